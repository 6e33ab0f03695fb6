//! Scripted debugger shared by the integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use monitor::cdp::protocol::{
    LoadingFailed, LoadingFinished, NetworkEvent, RequestInfo, RequestWillBeSent,
    ResponseInfo, ResponseReceived,
};
use monitor::cdp::CDPError;
use monitor::debugger::{AttachedTarget, Debugger, TargetEvent};
use monitor::SinkMessage;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use tokio::sync::broadcast;

#[derive(Default)]
pub struct FakeDebugger {
    pages: HashMap<String, String>,
    fail_attach: HashSet<String>,
    fail_enable: HashSet<String>,
    fail_detach: HashSet<String>,
    attachments: AtomicUsize,
    calls: Mutex<Vec<String>>,
}

impl FakeDebugger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_page(mut self, target_id: &str, url: &str) -> Self {
        self.pages.insert(target_id.to_string(), url.to_string());
        self
    }

    pub fn failing_attach(mut self, target_id: &str) -> Self {
        self.fail_attach.insert(target_id.to_string());
        self
    }

    pub fn failing_enable(mut self, target_id: &str) -> Self {
        self.fail_enable.insert(target_id.to_string());
        self
    }

    pub fn failing_detach(mut self, target_id: &str) -> Self {
        self.fail_detach.insert(target_id.to_string());
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    /// CDP session id handed out by the n-th successful attach (1-based)
    pub fn session_id(target_id: &str, n: usize) -> String {
        format!("{}#{}", target_id, n)
    }

    fn log(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }

    fn refused(message: &str) -> CDPError {
        CDPError::Protocol {
            code: -32000,
            message: message.to_string(),
        }
    }
}

#[async_trait]
impl Debugger for FakeDebugger {
    async fn attach(&self, target_id: &str) -> Result<AttachedTarget, CDPError> {
        self.log(format!("attach {}", target_id));
        if self.fail_attach.contains(target_id) {
            return Err(Self::refused("Another debugger is already attached"));
        }
        let url = self
            .pages
            .get(target_id)
            .cloned()
            .ok_or_else(|| Self::refused("No target with given id found"))?;
        let n = self.attachments.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(AttachedTarget {
            session_id: Self::session_id(target_id, n),
            url,
            title: format!("Title of {}", target_id),
        })
    }

    async fn enable_network(&self, target_id: &str) -> Result<(), CDPError> {
        self.log(format!("enable {}", target_id));
        if self.fail_enable.contains(target_id) {
            return Err(Self::refused("Network domain unavailable"));
        }
        Ok(())
    }

    async fn detach(&self, target_id: &str) -> Result<(), CDPError> {
        self.log(format!("detach {}", target_id));
        if self.fail_detach.contains(target_id) {
            return Err(CDPError::Closed);
        }
        Ok(())
    }
}

pub fn started(target: &str, session: &str, id: &str, url: &str, ts: f64) -> TargetEvent {
    wrap(
        target,
        session,
        NetworkEvent::RequestWillBeSent(RequestWillBeSent {
            request_id: id.to_string(),
            request: RequestInfo {
                url: url.to_string(),
                method: "GET".to_string(),
            },
            timestamp: ts,
            redirect_response: None,
        }),
    )
}

pub fn responded(target: &str, session: &str, id: &str, status: u16) -> TargetEvent {
    wrap(
        target,
        session,
        NetworkEvent::ResponseReceived(ResponseReceived {
            request_id: id.to_string(),
            response: ResponseInfo {
                status,
                mime_type: Some("image/gif".to_string()),
                protocol: Some("http/1.1".to_string()),
                from_disk_cache: false,
                from_service_worker: false,
            },
        }),
    )
}

pub fn finished(target: &str, session: &str, id: &str, ts: f64) -> TargetEvent {
    wrap(
        target,
        session,
        NetworkEvent::LoadingFinished(LoadingFinished {
            request_id: id.to_string(),
            timestamp: ts,
            encoded_data_length: 43.0,
        }),
    )
}

pub fn failed(target: &str, session: &str, id: &str) -> TargetEvent {
    wrap(
        target,
        session,
        NetworkEvent::LoadingFailed(LoadingFailed {
            request_id: id.to_string(),
            error_text: "net::ERR_BLOCKED_BY_CLIENT".to_string(),
        }),
    )
}

fn wrap(target: &str, session: &str, event: NetworkEvent) -> TargetEvent {
    TargetEvent {
        target_id: target.to_string(),
        session_id: Some(session.to_string()),
        event,
    }
}

/// Everything currently buffered for a sink
pub fn drain(rx: &mut broadcast::Receiver<SinkMessage>) -> Vec<SinkMessage> {
    let mut out = Vec::new();
    while let Ok(message) = rx.try_recv() {
        out.push(message);
    }
    out
}

pub fn records(messages: &[SinkMessage]) -> usize {
    messages
        .iter()
        .filter(|m| matches!(m, SinkMessage::Data(_) | SinkMessage::Failed(_)))
        .count()
}
