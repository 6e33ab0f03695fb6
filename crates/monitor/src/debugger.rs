//! Debugger - the transport seam the session controller talks to
//!
//! The controller only needs attach, enable and detach plus a stream of
//! network events tagged with the target they came from. [`CdpDebugger`]
//! provides that over a live [`CDPClient`]; tests substitute their own.

use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::cdp::client::{CDPClient, CDPError};
use crate::cdp::protocol::{CDPEvent, NetworkEvent, SessionId, TargetId, TargetInfo};
use crate::cdp::CDPSession;

/// A decoded network event and where it came from
#[derive(Debug, Clone, PartialEq)]
pub struct TargetEvent {
    pub target_id: TargetId,
    /// CDP session the event was routed through, when the transport knows it
    pub session_id: Option<SessionId>,
    pub event: NetworkEvent,
}

/// What an attach yields
#[derive(Debug, Clone, PartialEq)]
pub struct AttachedTarget {
    pub session_id: SessionId,
    pub url: String,
    pub title: String,
}

#[async_trait]
pub trait Debugger: Send + Sync {
    async fn attach(&self, target_id: &str) -> Result<AttachedTarget, CDPError>;

    async fn enable_network(&self, target_id: &str) -> Result<(), CDPError>;

    async fn detach(&self, target_id: &str) -> Result<(), CDPError>;
}

/// CDP-backed debugger with one flat session per attached target
pub struct CdpDebugger {
    client: Arc<CDPClient>,
    sessions: DashMap<TargetId, CDPSession>,
    /// session id → target id, read by the event callbacks
    routes: Arc<DashMap<SessionId, TargetId>>,
}

impl CdpDebugger {
    /// Subscribe to the Network domain on `client` and return the event stream.
    ///
    /// Only events from sessions this debugger attached are forwarded.
    pub fn new(client: Arc<CDPClient>) -> (Self, mpsc::UnboundedReceiver<TargetEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let routes: Arc<DashMap<SessionId, TargetId>> = Arc::new(DashMap::new());

        for method in NetworkEvent::METHODS {
            let tx = tx.clone();
            let routes = routes.clone();
            client.subscribe(
                method,
                Arc::new(move |event: CDPEvent| route_event(&routes, &tx, event)),
            );
        }

        let debugger = Self {
            client,
            sessions: DashMap::new(),
            routes,
        };
        (debugger, rx)
    }

    /// All page targets the browser currently knows about
    pub async fn page_targets(&self) -> Result<Vec<TargetInfo>, CDPError> {
        let result = self
            .client
            .send_request("Target.getTargets", None, None)
            .await?;
        let targets: Vec<TargetInfo> = serde_json::from_value(result["targetInfos"].clone())?;
        Ok(targets
            .into_iter()
            .filter(|t| t.target_type == "page")
            .collect())
    }

    fn session(&self, target_id: &str) -> Result<CDPSession, CDPError> {
        self.sessions
            .get(target_id)
            .map(|s| s.value().clone())
            .ok_or_else(|| CDPError::NotAttached(target_id.to_string()))
    }
}

#[async_trait]
impl Debugger for CdpDebugger {
    async fn attach(&self, target_id: &str) -> Result<AttachedTarget, CDPError> {
        let session = CDPSession::attach(self.client.clone(), target_id.to_string()).await?;
        tracing::debug!(
            "[CDP] Attached {} as session {}",
            target_id,
            session.session_id
        );

        self.routes
            .insert(session.session_id.clone(), target_id.to_string());

        let attached = AttachedTarget {
            session_id: session.session_id.clone(),
            url: session.url.clone(),
            title: session.title.clone(),
        };
        self.sessions.insert(target_id.to_string(), session);
        Ok(attached)
    }

    async fn enable_network(&self, target_id: &str) -> Result<(), CDPError> {
        self.session(target_id)?.enable_network().await
    }

    async fn detach(&self, target_id: &str) -> Result<(), CDPError> {
        let (_, session) = self
            .sessions
            .remove(target_id)
            .ok_or_else(|| CDPError::NotAttached(target_id.to_string()))?;

        // Stop routing first so nothing from this session leaks out mid-detach
        self.routes.remove(&session.session_id);
        session.detach().await
    }
}

fn route_event(
    routes: &DashMap<SessionId, TargetId>,
    tx: &mpsc::UnboundedSender<TargetEvent>,
    event: CDPEvent,
) {
    let Some(session_id) = event.session_id else {
        return;
    };
    let Some(target_id) = routes.get(&session_id).map(|t| t.value().clone()) else {
        tracing::trace!("[CDP] {} from unrouted session {}", event.method, session_id);
        return;
    };

    match NetworkEvent::decode(&event.method, event.params.as_ref()) {
        Ok(Some(decoded)) => {
            let sent = tx.send(TargetEvent {
                target_id,
                session_id: Some(session_id),
                event: decoded,
            });
            if sent.is_err() {
                tracing::debug!("[CDP] Event receiver gone, dropping {}", event.method);
            }
        }
        Ok(None) => {}
        Err(e) => {
            tracing::warn!("[CDP] Malformed {} event: {}", event.method, e);
        }
    }
}

/// The tab a user most likely wants to watch: the last http(s) page that is
/// not one of the monitor's own pages.
pub fn select_monitorable<'a>(
    targets: &'a [TargetInfo],
    exclude_url_prefix: Option<&str>,
) -> Option<&'a TargetInfo> {
    targets.iter().rev().find(|t| {
        t.target_type == "page"
            && t.url.starts_with("http")
            && exclude_url_prefix.map_or(true, |prefix| !t.url.starts_with(prefix))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn cdp_event(method: &str, session: Option<&str>, params: serde_json::Value) -> CDPEvent {
        CDPEvent {
            method: method.to_string(),
            params: Some(params),
            session_id: session.map(str::to_string),
        }
    }

    #[test]
    fn routes_only_known_sessions() {
        let routes = DashMap::new();
        routes.insert("S1".to_string(), "T1".to_string());
        let (tx, mut rx) = mpsc::unbounded_channel();

        let params = json!({ "requestId": "r1", "errorText": "net::ERR_FAILED" });
        route_event(&routes, &tx, cdp_event("Network.loadingFailed", Some("S1"), params.clone()));
        route_event(&routes, &tx, cdp_event("Network.loadingFailed", Some("S2"), params.clone()));
        route_event(&routes, &tx, cdp_event("Network.loadingFailed", None, params));

        let routed = rx.try_recv().unwrap();
        assert_eq!(routed.target_id, "T1");
        assert_eq!(routed.session_id.as_deref(), Some("S1"));
        assert_eq!(routed.event.request_id(), "r1");
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn malformed_events_are_dropped() {
        let routes = DashMap::new();
        routes.insert("S1".to_string(), "T1".to_string());
        let (tx, mut rx) = mpsc::unbounded_channel();

        route_event(
            &routes,
            &tx,
            cdp_event("Network.loadingFinished", Some("S1"), json!({ "requestId": "r1" })),
        );

        assert!(rx.try_recv().is_err());
    }

    fn target(id: &str, kind: &str, url: &str) -> TargetInfo {
        TargetInfo {
            target_id: id.to_string(),
            target_type: kind.to_string(),
            title: id.to_string(),
            url: url.to_string(),
            attached: false,
        }
    }

    #[test]
    fn picks_last_http_page() {
        let targets = vec![
            target("a", "page", "https://example.com/"),
            target("b", "service_worker", "https://example.com/sw.js"),
            target("c", "page", "http://localhost:8080/dashboard.html"),
            target("d", "page", "chrome://newtab/"),
        ];

        assert_eq!(select_monitorable(&targets, None).unwrap().target_id, "c");
        assert_eq!(
            select_monitorable(&targets, Some("http://localhost:8080/"))
                .unwrap()
                .target_id,
            "a"
        );
        assert!(select_monitorable(&targets[3..], None).is_none());
    }
}
