//! Request Lifecycle Tracker
//!
//! Rebuilds each network request from its `Network.*` events and emits one
//! record when it ends. Per request id the browser guarantees
//! start → response → terminal; across ids nothing is assumed.
//!
//! State per id: `NONE → STARTED → RESPONSE_RECEIVED → TERMINAL`. A terminal
//! event removes the entry, so anything arriving later for that id finds
//! nothing and is dropped.

use std::collections::HashMap;

use crate::cdp::protocol::{
    LoadingFailed, LoadingFinished, NetworkEvent, NetworkRequestId, RequestWillBeSent,
    ResponseReceived,
};
use crate::events::SinkMessage;
use crate::records::{ConsolidatedRecord, FailureRecord, RedirectHop};

const UNKNOWN: &str = "unknown";
const DEFAULT_ERROR_TEXT: &str = "Failed";

#[derive(Debug, Clone)]
struct ResponseMeta {
    status: u16,
    mime_type: Option<String>,
    protocol: Option<String>,
    from_cache: bool,
    from_service_worker: bool,
}

#[derive(Debug, Clone)]
struct InFlightRequest {
    url: String,
    method: String,
    start_time: f64,
    redirect_chain: Vec<RedirectHop>,
    response: Option<ResponseMeta>,
}

/// In-flight table plus the active-request counter for one session.
///
/// The counter goes up on every start event and down on every terminal event
/// that retires an entry; it never drops below zero. With unique request ids
/// it equals the number of in-flight entries between handler calls.
#[derive(Debug, Default)]
pub struct RequestTracker {
    in_flight: HashMap<NetworkRequestId, InFlightRequest>,
    active: usize,
    origin: String,
}

impl RequestTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_origin(origin: impl Into<String>) -> Self {
        Self {
            origin: origin.into(),
            ..Self::default()
        }
    }

    /// Domain that counts as first-party
    pub fn origin(&self) -> &str {
        &self.origin
    }

    pub fn set_origin(&mut self, origin: impl Into<String>) {
        self.origin = origin.into();
    }

    pub fn active_count(&self) -> usize {
        self.active
    }

    pub fn in_flight_len(&self) -> usize {
        self.in_flight.len()
    }

    pub fn is_tracking(&self, request_id: &str) -> bool {
        self.in_flight.contains_key(request_id)
    }

    /// Drop all in-flight state without emitting anything
    pub fn reset(&mut self) {
        if !self.in_flight.is_empty() {
            tracing::debug!(
                "[Tracker] Discarding {} in-flight requests",
                self.in_flight.len()
            );
        }
        self.in_flight.clear();
        self.active = 0;
    }

    /// Feed one event through the state machine and collect sink messages
    pub fn handle(&mut self, event: NetworkEvent) -> Vec<SinkMessage> {
        match event {
            NetworkEvent::RequestWillBeSent(e) => vec![self.on_request_start(e)],
            NetworkEvent::ResponseReceived(e) => {
                self.on_response_meta(e);
                Vec::new()
            }
            NetworkEvent::LoadingFinished(e) => match self.on_request_finished(e) {
                Some(record) => vec![
                    SinkMessage::Data(record),
                    SinkMessage::active_count(self.active),
                ],
                None => Vec::new(),
            },
            NetworkEvent::LoadingFailed(e) => {
                let before = self.active;
                let record = self.on_request_failed(e);
                let mut out = vec![SinkMessage::Failed(record)];
                if self.active != before {
                    out.push(SinkMessage::active_count(self.active));
                }
                out
            }
        }
    }

    /// `Network.requestWillBeSent`. Always bumps the counter and yields an
    /// active-count update, repeated ids included.
    ///
    /// A repeated id carrying `redirectResponse` is the next hop of the same
    /// request: the hop is appended and the original start time kept. A
    /// repeated id without one replaces the entry.
    pub fn on_request_start(&mut self, e: RequestWillBeSent) -> SinkMessage {
        let hop = e.redirect_response.map(|r| RedirectHop {
            url: r.url,
            status: r.status,
        });

        match self.in_flight.get_mut(&e.request_id) {
            Some(existing) if hop.is_some() => {
                existing.redirect_chain.extend(hop);
                existing.url = e.request.url;
                existing.method = e.request.method;
                existing.response = None;
                tracing::debug!(
                    "[Tracker] Redirect {} -> {} (hop {})",
                    e.request_id,
                    existing.url,
                    existing.redirect_chain.len()
                );
            }
            Some(existing) => {
                tracing::debug!("[Tracker] Duplicate start for {}, replacing", e.request_id);
                *existing = InFlightRequest {
                    url: e.request.url,
                    method: e.request.method,
                    start_time: e.timestamp,
                    redirect_chain: Vec::new(),
                    response: None,
                };
            }
            None => {
                tracing::debug!(
                    "[Tracker] Start {} {} {}",
                    e.request_id,
                    e.request.method,
                    e.request.url
                );
                self.in_flight.insert(
                    e.request_id,
                    InFlightRequest {
                        url: e.request.url,
                        method: e.request.method,
                        start_time: e.timestamp,
                        redirect_chain: hop.into_iter().collect(),
                        response: None,
                    },
                );
            }
        }

        self.active += 1;
        SinkMessage::active_count(self.active)
    }

    /// `Network.responseReceived`. Unknown ids (attached mid-flight) are ignored.
    pub fn on_response_meta(&mut self, e: ResponseReceived) {
        let Some(entry) = self.in_flight.get_mut(&e.request_id) else {
            tracing::trace!("[Tracker] Response for untracked {}", e.request_id);
            return;
        };

        entry.response = Some(ResponseMeta {
            status: e.response.status,
            mime_type: e.response.mime_type,
            protocol: e.response.protocol,
            from_cache: e.response.from_disk_cache,
            from_service_worker: e.response.from_service_worker,
        });
    }

    /// `Network.loadingFinished`. Returns the record, or `None` for unknown ids.
    pub fn on_request_finished(&mut self, e: LoadingFinished) -> Option<ConsolidatedRecord> {
        let entry = self.in_flight.remove(&e.request_id)?;

        let domain = domain_of(&entry.url);
        let first_party = self.is_first_party(&domain);
        let response = entry.response;

        let record = ConsolidatedRecord {
            duration_ms: duration_ms(entry.start_time, e.timestamp),
            bytes_transferred: e.encoded_data_length.max(0.0) as u64,
            status: response.as_ref().map_or(0, |r| r.status),
            mime_type: response
                .as_ref()
                .and_then(|r| r.mime_type.clone())
                .filter(|m| !m.is_empty())
                .unwrap_or_else(|| UNKNOWN.to_string()),
            protocol_name: response
                .as_ref()
                .and_then(|r| r.protocol.clone())
                .filter(|p| !p.is_empty())
                .unwrap_or_else(|| UNKNOWN.to_string()),
            from_cache: response.as_ref().is_some_and(|r| r.from_cache),
            from_service_worker: response.as_ref().is_some_and(|r| r.from_service_worker),
            full_url: entry.url,
            method: entry.method,
            redirect_chain: entry.redirect_chain,
            domain,
            first_party,
            active_request_count_at_completion: self.active,
        };

        self.active = self.active.saturating_sub(1);

        tracing::debug!(
            "[Tracker] Finished {} {} in {}ms",
            e.request_id,
            record.status,
            record.duration_ms
        );

        Some(record)
    }

    /// `Network.loadingFailed`. Always yields a record; unknown ids get an
    /// empty one and leave the counter alone.
    pub fn on_request_failed(&mut self, e: LoadingFailed) -> FailureRecord {
        let entry = self.in_flight.remove(&e.request_id);

        let (full_url, method) = match entry {
            Some(entry) => {
                self.active = self.active.saturating_sub(1);
                (entry.url, entry.method)
            }
            None => (String::new(), String::new()),
        };

        let domain = domain_of(&full_url);
        let error_text = if e.error_text.is_empty() {
            DEFAULT_ERROR_TEXT.to_string()
        } else {
            e.error_text
        };

        tracing::debug!("[Tracker] Failed {}: {}", e.request_id, error_text);

        FailureRecord {
            first_party: self.is_first_party(&domain),
            domain,
            full_url,
            method,
            error_text,
        }
    }

    fn is_first_party(&self, domain: &str) -> bool {
        !domain.is_empty() && domain == self.origin
    }
}

/// Hostname of `url` without a leading `www.`; empty if it does not parse
pub fn domain_of(url: &str) -> String {
    let Ok(parsed) = url::Url::parse(url) else {
        return String::new();
    };
    let host = parsed.host_str().unwrap_or_default();
    host.strip_prefix("www.").unwrap_or(host).to_string()
}

/// Milliseconds between two protocol timestamps, clamped at zero
pub fn duration_ms(start: f64, finish: f64) -> u64 {
    let ms = ((finish - start) * 1000.0).round();
    if ms.is_finite() && ms > 0.0 {
        ms as u64
    } else {
        0
    }
}
