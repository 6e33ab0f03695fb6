//! Sink Bus - messages from the monitor core to the presentation sink
//!
//! Delivery is a bounded broadcast: if nobody listens, or a listener falls
//! behind, messages are lost. The core never waits on the sink.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::records::{ConsolidatedRecord, FailureRecord};

/// Payload of an `ACTIVE_COUNT` message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActiveCount {
    pub active_request_count: usize,
}

/// Messages the sink understands. Serializes as `{"type": ..., "data": ...}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SinkMessage {
    /// New session, drop all aggregated state
    Clear,
    ActiveCount(ActiveCount),
    Failed(FailureRecord),
    Data(ConsolidatedRecord),
}

impl SinkMessage {
    pub fn active_count(active_request_count: usize) -> Self {
        Self::ActiveCount(ActiveCount {
            active_request_count,
        })
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Clear => "CLEAR",
            Self::ActiveCount(_) => "ACTIVE_COUNT",
            Self::Failed(_) => "FAILED",
            Self::Data(_) => "DATA",
        }
    }
}

/// Best-effort fan-out to whatever sinks are currently subscribed
#[derive(Clone)]
pub struct SinkBus {
    tx: broadcast::Sender<SinkMessage>,
}

impl SinkBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Publish a message. Returns how many sinks received it.
    pub fn publish(&self, message: SinkMessage) -> usize {
        let kind = message.kind();
        match self.tx.send(message) {
            Ok(receivers) => receivers,
            Err(_) => {
                tracing::debug!("[SinkBus] No sink listening, dropped {}", kind);
                0
            }
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SinkMessage> {
        self.tx.subscribe()
    }

    pub fn sink_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for SinkBus {
    fn default() -> Self {
        Self::new(1024)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_sink_bus_delivers() {
        let bus = SinkBus::default();
        let mut rx = bus.subscribe();

        assert_eq!(bus.publish(SinkMessage::Clear), 1);

        match rx.recv().await {
            Ok(SinkMessage::Clear) => {}
            other => panic!("Expected Clear, got {:?}", other),
        }
    }

    #[test]
    fn publish_without_sink_is_swallowed() {
        let bus = SinkBus::new(4);
        assert_eq!(bus.sink_count(), 0);
        assert_eq!(bus.publish(SinkMessage::active_count(3)), 0);
    }

    #[test]
    fn wire_shape_matches_dashboard_protocol() {
        assert_eq!(
            serde_json::to_value(SinkMessage::Clear).unwrap(),
            json!({ "type": "CLEAR" })
        );
        assert_eq!(
            serde_json::to_value(SinkMessage::active_count(2)).unwrap(),
            json!({ "type": "ACTIVE_COUNT", "data": { "activeRequestCount": 2 } })
        );

        let failed = SinkMessage::Failed(FailureRecord {
            domain: "cdn.example.net".into(),
            full_url: "https://cdn.example.net/a.js".into(),
            method: "GET".into(),
            error_text: "net::ERR_BLOCKED_BY_CLIENT".into(),
            first_party: false,
        });
        let value = serde_json::to_value(&failed).unwrap();
        assert_eq!(value["type"], "FAILED");
        assert_eq!(value["data"]["fullUrl"], "https://cdn.example.net/a.js");
        assert_eq!(value["data"]["errorText"], "net::ERR_BLOCKED_BY_CLIENT");

        let back: SinkMessage = serde_json::from_value(value).unwrap();
        assert_eq!(back, failed);
    }
}
