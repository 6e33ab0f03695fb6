//! CDP Session - one flat-mode attachment to a browser target
//!
//! All sessions share the client's WebSocket; commands are routed with the
//! `sessionId` Chrome hands back from `Target.attachToTarget`.

use super::client::{CDPClient, Result};
use super::protocol::{AttachToTargetResult, SessionId, TargetId, TargetInfo};
use serde_json::{json, Value};
use std::sync::Arc;

/// CDP Session bound to a specific target
#[derive(Clone)]
pub struct CDPSession {
    client: Arc<CDPClient>,

    pub target_id: TargetId,

    /// Session ID assigned by Chrome
    pub session_id: SessionId,

    /// Target info captured right after attaching
    pub title: String,
    pub url: String,
}

impl CDPSession {
    /// Attach to a target and read its current info.
    ///
    /// No domain is enabled here; callers pick what to observe. If the
    /// target info cannot be read, the fresh attachment is detached again
    /// before the error is returned.
    pub async fn attach(client: Arc<CDPClient>, target_id: TargetId) -> Result<Self> {
        let result = client
            .send_request(
                "Target.attachToTarget",
                Some(json!({
                    "targetId": target_id,
                    "flatten": true,
                })),
                None,
            )
            .await?;

        let attach_result: AttachToTargetResult = serde_json::from_value(result)?;

        let mut session = Self {
            client,
            target_id,
            session_id: attach_result.session_id,
            title: String::new(),
            url: String::new(),
        };

        let info = match session.get_target_info().await {
            Ok(info) => info,
            Err(e) => {
                if let Err(detach_err) = session.detach().await {
                    tracing::warn!(
                        "[CDP] Failed to detach {} after target info error: {}",
                        session.session_id,
                        detach_err
                    );
                }
                return Err(e);
            }
        };
        session.title = info.title;
        session.url = info.url;

        Ok(session)
    }

    /// Send command within this session's context
    pub async fn send(&self, method: impl Into<String>, params: Option<Value>) -> Result<Value> {
        self.client
            .send_request(method, params, Some(self.session_id.clone()))
            .await
    }

    /// Start receiving `Network.*` events for this target
    pub async fn enable_network(&self) -> Result<()> {
        self.send("Network.enable", Some(json!({}))).await?;
        Ok(())
    }

    /// Detach from the target; Chrome stops routing its events to us
    pub async fn detach(&self) -> Result<()> {
        self.client
            .send_request(
                "Target.detachFromTarget",
                Some(json!({ "sessionId": &self.session_id })),
                None,
            )
            .await?;
        Ok(())
    }

    /// Get current target info
    pub async fn get_target_info(&self) -> Result<TargetInfo> {
        let result = self
            .client
            .send_request(
                "Target.getTargetInfo",
                Some(json!({ "targetId": &self.target_id })),
                None,
            )
            .await?;

        Ok(serde_json::from_value(result["targetInfo"].clone())?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cdp::client::CDPError;
    use futures_util::{SinkExt, StreamExt};
    use std::time::Duration;
    use tokio::net::TcpListener;
    use tokio::sync::mpsc;
    use tokio_tungstenite::tungstenite::Message;

    /// Local CDP endpoint that accepts the attach, rejects
    /// `Target.getTargetInfo` and reports every detach it sees.
    async fn spawn_flaky_target_server() -> (String, mpsc::UnboundedReceiver<Value>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (detach_tx, detach_rx) = mpsc::unbounded_channel();

        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();

            while let Some(Ok(msg)) = ws.next().await {
                let Message::Text(text) = msg else { continue };
                let request: Value = serde_json::from_str(&text).unwrap();
                let id = request["id"].clone();

                let reply = match request["method"].as_str() {
                    Some("Target.attachToTarget") => {
                        json!({ "id": id, "result": { "sessionId": "S1" } })
                    }
                    Some("Target.getTargetInfo") => json!({
                        "id": id,
                        "error": { "code": -32000, "message": "No target with given id found" }
                    }),
                    Some("Target.detachFromTarget") => {
                        let _ = detach_tx.send(request["params"].clone());
                        json!({ "id": id, "result": {} })
                    }
                    _ => json!({ "id": id, "result": {} }),
                };

                if ws.send(Message::Text(reply.to_string())).await.is_err() {
                    break;
                }
            }
        });

        (format!("ws://{}", addr), detach_rx)
    }

    #[tokio::test]
    async fn attach_detaches_when_target_info_fails() {
        let (url, mut detaches) = spawn_flaky_target_server().await;
        let client = CDPClient::connect_with_timeout(&url, Duration::from_secs(2))
            .await
            .unwrap();

        let err = CDPSession::attach(client.clone(), "T1".to_string())
            .await
            .err()
            .expect("attach should fail");
        assert!(matches!(err, CDPError::Protocol { code: -32000, .. }));

        let params = tokio::time::timeout(Duration::from_secs(2), detaches.recv())
            .await
            .expect("detach was not sent")
            .unwrap();
        assert_eq!(params["sessionId"], "S1");
    }
}
