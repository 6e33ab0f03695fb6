//! CDP Protocol Types
//!
//! Wire envelopes for CDP communication plus the typed `Network.*` events the
//! monitor consumes. Payloads are decoded into explicit structs; anything that
//! does not fit is rejected at decode time instead of being trusted.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Request ID - monotonically increasing
pub type RequestId = u64;

/// Target ID from Chrome
pub type TargetId = String;

/// Session ID for attached targets
pub type SessionId = String;

/// Network request identifier, opaque and assigned by the browser
pub type NetworkRequestId = String;

/// CDP Request sent to browser
#[derive(Debug, Clone, Serialize)]
pub struct CDPRequest {
    pub id: RequestId,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
    #[serde(rename = "sessionId", skip_serializing_if = "Option::is_none")]
    pub session_id: Option<SessionId>,
}

/// CDP Response from browser
#[derive(Debug, Clone, Deserialize)]
pub struct CDPResponse {
    pub id: RequestId,
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default)]
    pub error: Option<CDPError>,
}

/// CDP Error
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CDPError {
    pub code: i32,
    pub message: String,
    #[serde(default)]
    pub data: Option<Value>,
}

/// CDP Event from browser (no request ID)
#[derive(Debug, Clone, Deserialize)]
pub struct CDPEvent {
    pub method: String,
    #[serde(default)]
    pub params: Option<Value>,
    #[serde(rename = "sessionId", default)]
    pub session_id: Option<SessionId>,
}

/// Unified CDP Message (response or event)
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum CDPMessage {
    Response(CDPResponse),
    Event(CDPEvent),
}

/// Target Info from Target.getTargetInfo
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TargetInfo {
    #[serde(rename = "targetId")]
    pub target_id: TargetId,
    #[serde(rename = "type")]
    pub target_type: String,
    pub title: String,
    pub url: String,
    pub attached: bool,
}

/// Result of Target.attachToTarget
#[derive(Debug, Clone, Deserialize)]
pub struct AttachToTargetResult {
    #[serde(rename = "sessionId")]
    pub session_id: SessionId,
}

/// `request` object of `Network.requestWillBeSent`
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct RequestInfo {
    pub url: String,
    pub method: String,
}

/// Response that caused a redirect, carried on the follow-up request
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct RedirectResponse {
    pub url: String,
    pub status: u16,
}

/// `response` object of `Network.responseReceived`
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ResponseInfo {
    pub status: u16,
    #[serde(default)]
    pub mime_type: Option<String>,
    #[serde(default)]
    pub protocol: Option<String>,
    #[serde(default)]
    pub from_disk_cache: bool,
    #[serde(default)]
    pub from_service_worker: bool,
}

/// Params of `Network.requestWillBeSent`
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RequestWillBeSent {
    pub request_id: NetworkRequestId,
    pub request: RequestInfo,
    /// Monotonic protocol time in seconds
    pub timestamp: f64,
    #[serde(default)]
    pub redirect_response: Option<RedirectResponse>,
}

/// Params of `Network.responseReceived`
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ResponseReceived {
    pub request_id: NetworkRequestId,
    pub response: ResponseInfo,
}

/// Params of `Network.loadingFinished`
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LoadingFinished {
    pub request_id: NetworkRequestId,
    pub timestamp: f64,
    #[serde(default)]
    pub encoded_data_length: f64,
}

/// Params of `Network.loadingFailed`
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LoadingFailed {
    pub request_id: NetworkRequestId,
    #[serde(default)]
    pub error_text: String,
}

/// Network domain events understood by the monitor
#[derive(Debug, Clone, PartialEq)]
pub enum NetworkEvent {
    RequestWillBeSent(RequestWillBeSent),
    ResponseReceived(ResponseReceived),
    LoadingFinished(LoadingFinished),
    LoadingFailed(LoadingFailed),
}

impl NetworkEvent {
    /// CDP methods that decode into a [`NetworkEvent`]
    pub const METHODS: [&'static str; 4] = [
        "Network.requestWillBeSent",
        "Network.responseReceived",
        "Network.loadingFinished",
        "Network.loadingFailed",
    ];

    /// Decode a raw CDP event.
    ///
    /// Returns `Ok(None)` for methods the monitor does not track and an error
    /// when a tracked method carries a payload of the wrong shape.
    pub fn decode(method: &str, params: Option<&Value>) -> serde_json::Result<Option<Self>> {
        let params = params.cloned().unwrap_or(Value::Null);
        let event = match method {
            "Network.requestWillBeSent" => Self::RequestWillBeSent(serde_json::from_value(params)?),
            "Network.responseReceived" => Self::ResponseReceived(serde_json::from_value(params)?),
            "Network.loadingFinished" => Self::LoadingFinished(serde_json::from_value(params)?),
            "Network.loadingFailed" => Self::LoadingFailed(serde_json::from_value(params)?),
            _ => return Ok(None),
        };
        Ok(Some(event))
    }

    pub fn request_id(&self) -> &str {
        match self {
            Self::RequestWillBeSent(e) => &e.request_id,
            Self::ResponseReceived(e) => &e.request_id,
            Self::LoadingFinished(e) => &e.request_id,
            Self::LoadingFailed(e) => &e.request_id,
        }
    }
}
