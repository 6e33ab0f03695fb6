//! Records emitted by the tracker once a request reaches a terminal event.

use serde::{Deserialize, Serialize};

/// One redirect hop observed before the final response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedirectHop {
    pub url: String,
    pub status: u16,
}

/// A completed request, fully reconstructed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsolidatedRecord {
    pub domain: String,
    pub full_url: String,
    pub method: String,
    /// 0 when no response headers were observed
    pub status: u16,
    pub mime_type: String,
    pub protocol_name: String,
    pub duration_ms: u64,
    pub bytes_transferred: u64,
    pub redirect_chain: Vec<RedirectHop>,
    pub first_party: bool,
    pub from_cache: bool,
    pub from_service_worker: bool,
    /// In-flight count including this request, taken before it was retired
    pub active_request_count_at_completion: usize,
}

/// A request that ended in `loadingFailed`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FailureRecord {
    pub domain: String,
    pub full_url: String,
    pub method: String,
    pub error_text: String,
    pub first_party: bool,
}
