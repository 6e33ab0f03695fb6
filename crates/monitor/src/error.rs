//! Errors surfaced to whoever drives the monitor.
//!
//! Only failed session transitions reach the caller. Unknown request ids,
//! malformed URLs, clock anomalies and an absent sink are all absorbed where
//! they happen.

use thiserror::Error;

use crate::cdp::client::CDPError;
use crate::cdp::protocol::TargetId;

#[derive(Error, Debug)]
pub enum MonitorError {
    #[error("attaching to target {target_id} failed: {source}")]
    Attach {
        target_id: TargetId,
        #[source]
        source: CDPError,
    },

    #[error("enabling network observation on {target_id} failed: {source}")]
    EnableNetwork {
        target_id: TargetId,
        #[source]
        source: CDPError,
    },

    #[error("monitor service is not running")]
    ServiceClosed,
}

impl MonitorError {
    /// Target whose attachment failed, if this is an attach-phase error
    pub fn target_id(&self) -> Option<&str> {
        match self {
            Self::Attach { target_id, .. } | Self::EnableNetwork { target_id, .. } => {
                Some(target_id.as_str())
            }
            Self::ServiceClosed => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, MonitorError>;
