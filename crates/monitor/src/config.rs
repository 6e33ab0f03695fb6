//! Monitor configuration

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("reading config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("parsing config {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Browser-level DevTools WebSocket URL
    pub cdp_url: String,

    /// Buffered messages per sink before a slow sink starts losing them
    pub sink_capacity: usize,

    /// Length of the recent-requests list kept by the stats fold
    pub recent_limit: usize,

    /// Rows returned by `TrafficStats::top_domains` by default
    pub top_domains: usize,

    /// JSON file for session metadata; in-memory when unset
    pub metadata_path: Option<PathBuf>,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            cdp_url: "ws://localhost:9222/devtools/browser".to_string(),
            sink_capacity: 1024,
            recent_limit: 150,
            top_domains: 12,
            metadata_path: None,
        }
    }
}

impl MonitorConfig {
    /// Load from a JSON file; absent fields keep their defaults
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| ConfigError::Io {
                path: path.to_path_buf(),
                source,
            })?;
        serde_json::from_str(&raw).map_err(|source| ConfigError::Json {
            path: path.to_path_buf(),
            source,
        })
    }
}
