//! Session metadata persistence
//!
//! Three keys survive between monitor restarts so a UI can show what is being
//! watched. Storage failures are logged by the caller, never fatal.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;
use tokio::sync::RwLock;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("metadata I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("metadata JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionMetadata {
    pub is_monitoring: bool,
    pub monitoring_tab_title: String,
    pub monitoring_origin: String,
}

impl SessionMetadata {
    pub fn active(title: impl Into<String>, origin: impl Into<String>) -> Self {
        Self {
            is_monitoring: true,
            monitoring_tab_title: title.into(),
            monitoring_origin: origin.into(),
        }
    }

    pub fn inactive() -> Self {
        Self::default()
    }
}

#[async_trait]
pub trait MetadataStore: Send + Sync {
    async fn save(&self, metadata: &SessionMetadata) -> Result<(), StoreError>;

    async fn load(&self) -> Result<SessionMetadata, StoreError>;
}

#[derive(Default)]
pub struct MemoryStore {
    metadata: RwLock<SessionMetadata>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MetadataStore for MemoryStore {
    async fn save(&self, metadata: &SessionMetadata) -> Result<(), StoreError> {
        *self.metadata.write().await = metadata.clone();
        Ok(())
    }

    async fn load(&self) -> Result<SessionMetadata, StoreError> {
        Ok(self.metadata.read().await.clone())
    }
}

/// Metadata kept as a small JSON document on disk
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl MetadataStore for JsonFileStore {
    async fn save(&self, metadata: &SessionMetadata) -> Result<(), StoreError> {
        let json = serde_json::to_vec_pretty(metadata)?;
        tokio::fs::write(&self.path, json).await?;
        Ok(())
    }

    /// A missing file reads as "not monitoring"
    async fn load(&self) -> Result<SessionMetadata, StoreError> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(SessionMetadata::inactive()),
            Err(e) => Err(e.into()),
        }
    }
}
