//! Storage module for persisting crawl data
//!
//! This module handles everything a run writes outside its own memory:
//! - SQLite database initialization and schema management
//! - Page, metadata, asset, and article persistence
//! - Per-domain run statistics and log lines
//! - Live progress counters
//! - Asset upload backends

mod assets;
mod progress;
mod schema;
mod sqlite;
mod traits;

pub use assets::{AssetStore, DirectoryAssetStore, DisabledAssetStore, HttpAssetStore, UploadedAsset};
pub use progress::MemoryProgressStore;
pub use sqlite::SqliteStorage;
pub use traits::{PersistenceSink, ProgressStore, SslInfo, StorageError, StorageResult};

use crate::config::{AssetStorageConfig, AssetStorageKind};
use crate::HarvestError;
use chrono::{DateTime, Utc};
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

/// Initializes or opens a storage database
///
/// # Arguments
///
/// * `path` - Path to the SQLite database file
///
/// # Returns
///
/// * `Ok(SqliteStorage)` - Successfully initialized storage
/// * `Err(HarvestError)` - Failed to initialize storage
pub fn open_storage(path: &Path) -> Result<SqliteStorage, HarvestError> {
    SqliteStorage::new(path)
}

/// Builds the asset store selected by the `[asset-storage]` section
pub fn build_asset_store(
    config: &AssetStorageConfig,
    timeout: Duration,
) -> Result<Arc<dyn AssetStore>, HarvestError> {
    let store: Arc<dyn AssetStore> = match config.kind {
        AssetStorageKind::Disabled => Arc::new(DisabledAssetStore),
        AssetStorageKind::Directory => {
            let dir = config.directory.as_deref().ok_or_else(|| {
                HarvestError::Launch("asset-storage directory is not set".to_string())
            })?;
            Arc::new(DirectoryAssetStore::new(dir))
        }
        AssetStorageKind::Http => {
            let endpoint = config.endpoint.as_deref().ok_or_else(|| {
                HarvestError::Launch("asset-storage endpoint is not set".to_string())
            })?;
            let endpoint = url::Url::parse(endpoint)?;
            let store = HttpAssetStore::new(endpoint, config.api_key.clone(), timeout)
                .map_err(|e| HarvestError::Launch(e.to_string()))?;
            Arc::new(store)
        }
    };
    Ok(store)
}

/// Severity of a run log line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LogLevel {
    Debug,
    Info,
    Warning,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Debug => "DEBUG",
            Self::Info => "INFO",
            Self::Warning => "WARNING",
            Self::Error => "ERROR",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "DEBUG" => Some(Self::Debug),
            "INFO" => Some(Self::Info),
            "WARNING" => Some(Self::Warning),
            "ERROR" => Some(Self::Error),
            _ => None,
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One stored run log line
#[derive(Debug, Clone)]
pub struct LogEntry {
    pub time: DateTime<Utc>,
    pub level: LogLevel,
    pub message: String,
}
