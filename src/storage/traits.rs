//! Storage traits and error types
//!
//! This module defines the trait interfaces for the persistence sink and the
//! progress counter store, and their associated error types.

use crate::crawler::{Article, AssetRef};
use crate::state::RunStats;
use crate::storage::{LogEntry, LogLevel};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Storage lock poisoned")]
    Poisoned,

    #[error("Corrupt row: {0}")]
    Corrupt(String),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Stored certificate details of a domain
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SslInfo {
    pub issuer: Option<String>,
    pub expiry: Option<DateTime<Utc>>,
}

/// Sink for everything a run produces
///
/// Every write is an idempotent upsert keyed by URL or domain, so concurrent
/// writers from different pages never need to be serialized by the caller.
/// The engine logs failures and carries on; none of them abort a run.
pub trait PersistenceSink: Send + Sync {
    // ===== Page Data =====

    /// Inserts a crawled page, or refreshes it if the URL is already stored
    ///
    /// # Returns
    ///
    /// The page ID (either newly created or existing)
    fn insert_page(
        &self,
        url: &str,
        domain: &str,
        title: &str,
        body: &str,
        status_code: u16,
        content_type: &str,
    ) -> StorageResult<i64>;

    /// Stores the meta tags of a page, replacing values for repeated keys
    fn insert_metadata_batch(
        &self,
        page_id: i64,
        metadata: &BTreeMap<String, String>,
    ) -> StorageResult<usize>;

    /// Stores the assets found on a page with their upload outcome
    fn insert_asset_batch(&self, page_id: i64, assets: &[AssetRef]) -> StorageResult<usize>;

    /// Stores the article extracted from a page
    fn insert_article(&self, page_id: i64, article: &Article) -> StorageResult<()>;

    // ===== Run Reporting =====

    /// Appends a line to the per-domain run log
    fn append_log(&self, domain: &str, message: &str, level: LogLevel) -> StorageResult<()>;

    /// Writes the current counters, status, and timestamps for a domain
    fn upsert_run_stats(&self, domain: &str, stats: &RunStats) -> StorageResult<()>;

    /// Records the certificate issuer and expiry seen when verifying a domain
    fn upsert_ssl_info(
        &self,
        domain: &str,
        issuer: Option<&str>,
        expiry: Option<DateTime<Utc>>,
    ) -> StorageResult<()>;

    // ===== Readers =====

    /// Gets the stored statistics for a domain
    fn get_run_stats(&self, domain: &str) -> StorageResult<Option<RunStats>>;

    /// Gets the most recent `limit` log lines for a domain, oldest first
    fn get_recent_logs(&self, domain: &str, limit: usize) -> StorageResult<Vec<LogEntry>>;

    /// Counts stored pages for a domain
    fn count_pages(&self, domain: &str) -> StorageResult<u64>;

    /// Gets the stored certificate issuer and expiry for a domain
    fn get_ssl_info(&self, domain: &str) -> StorageResult<Option<SslInfo>>;
}

/// Key-value store holding live progress counters per domain
pub trait ProgressStore: Send + Sync {
    /// Overwrites the counter for a domain
    fn set_counter(&self, domain: &str, value: f64) -> StorageResult<()>;

    /// Adds `amount` to the counter and returns the new value
    fn increment_counter(&self, domain: &str, amount: f64) -> StorageResult<f64>;

    /// Reads the counter, 0.0 when the domain is unknown
    fn get_counter(&self, domain: &str) -> StorageResult<f64>;

    /// Sets the denominator the counter is measured against
    fn set_target(&self, domain: &str, target: u64) -> StorageResult<()>;

    /// Reads the denominator, None when the domain is unknown
    fn get_target(&self, domain: &str) -> StorageResult<Option<u64>>;

    /// Zeroes the counter for a domain
    fn reset(&self, domain: &str) -> StorageResult<()>;
}
