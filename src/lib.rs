//! Site-Harvest: a supervised single-domain crawl engine
//!
//! This crate turns one seed URL into a bounded, deduplicated, concurrent
//! traversal of a single site. Pages are extracted into structured results,
//! linked assets are re-uploaded through a separate worker pool, and every run
//! is supervised, time-boxed, and reported on in real time.

pub mod config;
pub mod crawler;
pub mod output;
pub mod state;
pub mod stats;
pub mod storage;
pub mod supervisor;
pub mod url;

use thiserror::Error;

/// Main error type for Site-Harvest operations
#[derive(Debug, Error)]
pub enum HarvestError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Storage error: {0}")]
    Storage(#[from] storage::StorageError),

    #[error("URL error: {0}")]
    UrlError(#[from] UrlError),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] ::url::ParseError),

    #[error("HTTP client error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Crawl could not be launched: {0}")]
    Launch(String),

    #[error("Pre-flight verification failed for {domain}: dns_ok={dns_ok}, socket_ok={socket_ok}")]
    VerificationFailed {
        domain: String,
        dns_ok: bool,
        socket_ok: bool,
    },

    #[error("Run for {domain} exceeded its {secs}s wall-clock limit")]
    RunTimeout { domain: String, secs: u64 },

    #[error("Run for {domain} was cancelled")]
    Cancelled { domain: String },

    #[error("Crawl worker crashed: {0}")]
    WorkerCrashed(String),

    #[error("Invalid run transition: {from:?} -> {to:?}")]
    InvalidTransition {
        from: state::RunStatus,
        to: state::RunStatus,
    },
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),
}

/// URL-specific errors
#[derive(Debug, Error)]
pub enum UrlError {
    #[error("Failed to parse URL: {0}")]
    Parse(String),

    #[error("Invalid URL scheme: {0}")]
    InvalidScheme(String),

    #[error("Missing domain in URL")]
    MissingDomain,

    #[error("Malformed URL: {0}")]
    Malformed(String),
}

/// Result type alias for Site-Harvest operations
pub type Result<T> = std::result::Result<T, HarvestError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Result type alias for URL operations
pub type UrlResult<T> = std::result::Result<T, UrlError>;

// Re-export commonly used types
pub use config::Config;
pub use crawler::{CrawlTarget, Engine};
pub use state::{RunStats, RunStatus};
pub use stats::StatsAggregator;
pub use supervisor::{RunControl, Supervisor};
pub use crate::url::{extract_domain, fingerprint, normalize_url, Fingerprint};
