use serde::Deserialize;

/// Main configuration structure for Site-Harvest
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub crawler: CrawlerConfig,
    #[serde(default)]
    pub fetch: FetchConfig,
    #[serde(default)]
    pub assets: AssetsConfig,
    #[serde(default)]
    pub supervisor: SupervisorConfig,
    #[serde(rename = "user-agent")]
    pub user_agent: UserAgentConfig,
    pub output: OutputConfig,
    #[serde(rename = "asset-storage", default)]
    pub asset_storage: AssetStorageConfig,
}

/// Crawl traversal limits and concurrency
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct CrawlerConfig {
    /// Maximum link depth from the seed page
    #[serde(default = "default_max_depth")]
    pub max_depth: u32,

    /// Page-count ceiling; also the progress denominator
    #[serde(default = "default_max_pages")]
    pub max_pages: u64,

    /// Maximum number of concurrent page fetches across all domains
    #[serde(default = "default_global_concurrency")]
    pub global_concurrency: usize,

    /// Maximum number of concurrent page fetches against one domain
    #[serde(default = "default_domain_concurrency")]
    pub domain_concurrency: usize,

    /// Soft wall-clock budget after which no new fetches are issued (seconds)
    #[serde(default = "default_crawl_budget_secs")]
    pub crawl_budget_secs: u64,
}

/// Per-request fetch behavior
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct FetchConfig {
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Retries after the first attempt on transient failures
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,

    /// Starting inter-request delay per domain (milliseconds)
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,

    /// Ceiling of the adaptive inter-request delay (milliseconds)
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

/// Asset pipeline limits
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct AssetsConfig {
    #[serde(default = "default_asset_workers")]
    pub workers: usize,

    #[serde(default = "default_download_timeout_secs")]
    pub download_timeout_secs: u64,

    #[serde(default = "default_max_asset_bytes")]
    pub max_asset_bytes: u64,
}

/// Run supervision
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct SupervisorConfig {
    /// Hard wall-clock ceiling for a whole run (seconds)
    #[serde(default = "default_run_timeout_secs")]
    pub run_timeout_secs: u64,

    /// Time a cancelled engine gets to wind down before it is aborted
    #[serde(default = "default_shutdown_grace_secs")]
    pub shutdown_grace_secs: u64,

    /// Require DNS and TCP reachability before a run may start
    #[serde(default = "default_true")]
    pub verify_domain: bool,
}

/// User agent identification configuration
#[derive(Debug, Clone, Deserialize)]
pub struct UserAgentConfig {
    /// Name of the crawler
    #[serde(rename = "crawler-name")]
    pub crawler_name: String,

    /// Version of the crawler
    #[serde(rename = "crawler-version")]
    pub crawler_version: String,

    /// URL with information about the crawler
    #[serde(rename = "contact-url")]
    pub contact_url: String,
}

impl UserAgentConfig {
    /// Formats the `User-Agent` header value
    pub fn header_value(&self) -> String {
        format!(
            "{}/{} (+{})",
            self.crawler_name, self.crawler_version, self.contact_url
        )
    }
}

/// Output configuration
#[derive(Debug, Clone, Deserialize)]
pub struct OutputConfig {
    /// Path to the SQLite database file
    #[serde(rename = "database-path")]
    pub database_path: String,
}

/// Where re-uploaded assets end up
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum AssetStorageKind {
    /// Assets are recorded but never downloaded
    #[default]
    Disabled,
    /// Assets are written below a local directory
    Directory,
    /// Assets are POSTed to an HTTP upload endpoint
    Http,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub struct AssetStorageConfig {
    #[serde(default)]
    pub kind: AssetStorageKind,

    /// Root directory for `kind = "directory"`
    pub directory: Option<String>,

    /// Upload URL for `kind = "http"`
    pub endpoint: Option<String>,

    /// Bearer token sent with uploads
    pub api_key: Option<String>,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            max_depth: default_max_depth(),
            max_pages: default_max_pages(),
            global_concurrency: default_global_concurrency(),
            domain_concurrency: default_domain_concurrency(),
            crawl_budget_secs: default_crawl_budget_secs(),
        }
    }
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            request_timeout_secs: default_request_timeout_secs(),
            max_retries: default_max_retries(),
            backoff_base_ms: default_backoff_base_ms(),
            initial_delay_ms: default_initial_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
        }
    }
}

impl Default for AssetsConfig {
    fn default() -> Self {
        Self {
            workers: default_asset_workers(),
            download_timeout_secs: default_download_timeout_secs(),
            max_asset_bytes: default_max_asset_bytes(),
        }
    }
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            run_timeout_secs: default_run_timeout_secs(),
            shutdown_grace_secs: default_shutdown_grace_secs(),
            verify_domain: default_true(),
        }
    }
}

fn default_max_depth() -> u32 {
    3
}

fn default_max_pages() -> u64 {
    100
}

fn default_global_concurrency() -> usize {
    16
}

fn default_domain_concurrency() -> usize {
    8
}

fn default_crawl_budget_secs() -> u64 {
    1800
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_max_retries() -> u32 {
    2
}

fn default_backoff_base_ms() -> u64 {
    500
}

fn default_initial_delay_ms() -> u64 {
    500
}

fn default_max_delay_ms() -> u64 {
    3000
}

fn default_asset_workers() -> usize {
    5
}

fn default_download_timeout_secs() -> u64 {
    10
}

fn default_max_asset_bytes() -> u64 {
    10 * 1024 * 1024
}

fn default_run_timeout_secs() -> u64 {
    3600
}

fn default_shutdown_grace_secs() -> u64 {
    5
}

fn default_true() -> bool {
    true
}
