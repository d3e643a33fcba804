//! Configuration for crawl runs
//!
//! A run is configured from one TOML file with kebab-case keys. Only the
//! `[user-agent]` and `[output]` tables are required; `[crawler]`, `[fetch]`,
//! `[assets]`, `[supervisor]`, and `[asset-storage]` fall back to defaults.
//!
//! ```no_run
//! use site_harvest::config::load_config_with_hash;
//! use std::path::Path;
//!
//! let (config, hash) = load_config_with_hash(Path::new("harvest.toml")).unwrap();
//! println!("{} pages at most, config {}", config.crawler.max_pages, hash);
//! ```

mod parser;
mod types;
mod validation;

pub use parser::{compute_config_hash, load_config, load_config_with_hash, parse_config};
pub use types::{
    AssetStorageConfig, AssetStorageKind, AssetsConfig, Config, CrawlerConfig, FetchConfig,
    OutputConfig, SupervisorConfig, UserAgentConfig,
};
