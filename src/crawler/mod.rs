//! Crawler module for web page fetching and processing
//!
//! This module contains the core crawling logic, including:
//! - The deduplicating frontier
//! - HTTP fetching with retry logic
//! - Concurrency limits and adaptive politeness delays
//! - HTML extraction of titles, text, metadata, articles, assets, and links
//! - The asset download and re-upload pipeline
//! - The per-run engine that ties them together

mod assets;
mod coordinator;
mod fetcher;
mod frontier;
mod parser;
mod scheduler;

pub use assets::{AssetError, AssetLimits, AssetPipeline};
pub use coordinator::{CrawlTarget, Engine, WorkerGauge, WorkerGuard};
pub use fetcher::{build_http_client, fetch_page, is_text_content_type, FetchResult, RetryPolicy};
pub use frontier::{Frontier, FrontierEntry};
pub use parser::{
    extract, Article, AssetKind, AssetRef, ExtractedPage, PageResult, RawPage, MAX_ARTICLE_CHARS,
    MAX_BODY_CHARS, MAX_IMAGES, MAX_LINKS, MAX_META_VALUE_CHARS, MAX_SCRIPTS, MAX_STYLESHEETS,
    MIN_ARTICLE_CHARS, UNTITLED,
};
pub use scheduler::{FetchScheduler, SchedulerLimits};
