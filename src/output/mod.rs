//! Output module for reporting on crawl runs
//!
//! This module handles:
//! - Loading persisted run statistics and log lines for a domain
//! - Rendering them for the terminal

pub mod stats;

pub use stats::{format_log_entry, format_stats, load_report, print_report, DomainReport};
