//! Run reports from the crawl database
//!
//! This module provides functionality for loading a domain's persisted run
//! statistics and log lines and printing them for the terminal.

use crate::state::RunStats;
use crate::storage::{LogEntry, PersistenceSink};
use crate::HarvestError;

/// Everything stored about the last run for one domain
#[derive(Debug, Clone)]
pub struct DomainReport {
    pub domain: String,

    /// `None` if the domain was never crawled
    pub stats: Option<RunStats>,

    /// Rows in `crawled_pages` for the domain
    pub stored_pages: u64,

    /// Most recent log lines, oldest first
    pub logs: Vec<LogEntry>,
}

/// Loads the report for a domain
///
/// # Arguments
///
/// * `sink` - The storage backend to query
/// * `domain` - Domain to report on
/// * `log_limit` - Number of recent log lines to include
///
/// # Returns
///
/// * `Ok(DomainReport)` - Successfully loaded report
/// * `Err(HarvestError)` - Failed to query storage
pub fn load_report(
    sink: &dyn PersistenceSink,
    domain: &str,
    log_limit: usize,
) -> Result<DomainReport, HarvestError> {
    let stats = sink.get_run_stats(domain)?;
    let stored_pages = sink.count_pages(domain)?;
    let logs = if log_limit > 0 {
        sink.get_recent_logs(domain, log_limit)?
    } else {
        Vec::new()
    };

    Ok(DomainReport {
        domain: domain.to_string(),
        stats,
        stored_pages,
        logs,
    })
}

/// Renders run statistics as indented lines
pub fn format_stats(stats: &RunStats) -> String {
    let mut out = String::new();
    out.push_str(&format!("  Status: {}\n", stats.status));
    out.push_str(&format!("  Pages crawled: {}\n", stats.pages_crawled));
    out.push_str(&format!("  Pages failed: {}\n", stats.pages_failed));
    out.push_str(&format!("  Assets uploaded: {}\n", stats.assets_uploaded));

    if let Some(start) = stats.start_time {
        out.push_str(&format!("  Started: {}\n", start.to_rfc3339()));
    }
    if let Some(end) = stats.end_time {
        out.push_str(&format!("  Finished: {}\n", end.to_rfc3339()));
    }
    if let Some(duration) = stats.duration() {
        out.push_str(&format!("  Duration: {}s\n", duration.num_seconds()));
    }

    out
}

/// Renders one log line
pub fn format_log_entry(entry: &LogEntry) -> String {
    format!(
        "{} [{}] {}",
        entry.time.format("%Y-%m-%d %H:%M:%S"),
        entry.level,
        entry.message
    )
}

/// Prints a report to stdout
pub fn print_report(report: &DomainReport) {
    println!("=== Run Report: {} ===\n", report.domain);

    match &report.stats {
        Some(stats) => print!("{}", format_stats(stats)),
        None => println!("  No run recorded"),
    }
    println!("  Pages stored: {}", report.stored_pages);

    if !report.logs.is_empty() {
        println!("\nRecent log ({} lines):", report.logs.len());
        for entry in &report.logs {
            println!("  {}", format_log_entry(entry));
        }
    }
}
