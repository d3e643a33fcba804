//! Progress and statistics for crawl runs
//!
//! This module provides:
//! - `ProgressCounter`: numerator/denominator pair with a derived percentage
//! - `StatsAggregator`: the run's counters, status, and timestamps behind one lock

mod aggregator;
mod counter;

pub use aggregator::StatsAggregator;
pub use counter::ProgressCounter;
