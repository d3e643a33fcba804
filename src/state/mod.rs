//! State module for tracking crawl runs
//!
//! This module provides the run lifecycle and per-domain politeness state.
//!
//! # Components
//!
//! - `RunStatus`: Lifecycle of a run (pending, running, completed, failed)
//! - `RunStats`: Counters and timestamps reported for a run
//! - `DomainState`: Adaptive inter-request delay for a domain

mod domain_state;
mod run_state;

// Re-export main types
pub use domain_state::DomainState;
pub use run_state::{RunStats, RunStatus};
