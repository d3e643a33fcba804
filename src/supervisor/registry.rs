//! Process-wide registry of active runs
//!
//! At most one run is registered per domain. Entries are inserted when a run
//! launches and removed by the run itself when it reaches a terminal state.

use crate::crawler::WorkerGauge;
use crate::stats::StatsAggregator;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

/// Identifies one launch of a run
pub type RunId = u64;

/// Handle to an active run
#[derive(Clone)]
pub struct RunEntry {
    pub run_id: RunId,
    pub cancel: CancellationToken,
    pub stats: Arc<StatsAggregator>,

    /// Live fetch workers of the run's engine
    pub workers: WorkerGauge,

    /// Flips to `true` once the run is finalized
    pub done: watch::Receiver<bool>,
}

impl RunEntry {
    /// Waits until the run has been finalized
    pub async fn finished(&self) {
        let mut done = self.done.clone();
        // A dropped sender also means the run is gone
        let _ = done.wait_for(|done| *done).await;
    }
}

/// Mutex around a domain map with explicit insert and remove
#[derive(Clone, Default)]
pub struct RunRegistry {
    runs: Arc<Mutex<HashMap<String, RunEntry>>>,
}

impl RunRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, RunEntry>> {
        self.runs.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Registers `entry` for `domain`
    ///
    /// # Returns
    ///
    /// The entry it replaced, which the caller must shut down
    pub fn insert(&self, domain: &str, entry: RunEntry) -> Option<RunEntry> {
        self.lock().insert(domain.to_string(), entry)
    }

    /// Removes the entry for `domain` only if it still belongs to `run_id`
    pub fn remove(&self, domain: &str, run_id: RunId) -> bool {
        let mut runs = self.lock();
        match runs.get(domain) {
            Some(entry) if entry.run_id == run_id => {
                runs.remove(domain);
                true
            }
            _ => false,
        }
    }

    pub fn get(&self, domain: &str) -> Option<RunEntry> {
        self.lock().get(domain).cloned()
    }

    pub fn is_active(&self, domain: &str) -> bool {
        self.lock().contains_key(domain)
    }

    pub fn active_domains(&self) -> Vec<String> {
        let mut domains: Vec<_> = self.lock().keys().cloned().collect();
        domains.sort();
        domains
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}
