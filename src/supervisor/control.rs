//! Query and control surface over supervised runs
//!
//! Queries never fail: a domain with no active run is answered from storage,
//! and a domain never seen at all reports `pending` at 0%.

use crate::state::{RunStats, RunStatus};
use crate::stats::ProgressCounter;
use crate::storage::LogEntry;
use crate::supervisor::registry::RunId;
use crate::supervisor::run::Supervisor;
use crate::url::clean_domain;
use crate::HarvestError;
use std::sync::Arc;

/// Progress snapshot for one domain
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Progress {
    pub status: RunStatus,

    /// In `[0, 100]`, two decimals
    pub percentage: f64,
}

/// Cloneable handle used by callers to start, watch, and stop runs
#[derive(Clone)]
pub struct RunControl {
    supervisor: Arc<Supervisor>,
}

impl RunControl {
    pub fn new(supervisor: Supervisor) -> Self {
        Self {
            supervisor: Arc::new(supervisor),
        }
    }

    pub fn supervisor(&self) -> &Supervisor {
        &self.supervisor
    }

    fn key(domain: &str) -> String {
        clean_domain(domain).unwrap_or_else(|| domain.to_string())
    }

    /// Starts a run, superseding any active run for the same domain
    pub async fn start_run(&self, seed: &str, domain: Option<&str>) -> Result<RunId, HarvestError> {
        let entry = self.supervisor.launch(seed, domain).await?;
        Ok(entry.run_id)
    }

    /// Current status and percentage for `domain`
    pub fn get_progress(&self, domain: &str) -> Progress {
        let domain = Self::key(domain);

        if let Some(entry) = self.supervisor.registry().get(&domain) {
            return Progress {
                status: entry.stats.status(),
                percentage: entry.stats.percentage(),
            };
        }

        let status = self
            .stored_stats(&domain)
            .map(|stats| stats.status)
            .unwrap_or_default();

        let store = self.supervisor.progress_store();
        let counter = store.get_counter(&domain).unwrap_or(0.0);
        let target = store.get_target(&domain).ok().flatten().unwrap_or(0);
        let mut progress = ProgressCounter::new(target);
        progress.advance(counter);

        Progress {
            status,
            percentage: progress.percentage(),
        }
    }

    /// Statistics of the active run, else the last persisted ones
    pub fn get_stats(&self, domain: &str) -> RunStats {
        let domain = Self::key(domain);
        match self.supervisor.registry().get(&domain) {
            Some(entry) => entry.stats.snapshot(),
            None => self.stored_stats(&domain).unwrap_or_default(),
        }
    }

    /// The newest `limit` log lines for `domain`, oldest first
    pub fn get_recent_logs(&self, domain: &str, limit: usize) -> Vec<LogEntry> {
        let domain = Self::key(domain);
        self.supervisor
            .sink()
            .get_recent_logs(&domain, limit)
            .unwrap_or_else(|e| {
                tracing::warn!("Failed to read logs for {}: {}", domain, e);
                Vec::new()
            })
    }

    /// Waits until the active run for `domain` has been finalized
    ///
    /// Returns immediately with the stored statistics if no run is active.
    pub async fn wait(&self, domain: &str) -> RunStats {
        let key = Self::key(domain);
        if let Some(entry) = self.supervisor.registry().get(&key) {
            entry.finished().await;
            let stats = entry.stats.snapshot();
            // A successor may already own the domain; report this run's numbers
            return stats;
        }
        self.get_stats(&key)
    }

    /// Requests cancellation of the active run for `domain`
    ///
    /// # Returns
    ///
    /// `true` if a run was active
    pub fn cancel(&self, domain: &str) -> bool {
        match self.supervisor.registry().get(&Self::key(domain)) {
            Some(entry) => {
                entry.cancel.cancel();
                true
            }
            None => false,
        }
    }

    pub fn is_active(&self, domain: &str) -> bool {
        self.supervisor.registry().is_active(&Self::key(domain))
    }

    fn stored_stats(&self, domain: &str) -> Option<RunStats> {
        self.supervisor
            .sink()
            .get_run_stats(domain)
            .unwrap_or_else(|e| {
                tracing::warn!("Failed to read stats for {}: {}", domain, e);
                None
            })
    }
}
