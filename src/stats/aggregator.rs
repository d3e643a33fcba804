use crate::state::{RunStats, RunStatus};
use crate::stats::ProgressCounter;
use crate::storage::ProgressStore;
use crate::HarvestError;
use chrono::Utc;
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Debug, Default)]
struct Inner {
    stats: RunStats,
    counter: ProgressCounter,
}

/// Single owner of a run's counters and lifecycle timestamps
///
/// Fetch workers and asset workers report concurrently through `&self`
/// methods. Every mutation happens under one short-lived lock that is never
/// held across I/O; the live counter is mirrored to the `ProgressStore`
/// after the lock is released.
pub struct StatsAggregator {
    domain: String,
    inner: Mutex<Inner>,
    progress: Arc<dyn ProgressStore>,
}

impl StatsAggregator {
    /// Creates an aggregator for `domain` that mirrors into `progress`
    pub fn new(domain: impl Into<String>, progress: Arc<dyn ProgressStore>) -> Self {
        Self {
            domain: domain.into(),
            inner: Mutex::new(Inner::default()),
            progress,
        }
    }

    pub fn domain(&self) -> &str {
        &self.domain
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // Counters stay meaningful even if a holder panicked mid-update
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Clears counters and timestamps and fixes the progress denominator
    ///
    /// Called once at run start, before any worker begins.
    pub fn reset(&self, denominator: u64) {
        {
            let mut inner = self.lock();
            inner.stats = RunStats::default();
            inner.counter = ProgressCounter::new(denominator);
        }

        if let Err(e) = self.progress.reset(&self.domain) {
            tracing::warn!("Failed to reset progress for {}: {}", self.domain, e);
        }
        if let Err(e) = self.progress.set_target(&self.domain, denominator) {
            tracing::warn!("Failed to set progress target for {}: {}", self.domain, e);
        }
    }

    /// Records one successfully processed page
    pub fn on_page_complete(&self) {
        let numerator = {
            let mut inner = self.lock();
            inner.stats.pages_crawled += 1;
            inner.counter.advance(1.0);
            inner.counter.numerator()
        };
        self.mirror(numerator);
    }

    /// Records one page that failed to fetch or was rejected
    pub fn on_page_failed(&self) {
        self.lock().stats.pages_failed += 1;
    }

    /// Records one asset that reached external storage
    pub fn on_asset_uploaded(&self) {
        self.lock().stats.assets_uploaded += 1;
    }

    /// Current percentage, in `[0, 100]`
    pub fn percentage(&self) -> f64 {
        self.lock().counter.percentage()
    }

    /// Copy of the current statistics
    pub fn snapshot(&self) -> RunStats {
        self.lock().stats.clone()
    }

    pub fn status(&self) -> RunStatus {
        self.lock().stats.status
    }

    /// Moves the run to `next`, stamping start and end times
    ///
    /// # Returns
    ///
    /// * `Ok(true)` - The transition happened
    /// * `Ok(false)` - The run was already terminal; nothing changed
    /// * `Err(HarvestError::InvalidTransition)` - `next` is not reachable
    pub fn transition(&self, next: RunStatus) -> Result<bool, HarvestError> {
        let filled = {
            let mut inner = self.lock();
            let current = inner.stats.status;

            if current.is_terminal() {
                return Ok(false);
            }
            if !current.can_transition_to(next) {
                return Err(HarvestError::InvalidTransition {
                    from: current,
                    to: next,
                });
            }

            inner.stats.status = next;
            let now = Utc::now();
            match next {
                RunStatus::Running => inner.stats.start_time = Some(now),
                RunStatus::Completed | RunStatus::Failed => {
                    if inner.stats.end_time.is_none() {
                        inner.stats.end_time = Some(now);
                    }
                }
                RunStatus::Pending => {}
            }

            if next == RunStatus::Completed && inner.stats.pages_crawled > 0 {
                inner.counter.fill();
                Some(inner.counter.numerator())
            } else {
                None
            }
        };

        if let Some(numerator) = filled {
            self.mirror(numerator);
        }
        Ok(true)
    }

    fn mirror(&self, numerator: f64) {
        if let Err(e) = self.progress.set_counter(&self.domain, numerator) {
            tracing::warn!("Failed to mirror progress for {}: {}", self.domain, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryProgressStore;

    fn create_test_aggregator(denominator: u64) -> (StatsAggregator, Arc<MemoryProgressStore>) {
        let store = Arc::new(MemoryProgressStore::new());
        let aggregator = StatsAggregator::new("example.com", store.clone());
        aggregator.reset(denominator);
        (aggregator, store)
    }

    #[test]
    fn test_reset_clears_everything() {
        let (aggregator, store) = create_test_aggregator(10);
        aggregator.on_page_complete();
        aggregator.on_page_failed();
        aggregator.on_asset_uploaded();

        aggregator.reset(20);
        let stats = aggregator.snapshot();
        assert_eq!(stats, RunStats::default());
        assert_eq!(aggregator.percentage(), 0.0);
        assert_eq!(store.get_counter("example.com").unwrap(), 0.0);
        assert_eq!(store.get_target("example.com").unwrap(), Some(20));
    }

    #[test]
    fn test_counters_and_percentage() {
        let (aggregator, store) = create_test_aggregator(4);
        aggregator.on_page_complete();
        aggregator.on_page_failed();
        aggregator.on_asset_uploaded();
        aggregator.on_asset_uploaded();

        let stats = aggregator.snapshot();
        assert_eq!(stats.pages_crawled, 1);
        assert_eq!(stats.pages_failed, 1);
        assert_eq!(stats.assets_uploaded, 2);
        assert_eq!(aggregator.percentage(), 25.0);
        assert_eq!(store.get_counter("example.com").unwrap(), 1.0);
    }

    #[test]
    fn test_percentage_is_monotonic_and_bounded() {
        let (aggregator, _) = create_test_aggregator(3);
        let mut last = aggregator.percentage();
        for _ in 0..10 {
            aggregator.on_page_complete();
            aggregator.on_page_failed();
            let now = aggregator.percentage();
            assert!(now >= last);
            assert!((0.0..=100.0).contains(&now));
            last = now;
        }
        assert_eq!(last, 100.0);
    }

    #[test]
    fn test_concurrent_reporting() {
        let (aggregator, _) = create_test_aggregator(1000);
        let aggregator = Arc::new(aggregator);

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let aggregator = Arc::clone(&aggregator);
                std::thread::spawn(move || {
                    for _ in 0..50 {
                        aggregator.on_page_complete();
                        aggregator.on_asset_uploaded();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let stats = aggregator.snapshot();
        assert_eq!(stats.pages_crawled, 400);
        assert_eq!(stats.assets_uploaded, 400);
        assert_eq!(aggregator.percentage(), 40.0);
    }

    #[test]
    fn test_lifecycle_stamps_times_once() {
        let (aggregator, _) = create_test_aggregator(10);
        assert!(aggregator.transition(RunStatus::Running).unwrap());
        assert!(aggregator.snapshot().start_time.is_some());

        assert!(aggregator.transition(RunStatus::Failed).unwrap());
        let end = aggregator.snapshot().end_time;
        assert!(end.is_some());

        // A second terminal transition is a no-op
        assert!(!aggregator.transition(RunStatus::Completed).unwrap());
        assert!(!aggregator.transition(RunStatus::Failed).unwrap());
        assert_eq!(aggregator.snapshot().end_time, end);
        assert_eq!(aggregator.status(), RunStatus::Failed);
    }

    #[test]
    fn test_invalid_transition_rejected() {
        let (aggregator, _) = create_test_aggregator(10);
        let result = aggregator.transition(RunStatus::Completed);
        assert!(matches!(
            result,
            Err(HarvestError::InvalidTransition {
                from: RunStatus::Pending,
                to: RunStatus::Completed
            })
        ));
    }

    #[test]
    fn test_completion_reports_full_progress() {
        let (aggregator, store) = create_test_aggregator(100);
        aggregator.transition(RunStatus::Running).unwrap();
        aggregator.on_page_complete();
        aggregator.on_page_complete();
        assert_eq!(aggregator.percentage(), 2.0);

        aggregator.transition(RunStatus::Completed).unwrap();
        assert_eq!(aggregator.percentage(), 100.0);
        assert_eq!(store.get_counter("example.com").unwrap(), 100.0);
    }

    #[test]
    fn test_failure_keeps_partial_progress() {
        let (aggregator, _) = create_test_aggregator(100);
        aggregator.transition(RunStatus::Running).unwrap();
        aggregator.on_page_complete();
        aggregator.transition(RunStatus::Failed).unwrap();
        assert_eq!(aggregator.percentage(), 1.0);
    }
}
