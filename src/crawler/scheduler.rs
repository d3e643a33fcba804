//! Fetch scheduling and politeness
//!
//! This module handles:
//! - Global concurrency limiting via a shared semaphore
//! - Per-domain concurrency limiting
//! - Adaptive per-domain delay between request starts
//! - The crawl budget after which no new fetch is started

use crate::crawler::fetcher::{fetch_page, FetchResult, RetryPolicy};
use crate::state::DomainState;
use reqwest::Client;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use url::Url;

/// Limits the scheduler applies to every fetch
#[derive(Debug, Clone)]
pub struct SchedulerLimits {
    /// Concurrent fetches allowed against one domain
    pub per_domain: usize,

    /// Starting gap between request starts on a domain
    pub initial_delay: Duration,

    /// Ceiling for the adaptive gap
    pub max_delay: Duration,

    /// Wall-clock time after which no new fetch is dispatched
    pub budget: Duration,
}

/// Dispatches fetches while honoring concurrency, politeness, and budget
///
/// A fetch first holds a global permit (acquired by the caller before it
/// spawns a worker), then a per-domain permit, then waits for its reserved
/// slot in the domain's delay schedule before the request goes out.
pub struct FetchScheduler {
    client: Client,
    retry: RetryPolicy,

    /// Shared across every run in the process
    global: Arc<Semaphore>,

    domain_limits: Mutex<HashMap<String, Arc<Semaphore>>>,
    domain_states: Mutex<HashMap<String, DomainState>>,
    limits: SchedulerLimits,
    deadline: Instant,
}

impl FetchScheduler {
    /// Creates a new scheduler; the crawl budget starts counting now
    ///
    /// # Arguments
    ///
    /// * `client` - The HTTP client used for every page request
    /// * `retry` - Retry policy for transient failures
    /// * `global` - Process-wide fetch semaphore
    /// * `limits` - Per-domain and budget limits
    pub fn new(
        client: Client,
        retry: RetryPolicy,
        global: Arc<Semaphore>,
        limits: SchedulerLimits,
    ) -> Self {
        let deadline = Instant::now() + limits.budget;
        Self {
            client,
            retry,
            global,
            domain_limits: Mutex::new(HashMap::new()),
            domain_states: Mutex::new(HashMap::new()),
            limits,
            deadline,
        }
    }

    /// Returns true once the crawl budget has elapsed
    pub fn budget_exhausted(&self) -> bool {
        Instant::now() >= self.deadline
    }

    /// Waits for a global fetch slot
    ///
    /// # Returns
    ///
    /// * `Some(permit)` - The slot, released when the permit drops
    /// * `None` - The semaphore was closed
    pub async fn acquire_global(&self) -> Option<OwnedSemaphorePermit> {
        Arc::clone(&self.global).acquire_owned().await.ok()
    }

    fn domain_semaphore(&self, domain: &str) -> Arc<Semaphore> {
        let mut limits = self
            .domain_limits
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        Arc::clone(
            limits
                .entry(domain.to_string())
                .or_insert_with(|| Arc::new(Semaphore::new(self.limits.per_domain))),
        )
    }

    /// Reserves the next request slot on `domain` and returns the wait
    fn reserve_slot(&self, domain: &str) -> Duration {
        let mut states = self
            .domain_states
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        states
            .entry(domain.to_string())
            .or_insert_with(|| DomainState::new(self.limits.initial_delay, self.limits.max_delay))
            .reserve_slot(Instant::now())
    }

    /// Feeds a response observation into the domain's adaptive delay
    pub fn observe(&self, domain: &str, latency: Duration, ok: bool) {
        let mut states = self
            .domain_states
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(state) = states.get_mut(domain) {
            state.observe(latency, ok);
        }
    }

    /// Current adaptive delay for `domain`
    pub fn current_delay(&self, domain: &str) -> Duration {
        let states = self
            .domain_states
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        states
            .get(domain)
            .map(DomainState::current_delay)
            .unwrap_or(self.limits.initial_delay)
    }

    /// Fetches `url` under the domain limit and politeness delay
    ///
    /// The caller must already hold a global permit.
    pub async fn fetch(&self, url: &Url, domain: &str) -> FetchResult {
        let semaphore = self.domain_semaphore(domain);
        let _domain_permit = match semaphore.acquire_owned().await {
            Ok(permit) => permit,
            Err(_) => {
                return FetchResult::NetworkError {
                    error: "domain limiter closed".to_string(),
                    attempts: 0,
                }
            }
        };

        let wait = self.reserve_slot(domain);
        if !wait.is_zero() {
            tracing::trace!("Waiting {:?} before fetching {}", wait, url);
            tokio::time::sleep(wait).await;
        }

        let started = Instant::now();
        let result = fetch_page(&self.client, url, &self.retry).await;

        match &result {
            FetchResult::Success { latency, .. } => self.observe(domain, *latency, true),
            FetchResult::NonText { .. } => self.observe(domain, started.elapsed(), true),
            FetchResult::HttpError { .. } | FetchResult::NetworkError { .. } => {
                self.observe(domain, started.elapsed(), false)
            }
        }

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::UserAgentConfig;
    use crate::crawler::build_http_client;

    fn create_test_limits() -> SchedulerLimits {
        SchedulerLimits {
            per_domain: 2,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(3),
            budget: Duration::from_secs(60),
        }
    }

    fn create_test_scheduler(limits: SchedulerLimits) -> FetchScheduler {
        let client = build_http_client(
            &UserAgentConfig {
                crawler_name: "TestHarvester".to_string(),
                crawler_version: "1.0".to_string(),
                contact_url: "https://example.com".to_string(),
            },
            Duration::from_secs(5),
        )
        .unwrap();
        FetchScheduler::new(
            client,
            RetryPolicy::default(),
            Arc::new(Semaphore::new(4)),
            limits,
        )
    }

    #[test]
    fn test_slots_are_spaced_by_delay() {
        let scheduler = create_test_scheduler(create_test_limits());
        assert_eq!(scheduler.reserve_slot("example.com"), Duration::ZERO);

        let second = scheduler.reserve_slot("example.com");
        assert!(second > Duration::from_millis(400));
        assert!(second <= Duration::from_millis(500));

        // Other domains are independent
        assert_eq!(scheduler.reserve_slot("other.com"), Duration::ZERO);
    }

    #[test]
    fn test_observe_adapts_delay() {
        let scheduler = create_test_scheduler(create_test_limits());
        scheduler.reserve_slot("example.com");

        scheduler.observe("example.com", Duration::from_millis(1500), true);
        assert_eq!(scheduler.current_delay("example.com"), Duration::from_millis(1000));

        scheduler.observe("example.com", Duration::ZERO, false);
        assert_eq!(scheduler.current_delay("example.com"), Duration::from_millis(1000));

        scheduler.observe("example.com", Duration::ZERO, true);
        assert_eq!(scheduler.current_delay("example.com"), Duration::from_millis(500));
    }

    #[test]
    fn test_unknown_domain_reports_initial_delay() {
        let scheduler = create_test_scheduler(create_test_limits());
        assert_eq!(scheduler.current_delay("nowhere.com"), Duration::from_millis(500));
    }

    #[test]
    fn test_budget_exhaustion() {
        let scheduler = create_test_scheduler(SchedulerLimits {
            budget: Duration::ZERO,
            ..create_test_limits()
        });
        assert!(scheduler.budget_exhausted());

        let scheduler = create_test_scheduler(create_test_limits());
        assert!(!scheduler.budget_exhausted());
    }

    #[tokio::test]
    async fn test_global_permits_are_bounded() {
        let scheduler = create_test_scheduler(create_test_limits());
        let mut held = Vec::new();
        for _ in 0..4 {
            held.push(scheduler.acquire_global().await.unwrap());
        }

        let blocked =
            tokio::time::timeout(Duration::from_millis(50), scheduler.acquire_global()).await;
        assert!(blocked.is_err());

        held.pop();
        assert!(scheduler.acquire_global().await.is_some());
    }

    #[tokio::test]
    async fn test_domain_semaphore_shared_per_domain() {
        let scheduler = create_test_scheduler(create_test_limits());
        let a = scheduler.domain_semaphore("example.com");
        let b = scheduler.domain_semaphore("example.com");
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(a.available_permits(), 2);
    }
}
