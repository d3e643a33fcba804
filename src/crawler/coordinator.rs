//! Crawl engine for a single domain
//!
//! This module contains the main control loop that:
//! - Seeds the frontier
//! - Dispatches fetch workers under the global and per-domain limits
//! - Parses fetched pages and persists the results
//! - Feeds discovered links back into the frontier
//! - Hands page assets to the asset pipeline
//! - Stops on frontier exhaustion, budget exhaustion, or cancellation

use crate::config::{Config, CrawlerConfig};
use crate::crawler::assets::{AssetLimits, AssetPipeline};
use crate::crawler::fetcher::{build_http_client, FetchResult, RetryPolicy};
use crate::crawler::frontier::{Frontier, FrontierEntry};
use crate::crawler::parser::{self, ExtractedPage, RawPage};
use crate::crawler::scheduler::{FetchScheduler, SchedulerLimits};
use crate::state::RunStats;
use crate::stats::StatsAggregator;
use crate::storage::{AssetStore, PersistenceSink};
use crate::supervisor::EventSender;
use crate::url::extract_domain;
use crate::HarvestError;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::task::{JoinError, JoinSet};
use tokio_util::sync::CancellationToken;
use url::Url;

/// What to crawl and how far
#[derive(Debug, Clone)]
pub struct CrawlTarget {
    pub seed: Url,

    /// Exact host every crawled page must have
    pub domain: String,

    pub max_depth: u32,
    pub max_pages: u64,

    /// Wall-clock time after which no new fetch starts
    pub budget: Duration,
}

impl CrawlTarget {
    pub fn new(seed: Url, domain: impl Into<String>, config: &CrawlerConfig) -> Self {
        Self {
            seed,
            domain: domain.into(),
            max_depth: config.max_depth,
            max_pages: config.max_pages,
            budget: Duration::from_secs(config.crawl_budget_secs),
        }
    }
}

/// Live count of in-flight fetch workers
#[derive(Debug, Clone, Default)]
pub struct WorkerGauge(Arc<AtomicUsize>);

impl WorkerGauge {
    /// Registers a worker; it is released when the guard drops
    pub fn enter(&self) -> WorkerGuard {
        self.0.fetch_add(1, Ordering::SeqCst);
        WorkerGuard(Arc::clone(&self.0))
    }

    pub fn live(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug)]
pub struct WorkerGuard(Arc<AtomicUsize>);

impl Drop for WorkerGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// What a fetch worker hands back to the control loop
enum Outcome {
    Page(Box<ExtractedPage>),
    /// Final URL was already processed through another entry
    Duplicate(Url),
    Failed(String),
}

struct WorkerOutcome {
    entry: FrontierEntry,
    outcome: Outcome,
}

/// Crawl engine for one run
///
/// The engine owns the frontier, the fetch scheduler, and the asset pipeline.
/// Fetch workers run as tasks in a `JoinSet`; parsing happens in the worker,
/// persistence and link discovery in the control loop.
pub struct Engine {
    target: CrawlTarget,
    frontier: Arc<Frontier>,
    scheduler: Arc<FetchScheduler>,
    assets: Arc<AssetPipeline>,
    sink: Arc<dyn PersistenceSink>,
    stats: Arc<StatsAggregator>,
    events: EventSender,
    gauge: WorkerGauge,
}

impl Engine {
    /// Builds an engine; the crawl budget starts counting now
    ///
    /// # Arguments
    ///
    /// * `target` - Seed, domain, and limits for this run
    /// * `config` - Fetch, asset, and user agent settings
    /// * `global` - Process-wide fetch semaphore
    /// * `sink` - Persistence for pages, assets, and run stats
    /// * `store` - Destination for re-uploaded assets
    /// * `stats` - The run's aggregator, already reset and running
    /// * `events` - The run's event channel
    pub fn new(
        target: CrawlTarget,
        config: &Config,
        global: Arc<Semaphore>,
        sink: Arc<dyn PersistenceSink>,
        store: Arc<dyn AssetStore>,
        stats: Arc<StatsAggregator>,
        events: EventSender,
    ) -> Result<Self, HarvestError> {
        let client = build_http_client(
            &config.user_agent,
            Duration::from_secs(config.fetch.request_timeout_secs),
        )?;

        let scheduler = FetchScheduler::new(
            client.clone(),
            RetryPolicy::from_config(&config.fetch),
            global,
            SchedulerLimits {
                per_domain: config.crawler.domain_concurrency,
                initial_delay: Duration::from_millis(config.fetch.initial_delay_ms),
                max_delay: Duration::from_millis(config.fetch.max_delay_ms),
                budget: target.budget,
            },
        );

        let assets = AssetPipeline::new(
            client,
            store,
            Arc::clone(&sink),
            Arc::clone(&stats),
            AssetLimits {
                workers: config.assets.workers,
                download_timeout: Duration::from_secs(config.assets.download_timeout_secs),
                max_bytes: config.assets.max_asset_bytes,
            },
        );

        Ok(Self {
            frontier: Arc::new(Frontier::new(
                target.domain.clone(),
                target.max_depth,
                target.max_pages,
            )),
            target,
            scheduler: Arc::new(scheduler),
            assets: Arc::new(assets),
            sink,
            stats,
            events,
            gauge: WorkerGauge::default(),
        })
    }

    /// Handle to the in-flight worker count
    pub fn gauge(&self) -> WorkerGauge {
        self.gauge.clone()
    }

    pub fn target(&self) -> &CrawlTarget {
        &self.target
    }

    /// Runs the crawl to completion
    ///
    /// # Returns
    ///
    /// * `Ok(RunStats)` - The frontier or the budget ran out
    /// * `Err(HarvestError::Cancelled)` - `cancel` fired; every worker was reclaimed
    /// * `Err(HarvestError)` - The fetch limiter was closed
    pub async fn run(self, cancel: CancellationToken) -> Result<RunStats, HarvestError> {
        self.on_start();

        let mut workers: JoinSet<WorkerOutcome> = JoinSet::new();

        loop {
            let can_dispatch = self.frontier.pending() > 0 && !self.scheduler.budget_exhausted();
            if !can_dispatch && workers.is_empty() {
                break;
            }

            tokio::select! {
                biased;

                _ = cancel.cancelled() => {
                    return Err(self.on_cancel(&mut workers).await);
                }

                Some(joined) = workers.join_next(), if !workers.is_empty() => {
                    self.on_joined(joined);
                }

                permit = self.scheduler.acquire_global(), if can_dispatch => {
                    let permit = permit.ok_or_else(|| {
                        HarvestError::WorkerCrashed("global fetch limiter closed".to_string())
                    })?;
                    if self.scheduler.budget_exhausted() {
                        continue;
                    }
                    if let Some(entry) = self.frontier.next() {
                        self.dispatch(&mut workers, entry, permit);
                    }
                }
            }
        }

        if self.scheduler.budget_exhausted() && self.frontier.pending() > 0 {
            self.events.warn(format!(
                "Crawl budget of {}s exhausted with {} URL(s) pending",
                self.target.budget.as_secs(),
                self.frontier.pending()
            ));
        }

        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                return Err(self.on_cancel(&mut workers).await);
            }
            _ = self.assets.drain() => {}
        }

        Ok(self.on_finish())
    }

    fn on_start(&self) {
        self.events.info(format!(
            "Spider initialized for {} (max depth {}, max pages {})",
            self.target.seed, self.target.max_depth, self.target.max_pages
        ));

        if !self.frontier.propose(&self.target.seed, 0) {
            self.events.error(format!(
                "Seed {} is not a crawlable URL on {}",
                self.target.seed, self.target.domain
            ));
        }

        self.persist_stats();
    }

    fn dispatch(
        &self,
        workers: &mut JoinSet<WorkerOutcome>,
        entry: FrontierEntry,
        permit: OwnedSemaphorePermit,
    ) {
        let scheduler = Arc::clone(&self.scheduler);
        let frontier = Arc::clone(&self.frontier);
        let domain = self.target.domain.clone();
        let guard = self.gauge.enter();

        tracing::debug!("Dispatching {} (depth {})", entry.url, entry.depth);

        workers.spawn(async move {
            let _permit = permit;
            let _guard = guard;

            let result = scheduler.fetch(&entry.url, &domain).await;
            let outcome = classify(result, &frontier, &domain);
            WorkerOutcome { entry, outcome }
        });
    }

    fn on_joined(&self, joined: Result<WorkerOutcome, JoinError>) {
        match joined {
            Ok(WorkerOutcome { entry, outcome }) => match outcome {
                Outcome::Page(page) => self.on_item(entry, *page),
                Outcome::Duplicate(final_url) => {
                    tracing::debug!("Skipping {}: {} already processed", entry.url, final_url);
                }
                Outcome::Failed(reason) => {
                    self.stats.on_page_failed();
                    self.events
                        .warn(format!("Failed to crawl {}: {}", entry.url, reason));
                    self.persist_stats();
                }
            },
            Err(e) if e.is_cancelled() => {}
            Err(e) => {
                self.stats.on_page_failed();
                self.events.error(format!("Fetch worker crashed: {}", e));
            }
        }
    }

    /// Persists one processed page and follows its links
    fn on_item(&self, entry: FrontierEntry, page: ExtractedPage) {
        let ExtractedPage { result, links } = page;

        let page_id = match self.sink.insert_page(
            result.url.as_str(),
            &result.domain,
            &result.title,
            &result.body_text,
            result.status_code,
            &result.content_type,
        ) {
            Ok(id) => Some(id),
            Err(e) => {
                self.events
                    .error(format!("Failed to store page {}: {}", result.url, e));
                None
            }
        };

        if let Some(page_id) = page_id {
            if !result.metadata.is_empty() {
                if let Err(e) = self.sink.insert_metadata_batch(page_id, &result.metadata) {
                    tracing::warn!("Failed to store metadata for {}: {}", result.url, e);
                }
            }
            if let Some(article) = &result.article {
                if let Err(e) = self.sink.insert_article(page_id, article) {
                    tracing::warn!("Failed to store article for {}: {}", result.url, e);
                }
            }
        }

        self.stats.on_page_complete();
        let pages = self.stats.snapshot().pages_crawled;
        self.events.info(format!(
            "[{}] Crawled {} \"{}\" (depth {})",
            pages, result.url, result.title, entry.depth
        ));
        self.events.progress(pages, self.stats.percentage());

        self.assets.submit(page_id, result.assets);

        let next_depth = entry.depth + 1;
        if next_depth <= self.target.max_depth {
            let accepted = links
                .iter()
                .filter(|link| self.frontier.propose(link, next_depth))
                .count();
            tracing::debug!(
                "{} of {} link(s) on {} accepted",
                accepted,
                links.len(),
                result.url
            );
        }

        self.persist_stats();
    }

    async fn on_cancel(&self, workers: &mut JoinSet<WorkerOutcome>) -> HarvestError {
        let in_flight = workers.len();
        workers.shutdown().await;
        self.assets.abort().await;

        self.events.warn(format!(
            "Crawl cancelled with {} worker(s) in flight and {} URL(s) pending",
            in_flight,
            self.frontier.pending()
        ));

        HarvestError::Cancelled {
            domain: self.target.domain.clone(),
        }
    }

    fn on_finish(&self) -> RunStats {
        let stats = self.stats.snapshot();
        self.events.info(format!(
            "Crawl finished: {} page(s) crawled, {} failed, {} asset(s) uploaded",
            stats.pages_crawled, stats.pages_failed, stats.assets_uploaded
        ));
        self.persist_stats();
        stats
    }

    fn persist_stats(&self) {
        if let Err(e) = self
            .sink
            .upsert_run_stats(&self.target.domain, &self.stats.snapshot())
        {
            tracing::warn!("Failed to persist stats for {}: {}", self.target.domain, e);
        }
    }
}

/// Turns a fetch result into work for the control loop
///
/// Runs inside the worker so page parsing happens off the control loop.
fn classify(result: FetchResult, frontier: &Frontier, domain: &str) -> Outcome {
    match result {
        FetchResult::Success {
            final_url,
            status_code,
            content_type,
            body,
            ..
        } => {
            if extract_domain(&final_url).as_deref() != Some(domain) {
                return Outcome::Failed(format!("redirected off-domain to {}", final_url));
            }
            if !frontier.mark_crawled(&final_url) {
                return Outcome::Duplicate(final_url);
            }

            let raw = RawPage {
                url: final_url,
                status_code,
                content_type,
                body,
            };
            Outcome::Page(Box::new(parser::extract(&raw, domain)))
        }
        other => Outcome::Failed(other.describe()),
    }
}
