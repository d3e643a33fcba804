//! Run launch and monitoring
//!
//! The supervisor turns a seed URL into a registered, time-boxed run:
//! - Resolves and verifies the domain
//! - Supersedes any run already active for the domain
//! - Drives the status state machine and persists the final stats once
//! - Cancels, waits out the grace period, then aborts the engine task

use crate::config::Config;
use crate::crawler::{CrawlTarget, Engine};
use crate::state::RunStatus;
use crate::stats::StatsAggregator;
use crate::storage::{AssetStore, LogLevel, PersistenceSink, ProgressStore};
use crate::supervisor::events::{spawn_logger, EventSender};
use crate::supervisor::registry::{RunEntry, RunId, RunRegistry};
use crate::supervisor::verify::{DomainVerifier, NetworkVerifier};
use crate::url::{clean_domain, extract_domain, is_http_scheme};
use crate::HarvestError;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Semaphore};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use url::Url;

/// Launches and supervises crawl runs
pub struct Supervisor {
    config: Arc<Config>,
    sink: Arc<dyn PersistenceSink>,
    progress: Arc<dyn ProgressStore>,
    asset_store: Arc<dyn AssetStore>,
    verifier: Option<Arc<dyn DomainVerifier>>,
    registry: RunRegistry,

    /// Fetch slots shared by every run in the process
    global: Arc<Semaphore>,

    next_run_id: AtomicU64,
}

impl Supervisor {
    /// Creates a supervisor
    ///
    /// Domain verification is enabled when `[supervisor] verify-domain` is set.
    pub fn new(
        config: Config,
        sink: Arc<dyn PersistenceSink>,
        progress: Arc<dyn ProgressStore>,
        asset_store: Arc<dyn AssetStore>,
    ) -> Self {
        let verifier: Option<Arc<dyn DomainVerifier>> = if config.supervisor.verify_domain {
            Some(Arc::new(NetworkVerifier::default()))
        } else {
            None
        };

        Self {
            global: Arc::new(Semaphore::new(config.crawler.global_concurrency)),
            config: Arc::new(config),
            sink,
            progress,
            asset_store,
            verifier,
            registry: RunRegistry::new(),
            next_run_id: AtomicU64::new(0),
        }
    }

    pub fn with_verifier(mut self, verifier: Arc<dyn DomainVerifier>) -> Self {
        self.verifier = Some(verifier);
        self
    }

    pub fn without_verifier(mut self) -> Self {
        self.verifier = None;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn registry(&self) -> &RunRegistry {
        &self.registry
    }

    pub fn sink(&self) -> &Arc<dyn PersistenceSink> {
        &self.sink
    }

    pub fn progress_store(&self) -> &Arc<dyn ProgressStore> {
        &self.progress
    }

    /// Resolves the domain a run is scoped to
    ///
    /// An explicit domain wins over the seed's host.
    pub fn resolve_target(seed: &str, domain: Option<&str>) -> Result<(Url, String), HarvestError> {
        let seed_url = Url::parse(seed)
            .map_err(|e| HarvestError::Launch(format!("invalid seed URL {}: {}", seed, e)))?;
        if !is_http_scheme(&seed_url) {
            return Err(HarvestError::Launch(format!(
                "seed URL {} is not http or https",
                seed
            )));
        }

        let domain = match domain {
            Some(d) => clean_domain(d),
            None => extract_domain(&seed_url),
        }
        .ok_or_else(|| HarvestError::Launch(format!("no domain for seed {}", seed)))?;

        Ok((seed_url, domain))
    }

    /// Launches a run for `seed`
    ///
    /// Verification is the only step that waits. Once the run is registered,
    /// everything else (superseding an older run, the status transitions, the
    /// crawl itself) happens on the monitor task, so dropping the returned
    /// future never strands a registry entry.
    ///
    /// # Arguments
    ///
    /// * `seed` - Start URL
    /// * `domain` - Host to stay on; defaults to the seed's host
    ///
    /// # Returns
    ///
    /// * `Ok(RunEntry)` - The run is registered and its monitor is running
    /// * `Err(HarvestError::VerificationFailed)` - The domain did not resolve or accept connections
    /// * `Err(HarvestError::Launch)` - Bad seed, or the engine could not be built
    pub async fn launch(&self, seed: &str, domain: Option<&str>) -> Result<RunEntry, HarvestError> {
        let (seed_url, domain) = Self::resolve_target(seed, domain)?;

        if let Some(verifier) = &self.verifier {
            let port = seed_url.port_or_known_default().unwrap_or(443);
            let report = verifier.verify(&domain, port).await;
            if !report.is_reachable() {
                tracing::warn!(
                    "Refusing to crawl {}: dns_ok={}, socket_ok={}",
                    domain,
                    report.dns_ok,
                    report.socket_ok
                );
                return Err(HarvestError::VerificationFailed {
                    domain,
                    dns_ok: report.dns_ok,
                    socket_ok: report.socket_ok,
                });
            }

            if let Err(e) =
                self.sink
                    .upsert_ssl_info(&domain, report.tls_issuer.as_deref(), report.tls_expiry)
            {
                tracing::warn!("Failed to store certificate details for {}: {}", domain, e);
            }
        }

        let run_id = self.next_run_id.fetch_add(1, Ordering::SeqCst) + 1;
        let cancel = CancellationToken::new();
        let stats = Arc::new(StatsAggregator::new(domain.clone(), Arc::clone(&self.progress)));
        let (events, rx) = EventSender::channel(domain.clone());

        let target = CrawlTarget::new(seed_url, domain.clone(), &self.config.crawler);
        let engine = Engine::new(
            target,
            &self.config,
            Arc::clone(&self.global),
            Arc::clone(&self.sink),
            Arc::clone(&self.asset_store),
            Arc::clone(&stats),
            events.clone(),
        )
        .map_err(|e| {
            tracing::error!("Launch failed for {}: {}", domain, e);
            if let Err(log_err) =
                self.sink
                    .append_log(&domain, &format!("Launch failed: {}", e), LogLevel::Error)
            {
                tracing::warn!("Failed to log launch failure for {}: {}", domain, log_err);
            }
            HarvestError::Launch(e.to_string())
        })?;

        let (done_tx, done_rx) = watch::channel(false);
        let entry = RunEntry {
            run_id,
            cancel: cancel.clone(),
            stats: Arc::clone(&stats),
            workers: engine.gauge(),
            done: done_rx,
        };

        let monitor = RunMonitor {
            run_id,
            domain: domain.clone(),
            cancel,
            stats,
            events,
            logger: spawn_logger(domain.clone(), rx, Arc::clone(&self.sink)),
            done: done_tx,
            sink: Arc::clone(&self.sink),
            registry: self.registry.clone(),
            run_timeout: Duration::from_secs(self.config.supervisor.run_timeout_secs),
            grace: Duration::from_secs(self.config.supervisor.shutdown_grace_secs),
        };

        // No await between registering and spawning the monitor
        let previous = self.registry.insert(&domain, entry.clone());
        tokio::spawn(monitor.start(previous, engine, self.config.crawler.max_pages));

        Ok(entry)
    }
}

/// Everything the background monitor of one run needs
struct RunMonitor {
    run_id: RunId,
    domain: String,
    cancel: CancellationToken,
    stats: Arc<StatsAggregator>,
    events: EventSender,
    logger: JoinHandle<()>,
    done: watch::Sender<bool>,
    sink: Arc<dyn PersistenceSink>,
    registry: RunRegistry,
    run_timeout: Duration,
    grace: Duration,
}

impl RunMonitor {
    /// Retires the superseded run, moves this one to running, and supervises it
    async fn start(self, previous: Option<RunEntry>, engine: Engine, denominator: u64) {
        if let Some(previous) = previous {
            tracing::info!(
                "Run {} supersedes run {} for {}",
                self.run_id,
                previous.run_id,
                self.domain
            );
            previous.cancel.cancel();
            previous.finished().await;
        }

        if self.cancel.is_cancelled() {
            self.events.warn("Run cancelled before it started");
            self.finalize(RunStatus::Failed).await;
            return;
        }

        self.stats.reset(denominator);
        if let Err(e) = self.stats.transition(RunStatus::Running) {
            self.events.error(format!("Launch failed: {}", e));
            self.finalize(RunStatus::Failed).await;
            return;
        }
        self.events.status(RunStatus::Running);

        self.supervise(engine).await;
    }

    async fn supervise(self, engine: Engine) {
        let gauge = engine.gauge();
        let mut task = tokio::spawn(engine.run(self.cancel.clone()));

        let joined = tokio::select! {
            joined = &mut task => Some(joined),
            _ = tokio::time::sleep(self.run_timeout) => {
                self.events.error(
                    HarvestError::RunTimeout {
                        domain: self.domain.clone(),
                        secs: self.run_timeout.as_secs(),
                    }
                    .to_string(),
                );
                None
            }
            _ = self.cancel.cancelled() => {
                self.events.warn("Run cancelled");
                None
            }
        };

        let status = match joined {
            Some(Ok(Ok(_))) if self.stats.snapshot().pages_crawled > 0 => RunStatus::Completed,
            Some(Ok(Ok(_))) => {
                self.events.error("Crawl finished without crawling any page");
                RunStatus::Failed
            }
            Some(Ok(Err(e))) => {
                self.events.error(format!("Crawl failed: {}", e));
                RunStatus::Failed
            }
            Some(Err(e)) => {
                self.events
                    .error(HarvestError::WorkerCrashed(e.to_string()).to_string());
                RunStatus::Failed
            }
            None => {
                self.reclaim(task).await;
                RunStatus::Failed
            }
        };

        tracing::debug!(
            "Run {} for {} settled with {} live worker(s)",
            self.run_id,
            self.domain,
            gauge.live()
        );
        self.finalize(status).await;
    }

    /// Cancels the engine, waits out the grace period, then aborts it
    async fn reclaim(&self, mut task: JoinHandle<Result<crate::RunStats, HarvestError>>) {
        self.cancel.cancel();

        if tokio::time::timeout(self.grace, &mut task).await.is_err() {
            self.events.warn(format!(
                "Engine did not stop within {}s; aborting",
                self.grace.as_secs()
            ));
            task.abort();
            let _ = task.await;
        }
    }

    /// Applies the terminal status and releases the run
    ///
    /// Final stats are persisted only by the call that performs the
    /// transition, so they are written exactly once.
    async fn finalize(self, status: RunStatus) {
        self.cancel.cancel();

        match self.stats.transition(status) {
            Ok(true) => {
                let stats = self.stats.snapshot();
                if let Err(e) = self.sink.upsert_run_stats(&self.domain, &stats) {
                    tracing::error!("Failed to persist final stats for {}: {}", self.domain, e);
                }
                self.events.status(status);
                self.events.info(format!(
                    "Run finished: {} page(s) crawled, {} failed, {} asset(s) uploaded",
                    stats.pages_crawled, stats.pages_failed, stats.assets_uploaded
                ));
            }
            Ok(false) => {}
            Err(e) => tracing::error!("Run {} for {}: {}", self.run_id, self.domain, e),
        }

        self.registry.remove(&self.domain, self.run_id);

        let Self {
            events,
            logger,
            done,
            grace,
            domain,
            ..
        } = self;
        drop(events);
        if tokio::time::timeout(grace, logger).await.is_err() {
            tracing::warn!("Log writer for {} did not finish", domain);
        }

        let _ = done.send(true);
    }
}
