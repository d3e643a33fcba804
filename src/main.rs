//! Site-Harvest main entry point
//!
//! This is the command-line interface for the Site-Harvest crawl engine.

use anyhow::Context;
use clap::Parser;
use site_harvest::config::{load_config_with_hash, Config};
use site_harvest::output::{load_report, print_report};
use site_harvest::storage::{build_asset_store, open_storage};
use site_harvest::supervisor::{RunControl, Supervisor};
use site_harvest::RunStatus;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// Site-Harvest: a supervised single-domain crawler
///
/// Site-Harvest crawls one site from a seed URL, extracts page content,
/// metadata, and articles, re-uploads page assets, and reports progress
/// while the run is supervised against a wall-clock limit.
#[derive(Parser, Debug)]
#[command(name = "site-harvest")]
#[command(version = "1.0.0")]
#[command(about = "A supervised single-domain crawler", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    /// Start URL of the crawl
    #[arg(value_name = "SEED_URL")]
    seed: String,

    /// Host to stay on (defaults to the seed's host)
    #[arg(long)]
    domain: Option<String>,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Skip the DNS and socket pre-flight check
    #[arg(long)]
    skip_verify: bool,

    /// Show stored statistics for the domain and exit
    #[arg(long, conflicts_with = "dry_run")]
    stats: bool,

    /// Number of recent log lines to show with --stats
    #[arg(long, value_name = "N", default_value_t = 0)]
    logs: usize,

    /// Validate config and show what would be crawled without actually crawling
    #[arg(long, conflicts_with = "stats")]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose, cli.quiet);

    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (config, hash) = load_config_with_hash(&cli.config)
        .with_context(|| format!("failed to load {}", cli.config.display()))?;
    tracing::info!("Configuration loaded successfully (hash: {})", hash);

    let (seed, domain) = Supervisor::resolve_target(&cli.seed, cli.domain.as_deref())?;

    if cli.dry_run {
        handle_dry_run(&config, seed.as_str(), &domain);
    } else if cli.stats {
        handle_stats(&config, &domain, cli.logs)?;
    } else {
        handle_crawl(config, &cli).await?;
    }

    Ok(())
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("site_harvest=info,warn"),
            1 => EnvFilter::new("site_harvest=debug,info"),
            2 => EnvFilter::new("site_harvest=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

/// Handles the --dry-run mode: shows the effective limits for the run
fn handle_dry_run(config: &Config, seed: &str, domain: &str) {
    println!("=== Site-Harvest Dry Run ===\n");

    println!("Target:");
    println!("  Seed: {}", seed);
    println!("  Domain: {}", domain);

    println!("\nCrawler Configuration:");
    println!("  Max depth: {}", config.crawler.max_depth);
    println!("  Max pages: {}", config.crawler.max_pages);
    println!(
        "  Concurrency: {} global, {} per domain",
        config.crawler.global_concurrency, config.crawler.domain_concurrency
    );
    println!("  Crawl budget: {}s", config.crawler.crawl_budget_secs);

    println!("\nFetching:");
    println!("  Request timeout: {}s", config.fetch.request_timeout_secs);
    println!(
        "  Retries: {} (backoff base {}ms)",
        config.fetch.max_retries, config.fetch.backoff_base_ms
    );
    println!(
        "  Delay: {}ms initial, {}ms max",
        config.fetch.initial_delay_ms, config.fetch.max_delay_ms
    );

    println!("\nAssets:");
    println!("  Storage: {:?}", config.asset_storage.kind);
    println!("  Workers: {}", config.assets.workers);
    println!("  Max size: {} bytes", config.assets.max_asset_bytes);

    println!("\nSupervisor:");
    println!("  Run timeout: {}s", config.supervisor.run_timeout_secs);
    println!("  Grace period: {}s", config.supervisor.shutdown_grace_secs);
    println!("  Verify domain: {}", config.supervisor.verify_domain);

    println!("\nUser Agent: {}", config.user_agent.header_value());
    println!("Database: {}", config.output.database_path);

    println!("\n✓ Configuration is valid");
}

/// Handles the --stats mode: shows what the database holds for the domain
fn handle_stats(config: &Config, domain: &str, logs: usize) -> anyhow::Result<()> {
    let storage = open_storage(Path::new(&config.output.database_path))?;
    let report = load_report(&storage, domain, logs)?;
    print_report(&report);
    Ok(())
}

/// Handles the main crawl operation
async fn handle_crawl(config: Config, cli: &Cli) -> anyhow::Result<()> {
    let storage = Arc::new(open_storage(Path::new(&config.output.database_path))?);
    let asset_store = build_asset_store(
        &config.asset_storage,
        Duration::from_secs(config.assets.download_timeout_secs),
    )?;

    let mut supervisor = Supervisor::new(config, storage.clone(), storage.clone(), asset_store);
    if cli.skip_verify {
        supervisor = supervisor.without_verifier();
    }
    let control = RunControl::new(supervisor);

    let run_id = control
        .start_run(&cli.seed, cli.domain.as_deref())
        .await
        .context("crawl could not be started")?;
    let (_, domain) = Supervisor::resolve_target(&cli.seed, cli.domain.as_deref())?;
    tracing::info!("Run {} started for {}", run_id, domain);

    let mut ticker = tokio::time::interval(Duration::from_secs(5));
    let mut last_reported = -1.0;
    let stats = loop {
        tokio::select! {
            stats = control.wait(&domain) => break stats,
            _ = ticker.tick() => {
                let progress = control.get_progress(&domain);
                if progress.percentage != last_reported {
                    tracing::info!("Progress: {:.2}% ({})", progress.percentage, progress.status);
                    last_reported = progress.percentage;
                }
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::warn!("Interrupted, cancelling run for {}", domain);
                control.cancel(&domain);
                break control.wait(&domain).await;
            }
        }
    };

    print_report(&load_report(&*storage, &domain, 0)?);

    if stats.status == RunStatus::Completed {
        tracing::info!("Crawl completed successfully");
        Ok(())
    } else {
        anyhow::bail!("crawl for {} ended with status {}", domain, stats.status)
    }
}
