//! Integration tests for the crawler
//!
//! These tests use wiremock to create mock HTTP servers and drive complete
//! supervised runs end-to-end against a temporary SQLite database.

use site_harvest::config::{
    AssetStorageConfig, AssetsConfig, Config, CrawlerConfig, FetchConfig, OutputConfig,
    SupervisorConfig, UserAgentConfig,
};
use site_harvest::crawler::{CrawlTarget, Engine};
use site_harvest::storage::{
    DirectoryAssetStore, MemoryProgressStore, PersistenceSink, SqliteStorage,
};
use site_harvest::supervisor::{EventSender, RunControl, Supervisor};
use site_harvest::{HarvestError, RunStatus, StatsAggregator};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tempfile::TempDir;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use url::Url;
use wiremock::matchers::{method, path, path_regex};
use wiremock::{Mock, MockServer, ResponseTemplate};

const DOMAIN: &str = "127.0.0.1";

/// Creates a test configuration with fast politeness settings
fn create_test_config(db_path: &str) -> Config {
    Config {
        crawler: CrawlerConfig {
            max_depth: 2,
            max_pages: 50,
            ..CrawlerConfig::default()
        },
        fetch: FetchConfig {
            request_timeout_secs: 30,
            backoff_base_ms: 10,
            initial_delay_ms: 0,
            max_delay_ms: 100,
            ..FetchConfig::default()
        },
        assets: AssetsConfig::default(),
        supervisor: SupervisorConfig {
            run_timeout_secs: 30,
            shutdown_grace_secs: 2,
            verify_domain: false,
        },
        user_agent: UserAgentConfig {
            crawler_name: "TestBot".to_string(),
            crawler_version: "1.0.0".to_string(),
            contact_url: "https://example.com/contact".to_string(),
        },
        output: OutputConfig {
            database_path: db_path.to_string(),
        },
        asset_storage: AssetStorageConfig::default(),
    }
}

struct Harness {
    control: RunControl,
    storage: Arc<SqliteStorage>,
    _dir: TempDir,
}

fn create_harness(configure: impl FnOnce(&mut Config)) -> Harness {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let db_path = dir.path().join("harvest.db");
    let mut config = create_test_config(db_path.to_str().unwrap());
    configure(&mut config);

    let storage = Arc::new(SqliteStorage::new(&db_path).expect("Failed to open storage"));
    let assets = Arc::new(DirectoryAssetStore::new(dir.path().join("assets")));
    let supervisor = Supervisor::new(config, storage.clone(), storage.clone(), assets);

    Harness {
        control: RunControl::new(supervisor),
        storage,
        _dir: dir,
    }
}

fn html(body: String) -> ResponseTemplate {
    ResponseTemplate::new(200)
        .insert_header("content-type", "text/html; charset=utf-8")
        .set_body_string(body)
}

fn page(title: &str, links: &[&str]) -> ResponseTemplate {
    let anchors: String = links
        .iter()
        .map(|href| format!(r#"<a href="{}">{}</a>"#, href, href))
        .collect();
    html(format!(
        "<html><head><title>{}</title></head><body><p>{} content</p>{}</body></html>",
        title, title, anchors
    ))
}

#[tokio::test]
async fn test_full_crawl_single_domain() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(page("Home", &["/page1", "/page2", "/page1#top"]))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/page1"))
        .respond_with(page("Page 1", &["/page2", "/page3", "/"]))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/page2"))
        .respond_with(page("Page 2", &["/page1"]))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/page3"))
        .respond_with(page("Page 3", &[]))
        .expect(1)
        .mount(&server)
        .await;

    let harness = create_harness(|_| {});
    harness
        .control
        .start_run(&format!("{}/", server.uri()), None)
        .await
        .expect("Failed to start run");

    let stats = harness.control.wait(DOMAIN).await;
    assert_eq!(stats.status, RunStatus::Completed);
    assert_eq!(stats.pages_crawled, 4);
    assert_eq!(stats.pages_failed, 0);
    assert!(stats.start_time.is_some());
    assert!(stats.end_time.is_some());

    let progress = harness.control.get_progress(DOMAIN);
    assert_eq!(progress.status, RunStatus::Completed);
    assert_eq!(progress.percentage, 100.0);

    assert_eq!(harness.storage.count_pages(DOMAIN).unwrap(), 4);
    let stored = harness.storage.get_run_stats(DOMAIN).unwrap().unwrap();
    assert_eq!(stored.status, RunStatus::Completed);
    assert_eq!(stored.pages_crawled, 4);

    let logs = harness.control.get_recent_logs(DOMAIN, 100);
    assert!(logs.iter().any(|l| l.message.contains("Spider initialized")));
    assert!(logs.iter().any(|l| l.message == "Status: completed"));
    assert!(!harness.control.is_active(DOMAIN));
}

#[tokio::test]
async fn test_depth_one_ceiling_five_with_twelve_images() {
    let server = MockServer::start().await;

    let images: String = (0..12)
        .map(|i| format!(r#"<img src="/img/{}.png">"#, i))
        .collect();
    let seed_body = format!(
        r#"<html><head><title>Seed</title></head><body>
        <a href="/a">A</a><a href="/b">B</a><a href="/c">C</a>
        <a href="http://other.test/x">X</a><a href="https://elsewhere.test/y">Y</a>
        {}</body></html>"#,
        images
    );

    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(html(seed_body))
        .expect(1)
        .mount(&server)
        .await;
    for p in ["/a", "/b", "/c"] {
        Mock::given(method("GET"))
            .and(path(p))
            .respond_with(page(p, &["/deeper"]))
            .expect(1)
            .mount(&server)
            .await;
    }
    Mock::given(method("GET"))
        .and(path("/deeper"))
        .respond_with(page("Deeper", &[]))
        .expect(0)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path_regex(r"^/img/\d+\.png$"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "image/png")
                .set_body_bytes(vec![0x89, b'P', b'N', b'G']),
        )
        .expect(10)
        .mount(&server)
        .await;

    let harness = create_harness(|config| {
        config.crawler.max_depth = 1;
        config.crawler.max_pages = 5;
    });
    let seed = format!("{}/", server.uri());
    harness.control.start_run(&seed, None).await.unwrap();

    let stats = harness.control.wait(DOMAIN).await;
    assert_eq!(stats.status, RunStatus::Completed);
    assert_eq!(stats.pages_crawled, 4);
    assert_eq!(stats.assets_uploaded, 10);

    let seed_id = harness.storage.get_page_id(&seed).unwrap().unwrap();
    let assets = harness.storage.get_assets(seed_id).unwrap();
    assert_eq!(assets.len(), 10);
    assert!(assets.iter().all(|(_, _, uploaded)| uploaded.is_some()));
}

#[tokio::test]
async fn test_page_ceiling_limits_fetches() {
    let server = MockServer::start().await;

    let links: Vec<String> = (0..20).map(|i| format!("/p{}", i)).collect();
    let link_refs: Vec<&str> = links.iter().map(String::as_str).collect();
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(page("Hub", &link_refs))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path_regex(r"^/p\d+$"))
        .respond_with(page("Leaf", &[]))
        .expect(2)
        .mount(&server)
        .await;

    let harness = create_harness(|config| config.crawler.max_pages = 3);
    harness
        .control
        .start_run(&format!("{}/", server.uri()), None)
        .await
        .unwrap();

    let stats = harness.control.wait(DOMAIN).await;
    assert_eq!(stats.pages_crawled, 3);
    assert_eq!(harness.control.get_progress(DOMAIN).percentage, 100.0);
}

#[tokio::test]
async fn test_transient_errors_count_as_one_success() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(2)
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(page("Recovered", &[]))
        .expect(1)
        .mount(&server)
        .await;

    let harness = create_harness(|_| {});
    harness
        .control
        .start_run(&format!("{}/", server.uri()), None)
        .await
        .unwrap();

    let stats = harness.control.wait(DOMAIN).await;
    assert_eq!(stats.status, RunStatus::Completed);
    assert_eq!(stats.pages_crawled, 1);
    assert_eq!(stats.pages_failed, 0);
}

#[tokio::test]
async fn test_failed_seed_fails_run() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;

    let harness = create_harness(|_| {});
    harness
        .control
        .start_run(&format!("{}/missing", server.uri()), None)
        .await
        .unwrap();

    let stats = harness.control.wait(DOMAIN).await;
    assert_eq!(stats.status, RunStatus::Failed);
    assert_eq!(stats.pages_crawled, 0);
    assert_eq!(stats.pages_failed, 1);
    assert!(stats.end_time.is_some());
    assert_eq!(harness.control.get_progress(DOMAIN).status, RunStatus::Failed);
}

#[tokio::test]
async fn test_asset_failures_do_not_fail_page() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(html(
            r#"<html><head><title>Gallery</title>
            <link rel="stylesheet" href="/style.css"></head>
            <body><img src="/ok.png"><img src="/gone.png"></body></html>"#
                .to_string(),
        ))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/ok.png"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![1u8; 8]))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/gone.png"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/style.css"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let harness = create_harness(|_| {});
    let seed = format!("{}/", server.uri());
    harness.control.start_run(&seed, None).await.unwrap();

    let stats = harness.control.wait(DOMAIN).await;
    assert_eq!(stats.status, RunStatus::Completed);
    assert_eq!(stats.pages_crawled, 1);
    assert_eq!(stats.pages_failed, 0);
    assert_eq!(stats.assets_uploaded, 1);

    let seed_id = harness.storage.get_page_id(&seed).unwrap().unwrap();
    let assets = harness.storage.get_assets(seed_id).unwrap();
    assert_eq!(assets.len(), 3);
    assert_eq!(assets.iter().filter(|(_, _, uploaded)| uploaded.is_some()).count(), 1);
}

#[tokio::test]
async fn test_run_timeout_reclaims_in_flight_workers() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(page("Home", &["/slow1", "/slow2"]))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path_regex(r"^/slow\d$"))
        .respond_with(page("Slow", &[]).set_delay(Duration::from_secs(20)))
        .mount(&server)
        .await;

    let harness = create_harness(|config| {
        config.crawler.crawl_budget_secs = 1;
        config.supervisor.run_timeout_secs = 1;
    });

    let started = Instant::now();
    harness
        .control
        .start_run(&format!("{}/", server.uri()), None)
        .await
        .unwrap();
    let workers = harness
        .control
        .supervisor()
        .registry()
        .get(DOMAIN)
        .expect("run must be registered")
        .workers;

    let stats = harness.control.wait(DOMAIN).await;
    assert!(started.elapsed() < Duration::from_secs(10));
    assert_eq!(workers.live(), 0);

    assert_eq!(stats.status, RunStatus::Failed);
    assert_eq!(stats.pages_crawled, 1);
    assert_eq!(stats.pages_failed, 0);

    let end_time = stats.end_time.expect("end time must be set");
    let stored = harness.storage.get_run_stats(DOMAIN).unwrap().unwrap();
    assert_eq!(stored.status, RunStatus::Failed);
    assert_eq!(stored.end_time, Some(end_time));

    let logs = harness.control.get_recent_logs(DOMAIN, 100);
    assert!(logs.iter().any(|l| l.message.contains("wall-clock limit")));
    assert_eq!(
        logs.iter().filter(|l| l.message == "Status: failed").count(),
        1
    );
}

#[tokio::test]
async fn test_cancel_reclaims_workers() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(page("Home", &["/slow1", "/slow2"]))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path_regex(r"^/slow\d$"))
        .respond_with(page("Slow", &[]).set_delay(Duration::from_secs(20)))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let config = create_test_config(dir.path().join("unused.db").to_str().unwrap());
    let storage = Arc::new(SqliteStorage::new_in_memory().unwrap());
    let stats = Arc::new(StatsAggregator::new(
        DOMAIN,
        Arc::new(MemoryProgressStore::new()),
    ));
    stats.reset(config.crawler.max_pages);
    stats.transition(RunStatus::Running).unwrap();
    let (events, _rx) = EventSender::channel(DOMAIN);

    let seed = Url::parse(&format!("{}/", server.uri())).unwrap();
    let engine = Engine::new(
        CrawlTarget::new(seed, DOMAIN, &config.crawler),
        &config,
        Arc::new(Semaphore::new(16)),
        storage,
        Arc::new(DirectoryAssetStore::new(dir.path())),
        stats.clone(),
        events,
    )
    .unwrap();
    let gauge = engine.gauge();

    let cancel = CancellationToken::new();
    let run = tokio::spawn(engine.run(cancel.clone()));

    let deadline = Instant::now() + Duration::from_secs(5);
    while gauge.live() < 2 && Instant::now() < deadline {
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(gauge.live(), 2);

    cancel.cancel();
    let result = run.await.unwrap();
    assert!(matches!(result, Err(HarvestError::Cancelled { .. })));
    assert_eq!(gauge.live(), 0);
    assert_eq!(stats.snapshot().pages_crawled, 1);
}

#[tokio::test]
async fn test_new_run_supersedes_active_run() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(page("Home", &["/slow"]))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/slow"))
        .respond_with(page("Slow", &[]).set_delay(Duration::from_secs(20)))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/fresh"))
        .respond_with(page("Fresh", &[]))
        .mount(&server)
        .await;

    let harness = create_harness(|_| {});
    let first = harness
        .control
        .start_run(&format!("{}/", server.uri()), None)
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_millis(300)).await;
    let second = harness
        .control
        .start_run(&format!("{}/fresh", server.uri()), None)
        .await
        .unwrap();
    assert!(second > first);

    let stats = harness.control.wait(DOMAIN).await;
    assert_eq!(stats.status, RunStatus::Completed);
    assert_eq!(stats.pages_crawled, 1);

    let logs = harness.control.get_recent_logs(DOMAIN, 100);
    assert!(logs.iter().any(|l| l.message == "Status: failed"));
    assert!(logs.iter().any(|l| l.message == "Status: completed"));
}

#[tokio::test]
async fn test_unreachable_domain_is_refused() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let harness = create_harness(|config| config.supervisor.verify_domain = true);
    let result = harness
        .control
        .start_run(&format!("http://127.0.0.1:{}/", port), None)
        .await;

    assert!(matches!(
        result,
        Err(HarvestError::VerificationFailed {
            dns_ok: true,
            socket_ok: false,
            ..
        })
    ));
    assert!(!harness.control.is_active(DOMAIN));
    assert_eq!(harness.control.get_progress(DOMAIN).status, RunStatus::Pending);
}

#[tokio::test]
async fn test_budget_lets_in_flight_fetch_finish() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(page("Home", &["/a"]))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/a"))
        .respond_with(page("A", &["/b"]).set_delay(Duration::from_millis(1500)))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/b"))
        .respond_with(page("B", &[]))
        .expect(0)
        .mount(&server)
        .await;

    let harness = create_harness(|config| config.crawler.crawl_budget_secs = 1);
    harness
        .control
        .start_run(&format!("{}/", server.uri()), None)
        .await
        .unwrap();

    let stats = harness.control.wait(DOMAIN).await;
    assert_eq!(stats.status, RunStatus::Completed);
    assert_eq!(stats.pages_crawled, 2);
    assert_eq!(stats.pages_failed, 0);
}

#[tokio::test]
async fn test_dropped_start_run_still_settles() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(page("Home", &["/slow"]))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/slow"))
        .respond_with(page("Slow", &[]).set_delay(Duration::from_secs(20)))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/fresh"))
        .respond_with(page("Fresh", &[]))
        .mount(&server)
        .await;

    let harness = create_harness(|_| {});
    harness
        .control
        .start_run(&format!("{}/", server.uri()), None)
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(300)).await;

    // Abandon the second launch after its first poll
    {
        let fresh = format!("{}/fresh", server.uri());
        let mut launch = std::pin::pin!(harness.control.start_run(&fresh, None));
        let _ = futures::poll!(launch.as_mut());
    }

    let stats = tokio::time::timeout(Duration::from_secs(10), harness.control.wait(DOMAIN))
        .await
        .expect("run must settle after the launch is dropped");
    assert!(!harness.control.is_active(DOMAIN));
    assert_ne!(stats.status, RunStatus::Pending);
    assert_ne!(stats.status, RunStatus::Running);
    assert_ne!(harness.control.get_progress(DOMAIN).status, RunStatus::Pending);
}
