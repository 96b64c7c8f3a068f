//! Integration tests for the scrape pipeline
//!
//! These tests drive the full run (discovery, fetch, extract, ingest) against an in-process
//! fake marketplace renderer and a SQLite database in a temporary directory.

use async_trait::async_trait;
use market_sweep::config::Config;
use market_sweep::crawler::{Coordinator, Termination};
use market_sweep::render::{BrowserCookie, Renderer, RendererFactory};
use market_sweep::storage::{FailureStage, ListingFields, RunStatus, SqliteStorage, Storage};
use market_sweep::{ConfigError, RenderError, SweepError};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

const FEED: &str = "https://www.facebook.com/marketplace/manila/vehicles";

/// A marketplace whose feed reveals `batch` more listings on every scroll
struct FakeMarketplace {
    pages: HashMap<String, String>,
    feed_hrefs: Vec<String>,
    batch: usize,
    /// Remaining timeouts per URL
    flaky: Mutex<HashMap<String, u32>>,
    scrolls: AtomicUsize,
    navigations: Mutex<Vec<String>>,
    opened: AtomicUsize,
}

impl FakeMarketplace {
    fn new(batch: usize) -> Self {
        let mut pages = HashMap::new();
        pages.insert(FEED.to_string(), "<html><body>feed</body></html>".to_string());
        Self {
            pages,
            feed_hrefs: Vec::new(),
            batch,
            flaky: Mutex::new(HashMap::new()),
            scrolls: AtomicUsize::new(0),
            navigations: Mutex::new(Vec::new()),
            opened: AtomicUsize::new(0),
        }
    }

    /// Adds a listing to the feed and serves `markup` at its canonical URL
    fn with_listing(mut self, href: &str, canonical: &str, markup: &str) -> Self {
        self.feed_hrefs.push(href.to_string());
        self.pages.insert(canonical.to_string(), markup.to_string());
        self
    }

    fn with_timeouts(self, url: &str, count: u32) -> Self {
        self.flaky.lock().unwrap().insert(url.to_string(), count);
        self
    }

    fn navigations_to(&self, url: &str) -> usize {
        self.navigations
            .lock()
            .unwrap()
            .iter()
            .filter(|u| u.as_str() == url)
            .count()
    }
}

struct FakeSession {
    market: Arc<FakeMarketplace>,
    current: Mutex<Option<String>>,
}

#[async_trait]
impl Renderer for FakeSession {
    async fn navigate(&self, url: &str, timeout: Duration) -> Result<(), RenderError> {
        self.market.navigations.lock().unwrap().push(url.to_string());

        if let Some(remaining) = self.market.flaky.lock().unwrap().get_mut(url) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(RenderError::Timeout {
                    url: url.to_string(),
                    secs: timeout.as_secs(),
                });
            }
        }

        if !self.market.pages.contains_key(url) {
            return Err(RenderError::Navigation {
                url: url.to_string(),
                message: "net::ERR_ABORTED 404".to_string(),
            });
        }

        *self.current.lock().unwrap() = Some(url.to_string());
        Ok(())
    }

    async fn content(&self) -> Result<String, RenderError> {
        let current = self.current.lock().unwrap().clone();
        current
            .and_then(|url| self.market.pages.get(&url).cloned())
            .ok_or(RenderError::Closed)
    }

    async fn scroll_to_bottom(&self) -> Result<(), RenderError> {
        self.market.scrolls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn wait_network_idle(&self, _timeout: Duration) -> Result<(), RenderError> {
        Ok(())
    }

    async fn query_anchors(&self, _patterns: &[String]) -> Result<Vec<String>, RenderError> {
        let visible = self.market.scrolls.load(Ordering::SeqCst) * self.market.batch;
        Ok(self
            .market
            .feed_hrefs
            .iter()
            .take(visible)
            .cloned()
            .collect())
    }

    async fn add_cookies(&self, _cookies: &[BrowserCookie]) -> Result<(), RenderError> {
        Ok(())
    }

    async fn close(&self) -> Result<(), RenderError> {
        Ok(())
    }
}

struct FakeFactory(Arc<FakeMarketplace>);

#[async_trait]
impl RendererFactory for FakeFactory {
    async fn open(&self) -> Result<Box<dyn Renderer>, RenderError> {
        self.0.opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeSession {
            market: Arc::clone(&self.0),
            current: Mutex::new(None),
        }))
    }
}

struct BrokenFactory;

#[async_trait]
impl RendererFactory for BrokenFactory {
    async fn open(&self) -> Result<Box<dyn Renderer>, RenderError> {
        Err(RenderError::Launch("no chrome executable".to_string()))
    }
}

fn listing_url(id: u32) -> String {
    format!("https://www.facebook.com/marketplace/item/{}", id)
}

fn listing_markup(title: &str, body: &str) -> String {
    format!(
        r#"<html><head><meta property="og:title" content="{}"><title>Marketplace</title></head>
           <body>{}<div data-testid="location-label">Pasig City</div></body></html>"#,
        title, body
    )
}

/// Creates a fast test configuration storing into `dir`
fn create_test_config(dir: &TempDir) -> Config {
    let mut config = Config::default();
    config.scrape.target_url = Some(FEED.to_string());
    config.discovery.settle_ms = 0;
    config.discovery.initial_settle_ms = 0;
    config.fetch.settle_ms = 0;
    config.fetch.retry_delay_ms = 1;
    config.output.database_path = dir.path().join("market.db").to_string_lossy().to_string();
    config
}

fn marketplace(count: u32, batch: usize) -> FakeMarketplace {
    (1..=count).fold(FakeMarketplace::new(batch), |market, id| {
        market.with_listing(
            &format!("/marketplace/item/{}/?ref=browse_tab&referral_code=x", id),
            &listing_url(id),
            &listing_markup(
                &format!("20{:02} Honda Civic", 10 + id),
                &format!(
                    "<p>20{:02} model, ₱ {},000 negotiable. {}0,000 km</p>",
                    10 + id,
                    500 + id,
                    id
                ),
            ),
        )
    })
}

fn open_db(config: &Config) -> SqliteStorage {
    SqliteStorage::new(Path::new(&config.output.database_path)).unwrap()
}

#[tokio::test]
async fn test_full_scrape_ingests_every_listing() {
    let dir = TempDir::new().unwrap();
    let config = create_test_config(&dir);
    let market = Arc::new(marketplace(6, 2));

    let coordinator =
        Coordinator::new(config.clone(), Arc::new(FakeFactory(Arc::clone(&market)))).unwrap();
    let summary = coordinator.run().await.unwrap();

    // 3 productive scroll rounds, then 3 stagnant ones
    assert_eq!(summary.discovered, 6);
    assert_eq!(summary.rounds, 6);
    assert_eq!(summary.termination, Termination::Stagnated);
    assert_eq!(summary.ingested.len(), 6);
    assert!(summary.failures.is_empty());

    let storage = open_db(&config);
    assert_eq!(storage.count_listings().unwrap(), 6);

    let listing = storage.get_listing("3").unwrap().unwrap();
    assert_eq!(listing.title.as_deref(), Some("2013 Honda Civic"));
    assert_eq!(listing.price, Some(Decimal::from(503_000)));
    assert_eq!(listing.currency.as_deref(), Some("₱"));
    assert_eq!(listing.year, Some(2013));
    assert_eq!(listing.mileage, Some(30_000));
    assert_eq!(listing.location.as_deref(), Some("Pasig City"));
    assert_eq!(listing.url, listing_url(3));

    let run = storage.get_run(summary.run_id).unwrap();
    assert_eq!(run.status, RunStatus::Completed);
    assert_eq!(run.counts.discovered, 6);
    assert_eq!(run.counts.ingested, 6);
    assert_eq!(run.counts.failed, 0);
    assert!(run.finished_at.is_some());
}

#[tokio::test]
async fn test_item_cap_limits_discovery() {
    let dir = TempDir::new().unwrap();
    let mut config = create_test_config(&dir);
    config.scrape.max_items = 5;
    let market = Arc::new(marketplace(20, 3));

    let coordinator = Coordinator::new(config, Arc::new(FakeFactory(market))).unwrap();
    let summary = coordinator.run().await.unwrap();

    assert_eq!(summary.termination, Termination::CapReached);
    assert_eq!(summary.discovered, 5);
    assert_eq!(summary.ingested.len(), 5);
}

#[tokio::test]
async fn test_listing_without_id_is_skipped() {
    let dir = TempDir::new().unwrap();
    let mut config = create_test_config(&dir);
    config.discovery.link_patterns = vec!["/".to_string()];
    let market = marketplace(2, 5).with_listing(
        "https://www.facebook.com/",
        "https://www.facebook.com/",
        "<html><body>home</body></html>",
    );

    let coordinator = Coordinator::new(config.clone(), Arc::new(FakeFactory(Arc::new(market))))
        .unwrap();
    let summary = coordinator.run().await.unwrap();

    assert_eq!(summary.discovered, 3);
    assert_eq!(summary.ingested, vec!["1", "2"]);
    assert_eq!(summary.failures.len(), 1);
    assert_eq!(summary.failures[0].stage, FailureStage::Extract);
    assert_eq!(summary.failures[0].url, "https://www.facebook.com/");

    let storage = open_db(&config);
    let failures = storage.failures_for_run(summary.run_id).unwrap();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].stage, FailureStage::Extract);
    assert_eq!(storage.get_run(summary.run_id).unwrap().counts.failed, 1);
}

#[tokio::test]
async fn test_transient_timeouts_are_retried() {
    let dir = TempDir::new().unwrap();
    let config = create_test_config(&dir);
    let market = Arc::new(
        marketplace(3, 3)
            .with_timeouts(&listing_url(1), 2)
            .with_timeouts(&listing_url(2), 3),
    );

    let coordinator =
        Coordinator::new(config.clone(), Arc::new(FakeFactory(Arc::clone(&market)))).unwrap();
    let summary = coordinator.run().await.unwrap();

    assert_eq!(summary.ingested, vec!["1", "3"]);
    assert_eq!(market.navigations_to(&listing_url(1)), 3);
    assert_eq!(market.navigations_to(&listing_url(2)), 3);

    let failure = &summary.failures[0];
    assert_eq!(failure.stage, FailureStage::Fetch);
    assert_eq!(failure.listing_id.as_deref(), Some("2"));
    assert!(failure.error.contains("timed out"));
}

#[tokio::test]
async fn test_rerun_updates_instead_of_duplicating() {
    let dir = TempDir::new().unwrap();
    let config = create_test_config(&dir);

    let first = Coordinator::new(
        config.clone(),
        Arc::new(FakeFactory(Arc::new(marketplace(3, 3)))),
    )
    .unwrap()
    .run()
    .await
    .unwrap();
    let before = open_db(&config).get_listing("1").unwrap().unwrap();

    tokio::time::sleep(Duration::from_millis(5)).await;

    let second = Coordinator::new(
        config.clone(),
        Arc::new(FakeFactory(Arc::new(marketplace(3, 3)))),
    )
    .unwrap()
    .run()
    .await
    .unwrap();

    let storage = open_db(&config);
    let after = storage.get_listing("1").unwrap().unwrap();

    assert_eq!(storage.count_listings().unwrap(), 3);
    assert_eq!(before.id, after.id);
    assert_eq!(before.created_at, after.created_at);
    assert!(after.updated_at > before.updated_at);
    assert!(after.last_seen_at > before.last_seen_at);
    assert_eq!(storage.recent_runs(10).unwrap().len(), 2);
    assert!(second.run_id > first.run_id);
}

#[tokio::test]
async fn test_worker_pool_matches_sequential_result() {
    let dir = TempDir::new().unwrap();
    let mut config = create_test_config(&dir);
    config.scrape.max_workers = 4;
    let market = Arc::new(marketplace(10, 5));

    let coordinator =
        Coordinator::new(config.clone(), Arc::new(FakeFactory(Arc::clone(&market)))).unwrap();
    let summary = coordinator.run().await.unwrap();

    assert_eq!(summary.ingested.len(), 10);
    assert!(summary.failures.is_empty());
    assert_eq!(market.opened.load(Ordering::SeqCst), 5);
    assert_eq!(open_db(&config).count_listings().unwrap(), 10);
}

#[tokio::test]
async fn test_worker_pool_converges_on_shared_listing_id() {
    let dir = TempDir::new().unwrap();
    let mut config = create_test_config(&dir);
    config.scrape.max_workers = 4;

    let aliases = [
        ("/marketplace/item/5/?ref=feed", listing_url(5)),
        (
            "https://www.facebook.com/item/5",
            "https://www.facebook.com/item/5".to_string(),
        ),
        (
            "https://m.facebook.com/marketplace/item/5",
            "https://m.facebook.com/marketplace/item/5".to_string(),
        ),
    ];
    let market = aliases
        .iter()
        .fold(marketplace(3, 10), |market, (href, canonical)| {
            market.with_listing(
                href,
                canonical,
                &listing_markup("2015 Toyota Vios", "<p>2015 model, ₱ 450,000. 80,000 km</p>"),
            )
        });
    let market = Arc::new(market);

    let seeded = {
        let mut storage = open_db(&config);
        storage
            .upsert_listing(
                "5",
                &ListingFields {
                    title: Some("2015 Toyota Vios".to_string()),
                    url: listing_url(5),
                    ..Default::default()
                },
            )
            .unwrap();
        let seeded = storage.get_listing("5").unwrap().unwrap();
        storage.close().unwrap();
        seeded
    };

    let coordinator =
        Coordinator::new(config.clone(), Arc::new(FakeFactory(Arc::clone(&market)))).unwrap();
    let summary = coordinator.run().await.unwrap();

    assert_eq!(summary.discovered, 6);
    assert!(summary.failures.is_empty());
    assert_eq!(market.opened.load(Ordering::SeqCst), 5);
    assert_eq!(summary.ingested.len(), 6);
    assert_eq!(summary.ingested.iter().filter(|id| id.as_str() == "5").count(), 3);

    let storage = open_db(&config);
    assert_eq!(storage.count_listings().unwrap(), 4);

    let listing = storage.get_listing("5").unwrap().unwrap();
    assert_eq!(listing.id, seeded.id);
    assert_eq!(listing.created_at, seeded.created_at);
    assert!(listing.updated_at >= seeded.updated_at);
    assert_eq!(listing.price, Some(Decimal::from(450_000)));
    assert_eq!(listing.year, Some(2015));
}

#[tokio::test]
async fn test_renderer_launch_failure_is_fatal() {
    let dir = TempDir::new().unwrap();
    let config = create_test_config(&dir);

    let coordinator = Coordinator::new(config.clone(), Arc::new(BrokenFactory)).unwrap();
    let result = coordinator.run().await;

    assert!(matches!(
        result,
        Err(SweepError::Render(RenderError::Launch(_)))
    ));
    assert_eq!(open_db(&config).count_listings().unwrap(), 0);
}

#[test]
fn test_missing_target_url_is_rejected() {
    let mut config = Config::default();
    config.scrape.target_url = None;

    let result = Coordinator::new(config, Arc::new(BrokenFactory));

    assert!(matches!(
        result,
        Err(SweepError::Config(ConfigError::MissingTargetUrl))
    ));
}
