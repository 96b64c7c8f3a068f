//! Run coordinator - scrape run orchestration
//!
//! This module owns one scrape run end to end:
//! - Opening the storage session and the renderer session
//! - Injecting cookies and recording the run row
//! - Running discovery on the entry page
//! - Fetching, extracting and ingesting every discovered URL
//! - Finishing the run row and releasing both sessions on every exit path
//!
//! # Failure Handling
//!
//! | Failure | Effect |
//! |---------|--------|
//! | Invalid or missing target URL | [`Coordinator::new`] fails, nothing is opened |
//! | Storage or renderer session cannot be opened | Run fails before discovery |
//! | Entry page cannot be loaded | Run row marked failed, run returns the error |
//! | Fetch, extract or ingest of one URL | Logged, recorded, URL skipped |
//! | Worker cannot open its own session | Worker exits, others drain the queue |
//! | Worker task panics | Its in-flight URL is recorded as unprocessed |
//! | Run row cannot be finished | Logged, the summary is still returned |

use crate::config::{config_fingerprint, validate, Config};
use crate::crawler::discovery::{discover, DiscoveryOptions, Termination};
use crate::crawler::extractor::{derive_listing_id, extract};
use crate::crawler::fetcher::{fetch_page, navigate_with_retry, settle, FetchOptions};
use crate::crawler::ingest::ingest;
use crate::render::{load_cookie_jar, BrowserCookie, ChromiumLauncher, Renderer, RendererFactory};
use crate::storage::{open_storage, FailureStage, RunCounts, RunStatus, SqliteStorage, Storage};
use crate::url::origin_of;
use crate::{ConfigError, SweepError};
use std::collections::{HashMap, VecDeque};
use std::fmt::Display;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tokio::task::JoinSet;

type SharedStorage = Arc<Mutex<SqliteStorage>>;

/// A URL that could not be turned into a stored listing
#[derive(Debug, Clone, PartialEq)]
pub struct ItemFailure {
    pub url: String,
    pub listing_id: Option<String>,
    pub stage: FailureStage,
    pub error: String,
}

impl ItemFailure {
    fn new(url: &str, listing_id: Option<String>, stage: FailureStage, error: impl Display) -> Self {
        Self {
            url: url.to_string(),
            listing_id,
            stage,
            error: error.to_string(),
        }
    }
}

/// What a finished run did
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub run_id: i64,
    /// Unique listing URLs found by discovery
    pub discovered: usize,
    pub rounds: u32,
    pub termination: Termination,
    /// Listing ids written during this run
    pub ingested: Vec<String>,
    pub failures: Vec<ItemFailure>,
    pub elapsed: Duration,
}

impl RunSummary {
    pub fn counts(&self) -> RunCounts {
        RunCounts {
            discovered: self.discovered as u64,
            ingested: self.ingested.len() as u64,
            failed: self.failures.len() as u64,
        }
    }
}

/// Per-URL results collected by the sequential path or by the worker pool
#[derive(Debug, Default)]
struct ItemResults {
    ingested: Vec<String>,
    failures: Vec<ItemFailure>,
}

impl ItemResults {
    /// Keeps the outcome of one URL, persisting failures for the run
    async fn record(
        &mut self,
        storage: &SharedStorage,
        run_id: i64,
        outcome: Result<String, ItemFailure>,
    ) {
        match outcome {
            Ok(listing_id) => self.ingested.push(listing_id),
            Err(failure) => {
                tracing::warn!(
                    "Skipping {} (listing {}) after {} failure: {}",
                    failure.url,
                    failure.listing_id.as_deref().unwrap_or("unknown"),
                    failure.stage,
                    failure.error
                );

                let recorded = storage.lock().await.record_failure(
                    run_id,
                    &failure.url,
                    failure.listing_id.as_deref(),
                    failure.stage,
                    &failure.error,
                );
                if let Err(e) = recorded {
                    tracing::error!("Failed to record failure for {}: {}", failure.url, e);
                }

                self.failures.push(failure);
            }
        }
    }
}

/// Results and in-flight URLs shared by the pooled workers
#[derive(Debug, Default)]
struct PoolState {
    results: ItemResults,
    /// URL each worker is processing, keyed by worker id
    in_flight: HashMap<usize, String>,
}

/// Main scrape run coordinator
pub struct Coordinator {
    config: Arc<Config>,
    factory: Arc<dyn RendererFactory>,
    target: String,
    fetch: FetchOptions,
    discovery: DiscoveryOptions,
}

impl Coordinator {
    /// Creates a new coordinator instance
    ///
    /// # Arguments
    ///
    /// * `config` - The effective configuration
    /// * `factory` - Source of renderer sessions
    ///
    /// # Returns
    ///
    /// * `Ok(Coordinator)` - Configuration is valid and names a target URL
    /// * `Err(SweepError)` - Invalid configuration; no session has been opened
    pub fn new(config: Config, factory: Arc<dyn RendererFactory>) -> Result<Self, SweepError> {
        validate(&config)?;

        let target = config
            .scrape
            .target_url
            .clone()
            .ok_or(ConfigError::MissingTargetUrl)?;

        let origin = match &config.discovery.base_origin {
            Some(base) => origin_of(base)?,
            None => origin_of(&target)?,
        };

        let fetch = FetchOptions::from_config(&config.fetch);
        let discovery = DiscoveryOptions::from_config(&config, origin);

        Ok(Self {
            config: Arc::new(config),
            factory,
            target,
            fetch,
            discovery,
        })
    }

    /// Runs one scrape
    ///
    /// Storage and renderer sessions are opened here and released before returning, whether
    /// the run succeeds or fails.
    pub async fn run(&self) -> Result<RunSummary, SweepError> {
        let started = Instant::now();

        let storage = open_storage(Path::new(&self.config.output.database_path)).map_err(|e| {
            tracing::error!(
                "Cannot open database {}: {}",
                self.config.output.database_path,
                e
            );
            e
        })?;
        let storage: SharedStorage = Arc::new(Mutex::new(storage));

        let renderer = match self.factory.open().await {
            Ok(renderer) => renderer,
            Err(e) => {
                tracing::error!("Cannot open renderer session: {}", e);
                close_storage(storage);
                return Err(e.into());
            }
        };

        let result = self.run_with(renderer.as_ref(), &storage, started).await;

        if let Err(e) = renderer.close().await {
            tracing::warn!("Failed to close renderer session: {}", e);
        }
        drop(renderer);
        close_storage(storage);

        result
    }

    async fn run_with(
        &self,
        renderer: &dyn Renderer,
        storage: &SharedStorage,
        started: Instant,
    ) -> Result<RunSummary, SweepError> {
        let cookies = Arc::new(self.load_cookies());
        inject_cookies(renderer, &cookies).await;

        let run_id = storage
            .lock()
            .await
            .create_run(&config_fingerprint(&self.config))?;
        tracing::info!("Starting scrape run {} at {}", run_id, self.target);

        match self.scrape(renderer, storage, &cookies, run_id, started).await {
            Ok(summary) => {
                let finished =
                    storage
                        .lock()
                        .await
                        .finish_run(run_id, RunStatus::Completed, summary.counts());
                if let Err(e) = finished {
                    tracing::error!("Cannot mark run {} completed: {}", run_id, e);
                }

                tracing::info!(
                    "Run {} completed: {} discovered, {} ingested, {} failed in {:?}",
                    run_id,
                    summary.discovered,
                    summary.ingested.len(),
                    summary.failures.len(),
                    summary.elapsed
                );
                Ok(summary)
            }
            Err(e) => {
                tracing::error!("Run {} failed: {}", run_id, e);
                let finished =
                    storage
                        .lock()
                        .await
                        .finish_run(run_id, RunStatus::Failed, RunCounts::default());
                if let Err(finish_error) = finished {
                    tracing::error!("Cannot mark run {} failed: {}", run_id, finish_error);
                }
                Err(e)
            }
        }
    }

    /// Loads the entry page, discovers listing URLs and processes each of them
    async fn scrape(
        &self,
        renderer: &dyn Renderer,
        storage: &SharedStorage,
        cookies: &Arc<Vec<BrowserCookie>>,
        run_id: i64,
        started: Instant,
    ) -> Result<RunSummary, SweepError> {
        navigate_with_retry(renderer, &self.target, &self.fetch).await?;
        settle(Duration::from_millis(self.config.discovery.initial_settle_ms)).await;

        let outcome = discover(renderer, &self.discovery).await;
        let discovered = outcome.urls.len();

        let workers = (self.config.scrape.max_workers as usize).min(discovered);
        let results = if workers > 1 {
            self.process_pooled(storage, cookies, run_id, outcome.urls, workers)
                .await
        } else {
            self.process_sequential(renderer, storage, run_id, outcome.urls)
                .await
        };

        Ok(RunSummary {
            run_id,
            discovered,
            rounds: outcome.rounds,
            termination: outcome.termination,
            ingested: results.ingested,
            failures: results.failures,
            elapsed: started.elapsed(),
        })
    }

    async fn process_sequential(
        &self,
        renderer: &dyn Renderer,
        storage: &SharedStorage,
        run_id: i64,
        urls: Vec<String>,
    ) -> ItemResults {
        let total = urls.len();
        let mut results = ItemResults::default();

        for (index, url) in urls.iter().enumerate() {
            tracing::debug!("Processing {}/{}: {}", index + 1, total, url);
            let outcome = process_item(renderer, storage, url, &self.fetch).await;
            results.record(storage, run_id, outcome).await;
        }

        results
    }

    /// Processes URLs on `workers` tasks, each with its own renderer session
    async fn process_pooled(
        &self,
        storage: &SharedStorage,
        cookies: &Arc<Vec<BrowserCookie>>,
        run_id: i64,
        urls: Vec<String>,
        workers: usize,
    ) -> ItemResults {
        tracing::info!("Processing {} URLs on {} workers", urls.len(), workers);
        let queue = Arc::new(Mutex::new(VecDeque::from(urls)));
        let pool = Arc::new(Mutex::new(PoolState::default()));

        let mut tasks = JoinSet::new();
        for id in 1..=workers {
            let worker = Worker {
                id,
                factory: Arc::clone(&self.factory),
                cookies: Arc::clone(cookies),
                storage: Arc::clone(storage),
                queue: Arc::clone(&queue),
                pool: Arc::clone(&pool),
                fetch: self.fetch.clone(),
                run_id,
            };
            tasks.spawn(worker.run());
        }

        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                tracing::error!("Worker task failed: {}", e);
            }
        }

        let state = std::mem::take(&mut *pool.lock().await);
        let mut results = state.results;

        let mut stranded: Vec<String> = state.in_flight.into_values().collect();
        stranded.sort();
        for url in stranded {
            let failure = ItemFailure::new(
                &url,
                derive_listing_id(&url).ok(),
                FailureStage::Unprocessed,
                "worker stopped while processing this URL",
            );
            results.record(storage, run_id, Err(failure)).await;
        }

        let leftovers: Vec<String> = queue.lock().await.drain(..).collect();
        for url in leftovers {
            let failure = ItemFailure::new(
                &url,
                derive_listing_id(&url).ok(),
                FailureStage::Unprocessed,
                "no renderer session was available",
            );
            results.record(storage, run_id, Err(failure)).await;
        }

        results
    }

    fn load_cookies(&self) -> Vec<BrowserCookie> {
        match &self.config.browser.cookies_path {
            Some(path) => load_cookie_jar(path),
            None => Vec::new(),
        }
    }
}

/// One pooled fetch worker
struct Worker {
    id: usize,
    factory: Arc<dyn RendererFactory>,
    cookies: Arc<Vec<BrowserCookie>>,
    storage: SharedStorage,
    queue: Arc<Mutex<VecDeque<String>>>,
    pool: Arc<Mutex<PoolState>>,
    fetch: FetchOptions,
    run_id: i64,
}

impl Worker {
    async fn run(self) {
        let renderer = match self.factory.open().await {
            Ok(renderer) => renderer,
            Err(e) => {
                tracing::warn!("Worker {} cannot open a renderer session: {}", self.id, e);
                return;
            }
        };
        inject_cookies(renderer.as_ref(), &self.cookies).await;

        loop {
            let next = self.queue.lock().await.pop_front();
            let Some(url) = next else {
                break;
            };

            tracing::debug!("Worker {} processing {}", self.id, url);
            self.pool.lock().await.in_flight.insert(self.id, url.clone());

            let outcome = process_item(renderer.as_ref(), &self.storage, &url, &self.fetch).await;

            let mut pool = self.pool.lock().await;
            pool.in_flight.remove(&self.id);
            pool.results.record(&self.storage, self.run_id, outcome).await;
        }

        if let Err(e) = renderer.close().await {
            tracing::warn!("Worker {} failed to close its session: {}", self.id, e);
        }
    }
}

/// Fetches, extracts and ingests one URL
async fn process_item(
    renderer: &dyn Renderer,
    storage: &SharedStorage,
    url: &str,
    options: &FetchOptions,
) -> Result<String, ItemFailure> {
    let page = fetch_page(renderer, url, options).await.map_err(|e| {
        ItemFailure::new(url, derive_listing_id(url).ok(), FailureStage::Fetch, e)
    })?;

    let record = extract(&page.markup, &page.url)
        .map_err(|e| ItemFailure::new(url, None, FailureStage::Extract, e))?;

    let mut store = storage.lock().await;
    ingest(&mut *store, &record).map_err(|e| {
        ItemFailure::new(
            url,
            Some(record.listing_id.clone()),
            FailureStage::Ingest,
            e,
        )
    })
}

async fn inject_cookies(renderer: &dyn Renderer, cookies: &[BrowserCookie]) {
    if cookies.is_empty() {
        return;
    }
    if let Err(e) = renderer.add_cookies(cookies).await {
        tracing::warn!("Failed to inject {} cookies: {}", cookies.len(), e);
    }
}

fn close_storage(storage: SharedStorage) {
    match Arc::try_unwrap(storage) {
        Ok(storage) => {
            if let Err(e) = storage.into_inner().close() {
                tracing::warn!("Failed to close database: {}", e);
            }
        }
        Err(_) => tracing::warn!("Database still shared at shutdown; leaving it to drop"),
    }
}

/// Runs one scrape with a Chrome renderer configured from `[browser]`
///
/// # Example
///
/// ```no_run
/// use market_sweep::config::load_config;
/// use market_sweep::crawler::run_scrape;
/// use std::path::Path;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let config = load_config(Path::new("config.toml"))?;
/// let summary = run_scrape(config).await?;
/// println!("{} listings ingested", summary.ingested.len());
/// # Ok(())
/// # }
/// ```
pub async fn run_scrape(config: Config) -> Result<RunSummary, SweepError> {
    let factory = Arc::new(ChromiumLauncher::from_config(&config.browser));
    let coordinator = Coordinator::new(config, factory)?;
    coordinator.run().await
}
