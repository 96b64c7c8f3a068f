use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Main configuration structure for Market-Sweep
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub scrape: ScrapeConfig,
    #[serde(default)]
    pub browser: BrowserConfig,
    #[serde(default)]
    pub discovery: DiscoveryConfig,
    #[serde(default)]
    pub fetch: FetchConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

/// What to scrape and how much of it
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScrapeConfig {
    /// Entry page for discovery
    #[serde(rename = "target-url", default)]
    pub target_url: Option<String>,

    /// Upper bound on discovered URLs per run
    #[serde(rename = "max-items", default = "default_max_items")]
    pub max_items: u32,

    /// Number of renderer sessions fetching listing pages in parallel
    #[serde(rename = "max-workers", default = "default_max_workers")]
    pub max_workers: u32,
}

/// Renderer session configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrowserConfig {
    /// Run the browser without a window
    #[serde(default = "default_headless")]
    pub headless: bool,

    /// JSON cookie jar injected into every session
    #[serde(rename = "cookies-path", default)]
    pub cookies_path: Option<PathBuf>,

    /// DevTools endpoint of an already running browser (http:// or ws://)
    #[serde(rename = "remote-url", default)]
    pub remote_url: Option<String>,

    /// Explicit Chrome/Chromium executable
    #[serde(default)]
    pub executable: Option<PathBuf>,

    /// Extra command line arguments for a launched browser
    #[serde(default)]
    pub args: Vec<String>,

    /// DevTools request timeout (seconds)
    #[serde(rename = "request-timeout-secs", default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

/// Scroll-driven discovery tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveryConfig {
    /// Hard cap on scroll rounds
    #[serde(rename = "max-rounds", default = "default_max_rounds")]
    pub max_rounds: u32,

    /// Consecutive rounds without new URLs before giving up
    #[serde(rename = "stagnant-rounds", default = "default_stagnant_rounds")]
    pub stagnant_rounds: u32,

    /// Bound on each network-quiescence wait (seconds)
    #[serde(rename = "network-idle-timeout-secs", default = "default_network_idle_timeout_secs")]
    pub network_idle_timeout_secs: u64,

    /// Grace delay after network quiescence (milliseconds)
    #[serde(rename = "settle-ms", default = "default_discovery_settle_ms")]
    pub settle_ms: u64,

    /// Delay after the entry page loads, before the first scroll (milliseconds)
    #[serde(rename = "initial-settle-ms", default = "default_initial_settle_ms")]
    pub initial_settle_ms: u64,

    /// Path fragments identifying listing links
    #[serde(rename = "link-patterns", default = "default_link_patterns")]
    pub link_patterns: Vec<String>,

    /// Origin used to resolve relative hrefs; defaults to the target URL's origin
    #[serde(rename = "base-origin", default)]
    pub base_origin: Option<String>,
}

/// Per-listing fetch configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchConfig {
    /// Navigation timeout (seconds)
    #[serde(rename = "navigation-timeout-secs", default = "default_navigation_timeout_secs")]
    pub navigation_timeout_secs: u64,

    /// Delay after navigation for client-side rendering (milliseconds)
    #[serde(rename = "settle-ms", default = "default_fetch_settle_ms")]
    pub settle_ms: u64,

    /// Total attempts per URL
    #[serde(default = "default_tries")]
    pub tries: u32,

    /// Wait before the first retry (milliseconds)
    #[serde(rename = "retry-delay-ms", default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,

    /// Multiplier applied to the wait after every retry
    #[serde(default = "default_backoff")]
    pub backoff: f64,
}

/// Output configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Path to the SQLite database file
    #[serde(rename = "database-path", default = "default_database_path")]
    pub database_path: String,
}

fn default_max_items() -> u32 {
    200
}

fn default_max_workers() -> u32 {
    1
}

fn default_headless() -> bool {
    true
}

fn default_request_timeout_secs() -> u64 {
    60
}

fn default_max_rounds() -> u32 {
    50
}

fn default_stagnant_rounds() -> u32 {
    3
}

fn default_network_idle_timeout_secs() -> u64 {
    30
}

fn default_discovery_settle_ms() -> u64 {
    1000
}

fn default_initial_settle_ms() -> u64 {
    2000
}

fn default_link_patterns() -> Vec<String> {
    vec!["/marketplace/item/".to_string(), "/item/".to_string()]
}

fn default_navigation_timeout_secs() -> u64 {
    60
}

fn default_fetch_settle_ms() -> u64 {
    1000
}

fn default_tries() -> u32 {
    3
}

fn default_retry_delay_ms() -> u64 {
    2000
}

fn default_backoff() -> f64 {
    2.0
}

fn default_database_path() -> String {
    "./listings.db".to_string()
}

impl Default for ScrapeConfig {
    fn default() -> Self {
        Self {
            target_url: None,
            max_items: default_max_items(),
            max_workers: default_max_workers(),
        }
    }
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            headless: default_headless(),
            cookies_path: None,
            remote_url: None,
            executable: None,
            args: Vec::new(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            max_rounds: default_max_rounds(),
            stagnant_rounds: default_stagnant_rounds(),
            network_idle_timeout_secs: default_network_idle_timeout_secs(),
            settle_ms: default_discovery_settle_ms(),
            initial_settle_ms: default_initial_settle_ms(),
            link_patterns: default_link_patterns(),
            base_origin: None,
        }
    }
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            navigation_timeout_secs: default_navigation_timeout_secs(),
            settle_ms: default_fetch_settle_ms(),
            tries: default_tries(),
            retry_delay_ms: default_retry_delay_ms(),
            backoff: default_backoff(),
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
        }
    }
}
