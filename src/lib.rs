//! Market-Sweep: a listing harvester for scroll-paginated marketplaces
//!
//! This crate discovers listing pages on a JavaScript-rendered marketplace, extracts
//! structured attributes from each page and upserts them into SQLite keyed by a stable
//! listing identifier, so repeated runs converge instead of duplicating rows.

pub mod config;
pub mod crawler;
pub mod output;
pub mod render;
pub mod storage;
pub mod url;

use thiserror::Error;

/// Main error type for Market-Sweep operations
#[derive(Debug, Error)]
pub enum SweepError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Renderer error: {0}")]
    Render(#[from] RenderError),

    #[error("Storage error: {0}")]
    Storage(#[from] storage::StorageError),

    #[error("URL error: {0}")]
    Url(#[from] UrlError),

    #[error("Cannot derive a listing id from {url}")]
    MissingListingId { url: String },
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),

    #[error("No target URL configured (set scrape.target-url or TARGET_URL)")]
    MissingTargetUrl,
}

/// URL-specific errors
#[derive(Debug, Error)]
pub enum UrlError {
    #[error("Failed to parse URL: {0}")]
    Parse(String),

    #[error("Invalid URL scheme: {0}")]
    InvalidScheme(String),

    #[error("Missing domain in URL")]
    MissingDomain,
}

/// Errors raised by a renderer session
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("Navigation to {url} timed out after {secs}s")]
    Timeout { url: String, secs: u64 },

    #[error("Navigation to {url} failed: {message}")]
    Navigation { url: String, message: String },

    #[error("Page script failed: {0}")]
    Script(String),

    #[error("Failed to open renderer session: {0}")]
    Launch(String),

    #[error("Renderer session is closed")]
    Closed,

    #[error("Browser support not compiled. Rebuild with: cargo build --features browser")]
    Unsupported,
}

impl RenderError {
    /// Returns true for failures worth another attempt (timeouts, navigation/transport)
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Timeout { .. } | Self::Navigation { .. })
    }
}

/// Result type alias for Market-Sweep operations
pub type Result<T> = std::result::Result<T, SweepError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Result type alias for URL operations
pub type UrlResult<T> = std::result::Result<T, UrlError>;

// Re-export commonly used types
pub use config::Config;
pub use crawler::{Coordinator, ExtractedRecord, RunSummary};
pub use url::{normalize_url, resolve_href};
