//! Renderer abstraction
//!
//! The pipeline never talks to a browser directly. It drives a [`Renderer`] session that can
//! load a page, scroll it, wait for the network to quiet down and hand back rendered markup.
//! Sessions are acquired through a [`RendererFactory`] so each worker can own its own.
//!
//! The Chrome DevTools implementation lives in [`chromium`] and is compiled with the
//! `browser` feature (on by default).

mod chromium;
mod cookies;

pub use chromium::{resolve_debugger_url, ChromiumLauncher};
pub use cookies::{load_cookie_jar, BrowserCookie};

use crate::RenderError;
use async_trait::async_trait;
use std::time::Duration;

/// One live page in a rendering engine
///
/// Methods take `&self` so a session can be shared by reference with retry closures.
#[async_trait]
pub trait Renderer: Send + Sync {
    /// Loads `url`, failing with [`RenderError::Timeout`] if it takes longer than `timeout`
    async fn navigate(&self, url: &str, timeout: Duration) -> Result<(), RenderError>;

    /// Returns the current rendered markup
    async fn content(&self) -> Result<String, RenderError>;

    /// Scrolls down by the full document height so lazy feeds load their next batch
    async fn scroll_to_bottom(&self) -> Result<(), RenderError>;

    /// Waits until no new network requests are observed, bounded by `timeout`
    async fn wait_network_idle(&self, timeout: Duration) -> Result<(), RenderError>;

    /// Returns the raw `href` of every anchor whose href contains one of `patterns`
    async fn query_anchors(&self, patterns: &[String]) -> Result<Vec<String>, RenderError>;

    /// Adds cookies to the session before navigation
    async fn add_cookies(&self, cookies: &[BrowserCookie]) -> Result<(), RenderError>;

    /// Releases the session. Calling it twice is not an error.
    async fn close(&self) -> Result<(), RenderError>;
}

/// Acquires renderer sessions
#[async_trait]
pub trait RendererFactory: Send + Sync {
    async fn open(&self) -> Result<Box<dyn Renderer>, RenderError>;
}

/// Whether this build can drive a real browser
pub fn browser_support() -> bool {
    cfg!(feature = "browser")
}
