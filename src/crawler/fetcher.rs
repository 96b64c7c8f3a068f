//! Listing page fetcher
//!
//! Loads one URL through a renderer session and returns its rendered markup. Every attempt
//! navigates with a fixed timeout, waits a short settle delay for client-side rendering,
//! then reads the DOM. Attempts are wrapped by the retry executor:
//!
//! | Condition | Action |
//! |-----------|--------|
//! | Navigation timeout | Retry with backoff |
//! | Navigation/transport error | Retry with backoff |
//! | Script error, closed session | Fail immediately |
//! | Retries exhausted | Per-item failure for the caller |

use crate::config::FetchConfig;
use crate::crawler::retry::{retry, RetryPolicy};
use crate::render::Renderer;
use crate::RenderError;
use std::time::Duration;

/// Rendered markup of one page
#[derive(Debug, Clone)]
pub struct RawPage {
    pub url: String,
    pub markup: String,
}

/// Timing and retry settings for [`fetch_page`]
#[derive(Debug, Clone)]
pub struct FetchOptions {
    pub navigation_timeout: Duration,
    pub settle: Duration,
    pub retry: RetryPolicy,
}

impl FetchOptions {
    pub fn from_config(config: &FetchConfig) -> Self {
        Self {
            navigation_timeout: Duration::from_secs(config.navigation_timeout_secs),
            settle: Duration::from_millis(config.settle_ms),
            retry: RetryPolicy::from_config(config),
        }
    }
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self::from_config(&FetchConfig::default())
    }
}

/// Fetches the rendered markup of `url`
///
/// # Arguments
///
/// * `renderer` - The session to load the page in
/// * `url` - Absolute URL of the listing page
/// * `options` - Navigation timeout, settle delay and retry policy
///
/// # Returns
///
/// * `Ok(RawPage)` - Markup after navigation and settling
/// * `Err(RenderError)` - The last error once retries are exhausted, or the first
///   non-recoverable one
pub async fn fetch_page(
    renderer: &dyn Renderer,
    url: &str,
    options: &FetchOptions,
) -> Result<RawPage, RenderError> {
    retry(&options.retry, |attempt| async move {
        if attempt > 1 {
            tracing::debug!("Fetching {} (attempt {})", url, attempt);
        }

        renderer.navigate(url, options.navigation_timeout).await?;
        settle(options.settle).await;
        let markup = renderer.content().await?;

        Ok(RawPage {
            url: url.to_string(),
            markup,
        })
    })
    .await
}

/// Navigates to `url` with retry but does not read the page
///
/// Used for the discovery entry page, where the caller keeps interacting with the tab.
pub async fn navigate_with_retry(
    renderer: &dyn Renderer,
    url: &str,
    options: &FetchOptions,
) -> Result<(), RenderError> {
    retry(&options.retry, |_| renderer.navigate(url, options.navigation_timeout)).await
}

pub(crate) async fn settle(delay: Duration) {
    if !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }
}
