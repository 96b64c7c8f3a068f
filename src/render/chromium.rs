//! Chrome DevTools renderer.
//!
//! Launches a local Chrome/Chromium through chromiumoxide, or attaches to one that is
//! already running when `remote-url` is configured.

use crate::config::BrowserConfig;
use crate::render::{Renderer, RendererFactory};
use crate::RenderError;
use async_trait::async_trait;
use std::path::PathBuf;
use std::time::Duration;

#[cfg(feature = "browser")]
use crate::render::BrowserCookie;
#[cfg(feature = "browser")]
use crate::url::anchor_selector;
#[cfg(feature = "browser")]
use chromiumoxide::cdp::browser_protocol::network::{CookieParam, TimeSinceEpoch};
#[cfg(feature = "browser")]
use chromiumoxide::cdp::browser_protocol::page::NavigateParams;
#[cfg(feature = "browser")]
use chromiumoxide::{Browser, BrowserConfig as LaunchConfig, Page};
#[cfg(feature = "browser")]
use futures::StreamExt;
#[cfg(feature = "browser")]
use std::sync::atomic::{AtomicBool, Ordering};
#[cfg(feature = "browser")]
use tokio::sync::Mutex;
#[cfg(feature = "browser")]
use tokio::task::JoinHandle;
#[cfg(feature = "browser")]
use tracing::{debug, info, warn};

/// Polls the resource timing buffer until no new entries appear for 500ms
#[cfg(feature = "browser")]
const NETWORK_IDLE_SCRIPT: &str = r#"
    new Promise((resolve) => {
        performance.setResourceTimingBufferSize(100000);
        let last = performance.getEntriesByType('resource').length;
        let quiet = 0;
        const timer = setInterval(() => {
            const now = performance.getEntriesByType('resource').length;
            if (now === last) {
                quiet += 1;
            } else {
                quiet = 0;
                last = now;
            }
            if (quiet >= 5) {
                clearInterval(timer);
                resolve(now);
            }
        }, 100);
    })
"#;

#[cfg(feature = "browser")]
const SCROLL_SCRIPT: &str = "window.scrollBy(0, document.body.scrollHeight)";

/// Opens Chrome sessions according to `[browser]` settings
#[derive(Debug, Clone)]
pub struct ChromiumLauncher {
    headless: bool,
    remote_url: Option<String>,
    executable: Option<PathBuf>,
    args: Vec<String>,
    request_timeout: Duration,
}

impl ChromiumLauncher {
    pub fn from_config(config: &BrowserConfig) -> Self {
        Self {
            headless: config.headless,
            remote_url: config.remote_url.clone(),
            executable: config.executable.clone(),
            args: config.args.clone(),
            request_timeout: Duration::from_secs(config.request_timeout_secs),
        }
    }
}

#[async_trait]
impl RendererFactory for ChromiumLauncher {
    #[cfg(feature = "browser")]
    async fn open(&self) -> Result<Box<dyn Renderer>, RenderError> {
        let session = match &self.remote_url {
            Some(remote) => ChromiumSession::connect(self, remote).await?,
            None => ChromiumSession::launch(self).await?,
        };
        Ok(Box::new(session))
    }

    #[cfg(not(feature = "browser"))]
    async fn open(&self) -> Result<Box<dyn Renderer>, RenderError> {
        Err(RenderError::Unsupported)
    }
}

/// Resolves the DevTools WebSocket URL of a running browser
///
/// `ws://` URLs that already point at a `/devtools/` target are used as-is; anything else is
/// treated as the browser's HTTP endpoint and asked for `/json/version`.
pub async fn resolve_debugger_url(remote: &str, timeout: Duration) -> Result<String, RenderError> {
    let is_ws = remote.starts_with("ws://") || remote.starts_with("wss://");
    if is_ws && remote.contains("/devtools/") {
        return Ok(remote.to_string());
    }

    let http_url = remote
        .replacen("wss://", "https://", 1)
        .replacen("ws://", "http://", 1);
    let version_url = format!("{}/json/version", http_url.trim_end_matches('/'));

    let client = reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| RenderError::Launch(format!("Failed to build HTTP client: {}", e)))?;

    let resp: serde_json::Value = client
        .get(&version_url)
        .send()
        .await
        .and_then(|r| r.error_for_status())
        .map_err(|e| RenderError::Launch(format!("Cannot reach {}: {}", version_url, e)))?
        .json()
        .await
        .map_err(|e| RenderError::Launch(format!("Invalid browser version info: {}", e)))?;

    resp.get("webSocketDebuggerUrl")
        .and_then(|v| v.as_str())
        .map(str::to_string)
        .ok_or_else(|| {
            RenderError::Launch(format!("No webSocketDebuggerUrl in {}", version_url))
        })
}

/// A single Chrome tab plus the browser connection that owns it
#[cfg(feature = "browser")]
pub struct ChromiumSession {
    browser: Mutex<Browser>,
    page: Page,
    handler: JoinHandle<()>,
    /// Attached browsers are left running on close
    remote: bool,
    closed: AtomicBool,
}

#[cfg(feature = "browser")]
impl ChromiumSession {
    async fn launch(launcher: &ChromiumLauncher) -> Result<Self, RenderError> {
        info!("Launching browser (headless={})", launcher.headless);

        let mut builder = LaunchConfig::builder().request_timeout(launcher.request_timeout);
        if let Some(executable) = &launcher.executable {
            builder = builder.chrome_executable(executable);
        }
        if !launcher.headless {
            builder = builder.with_head();
        }

        builder = builder
            .arg("--disable-dev-shm-usage")
            .arg("--no-first-run")
            .arg("--no-default-browser-check")
            .arg("--disable-blink-features=AutomationControlled");
        for arg in &launcher.args {
            builder = builder.arg(arg);
        }

        let config = builder
            .build()
            .map_err(|e| RenderError::Launch(format!("Failed to build browser config: {}", e)))?;

        let (browser, handler) = Browser::launch(config)
            .await
            .map_err(|e| RenderError::Launch(format!("Failed to launch browser: {}", e)))?;

        Self::with_browser(browser, handler, false).await
    }

    async fn connect(launcher: &ChromiumLauncher, remote: &str) -> Result<Self, RenderError> {
        info!("Connecting to remote browser at {}", remote);
        let ws_url = resolve_debugger_url(remote, launcher.request_timeout).await?;

        let handler_config = chromiumoxide::handler::HandlerConfig {
            request_timeout: launcher.request_timeout,
            ..Default::default()
        };

        let (browser, handler) = Browser::connect_with_config(ws_url, handler_config)
            .await
            .map_err(|e| RenderError::Launch(format!("Failed to connect to browser: {}", e)))?;

        Self::with_browser(browser, handler, true).await
    }

    async fn with_browser(
        mut browser: Browser,
        mut handler: chromiumoxide::handler::Handler,
        remote: bool,
    ) -> Result<Self, RenderError> {
        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if event.is_err() {
                    break;
                }
            }
        });

        let page = match browser.new_page("about:blank").await {
            Ok(page) => page,
            Err(e) => {
                if !remote {
                    let _ = browser.close().await;
                }
                handler.abort();
                return Err(RenderError::Launch(format!("Failed to open tab: {}", e)));
            }
        };

        Ok(Self {
            browser: Mutex::new(browser),
            page,
            handler,
            remote,
            closed: AtomicBool::new(false),
        })
    }

    fn ensure_open(&self) -> Result<(), RenderError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(RenderError::Closed);
        }
        Ok(())
    }
}

#[cfg(feature = "browser")]
#[async_trait]
impl Renderer for ChromiumSession {
    async fn navigate(&self, url: &str, timeout: Duration) -> Result<(), RenderError> {
        self.ensure_open()?;
        debug!("Navigating to {}", url);

        let params = NavigateParams::builder()
            .url(url)
            .build()
            .map_err(|e| RenderError::Navigation {
                url: url.to_string(),
                message: e,
            })?;

        let navigation = async {
            let response =
                self.page
                    .execute(params)
                    .await
                    .map_err(|e| RenderError::Navigation {
                        url: url.to_string(),
                        message: e.to_string(),
                    })?;

            if let Some(error_text) = response.result.error_text.clone() {
                return Err(RenderError::Navigation {
                    url: url.to_string(),
                    message: error_text,
                });
            }

            self.page
                .wait_for_navigation()
                .await
                .map_err(|e| RenderError::Navigation {
                    url: url.to_string(),
                    message: e.to_string(),
                })?;
            Ok(())
        };

        tokio::time::timeout(timeout, navigation)
            .await
            .map_err(|_| RenderError::Timeout {
                url: url.to_string(),
                secs: timeout.as_secs(),
            })?
    }

    async fn content(&self) -> Result<String, RenderError> {
        self.ensure_open()?;
        self.page
            .content()
            .await
            .map_err(|e| RenderError::Script(format!("Failed to read page content: {}", e)))
    }

    async fn scroll_to_bottom(&self) -> Result<(), RenderError> {
        self.ensure_open()?;
        self.page
            .evaluate(SCROLL_SCRIPT.to_string())
            .await
            .map_err(|e| RenderError::Script(format!("Scroll failed: {}", e)))?;
        Ok(())
    }

    async fn wait_network_idle(&self, timeout: Duration) -> Result<(), RenderError> {
        self.ensure_open()?;
        match tokio::time::timeout(timeout, self.page.evaluate(NETWORK_IDLE_SCRIPT.to_string())).await {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(e)) => Err(RenderError::Script(format!("Network idle check failed: {}", e))),
            Err(_) => Err(RenderError::Timeout {
                url: "network idle".to_string(),
                secs: timeout.as_secs(),
            }),
        }
    }

    async fn query_anchors(&self, patterns: &[String]) -> Result<Vec<String>, RenderError> {
        self.ensure_open()?;
        let selector = serde_json::to_string(&anchor_selector(patterns))
            .map_err(|e| RenderError::Script(e.to_string()))?;
        let script = format!(
            "Array.from(document.querySelectorAll({})).map(a => a.getAttribute('href')).filter(h => h)",
            selector
        );

        self.page
            .evaluate(script)
            .await
            .map_err(|e| RenderError::Script(format!("Anchor query failed: {}", e)))?
            .into_value::<Vec<String>>()
            .map_err(|e| RenderError::Script(format!("Unexpected anchor list: {}", e)))
    }

    async fn add_cookies(&self, cookies: &[BrowserCookie]) -> Result<(), RenderError> {
        self.ensure_open()?;
        for cookie in cookies {
            let mut builder = CookieParam::builder()
                .name(cookie.name.as_str())
                .value(cookie.value.as_str())
                .domain(cookie.domain.as_str())
                .path(cookie.path.as_str());
            if let Some(secure) = cookie.secure {
                builder = builder.secure(secure);
            }
            if let Some(http_only) = cookie.http_only {
                builder = builder.http_only(http_only);
            }
            if let Some(expires) = cookie.expires {
                builder = builder.expires(TimeSinceEpoch::new(expires));
            }

            match builder.build() {
                Ok(param) => {
                    if let Err(e) = self.page.set_cookie(param).await {
                        warn!("Failed to set cookie {}: {}", cookie.name, e);
                    }
                }
                Err(e) => warn!("Failed to build cookie {}: {}", cookie.name, e),
            }
        }
        Ok(())
    }

    async fn close(&self) -> Result<(), RenderError> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        if let Err(e) = self.page.clone().close().await {
            debug!("Closing tab failed: {}", e);
        }

        let result = if self.remote {
            Ok(())
        } else {
            let mut browser = self.browser.lock().await;
            let closed = browser
                .close()
                .await
                .map(|_| ())
                .map_err(|e| RenderError::Launch(format!("Failed to close browser: {}", e)));
            if closed.is_ok() {
                let _ = browser.wait().await;
            }
            closed
        };

        self.handler.abort();
        result
    }
}

#[cfg(feature = "browser")]
impl Drop for ChromiumSession {
    fn drop(&mut self) {
        self.handler.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_resolve_from_version_endpoint() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/json/version"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "Browser": "Chrome/120.0.0.0",
                "webSocketDebuggerUrl": "ws://127.0.0.1:9222/devtools/browser/abc"
            })))
            .mount(&server)
            .await;

        let ws = resolve_debugger_url(&server.uri(), Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(ws, "ws://127.0.0.1:9222/devtools/browser/abc");
    }

    #[tokio::test]
    async fn test_ws_scheme_is_translated_for_lookup() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/json/version"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "webSocketDebuggerUrl": "ws://remote/devtools/browser/1"
            })))
            .mount(&server)
            .await;

        let remote = server.uri().replacen("http://", "ws://", 1);
        let ws = resolve_debugger_url(&format!("{}/", remote), Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(ws, "ws://remote/devtools/browser/1");
    }

    #[tokio::test]
    async fn test_direct_devtools_url_skips_lookup() {
        let ws = resolve_debugger_url(
            "ws://127.0.0.1:1/devtools/browser/xyz",
            Duration::from_secs(1),
        )
        .await
        .unwrap();
        assert_eq!(ws, "ws://127.0.0.1:1/devtools/browser/xyz");
    }

    #[tokio::test]
    async fn test_missing_debugger_url_is_launch_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/json/version"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "Browser": "Chrome/120.0.0.0"
            })))
            .mount(&server)
            .await;

        let result = resolve_debugger_url(&server.uri(), Duration::from_secs(5)).await;
        assert!(matches!(result, Err(RenderError::Launch(_))));
    }

    #[tokio::test]
    async fn test_http_error_is_launch_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/json/version"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let result = resolve_debugger_url(&server.uri(), Duration::from_secs(5)).await;
        assert!(matches!(result, Err(RenderError::Launch(_))));
    }

    #[cfg(not(feature = "browser"))]
    #[tokio::test]
    async fn test_launcher_without_browser_feature() {
        let launcher = ChromiumLauncher::from_config(&BrowserConfig::default());
        assert!(matches!(launcher.open().await, Err(RenderError::Unsupported)));
    }
}
