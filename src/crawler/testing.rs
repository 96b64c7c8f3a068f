//! Scripted renderer used by the crawler unit tests

use crate::render::{BrowserCookie, Renderer, RendererFactory};
use crate::RenderError;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

type AnchorScript = Box<dyn Fn(usize) -> Result<Vec<String>, RenderError> + Send + Sync>;

/// Serves fixed markup per URL and scripted anchors per harvest round
pub(crate) struct ScriptedRenderer {
    pages: HashMap<String, String>,
    /// Remaining transient navigation failures per URL
    flaky: Mutex<HashMap<String, u32>>,
    anchors: AnchorScript,
    /// Navigating here panics, standing in for a crashed session
    panic_on: Option<String>,
    harvests: AtomicUsize,
    current: Mutex<Option<String>>,
    pub navigations: Mutex<Vec<String>>,
    pub cookies: Mutex<Vec<BrowserCookie>>,
    pub scrolls: AtomicUsize,
    pub fail_scroll: bool,
    pub idle_times_out: bool,
    pub closed: AtomicBool,
}

impl ScriptedRenderer {
    pub fn new() -> Self {
        Self {
            pages: HashMap::new(),
            flaky: Mutex::new(HashMap::new()),
            anchors: Box::new(|_| Ok(Vec::new())),
            panic_on: None,
            harvests: AtomicUsize::new(0),
            current: Mutex::new(None),
            navigations: Mutex::new(Vec::new()),
            cookies: Mutex::new(Vec::new()),
            scrolls: AtomicUsize::new(0),
            fail_scroll: false,
            idle_times_out: false,
            closed: AtomicBool::new(false),
        }
    }

    pub fn with_page(mut self, url: &str, markup: &str) -> Self {
        self.pages.insert(url.to_string(), markup.to_string());
        self
    }

    pub fn with_flaky(self, url: &str, failures: u32) -> Self {
        self.flaky
            .lock()
            .unwrap()
            .insert(url.to_string(), failures);
        self
    }

    pub fn with_panic_on(mut self, url: &str) -> Self {
        self.panic_on = Some(url.to_string());
        self
    }

    /// `script` receives the 0-based harvest index
    pub fn with_anchors<F>(mut self, script: F) -> Self
    where
        F: Fn(usize) -> Result<Vec<String>, RenderError> + Send + Sync + 'static,
    {
        self.anchors = Box::new(script);
        self
    }

    pub fn harvest_count(&self) -> usize {
        self.harvests.load(Ordering::SeqCst)
    }

    pub fn navigation_count(&self, url: &str) -> usize {
        self.navigations
            .lock()
            .unwrap()
            .iter()
            .filter(|u| u.as_str() == url)
            .count()
    }
}

impl ScriptedRenderer {
    /// Records the navigation and applies the scripted failure, without loading the page
    fn try_navigate(&self, url: &str, timeout: Duration) -> Result<(), RenderError> {
        if self.panic_on.as_deref() == Some(url) {
            panic!("renderer session crashed on {}", url);
        }
        self.navigations.lock().unwrap().push(url.to_string());

        if let Some(remaining) = self.flaky.lock().unwrap().get_mut(url) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(RenderError::Timeout {
                    url: url.to_string(),
                    secs: timeout.as_secs(),
                });
            }
        }

        if !self.pages.contains_key(url) {
            return Err(RenderError::Navigation {
                url: url.to_string(),
                message: "net::ERR_NAME_NOT_RESOLVED".to_string(),
            });
        }
        Ok(())
    }

    fn markup(&self, current: &Mutex<Option<String>>) -> Result<String, RenderError> {
        let current = current.lock().unwrap().clone();
        current
            .and_then(|url| self.pages.get(&url).cloned())
            .ok_or_else(|| RenderError::Script("no page loaded".to_string()))
    }
}

#[async_trait]
impl Renderer for ScriptedRenderer {
    async fn navigate(&self, url: &str, timeout: Duration) -> Result<(), RenderError> {
        self.try_navigate(url, timeout)?;
        *self.current.lock().unwrap() = Some(url.to_string());
        Ok(())
    }

    async fn content(&self) -> Result<String, RenderError> {
        self.markup(&self.current)
    }

    async fn scroll_to_bottom(&self) -> Result<(), RenderError> {
        self.scrolls.fetch_add(1, Ordering::SeqCst);
        if self.fail_scroll {
            return Err(RenderError::Script("scroll blocked".to_string()));
        }
        Ok(())
    }

    async fn wait_network_idle(&self, timeout: Duration) -> Result<(), RenderError> {
        if self.idle_times_out {
            return Err(RenderError::Timeout {
                url: "network idle".to_string(),
                secs: timeout.as_secs(),
            });
        }
        Ok(())
    }

    async fn query_anchors(&self, _patterns: &[String]) -> Result<Vec<String>, RenderError> {
        let index = self.harvests.fetch_add(1, Ordering::SeqCst);
        (self.anchors)(index)
    }

    async fn add_cookies(&self, cookies: &[BrowserCookie]) -> Result<(), RenderError> {
        self.cookies.lock().unwrap().extend_from_slice(cookies);
        Ok(())
    }

    async fn close(&self) -> Result<(), RenderError> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

/// Hands out sessions that share one scripted renderer
pub(crate) struct SharedFactory {
    pub renderer: Arc<ScriptedRenderer>,
    pub opened: AtomicUsize,
}

impl SharedFactory {
    pub fn new(renderer: ScriptedRenderer) -> Self {
        Self {
            renderer: Arc::new(renderer),
            opened: AtomicUsize::new(0),
        }
    }
}

/// Shares scripts and counters with the factory's renderer but keeps its own current page
struct SharedSession(Arc<ScriptedRenderer>, Mutex<Option<String>>);

#[async_trait]
impl Renderer for SharedSession {
    async fn navigate(&self, url: &str, timeout: Duration) -> Result<(), RenderError> {
        self.0.try_navigate(url, timeout)?;
        *self.1.lock().unwrap() = Some(url.to_string());
        Ok(())
    }

    async fn content(&self) -> Result<String, RenderError> {
        self.0.markup(&self.1)
    }

    async fn scroll_to_bottom(&self) -> Result<(), RenderError> {
        self.0.scroll_to_bottom().await
    }

    async fn wait_network_idle(&self, timeout: Duration) -> Result<(), RenderError> {
        self.0.wait_network_idle(timeout).await
    }

    async fn query_anchors(&self, patterns: &[String]) -> Result<Vec<String>, RenderError> {
        self.0.query_anchors(patterns).await
    }

    async fn add_cookies(&self, cookies: &[BrowserCookie]) -> Result<(), RenderError> {
        self.0.add_cookies(cookies).await
    }

    async fn close(&self) -> Result<(), RenderError> {
        self.0.close().await
    }
}

#[async_trait]
impl RendererFactory for SharedFactory {
    async fn open(&self) -> Result<Box<dyn Renderer>, RenderError> {
        self.opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(SharedSession(
            Arc::clone(&self.renderer),
            Mutex::new(None),
        )))
    }
}

/// A factory whose sessions can never be opened
pub(crate) struct FailingFactory;

#[async_trait]
impl RendererFactory for FailingFactory {
    async fn open(&self) -> Result<Box<dyn Renderer>, RenderError> {
        Err(RenderError::Launch("chrome not found".to_string()))
    }
}
