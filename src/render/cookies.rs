//! Cookie jar loading for renderer sessions.

use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, info, warn};

/// A cookie as exported by common browser extensions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BrowserCookie {
    #[serde(alias = "key")]
    pub name: String,
    #[serde(default)]
    pub value: String,
    pub domain: String,
    #[serde(default = "default_path")]
    pub path: String,
    #[serde(default)]
    pub secure: Option<bool>,
    #[serde(default, alias = "httpOnly")]
    pub http_only: Option<bool>,
    /// Expiry in seconds since the epoch
    #[serde(default, alias = "expirationDate")]
    pub expires: Option<f64>,
}

fn default_path() -> String {
    "/".to_string()
}

/// Loads a JSON array of cookies
///
/// A missing or unreadable jar is not fatal: the problem is logged and the session simply
/// runs without cookies. Entries without a name or domain are skipped.
pub fn load_cookie_jar(path: &Path) -> Vec<BrowserCookie> {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) => {
            warn!("Cannot read cookie jar {}: {}", path.display(), e);
            return Vec::new();
        }
    };

    let entries: Vec<serde_json::Value> = match serde_json::from_str(&content) {
        Ok(entries) => entries,
        Err(e) => {
            warn!("Cookie jar {} is not a JSON array: {}", path.display(), e);
            return Vec::new();
        }
    };

    let total = entries.len();
    let cookies: Vec<BrowserCookie> = entries
        .into_iter()
        .filter_map(|entry| match serde_json::from_value::<BrowserCookie>(entry) {
            Ok(cookie) if !cookie.name.is_empty() && !cookie.domain.is_empty() => Some(cookie),
            Ok(cookie) => {
                debug!("Skipping cookie without name or domain: {:?}", cookie.name);
                None
            }
            Err(e) => {
                debug!("Skipping malformed cookie: {}", e);
                None
            }
        })
        .collect();

    info!(
        "Loaded {} of {} cookies from {}",
        cookies.len(),
        total,
        path.display()
    );
    cookies
}
