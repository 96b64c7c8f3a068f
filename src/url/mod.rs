//! URL handling module for Market-Sweep
//!
//! This module provides candidate URL normalization, relative href resolution against the
//! marketplace origin and listing-link matching.

mod matcher;
mod normalize;

use crate::{UrlError, UrlResult};
use url::Url;

// Re-export main functions
pub use matcher::{anchor_selector, is_listing_link};
pub use normalize::normalize_url;

/// Returns the origin (`scheme://host[:port]/`) of a URL as a base for href resolution
///
/// # Examples
///
/// ```
/// use market_sweep::url::origin_of;
///
/// let origin = origin_of("https://www.facebook.com/marketplace/manila/vehicles?x=1").unwrap();
/// assert_eq!(origin.as_str(), "https://www.facebook.com/");
/// ```
pub fn origin_of(url_str: &str) -> UrlResult<Url> {
    let url = Url::parse(url_str).map_err(|e| UrlError::Parse(e.to_string()))?;
    if url.host_str().is_none() {
        return Err(UrlError::MissingDomain);
    }
    let origin = url.origin().ascii_serialization();
    Url::parse(&format!("{}/", origin)).map_err(|e| UrlError::Parse(e.to_string()))
}

/// Resolves an href found on a page to a normalized absolute URL
///
/// Returns None if the href should be ignored:
/// - empty or fragment-only hrefs
/// - javascript:, mailto:, tel:, data: schemes
/// - anything that does not resolve to an HTTP(S) URL
///
/// Absolute hrefs are kept as-is (apart from normalization); relative and
/// protocol-relative hrefs are joined onto `base`.
pub fn resolve_href(base: &Url, href: &str) -> Option<Url> {
    let href = href.trim();

    if href.is_empty() || href.starts_with('#') {
        return None;
    }

    let lowered = href.to_ascii_lowercase();
    if lowered.starts_with("javascript:")
        || lowered.starts_with("mailto:")
        || lowered.starts_with("tel:")
        || lowered.starts_with("data:")
    {
        return None;
    }

    let absolute = base.join(href).ok()?;
    normalize_url(absolute.as_str()).ok()
}
