use url::Url;

/// Checks if a URL points at a listing page
///
/// A URL matches when its path contains any of the configured fragments, e.g.
/// `/marketplace/item/`. Matching is done on the path only so hosts or query strings
/// that happen to contain the fragment are not mistaken for listings.
///
/// # Examples
///
/// ```
/// use market_sweep::url::is_listing_link;
/// use url::Url;
///
/// let patterns = vec!["/item/".to_string()];
/// let url = Url::parse("https://example.com/marketplace/item/42").unwrap();
/// assert!(is_listing_link(&url, &patterns));
///
/// let url = Url::parse("https://example.com/search?next=/item/42").unwrap();
/// assert!(!is_listing_link(&url, &patterns));
/// ```
pub fn is_listing_link(url: &Url, patterns: &[String]) -> bool {
    let path = url.path();
    patterns.iter().any(|pattern| path.contains(pattern.as_str()))
}

/// Builds the CSS selector a renderer uses to find listing anchors
///
/// Patterns are validated at config load to contain no quotes or whitespace.
pub fn anchor_selector(patterns: &[String]) -> String {
    patterns
        .iter()
        .map(|pattern| format!("a[href*='{}']", pattern))
        .collect::<Vec<_>>()
        .join(", ")
}
