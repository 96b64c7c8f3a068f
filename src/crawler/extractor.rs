//! Listing field extraction
//!
//! Turns the rendered markup of a listing page into an [`ExtractedRecord`]. Extraction is
//! heuristic and best-effort: only the listing id is required, every other field is `None`
//! when it cannot be found.
//!
//! # Field Rules
//!
//! | Field | Source |
//! |-------|--------|
//! | `listing_id` | URL segment after `/item/`, else the final path segment |
//! | `title` | `og:title` meta content, else `<title>` |
//! | `price`, `currency` | First currency marker followed by a number in the visible text |
//! | `year` | First standalone 19xx/20xx token in the visible text |
//! | `mileage` | First number followed by km/kms/kilometers in the visible text |
//! | `location` | First element whose `data-testid` or `class` mentions "location" |
//! | `raw_snippet` | First 4000 characters of the markup |

use crate::SweepError;
use once_cell::sync::Lazy;
use regex::Regex;
use rust_decimal::Decimal;
use scraper::{ElementRef, Html, Node, Selector};
use std::str::FromStr;
use url::Url;

/// Characters of raw markup kept with each record
pub const SNIPPET_CHARS: usize = 4000;

static ITEM_ID: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"/item/([^/?&#]+)").expect("valid item id regex"));

static PRICE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"([₱$€£¥]|\b(?:PHP|USD|EUR|GBP|JPY|AUD|CAD|SGD))\s*(\d{1,3}(?:,\d{3})+(?:\.\d+)?|\d+(?:\.\d+)?)",
    )
    .expect("valid price regex")
});

static YEAR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(?:19|20)\d{2}\b").expect("valid year regex"));

static MILEAGE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(\d{1,3}(?:,\d{3})+|\d{2,6})\s*(?:kilometers|kilometres|kms|km)\b")
        .expect("valid mileage regex")
});

static OG_TITLE: Lazy<Selector> =
    Lazy::new(|| Selector::parse(r#"meta[property="og:title"]"#).expect("valid selector"));

static TITLE: Lazy<Selector> = Lazy::new(|| Selector::parse("title").expect("valid selector"));

static LOCATION: Lazy<Selector> = Lazy::new(|| {
    Selector::parse(r#"[data-testid*="location"], [class*="location"]"#).expect("valid selector")
});

/// Elements whose text never reaches the reader
const HIDDEN_ELEMENTS: &[&str] = &["script", "style", "noscript", "template"];

/// Structured attributes of one listing page
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractedRecord {
    pub listing_id: String,
    pub title: Option<String>,
    pub price: Option<Decimal>,
    pub currency: Option<String>,
    pub year: Option<i32>,
    pub mileage: Option<i64>,
    pub location: Option<String>,
    pub url: String,
    pub raw_snippet: String,
}

/// Extracts a record from rendered markup
///
/// # Arguments
///
/// * `markup` - Rendered HTML of the listing page
/// * `url` - The URL the markup was loaded from
///
/// # Returns
///
/// * `Ok(ExtractedRecord)` - The listing id was derived; other fields are best-effort
/// * `Err(SweepError::MissingListingId)` - No listing id could be derived from `url`
///
/// # Example
///
/// ```
/// use market_sweep::crawler::extract;
///
/// let html = r#"<html><head><title>2018 Toyota Vios</title></head>
///               <body><p>₱ 450,000 · 45,000 km</p></body></html>"#;
/// let record = extract(html, "https://www.facebook.com/marketplace/item/123/").unwrap();
///
/// assert_eq!(record.listing_id, "123");
/// assert_eq!(record.year, Some(2018));
/// assert_eq!(record.mileage, Some(45000));
/// ```
pub fn extract(markup: &str, url: &str) -> Result<ExtractedRecord, SweepError> {
    let listing_id = derive_listing_id(url)?;

    let document = Html::parse_document(markup);
    let text = visible_text(&document);
    let (price, currency) = match extract_price(&text) {
        Some((price, currency)) => (Some(price), Some(currency)),
        None => (None, None),
    };

    Ok(ExtractedRecord {
        listing_id,
        title: extract_title(&document),
        price,
        currency,
        year: extract_year(&text),
        mileage: extract_mileage(&text),
        location: extract_location(&document),
        url: url.to_string(),
        raw_snippet: markup.chars().take(SNIPPET_CHARS).collect(),
    })
}

/// Derives the stable listing identifier from a listing URL
///
/// Uses the segment after `/item/` when present, otherwise the final path segment.
pub fn derive_listing_id(url: &str) -> Result<String, SweepError> {
    let missing = || SweepError::MissingListingId {
        url: url.to_string(),
    };

    if let Some(captures) = ITEM_ID.captures(url) {
        return Ok(captures[1].to_string());
    }

    let parsed = Url::parse(url).map_err(|_| missing())?;
    parsed
        .path_segments()
        .and_then(|mut segments| segments.next_back())
        .filter(|segment| !segment.is_empty())
        .map(str::to_string)
        .ok_or_else(missing)
}

fn extract_title(document: &Html) -> Option<String> {
    let og_title = document
        .select(&OG_TITLE)
        .next()
        .and_then(|meta| meta.value().attr("content"))
        .and_then(non_blank);

    og_title.or_else(|| {
        document
            .select(&TITLE)
            .next()
            .and_then(|title| non_blank(&title.text().collect::<String>()))
    })
}

fn extract_location(document: &Html) -> Option<String> {
    document
        .select(&LOCATION)
        .next()
        .and_then(|element| non_blank(&joined_text(element)))
}

/// Returns the first price and its currency marker
fn extract_price(text: &str) -> Option<(Decimal, String)> {
    let captures = PRICE.captures(text)?;
    let amount = captures[2].replace(',', "");
    let price = Decimal::from_str(&amount).ok()?;
    Some((price, captures[1].to_string()))
}

fn extract_year(text: &str) -> Option<i32> {
    YEAR.find(text).and_then(|m| m.as_str().parse().ok())
}

fn extract_mileage(text: &str) -> Option<i64> {
    let captures = MILEAGE.captures(text)?;
    let digits: String = captures[1].chars().filter(char::is_ascii_digit).collect();
    digits.parse().ok()
}

/// Document text outside script-like elements, fragments trimmed and joined by spaces
fn visible_text(document: &Html) -> String {
    let mut fragments = Vec::new();

    for node in document.tree.root().descendants() {
        let Node::Text(text) = node.value() else {
            continue;
        };

        let hidden = node.ancestors().any(|ancestor| {
            ancestor
                .value()
                .as_element()
                .map_or(false, |element| HIDDEN_ELEMENTS.contains(&element.name()))
        });
        if hidden {
            continue;
        }

        let trimmed = text.trim();
        if !trimmed.is_empty() {
            fragments.push(trimmed);
        }
    }

    fragments.join(" ")
}

fn joined_text(element: ElementRef<'_>) -> String {
    element
        .text()
        .map(str::trim)
        .filter(|fragment| !fragment.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

fn non_blank(value: &str) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const URL: &str = "https://www.facebook.com/marketplace/item/987654321/";

    fn page(body: &str) -> String {
        format!(
            "<html><head><title>Marketplace</title></head><body>{}</body></html>",
            body
        )
    }

    #[test]
    fn test_price_with_peso_sign_and_separators() {
        let record = extract(&page("<p>Selling fast ₱ 1,234,567 negotiable</p>"), URL).unwrap();
        assert_eq!(record.price, Some(Decimal::from(1_234_567)));
        assert_eq!(record.currency.as_deref(), Some("₱"));
    }

    #[test]
    fn test_year_and_mileage() {
        let record = extract(&page("<p>2018 model, 45,000 km driven</p>"), URL).unwrap();
        assert_eq!(record.year, Some(2018));
        assert_eq!(record.mileage, Some(45000));
    }

    #[test]
    fn test_currency_codes_and_decimals() {
        let record = extract(&page("<span>Price: PHP 350000.50</span>"), URL).unwrap();
        assert_eq!(record.price, Some(Decimal::from_str("350000.50").unwrap()));
        assert_eq!(record.currency.as_deref(), Some("PHP"));

        let record = extract(&page("<span>$1500 obo</span>"), URL).unwrap();
        assert_eq!(record.price, Some(Decimal::from(1500)));
        assert_eq!(record.currency.as_deref(), Some("$"));
    }

    #[test]
    fn test_mileage_units_are_case_insensitive() {
        let record = extract(&page("<p>Odometer 120000 KMS</p>"), URL).unwrap();
        assert_eq!(record.mileage, Some(120000));

        let record = extract(&page("<p>only 9,500 Kilometers</p>"), URL).unwrap();
        assert_eq!(record.mileage, Some(9500));
    }

    #[test]
    fn test_script_text_is_ignored() {
        let markup = page(
            r#"<script>var price = "₱ 1"; var year = 1999;</script>
               <style>.x { content: "2001"; }</style>
               <p>2015 Honda City ₱ 480,000</p>"#,
        );
        let record = extract(&markup, URL).unwrap();
        assert_eq!(record.price, Some(Decimal::from(480_000)));
        assert_eq!(record.year, Some(2015));
    }

    #[test]
    fn test_og_title_preferred_over_title() {
        let markup = r#"<html><head>
            <meta property="og:title" content="  2019 Mitsubishi Mirage G4  ">
            <title>Facebook</title></head><body></body></html>"#;
        let record = extract(markup, URL).unwrap();
        assert_eq!(record.title.as_deref(), Some("2019 Mitsubishi Mirage G4"));
    }

    #[test]
    fn test_title_fallback_and_blank_title() {
        let record = extract(&page(""), URL).unwrap();
        assert_eq!(record.title.as_deref(), Some("Marketplace"));

        let markup = "<html><head><title>   </title></head><body></body></html>";
        let record = extract(markup, URL).unwrap();
        assert_eq!(record.title, None);
    }

    #[test]
    fn test_location_from_testid_or_class() {
        let markup = page(r#"<div data-testid="marketplace_pdp_location"> Quezon City,  PH </div>"#);
        let record = extract(&markup, URL).unwrap();
        assert_eq!(record.location.as_deref(), Some("Quezon City,  PH"));

        let markup = page(r#"<span class="seller-location"><b>Makati</b> <i>Metro Manila</i></span>"#);
        let record = extract(&markup, URL).unwrap();
        assert_eq!(record.location.as_deref(), Some("Makati Metro Manila"));
    }

    #[test]
    fn test_missing_fields_are_none() {
        let record = extract("<html><body><p>Contact seller</p></body></html>", URL).unwrap();
        assert_eq!(record.price, None);
        assert_eq!(record.currency, None);
        assert_eq!(record.year, None);
        assert_eq!(record.mileage, None);
        assert_eq!(record.location, None);
        assert_eq!(record.title, None);
    }

    #[test]
    fn test_raw_snippet_is_char_bounded() {
        let markup = "₱".repeat(SNIPPET_CHARS + 100);
        let record = extract(&markup, URL).unwrap();
        assert_eq!(record.raw_snippet.chars().count(), SNIPPET_CHARS);
        assert_eq!(record.url, URL);
    }

    #[test]
    fn test_listing_id_from_item_segment() {
        assert_eq!(derive_listing_id(URL).unwrap(), "987654321");
        assert_eq!(
            derive_listing_id("https://example.com/item/abc?ref=1").unwrap(),
            "abc"
        );
    }

    #[test]
    fn test_listing_id_from_final_segment() {
        assert_eq!(
            derive_listing_id("https://example.com/listings/xyz-42?x=1").unwrap(),
            "xyz-42"
        );
    }

    #[test]
    fn test_missing_listing_id_is_an_error() {
        let result = extract("<html></html>", "https://example.com/marketplace/");
        assert!(matches!(result, Err(SweepError::MissingListingId { .. })));

        assert!(derive_listing_id("https://example.com/").is_err());
        assert!(derive_listing_id("not a url").is_err());
    }
}
