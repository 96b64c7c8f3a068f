//! Plain-text rendering of stored listings for `--list` and `--show`

use crate::storage::{ListingPage, PersistedListing};
use std::fmt::Write;

/// One-line description of a listing
pub fn format_listing_row(listing: &PersistedListing) -> String {
    let price = match (&listing.currency, &listing.price) {
        (Some(currency), Some(price)) => format!("{} {}", currency, price),
        (None, Some(price)) => price.to_string(),
        _ => "-".to_string(),
    };

    format!(
        "{:<20} {:<14} {:<6} {:<40} {}",
        listing.listing_id,
        price,
        listing
            .year
            .map(|y| y.to_string())
            .unwrap_or_else(|| "-".to_string()),
        truncate(listing.title.as_deref().unwrap_or("-"), 40),
        listing.location.as_deref().unwrap_or("-")
    )
}

/// Multi-line detail view of a listing
pub fn format_listing_detail(listing: &PersistedListing) -> String {
    let mut out = String::new();
    let optional = |value: Option<String>| value.unwrap_or_else(|| "-".to_string());

    // Writing to a String cannot fail
    let _ = writeln!(out, "Listing {}", listing.listing_id);
    let _ = writeln!(out, "  Title:     {}", optional(listing.title.clone()));
    let _ = writeln!(
        out,
        "  Price:     {}",
        optional(listing.price.map(|p| p.to_string()))
    );
    let _ = writeln!(out, "  Currency:  {}", optional(listing.currency.clone()));
    let _ = writeln!(
        out,
        "  Year:      {}",
        optional(listing.year.map(|y| y.to_string()))
    );
    let _ = writeln!(
        out,
        "  Mileage:   {}",
        optional(listing.mileage.map(|m| format!("{} km", m)))
    );
    let _ = writeln!(out, "  Location:  {}", optional(listing.location.clone()));
    let _ = writeln!(out, "  URL:       {}", listing.url);
    let _ = writeln!(out, "  Created:   {}", listing.created_at);
    let _ = writeln!(out, "  Updated:   {}", listing.updated_at);
    let _ = writeln!(out, "  Last seen: {}", listing.last_seen_at);
    out
}

/// Prints one page of listings with a header and the total match count
pub fn print_listing_page(page: &ListingPage, skip: u64) {
    println!(
        "{:<20} {:<14} {:<6} {:<40} {}",
        "LISTING", "PRICE", "YEAR", "TITLE", "LOCATION"
    );
    for listing in &page.items {
        println!("{}", format_listing_row(listing));
    }

    let shown_to = skip + page.items.len() as u64;
    if page.items.is_empty() {
        println!("\nNo listings in range ({} matching)", page.total);
    } else {
        println!("\nShowing {}-{} of {}", skip + 1, shown_to, page.total);
    }
}

pub fn print_listing(listing: &PersistedListing) {
    print!("{}", format_listing_detail(listing));
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let mut cut: String = text.chars().take(max_chars.saturating_sub(3)).collect();
    cut.push_str("...");
    cut
}
