//! Idempotent listing ingestion
//!
//! Normalizes an [`ExtractedRecord`] and upserts it keyed by `listing_id`. Ingesting the same
//! record twice leaves one row whose audit timestamps alone differ.

use crate::crawler::ExtractedRecord;
use crate::storage::{ListingFields, Storage};
use crate::SweepError;

/// Normalizes `record` and upserts it into `store`
///
/// # Arguments
///
/// * `store` - Storage backend to write to
/// * `record` - The extracted listing
///
/// # Returns
///
/// * `Ok(String)` - The trimmed listing id that was written
/// * `Err(SweepError::MissingListingId)` - The listing id is blank
/// * `Err(SweepError::Storage)` - The upsert failed
pub fn ingest<S: Storage + ?Sized>(store: &mut S, record: &ExtractedRecord) -> crate::Result<String> {
    let listing_id = record.listing_id.trim();
    if listing_id.is_empty() {
        return Err(SweepError::MissingListingId {
            url: record.url.clone(),
        });
    }

    let fields = normalize(listing_id, record);
    let outcome = store.upsert_listing(listing_id, &fields)?;

    tracing::info!(
        "Ingested listing {} ({})",
        listing_id,
        if outcome.inserted { "new" } else { "updated" }
    );

    Ok(listing_id.to_string())
}

fn normalize(listing_id: &str, record: &ExtractedRecord) -> ListingFields {
    let price = match record.price {
        Some(price) if price.is_sign_negative() && !price.is_zero() => {
            tracing::warn!(
                "Discarding negative price {} for listing {}",
                price,
                listing_id
            );
            None
        }
        Some(price) => Some(price.normalize()),
        None => None,
    };

    ListingFields {
        title: non_blank(record.title.as_deref()),
        price,
        currency: non_blank(record.currency.as_deref()),
        year: record.year,
        mileage: record.mileage,
        location: non_blank(record.location.as_deref()),
        url: record.url.clone(),
        raw_snippet: record.raw_snippet.clone(),
    }
}

fn non_blank(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}
