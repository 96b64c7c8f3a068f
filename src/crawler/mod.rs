//! Crawler module for listing discovery and processing
//!
//! This module contains the scrape pipeline, including:
//! - Bounded retry with exponential backoff
//! - Rendered page fetching
//! - Scroll-driven listing discovery
//! - Field extraction and idempotent ingestion
//! - Overall run coordination

mod coordinator;
mod discovery;
mod extractor;
mod fetcher;
mod ingest;
mod retry;

#[cfg(test)]
mod testing;

pub use coordinator::{run_scrape, Coordinator, ItemFailure, RunSummary};
pub use discovery::{
    discover, DiscoveryOptions, DiscoveryOutcome, DiscoveryPhase, Termination, UrlSet,
};
pub use extractor::{derive_listing_id, extract, ExtractedRecord, SNIPPET_CHARS};
pub use fetcher::{fetch_page, navigate_with_retry, FetchOptions, RawPage};
pub use ingest::ingest;
pub use retry::{retry, retry_with_sleep, RetryPolicy, Retryable};
