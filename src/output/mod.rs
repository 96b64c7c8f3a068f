//! Output module for run summaries and database reports
//!
//! This module handles:
//! - Printing the summary of a finished scrape run
//! - Listing and showing stored listings
//! - Recording listing and run statistics

mod listings;
pub mod stats;
mod summary;

pub use listings::{format_listing_detail, format_listing_row, print_listing, print_listing_page};
pub use stats::{load_statistics, print_statistics, ListingStatistics};
pub use summary::{format_run_summary, print_run_summary};
