//! Statistics generation from the listings database
//!
//! This module provides functionality for extracting and displaying
//! listing and run statistics from the storage layer.

use crate::storage::{RunRecord, RunStatus, Storage};
use crate::SweepError;

/// How many runs `--stats` shows
pub const RECENT_RUN_LIMIT: u64 = 10;

/// Database statistics summary
#[derive(Debug, Clone)]
pub struct ListingStatistics {
    /// Total number of stored listings
    pub total_listings: u64,

    /// Most recent runs, newest first
    pub recent_runs: Vec<RunRecord>,

    /// Failures recorded by the most recent run
    pub last_run_failures: u64,
}

impl ListingStatistics {
    /// Share of discovered URLs that were ingested across `recent_runs`
    pub fn ingest_rate(&self) -> Option<f64> {
        let (discovered, ingested) = self
            .recent_runs
            .iter()
            .filter(|run| run.status == RunStatus::Completed)
            .fold((0u64, 0u64), |(d, i), run| {
                (d + run.counts.discovered, i + run.counts.ingested)
            });

        if discovered == 0 {
            None
        } else {
            Some(ingested as f64 / discovered as f64 * 100.0)
        }
    }
}

/// Loads statistics from storage
///
/// # Arguments
///
/// * `storage` - The storage backend to query
///
/// # Returns
///
/// * `Ok(ListingStatistics)` - Successfully loaded statistics
/// * `Err(SweepError)` - Failed to query statistics
pub fn load_statistics(storage: &dyn Storage) -> Result<ListingStatistics, SweepError> {
    let total_listings = storage.count_listings()?;
    let recent_runs = storage.recent_runs(RECENT_RUN_LIMIT)?;

    let last_run_failures = match recent_runs.first() {
        Some(run) => storage.failures_for_run(run.id)?.len() as u64,
        None => 0,
    };

    Ok(ListingStatistics {
        total_listings,
        recent_runs,
        last_run_failures,
    })
}

/// Prints statistics to stdout in a formatted manner
///
/// # Arguments
///
/// * `stats` - The statistics to display
pub fn print_statistics(stats: &ListingStatistics) {
    println!("=== Listing Statistics ===\n");

    println!("Overview:");
    println!("  Stored listings: {}", stats.total_listings);
    println!("  Runs shown: {}", stats.recent_runs.len());
    println!();

    if stats.recent_runs.is_empty() {
        println!("No scrape runs recorded yet.");
        return;
    }

    println!("Recent Runs:");
    for run in &stats.recent_runs {
        println!(
            "  #{} {} [{}] discovered {}, ingested {}, failed {}",
            run.id,
            run.started_at,
            run.status.to_db_string(),
            run.counts.discovered,
            run.counts.ingested,
            run.counts.failed
        );
    }
    println!();

    println!(
        "Failures in latest run: {}",
        stats.last_run_failures
    );

    match stats.ingest_rate() {
        Some(rate) => println!("Ingest Rate: {:.1}% of discovered URLs", rate),
        None => println!("Ingest Rate: n/a"),
    }
}
