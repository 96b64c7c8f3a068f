//! Storage traits and error types
//!
//! This module defines the trait interface for storage backends and
//! associated error types.

use crate::storage::{
    FailureStage, ListingFields, ListingFilter, ListingPage, ListingUpdate, PersistedListing,
    RunCounts, RunRecord, RunStatus, StoredFailure, UpsertOutcome,
};
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Run not found: {0}")]
    RunNotFound(i64),

    #[error("Listing id must not be empty")]
    EmptyListingId,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Trait for storage backend implementations
///
/// This trait defines all database operations needed by the pipeline and the CLI.
/// Writes take `&mut self`; callers sharing a backend between tasks wrap it in a mutex.
pub trait Storage {
    // ===== Listings =====

    /// Inserts a listing or overwrites the existing row with the same `listing_id`
    ///
    /// # Arguments
    ///
    /// * `listing_id` - Stable marketplace identifier (the conflict key)
    /// * `fields` - Values to write; every column except `id` and `created_at` is replaced
    ///
    /// # Returns
    ///
    /// The row id and whether the row was newly created. `updated_at` and `last_seen_at`
    /// are set to the current time on every call, even when nothing else changed.
    fn upsert_listing(
        &mut self,
        listing_id: &str,
        fields: &ListingFields,
    ) -> StorageResult<UpsertOutcome>;

    /// Gets a listing by its marketplace identifier
    fn get_listing(&self, listing_id: &str) -> StorageResult<Option<PersistedListing>>;

    /// Lists listings matching `filter`, ordered by row id
    fn list_listings(
        &self,
        filter: &ListingFilter,
        skip: u64,
        limit: u64,
    ) -> StorageResult<ListingPage>;

    /// Applies a partial edit to an existing listing
    ///
    /// # Arguments
    ///
    /// * `listing_id` - Marketplace identifier of the row to edit
    /// * `update` - Only the `Some` fields are written; `updated_at` is always refreshed
    ///
    /// # Returns
    ///
    /// The edited row, or `None` if no listing has that identifier
    fn update_listing(
        &mut self,
        listing_id: &str,
        update: &ListingUpdate,
    ) -> StorageResult<Option<PersistedListing>>;

    /// Deletes a listing; returns false if it did not exist
    fn delete_listing(&mut self, listing_id: &str) -> StorageResult<bool>;

    /// Counts all stored listings
    fn count_listings(&self) -> StorageResult<u64>;

    // ===== Run Management =====

    /// Creates a new scrape run
    ///
    /// # Arguments
    ///
    /// * `config_hash` - Fingerprint of the effective configuration
    ///
    /// # Returns
    ///
    /// The ID of the newly created run
    fn create_run(&mut self, config_hash: &str) -> StorageResult<i64>;

    /// Marks a run finished with its final status and totals
    fn finish_run(&mut self, run_id: i64, status: RunStatus, counts: RunCounts)
        -> StorageResult<()>;

    /// Gets a run by ID
    fn get_run(&self, run_id: i64) -> StorageResult<RunRecord>;

    /// Gets the most recent runs, newest first
    fn recent_runs(&self, limit: u64) -> StorageResult<Vec<RunRecord>>;

    // ===== Failures =====

    /// Records a per-item failure for a run
    fn record_failure(
        &mut self,
        run_id: i64,
        url: &str,
        listing_id: Option<&str>,
        stage: FailureStage,
        error: &str,
    ) -> StorageResult<()>;

    /// Gets all failures recorded for a run in insertion order
    fn failures_for_run(&self, run_id: i64) -> StorageResult<Vec<StoredFailure>>;
}
