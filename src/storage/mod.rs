//! Storage module for persisting scraped listings
//!
//! This module handles all database operations for the pipeline, including:
//! - SQLite database initialization and schema management
//! - Idempotent listing upserts keyed by `listing_id`
//! - Filtered listing queries and deletion
//! - Run bookkeeping and per-item failure records

mod schema;
mod sqlite;
mod traits;

pub use sqlite::SqliteStorage;
pub use traits::{Storage, StorageError, StorageResult};

use rust_decimal::Decimal;
use std::path::Path;

/// Initializes or opens a storage database
///
/// # Arguments
///
/// * `path` - Path to the SQLite database file
///
/// # Returns
///
/// * `Ok(SqliteStorage)` - Successfully initialized storage
/// * `Err(StorageError)` - Failed to initialize storage
pub fn open_storage(path: &Path) -> StorageResult<SqliteStorage> {
    SqliteStorage::new(path)
}

/// Everything an upsert writes besides the key and the audit timestamps
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ListingFields {
    pub title: Option<String>,
    pub price: Option<Decimal>,
    pub currency: Option<String>,
    pub year: Option<i32>,
    pub mileage: Option<i64>,
    pub location: Option<String>,
    pub url: String,
    pub raw_snippet: String,
}

/// Fields changed by a manual listing edit; `None` leaves the column as it is
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ListingUpdate {
    pub title: Option<String>,
    pub price: Option<Decimal>,
    pub year: Option<i32>,
    pub mileage: Option<i64>,
    pub location: Option<String>,
}

impl ListingUpdate {
    /// True when no field would be written
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.price.is_none()
            && self.year.is_none()
            && self.mileage.is_none()
            && self.location.is_none()
    }
}

/// A listing row as stored in the database
#[derive(Debug, Clone, PartialEq)]
pub struct PersistedListing {
    pub id: i64,
    pub listing_id: String,
    pub title: Option<String>,
    pub price: Option<Decimal>,
    pub currency: Option<String>,
    pub year: Option<i32>,
    pub mileage: Option<i64>,
    pub location: Option<String>,
    pub url: String,
    pub raw_snippet: String,
    pub created_at: String,
    pub updated_at: String,
    pub last_seen_at: String,
}

/// Result of a single upsert
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpsertOutcome {
    pub id: i64,
    /// True when the row did not exist before this upsert
    pub inserted: bool,
}

/// Optional bounds applied by `list_listings`; `None` means unbounded
#[derive(Debug, Clone, Default)]
pub struct ListingFilter {
    pub min_price: Option<Decimal>,
    pub max_price: Option<Decimal>,
    pub min_year: Option<i32>,
    pub max_year: Option<i32>,
    /// Case-insensitive substring of the location
    pub location: Option<String>,
}

/// One page of a filtered listing query
#[derive(Debug, Clone)]
pub struct ListingPage {
    /// Rows matching the filter, ignoring skip/limit
    pub total: u64,
    pub items: Vec<PersistedListing>,
}

/// Represents a scrape run
#[derive(Debug, Clone)]
pub struct RunRecord {
    pub id: i64,
    pub started_at: String,
    pub finished_at: Option<String>,
    pub config_hash: String,
    pub status: RunStatus,
    pub counts: RunCounts,
}

/// Per-run totals written when a run finishes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunCounts {
    pub discovered: u64,
    pub ingested: u64,
    pub failed: u64,
}

/// Status of a scrape run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Running,
    Completed,
    Failed,
}

impl RunStatus {
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "running" => Some(Self::Running),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

/// Pipeline stage at which an item failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureStage {
    Fetch,
    Extract,
    Ingest,
    /// Discovered but never picked up by a worker
    Unprocessed,
}

impl FailureStage {
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Fetch => "fetch",
            Self::Extract => "extract",
            Self::Ingest => "ingest",
            Self::Unprocessed => "unprocessed",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "fetch" => Some(Self::Fetch),
            "extract" => Some(Self::Extract),
            "ingest" => Some(Self::Ingest),
            "unprocessed" => Some(Self::Unprocessed),
            _ => None,
        }
    }
}

impl std::fmt::Display for FailureStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.to_db_string())
    }
}

/// A per-item failure as recorded in `item_failures`
#[derive(Debug, Clone)]
pub struct StoredFailure {
    pub id: i64,
    pub run_id: i64,
    pub url: String,
    pub listing_id: Option<String>,
    pub stage: FailureStage,
    pub error: String,
    pub failed_at: String,
}
