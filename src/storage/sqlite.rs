//! SQLite storage implementation
//!
//! This module provides a SQLite-based implementation of the Storage trait.

use crate::storage::schema::initialize_schema;
use crate::storage::traits::{Storage, StorageError, StorageResult};
use crate::storage::{
    FailureStage, ListingFields, ListingFilter, ListingPage, ListingUpdate, PersistedListing,
    RunCounts, RunRecord, RunStatus, StoredFailure, UpsertOutcome,
};
use chrono::{SecondsFormat, Utc};
use rusqlite::types::{Type, Value};
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};
use rust_decimal::Decimal;
use std::path::Path;
use std::str::FromStr;

const LISTING_COLUMNS: &str = "id, listing_id, title, price, currency, year, mileage, location,
     url, raw_snippet, created_at, updated_at, last_seen_at";

const RUN_COLUMNS: &str =
    "id, started_at, finished_at, config_hash, status, discovered, ingested, failed";

/// SQLite storage backend
pub struct SqliteStorage {
    conn: Connection,
}

impl SqliteStorage {
    /// Creates a new SqliteStorage instance
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the SQLite database file
    ///
    /// # Returns
    ///
    /// * `Ok(SqliteStorage)` - Successfully opened/created database
    /// * `Err(StorageError)` - Failed to open database
    pub fn new(path: &Path) -> StorageResult<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path)?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA foreign_keys = ON;
            PRAGMA temp_store = MEMORY;
        ",
        )?;

        initialize_schema(&conn)?;

        Ok(Self { conn })
    }

    /// Creates an in-memory database (for testing)
    #[cfg(test)]
    pub fn new_in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        initialize_schema(&conn)?;
        Ok(Self { conn })
    }

    /// Upserts a listing with an explicit write timestamp
    ///
    /// The existence check and the write share one transaction, so `inserted` does not
    /// depend on the clock.
    fn upsert_listing_at(
        &mut self,
        listing_id: &str,
        fields: &ListingFields,
        now: &str,
    ) -> StorageResult<UpsertOutcome> {
        if listing_id.is_empty() {
            return Err(StorageError::EmptyListingId);
        }

        let tx = self.conn.transaction()?;

        let existing: Option<i64> = tx
            .query_row(
                "SELECT id FROM listings WHERE listing_id = ?1",
                params![listing_id],
                |row| row.get(0),
            )
            .optional()?;

        let id: i64 = tx.query_row(
            "INSERT INTO listings (listing_id, title, price, currency, year, mileage, location,
                                   url, raw_snippet, created_at, updated_at, last_seen_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?10, ?10)
             ON CONFLICT(listing_id) DO UPDATE SET
                title = excluded.title,
                price = excluded.price,
                currency = excluded.currency,
                year = excluded.year,
                mileage = excluded.mileage,
                location = excluded.location,
                url = excluded.url,
                raw_snippet = excluded.raw_snippet,
                updated_at = excluded.updated_at,
                last_seen_at = excluded.last_seen_at
             RETURNING id",
            params![
                listing_id,
                fields.title,
                fields.price.map(|p| p.to_string()),
                fields.currency,
                fields.year,
                fields.mileage,
                fields.location,
                fields.url,
                fields.raw_snippet,
                now,
            ],
            |row| row.get(0),
        )?;

        tx.commit()?;

        Ok(UpsertOutcome {
            id,
            inserted: existing.is_none(),
        })
    }

    /// Raw connection, for tests that need to shape the database directly
    #[cfg(test)]
    pub(crate) fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Closes the connection, surfacing any error SQLite reports on close
    pub fn close(self) -> StorageResult<()> {
        self.conn.close().map_err(|(_, e)| StorageError::Sqlite(e))
    }
}

/// Current time as UTC RFC 3339 with microseconds
fn now_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn listing_from_row(row: &Row<'_>) -> rusqlite::Result<PersistedListing> {
    let price: Option<String> = row.get(3)?;
    let price = price
        .map(|text| {
            Decimal::from_str(&text)
                .map_err(|e| rusqlite::Error::FromSqlConversionFailure(3, Type::Text, Box::new(e)))
        })
        .transpose()?;

    Ok(PersistedListing {
        id: row.get(0)?,
        listing_id: row.get(1)?,
        title: row.get(2)?,
        price,
        currency: row.get(4)?,
        year: row.get(5)?,
        mileage: row.get(6)?,
        location: row.get(7)?,
        url: row.get(8)?,
        raw_snippet: row.get(9)?,
        created_at: row.get(10)?,
        updated_at: row.get(11)?,
        last_seen_at: row.get(12)?,
    })
}

fn run_from_row(row: &Row<'_>) -> rusqlite::Result<RunRecord> {
    Ok(RunRecord {
        id: row.get(0)?,
        started_at: row.get(1)?,
        finished_at: row.get(2)?,
        config_hash: row.get(3)?,
        status: RunStatus::from_db_string(&row.get::<_, String>(4)?)
            .unwrap_or(RunStatus::Running),
        counts: RunCounts {
            discovered: row.get::<_, i64>(5)? as u64,
            ingested: row.get::<_, i64>(6)? as u64,
            failed: row.get::<_, i64>(7)? as u64,
        },
    })
}

/// Escapes LIKE wildcards so user input matches literally
fn escape_like(input: &str) -> String {
    let mut escaped = String::with_capacity(input.len());
    for c in input.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

fn to_sql_int(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

impl Storage for SqliteStorage {
    // ===== Listings =====

    fn upsert_listing(
        &mut self,
        listing_id: &str,
        fields: &ListingFields,
    ) -> StorageResult<UpsertOutcome> {
        self.upsert_listing_at(listing_id, fields, &now_timestamp())
    }

    fn get_listing(&self, listing_id: &str) -> StorageResult<Option<PersistedListing>> {
        let listing = self
            .conn
            .query_row(
                &format!(
                    "SELECT {} FROM listings WHERE listing_id = ?1",
                    LISTING_COLUMNS
                ),
                params![listing_id],
                listing_from_row,
            )
            .optional()?;

        Ok(listing)
    }

    fn list_listings(
        &self,
        filter: &ListingFilter,
        skip: u64,
        limit: u64,
    ) -> StorageResult<ListingPage> {
        let mut conditions: Vec<&str> = Vec::new();
        let mut values: Vec<Value> = Vec::new();

        if let Some(min_price) = filter.min_price {
            conditions.push("price IS NOT NULL AND CAST(price AS REAL) >= CAST(? AS REAL)");
            values.push(Value::Text(min_price.to_string()));
        }
        if let Some(max_price) = filter.max_price {
            conditions.push("price IS NOT NULL AND CAST(price AS REAL) <= CAST(? AS REAL)");
            values.push(Value::Text(max_price.to_string()));
        }
        if let Some(min_year) = filter.min_year {
            conditions.push("year >= ?");
            values.push(Value::Integer(min_year.into()));
        }
        if let Some(max_year) = filter.max_year {
            conditions.push("year <= ?");
            values.push(Value::Integer(max_year.into()));
        }
        if let Some(location) = filter.location.as_deref().filter(|l| !l.is_empty()) {
            conditions.push("location LIKE ? ESCAPE '\\'");
            values.push(Value::Text(format!("%{}%", escape_like(location))));
        }

        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!(
                " WHERE {}",
                conditions
                    .iter()
                    .map(|c| format!("({})", c))
                    .collect::<Vec<_>>()
                    .join(" AND ")
            )
        };

        let total: i64 = self.conn.query_row(
            &format!("SELECT COUNT(*) FROM listings{}", where_clause),
            params_from_iter(values.iter()),
            |row| row.get(0),
        )?;

        values.push(Value::Integer(to_sql_int(limit)));
        values.push(Value::Integer(to_sql_int(skip)));

        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM listings{} ORDER BY id LIMIT ? OFFSET ?",
            LISTING_COLUMNS, where_clause
        ))?;

        let items = stmt
            .query_map(params_from_iter(values.iter()), listing_from_row)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(ListingPage {
            total: total as u64,
            items,
        })
    }

    fn update_listing(
        &mut self,
        listing_id: &str,
        update: &ListingUpdate,
    ) -> StorageResult<Option<PersistedListing>> {
        let mut assignments: Vec<&str> = Vec::new();
        let mut values: Vec<Value> = Vec::new();

        if let Some(title) = &update.title {
            assignments.push("title = ?");
            values.push(Value::Text(title.clone()));
        }
        if let Some(price) = update.price {
            assignments.push("price = ?");
            values.push(Value::Text(price.normalize().to_string()));
        }
        if let Some(year) = update.year {
            assignments.push("year = ?");
            values.push(Value::Integer(year.into()));
        }
        if let Some(mileage) = update.mileage {
            assignments.push("mileage = ?");
            values.push(Value::Integer(mileage));
        }
        if let Some(location) = &update.location {
            assignments.push("location = ?");
            values.push(Value::Text(location.clone()));
        }

        assignments.push("updated_at = ?");
        values.push(Value::Text(now_timestamp()));
        values.push(Value::Text(listing_id.to_string()));

        let affected = self.conn.execute(
            &format!(
                "UPDATE listings SET {} WHERE listing_id = ?",
                assignments.join(", ")
            ),
            params_from_iter(values.iter()),
        )?;

        if affected == 0 {
            return Ok(None);
        }
        self.get_listing(listing_id)
    }

    fn delete_listing(&mut self, listing_id: &str) -> StorageResult<bool> {
        let affected = self.conn.execute(
            "DELETE FROM listings WHERE listing_id = ?1",
            params![listing_id],
        )?;
        Ok(affected > 0)
    }

    fn count_listings(&self) -> StorageResult<u64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM listings", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    // ===== Run Management =====

    fn create_run(&mut self, config_hash: &str) -> StorageResult<i64> {
        let now = now_timestamp();
        self.conn.execute(
            "INSERT INTO runs (started_at, config_hash, status) VALUES (?1, ?2, ?3)",
            params![now, config_hash, RunStatus::Running.to_db_string()],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    fn finish_run(
        &mut self,
        run_id: i64,
        status: RunStatus,
        counts: RunCounts,
    ) -> StorageResult<()> {
        let now = now_timestamp();
        let affected = self.conn.execute(
            "UPDATE runs SET status = ?1, finished_at = ?2, discovered = ?3, ingested = ?4, failed = ?5
             WHERE id = ?6",
            params![
                status.to_db_string(),
                now,
                to_sql_int(counts.discovered),
                to_sql_int(counts.ingested),
                to_sql_int(counts.failed),
                run_id
            ],
        )?;

        if affected == 0 {
            return Err(StorageError::RunNotFound(run_id));
        }
        Ok(())
    }

    fn get_run(&self, run_id: i64) -> StorageResult<RunRecord> {
        self.conn
            .query_row(
                &format!("SELECT {} FROM runs WHERE id = ?1", RUN_COLUMNS),
                params![run_id],
                run_from_row,
            )
            .optional()?
            .ok_or(StorageError::RunNotFound(run_id))
    }

    fn recent_runs(&self, limit: u64) -> StorageResult<Vec<RunRecord>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM runs ORDER BY id DESC LIMIT ?1",
            RUN_COLUMNS
        ))?;

        let runs = stmt
            .query_map(params![to_sql_int(limit)], run_from_row)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(runs)
    }

    // ===== Failures =====

    fn record_failure(
        &mut self,
        run_id: i64,
        url: &str,
        listing_id: Option<&str>,
        stage: FailureStage,
        error: &str,
    ) -> StorageResult<()> {
        self.conn.execute(
            "INSERT INTO item_failures (run_id, url, listing_id, stage, error, failed_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                run_id,
                url,
                listing_id,
                stage.to_db_string(),
                error,
                now_timestamp()
            ],
        )?;
        Ok(())
    }

    fn failures_for_run(&self, run_id: i64) -> StorageResult<Vec<StoredFailure>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, run_id, url, listing_id, stage, error, failed_at
             FROM item_failures WHERE run_id = ?1 ORDER BY id",
        )?;

        let failures = stmt
            .query_map(params![run_id], |row| {
                let stage: String = row.get(4)?;
                Ok(StoredFailure {
                    id: row.get(0)?,
                    run_id: row.get(1)?,
                    url: row.get(2)?,
                    listing_id: row.get(3)?,
                    stage: FailureStage::from_db_string(&stage).ok_or_else(|| {
                        rusqlite::Error::FromSqlConversionFailure(
                            4,
                            Type::Text,
                            format!("unknown failure stage '{}'", stage).into(),
                        )
                    })?,
                    error: row.get(5)?,
                    failed_at: row.get(6)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(failures)
    }
}
