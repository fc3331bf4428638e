//! SQLite access to remote record state
//!
//! This module provides the concrete SQLite-based storage behind the
//! `IRecordStore` port. Callers normally go through [`StoreHandle`], which
//! serializes access; the repository itself is also usable directly and
//! implements the port for single-task callers.
//!
//! ## Storage Format
//!
//! - Timestamps are stored as RFC 3339 strings
//! - Metadata maps are stored as JSON objects
//! - Record status is stored as its lowercase name
//!
//! [`StoreHandle`]: crate::StoreHandle

use std::collections::HashSet;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use sqlx::{sqlite::SqliteRow, Row, Sqlite, SqlitePool, Transaction};

use drivesync_core::{
    domain::{Metadata, RecordKey, RecordStatus, RemoteFile, RemoteRecord},
    ports::IRecordStore,
};

use crate::CacheError;

/// SQLite-backed storage of remote records and attachments
#[derive(Clone)]
pub struct SqliteRecordRepository {
    pool: SqlitePool,
}

impl SqliteRecordRepository {
    /// Creates a new repository using the given connection pool
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

// ============================================================================
// Conversion helpers
// ============================================================================

/// Parse a DateTime<Utc> from an ISO 8601 string
fn parse_datetime(s: &str) -> Result<DateTime<Utc>, CacheError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            CacheError::SerializationError(format!("Failed to parse datetime '{}': {}", s, e))
        })
}

fn metadata_to_json(metadata: &Metadata) -> Result<String, CacheError> {
    serde_json::to_string(metadata)
        .map_err(|e| CacheError::SerializationError(format!("Failed to serialize metadata: {}", e)))
}

fn metadata_from_json(s: &str) -> Result<Metadata, CacheError> {
    serde_json::from_str(s)
        .map_err(|e| CacheError::SerializationError(format!("Invalid metadata JSON: {}", e)))
}

fn key_from_row(row: &SqliteRow) -> Result<RecordKey, CacheError> {
    let recorded_object_type: String = row.get("recorded_object_type");
    let recorded_object_identifier: String = row.get("recorded_object_identifier");
    RecordKey::new(recorded_object_type, recorded_object_identifier)
        .map_err(|e| CacheError::SerializationError(e.to_string()))
}

async fn insert_record(
    tx: &mut Transaction<'_, Sqlite>,
    record: &RemoteRecord,
) -> Result<(), CacheError> {
    let metadata = metadata_to_json(record.metadata())?;

    sqlx::query(
        "INSERT OR REPLACE INTO remote_records \
         (identifier, recorded_object_type, recorded_object_identifier, \
          version_identifier, version_date, metadata, status) \
         VALUES (?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(record.identifier())
    .bind(record.recorded_object_type())
    .bind(record.recorded_object_identifier())
    .bind(record.version_identifier())
    .bind(record.version_date().to_rfc3339())
    .bind(&metadata)
    .bind(record.status().name())
    .execute(&mut **tx)
    .await?;

    Ok(())
}

/// Upserts `records` within `tx`, returning the distinct rows they replaced
async fn upsert_records(
    tx: &mut Transaction<'_, Sqlite>,
    records: &[RemoteRecord],
) -> Result<Vec<RemoteRecord>, CacheError> {
    let mut written: HashSet<&str> = HashSet::new();
    let mut replaced = Vec::new();

    for record in records {
        let existing = sqlx::query(
            "SELECT * FROM remote_records WHERE identifier = ? \
             OR (recorded_object_type = ? AND recorded_object_identifier = ?)",
        )
        .bind(record.identifier())
        .bind(record.recorded_object_type())
        .bind(record.recorded_object_identifier())
        .fetch_all(&mut **tx)
        .await?;

        for row in &existing {
            let previous = remote_record_from_row(row)?;
            if !written.contains(previous.identifier())
                && !replaced
                    .iter()
                    .any(|r: &RemoteRecord| r.identifier() == previous.identifier())
            {
                replaced.push(previous);
            }
        }

        insert_record(tx, record).await?;
        written.insert(record.identifier());
    }

    Ok(replaced)
}

/// Deletes the rows with the given identifiers within `tx`
async fn remove_records(
    tx: &mut Transaction<'_, Sqlite>,
    identifiers: &[String],
) -> Result<u64, CacheError> {
    let mut deleted = 0;
    for identifier in identifiers {
        deleted += sqlx::query("DELETE FROM remote_records WHERE identifier = ?")
            .bind(identifier)
            .execute(&mut **tx)
            .await?
            .rows_affected();
    }
    Ok(deleted)
}

// ============================================================================
// Row mapping functions
// ============================================================================

fn remote_record_from_row(row: &SqliteRow) -> Result<RemoteRecord, CacheError> {
    let identifier: String = row.get("identifier");
    let version_identifier: String = row.get("version_identifier");
    let version_date: String = row.get("version_date");
    let metadata: String = row.get("metadata");
    let status: String = row.get("status");

    let status = RecordStatus::from_str(&status)
        .map_err(|e| CacheError::SerializationError(e.to_string()))?;

    RemoteRecord::new(
        identifier,
        version_identifier,
        parse_datetime(&version_date)?,
        key_from_row(row)?,
        metadata_from_json(&metadata)?,
        status,
    )
    .map_err(|e| CacheError::SerializationError(e.to_string()))
}

fn remote_file_from_row(row: &SqliteRow) -> Result<RemoteFile, CacheError> {
    let file_identifier: String = row.get("file_identifier");
    let remote_identifier: String = row.get("remote_identifier");
    let version_identifier: String = row.get("version_identifier");
    let size_bytes: i64 = row.get("size_bytes");
    let metadata: String = row.get("metadata");

    RemoteFile::new(
        file_identifier,
        remote_identifier,
        version_identifier,
        size_bytes.max(0) as u64,
        metadata_from_json(&metadata)?,
    )
    .map_err(|e| CacheError::SerializationError(e.to_string()))
}

// ============================================================================
// Record operations
// ============================================================================

impl SqliteRecordRepository {
    /// Upserts every record inside one transaction
    ///
    /// Returns the pre-existing rows the batch replaced: a row is replaced when
    /// it shares the remote identifier or the logical key of an incoming record.
    pub async fn save_records(
        &self,
        records: &[RemoteRecord],
    ) -> Result<Vec<RemoteRecord>, CacheError> {
        if records.is_empty() {
            return Ok(Vec::new());
        }

        let mut tx = self.pool.begin().await?;
        let replaced = upsert_records(&mut tx, records).await?;
        tx.commit().await?;

        tracing::trace!(
            count = records.len(),
            replaced = replaced.len(),
            "Saved remote records"
        );
        Ok(replaced)
    }

    /// Applies one delta inside a single transaction: removes `deleted`,
    /// then upserts `updated`
    pub async fn apply_changes(
        &self,
        updated: &[RemoteRecord],
        deleted: &[String],
    ) -> Result<(), CacheError> {
        if updated.is_empty() && deleted.is_empty() {
            return Ok(());
        }

        let mut tx = self.pool.begin().await?;
        let removed = remove_records(&mut tx, deleted).await?;
        upsert_records(&mut tx, updated).await?;
        tx.commit().await?;

        tracing::trace!(updated = updated.len(), removed, "Applied remote changes");
        Ok(())
    }

    /// Removes `identifiers` and re-inserts `restore` inside one transaction
    pub async fn revert_records(
        &self,
        identifiers: &[String],
        restore: &[RemoteRecord],
    ) -> Result<(), CacheError> {
        let mut tx = self.pool.begin().await?;

        remove_records(&mut tx, identifiers).await?;
        for record in restore {
            insert_record(&mut tx, record).await?;
        }

        tx.commit().await?;

        tracing::debug!(
            removed = identifiers.len(),
            restored = restore.len(),
            "Reverted remote records"
        );
        Ok(())
    }

    /// Deletes every record with one of the given identifiers, in one transaction
    pub async fn delete_records(&self, identifiers: &[String]) -> Result<u64, CacheError> {
        if identifiers.is_empty() {
            return Ok(0);
        }

        let mut tx = self.pool.begin().await?;
        let deleted = remove_records(&mut tx, identifiers).await?;
        tx.commit().await?;

        tracing::trace!(requested = identifiers.len(), deleted, "Deleted remote records");
        Ok(deleted)
    }

    pub async fn get_record(&self, key: &RecordKey) -> Result<Option<RemoteRecord>, CacheError> {
        let row = sqlx::query(
            "SELECT * FROM remote_records \
             WHERE recorded_object_type = ? AND recorded_object_identifier = ?",
        )
        .bind(key.recorded_object_type())
        .bind(key.recorded_object_identifier())
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(remote_record_from_row).transpose()
    }

    pub async fn get_record_by_identifier(
        &self,
        identifier: &str,
    ) -> Result<Option<RemoteRecord>, CacheError> {
        let row = sqlx::query("SELECT * FROM remote_records WHERE identifier = ?")
            .bind(identifier)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(remote_record_from_row).transpose()
    }

    pub async fn list_records(&self) -> Result<Vec<RemoteRecord>, CacheError> {
        let rows = sqlx::query(
            "SELECT * FROM remote_records \
             ORDER BY recorded_object_type ASC, recorded_object_identifier ASC",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(remote_record_from_row).collect()
    }

    pub async fn count_records(&self) -> Result<u64, CacheError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM remote_records")
            .fetch_one(&self.pool)
            .await?;
        Ok(count.max(0) as u64)
    }
}

// ============================================================================
// Attachment operations
// ============================================================================

impl SqliteRecordRepository {
    pub async fn save_file(&self, key: &RecordKey, file: &RemoteFile) -> Result<(), CacheError> {
        let metadata = metadata_to_json(file.metadata())?;

        sqlx::query(
            "INSERT OR REPLACE INTO remote_files \
             (remote_identifier, recorded_object_type, recorded_object_identifier, \
              file_identifier, version_identifier, size_bytes, metadata) \
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(file.remote_identifier())
        .bind(key.recorded_object_type())
        .bind(key.recorded_object_identifier())
        .bind(file.identifier())
        .bind(file.version_identifier())
        .bind(file.size() as i64)
        .bind(&metadata)
        .execute(&self.pool)
        .await?;

        tracing::trace!(record = %key, file_id = file.identifier(), "Saved remote file");
        Ok(())
    }

    pub async fn get_file(
        &self,
        key: &RecordKey,
        file_identifier: &str,
    ) -> Result<Option<RemoteFile>, CacheError> {
        let row = sqlx::query(
            "SELECT * FROM remote_files \
             WHERE recorded_object_type = ? AND recorded_object_identifier = ? \
             AND file_identifier = ?",
        )
        .bind(key.recorded_object_type())
        .bind(key.recorded_object_identifier())
        .bind(file_identifier)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(remote_file_from_row).transpose()
    }

    pub async fn delete_file(&self, remote_identifier: &str) -> Result<(), CacheError> {
        sqlx::query("DELETE FROM remote_files WHERE remote_identifier = ?")
            .bind(remote_identifier)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

// ============================================================================
// IRecordStore implementation
// ============================================================================

#[async_trait::async_trait]
impl IRecordStore for SqliteRecordRepository {
    async fn save_remote_records(
        &self,
        records: &[RemoteRecord],
    ) -> anyhow::Result<Vec<RemoteRecord>> {
        Ok(self.save_records(records).await?)
    }

    async fn revert_remote_records(
        &self,
        identifiers: &[String],
        restore: &[RemoteRecord],
    ) -> anyhow::Result<()> {
        Ok(self.revert_records(identifiers, restore).await?)
    }

    async fn delete_remote_records(&self, identifiers: &[String]) -> anyhow::Result<()> {
        self.delete_records(identifiers).await?;
        Ok(())
    }

    async fn apply_remote_changes(
        &self,
        updated: &[RemoteRecord],
        deleted: &[String],
    ) -> anyhow::Result<()> {
        Ok(self.apply_changes(updated, deleted).await?)
    }

    async fn get_remote_record(&self, key: &RecordKey) -> anyhow::Result<Option<RemoteRecord>> {
        Ok(self.get_record(key).await?)
    }

    async fn get_remote_record_by_identifier(
        &self,
        identifier: &str,
    ) -> anyhow::Result<Option<RemoteRecord>> {
        Ok(self.get_record_by_identifier(identifier).await?)
    }

    async fn list_remote_records(&self) -> anyhow::Result<Vec<RemoteRecord>> {
        Ok(self.list_records().await?)
    }

    async fn count_remote_records(&self) -> anyhow::Result<u64> {
        Ok(self.count_records().await?)
    }

    async fn save_remote_file(&self, key: &RecordKey, file: &RemoteFile) -> anyhow::Result<()> {
        Ok(self.save_file(key, file).await?)
    }

    async fn get_remote_file(
        &self,
        key: &RecordKey,
        file_identifier: &str,
    ) -> anyhow::Result<Option<RemoteFile>> {
        Ok(self.get_file(key, file_identifier).await?)
    }

    async fn delete_remote_file(&self, remote_identifier: &str) -> anyhow::Result<()> {
        Ok(self.delete_file(remote_identifier).await?)
    }
}
