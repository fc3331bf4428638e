//! Record store port (driven/secondary port)
//!
//! The local store holds the last observed remote state of every record and
//! attachment. Synchronizers apply remote changes to it and revert them when
//! an operation fails or is cancelled.
//!
//! ## Design Notes
//!
//! - Uses `anyhow::Result` because storage errors are adapter-specific
//!   (SQLite, in-memory); the drive adapter maps them to `SyncError::Store`.
//! - Multi-record writes are applied atomically: either every record in the
//!   slice is written or none is.
//! - Implementations must serialize their own access; callers may invoke the
//!   port from any task.

use async_trait::async_trait;

use crate::domain::{RecordKey, RemoteFile, RemoteRecord};

/// Persistence of remote record and attachment state
#[async_trait]
pub trait IRecordStore: Send + Sync {
    // --- Records ---

    /// Inserts or replaces the given records atomically
    ///
    /// Returns the previously stored records the batch overwrote (same remote
    /// identifier or same key), so the write can be compensated later with
    /// [`revert_remote_records`](Self::revert_remote_records).
    async fn save_remote_records(&self, records: &[RemoteRecord])
        -> anyhow::Result<Vec<RemoteRecord>>;

    /// Undoes an earlier save atomically: removes `identifiers`, then writes
    /// back the `restore` records it had replaced
    async fn revert_remote_records(
        &self,
        identifiers: &[String],
        restore: &[RemoteRecord],
    ) -> anyhow::Result<()>;

    /// Removes the records with the given remote identifiers
    ///
    /// Unknown identifiers are ignored.
    async fn delete_remote_records(&self, identifiers: &[String]) -> anyhow::Result<()>;

    /// Applies a batch of remote changes atomically: removes `deleted`, then
    /// inserts or replaces `updated`
    async fn apply_remote_changes(
        &self,
        updated: &[RemoteRecord],
        deleted: &[String],
    ) -> anyhow::Result<()>;

    /// Retrieves a record by its logical key
    async fn get_remote_record(&self, key: &RecordKey) -> anyhow::Result<Option<RemoteRecord>>;

    /// Retrieves a record by its remote identifier
    async fn get_remote_record_by_identifier(
        &self,
        identifier: &str,
    ) -> anyhow::Result<Option<RemoteRecord>>;

    /// Lists every stored record, ordered by key
    async fn list_remote_records(&self) -> anyhow::Result<Vec<RemoteRecord>>;

    /// Number of stored records
    async fn count_remote_records(&self) -> anyhow::Result<u64>;

    // --- Attachments ---

    /// Inserts or replaces the attachment `file` owned by `key`
    async fn save_remote_file(&self, key: &RecordKey, file: &RemoteFile) -> anyhow::Result<()>;

    /// Retrieves the attachment `file_identifier` owned by `key`
    async fn get_remote_file(
        &self,
        key: &RecordKey,
        file_identifier: &str,
    ) -> anyhow::Result<Option<RemoteFile>>;

    /// Removes the attachment stored under the given remote identifier
    async fn delete_remote_file(&self, remote_identifier: &str) -> anyhow::Result<()>;
}
