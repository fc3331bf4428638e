//! Store operation serialization.
//!
//! Provides `StoreSerializer`, the store's serialized execution context. Every
//! read and write from the synchronizers is queued to one task and applied in
//! arrival order, so concurrent bootstrap legs, delta runs and rollbacks never
//! interleave inside SQLite.

use drivesync_core::{
    config::StoreConfig,
    domain::{RecordKey, RemoteFile, RemoteRecord},
    ports::IRecordStore,
};
use tokio::sync::{mpsc, oneshot};

use crate::{pool::DatabasePool, repository::SqliteRecordRepository, CacheError};

/// Result type for store operations
pub type Result<T> = std::result::Result<T, CacheError>;

// ============================================================================
// StoreOp enum
// ============================================================================

/// Operations that can be serialized through the StoreSerializer
///
/// Each variant carries the data needed for the operation plus a oneshot
/// sender for returning the result to the caller.
#[derive(Debug)]
pub enum StoreOp {
    /// Upsert a batch of records atomically; replies with the rows replaced
    SaveRecords {
        records: Vec<RemoteRecord>,
        reply: oneshot::Sender<Result<Vec<RemoteRecord>>>,
    },

    /// Compensate an earlier SaveRecords atomically
    RevertRecords {
        identifiers: Vec<String>,
        restore: Vec<RemoteRecord>,
        reply: oneshot::Sender<Result<()>>,
    },

    /// Delete a batch of records atomically; replies with the number removed
    DeleteRecords {
        identifiers: Vec<String>,
        reply: oneshot::Sender<Result<u64>>,
    },

    /// Apply one delta (deletions then upserts) atomically
    ApplyChanges {
        updated: Vec<RemoteRecord>,
        deleted: Vec<String>,
        reply: oneshot::Sender<Result<()>>,
    },

    GetRecord {
        key: RecordKey,
        reply: oneshot::Sender<Result<Option<RemoteRecord>>>,
    },

    GetRecordByIdentifier {
        identifier: String,
        reply: oneshot::Sender<Result<Option<RemoteRecord>>>,
    },

    ListRecords {
        reply: oneshot::Sender<Result<Vec<RemoteRecord>>>,
    },

    CountRecords {
        reply: oneshot::Sender<Result<u64>>,
    },

    SaveFile {
        key: RecordKey,
        file: Box<RemoteFile>,
        reply: oneshot::Sender<Result<()>>,
    },

    GetFile {
        key: RecordKey,
        file_identifier: String,
        reply: oneshot::Sender<Result<Option<RemoteFile>>>,
    },

    DeleteFile {
        remote_identifier: String,
        reply: oneshot::Sender<Result<()>>,
    },
}

// ============================================================================
// StoreHandle
// ============================================================================

/// Handle for sending operations to the StoreSerializer
///
/// This handle can be cloned and shared across multiple tasks.
/// All operations are processed sequentially by the StoreSerializer task.
#[derive(Clone)]
pub struct StoreHandle {
    tx: mpsc::Sender<StoreOp>,
}

impl StoreHandle {
    /// Queues one operation and waits for its reply
    async fn request<T>(&self, op: impl FnOnce(oneshot::Sender<Result<T>>) -> StoreOp) -> Result<T> {
        let (tx, rx) = oneshot::channel();

        self.tx.send(op(tx)).await.map_err(|_| {
            CacheError::Unavailable("StoreSerializer task has stopped".to_string())
        })?;

        rx.await
            .map_err(|_| CacheError::Unavailable("StoreSerializer response lost".to_string()))?
    }

    pub async fn save_records(&self, records: Vec<RemoteRecord>) -> Result<Vec<RemoteRecord>> {
        self.request(|reply| StoreOp::SaveRecords { records, reply })
            .await
    }

    pub async fn revert_records(
        &self,
        identifiers: Vec<String>,
        restore: Vec<RemoteRecord>,
    ) -> Result<()> {
        self.request(|reply| StoreOp::RevertRecords {
            identifiers,
            restore,
            reply,
        })
        .await
    }

    pub async fn delete_records(&self, identifiers: Vec<String>) -> Result<u64> {
        self.request(|reply| StoreOp::DeleteRecords { identifiers, reply })
            .await
    }

    pub async fn apply_changes(&self, updated: Vec<RemoteRecord>, deleted: Vec<String>) -> Result<()> {
        self.request(|reply| StoreOp::ApplyChanges {
            updated,
            deleted,
            reply,
        })
        .await
    }

    pub async fn get_record(&self, key: RecordKey) -> Result<Option<RemoteRecord>> {
        self.request(|reply| StoreOp::GetRecord { key, reply }).await
    }

    pub async fn get_record_by_identifier(&self, identifier: String) -> Result<Option<RemoteRecord>> {
        self.request(|reply| StoreOp::GetRecordByIdentifier { identifier, reply })
            .await
    }

    pub async fn list_records(&self) -> Result<Vec<RemoteRecord>> {
        self.request(|reply| StoreOp::ListRecords { reply }).await
    }

    pub async fn count_records(&self) -> Result<u64> {
        self.request(|reply| StoreOp::CountRecords { reply }).await
    }

    pub async fn save_file(&self, key: RecordKey, file: RemoteFile) -> Result<()> {
        self.request(|reply| StoreOp::SaveFile {
            key,
            file: Box::new(file),
            reply,
        })
        .await
    }

    pub async fn get_file(&self, key: RecordKey, file_identifier: String) -> Result<Option<RemoteFile>> {
        self.request(|reply| StoreOp::GetFile {
            key,
            file_identifier,
            reply,
        })
        .await
    }

    pub async fn delete_file(&self, remote_identifier: String) -> Result<()> {
        self.request(|reply| StoreOp::DeleteFile {
            remote_identifier,
            reply,
        })
        .await
    }
}

#[async_trait::async_trait]
impl IRecordStore for StoreHandle {
    async fn save_remote_records(
        &self,
        records: &[RemoteRecord],
    ) -> anyhow::Result<Vec<RemoteRecord>> {
        Ok(self.save_records(records.to_vec()).await?)
    }

    async fn revert_remote_records(
        &self,
        identifiers: &[String],
        restore: &[RemoteRecord],
    ) -> anyhow::Result<()> {
        Ok(self
            .revert_records(identifiers.to_vec(), restore.to_vec())
            .await?)
    }

    async fn delete_remote_records(&self, identifiers: &[String]) -> anyhow::Result<()> {
        self.delete_records(identifiers.to_vec()).await?;
        Ok(())
    }

    async fn apply_remote_changes(
        &self,
        updated: &[RemoteRecord],
        deleted: &[String],
    ) -> anyhow::Result<()> {
        Ok(self.apply_changes(updated.to_vec(), deleted.to_vec()).await?)
    }

    async fn get_remote_record(&self, key: &RecordKey) -> anyhow::Result<Option<RemoteRecord>> {
        Ok(self.get_record(key.clone()).await?)
    }

    async fn get_remote_record_by_identifier(
        &self,
        identifier: &str,
    ) -> anyhow::Result<Option<RemoteRecord>> {
        Ok(self.get_record_by_identifier(identifier.to_string()).await?)
    }

    async fn list_remote_records(&self) -> anyhow::Result<Vec<RemoteRecord>> {
        Ok(self.list_records().await?)
    }

    async fn count_remote_records(&self) -> anyhow::Result<u64> {
        Ok(self.count_records().await?)
    }

    async fn save_remote_file(&self, key: &RecordKey, file: &RemoteFile) -> anyhow::Result<()> {
        Ok(self.save_file(key.clone(), file.clone()).await?)
    }

    async fn get_remote_file(
        &self,
        key: &RecordKey,
        file_identifier: &str,
    ) -> anyhow::Result<Option<RemoteFile>> {
        Ok(self.get_file(key.clone(), file_identifier.to_string()).await?)
    }

    async fn delete_remote_file(&self, remote_identifier: &str) -> anyhow::Result<()> {
        Ok(self.delete_file(remote_identifier.to_string()).await?)
    }
}

// ============================================================================
// StoreSerializer
// ============================================================================

/// Applies store operations one at a time, in arrival order
///
/// ```text
/// ┌──────────────────┐     StoreOp     ┌──────────────────┐
/// │ bootstrap legs   │ ──────────────► │ StoreSerializer  │
/// │ delta / rollback │                 │      task        │
/// └──────────────────┘                 └──────────────────┘
///          ▲                                    │
///          │       Result via oneshot           ▼
///          └─────────────────────────── SqliteRecordRepository
/// ```
pub struct StoreSerializer {
    rx: mpsc::Receiver<StoreOp>,
    repository: SqliteRecordRepository,
}

impl StoreSerializer {
    /// Creates a new StoreSerializer with the given database pool
    ///
    /// Returns the serializer (to be spawned with [`run`](Self::run)) and a
    /// handle for queuing operations. `queue_depth` bounds the number of
    /// operations waiting in the channel.
    pub fn new(pool: DatabasePool, queue_depth: usize) -> (Self, StoreHandle) {
        let (tx, rx) = mpsc::channel(queue_depth.max(1));

        let repository = SqliteRecordRepository::new(pool.pool().clone());

        (Self { rx, repository }, StoreHandle { tx })
    }

    /// Creates the serializer, spawns it on the current runtime and returns its handle
    pub fn spawn(pool: DatabasePool, queue_depth: usize) -> StoreHandle {
        let (serializer, handle) = Self::new(pool, queue_depth);
        tokio::spawn(serializer.run());
        handle
    }

    /// Opens the configured database and spawns its serializer
    ///
    /// # Errors
    ///
    /// Returns the pool's error if the database cannot be opened or migrated.
    pub async fn open(config: &StoreConfig) -> Result<StoreHandle> {
        let pool = DatabasePool::new(&config.database_path).await?;
        tracing::info!(
            path = %config.database_path.display(),
            queue_depth = config.queue_depth,
            "Opened record store"
        );
        Ok(Self::spawn(pool, config.queue_depth))
    }

    /// Runs the serializer loop until every handle is dropped
    ///
    /// A failing operation reports its error to its own caller and does not
    /// stop the loop.
    pub async fn run(mut self) {
        tracing::info!("StoreSerializer task started");

        while let Some(op) = self.rx.recv().await {
            self.process_operation(op).await;
        }

        tracing::info!("StoreSerializer task stopped (all handles dropped)");
    }

    async fn process_operation(&self, op: StoreOp) {
        // A dropped reply receiver means the caller stopped waiting; the
        // operation has still been applied.
        match op {
            StoreOp::SaveRecords { records, reply } => {
                tracing::trace!(count = records.len(), "Processing SaveRecords");
                let _ = reply.send(self.repository.save_records(&records).await);
            }
            StoreOp::RevertRecords {
                identifiers,
                restore,
                reply,
            } => {
                tracing::trace!(
                    removed = identifiers.len(),
                    restored = restore.len(),
                    "Processing RevertRecords"
                );
                let _ = reply.send(self.repository.revert_records(&identifiers, &restore).await);
            }
            StoreOp::DeleteRecords { identifiers, reply } => {
                tracing::trace!(count = identifiers.len(), "Processing DeleteRecords");
                let _ = reply.send(self.repository.delete_records(&identifiers).await);
            }
            StoreOp::ApplyChanges {
                updated,
                deleted,
                reply,
            } => {
                tracing::trace!(
                    updated = updated.len(),
                    deleted = deleted.len(),
                    "Processing ApplyChanges"
                );
                let _ = reply.send(self.repository.apply_changes(&updated, &deleted).await);
            }
            StoreOp::GetRecord { key, reply } => {
                let _ = reply.send(self.repository.get_record(&key).await);
            }
            StoreOp::GetRecordByIdentifier { identifier, reply } => {
                let _ = reply.send(self.repository.get_record_by_identifier(&identifier).await);
            }
            StoreOp::ListRecords { reply } => {
                let _ = reply.send(self.repository.list_records().await);
            }
            StoreOp::CountRecords { reply } => {
                let _ = reply.send(self.repository.count_records().await);
            }
            StoreOp::SaveFile { key, file, reply } => {
                tracing::trace!(record = %key, file_id = file.identifier(), "Processing SaveFile");
                let _ = reply.send(self.repository.save_file(&key, &file).await);
            }
            StoreOp::GetFile {
                key,
                file_identifier,
                reply,
            } => {
                let _ = reply.send(self.repository.get_file(&key, &file_identifier).await);
            }
            StoreOp::DeleteFile {
                remote_identifier,
                reply,
            } => {
                tracing::trace!(remote_id = %remote_identifier, "Processing DeleteFile");
                let _ = reply.send(self.repository.delete_file(&remote_identifier).await);
            }
        }
    }
}
