//! DriveSync Cache - Local record store
//!
//! SQLite-based store for:
//! - The last observed remote state of every record
//! - Attachment files owned by records
//!
//! ## Architecture
//!
//! This crate implements the `IRecordStore` port from `drivesync-core`
//! using SQLite as the storage backend. It is a driven (secondary) adapter
//! in the hexagonal architecture.
//!
//! ## Key Components
//!
//! - [`DatabasePool`] - Connection pool with migration support
//! - [`SqliteRecordRepository`] - Direct SQLite access to record state
//! - [`StoreSerializer`] / [`StoreHandle`] - The store's serialized execution
//!   context: every read and write is queued to a single task
//! - [`CacheError`] - Error types for cache operations
//!
//! ## Usage
//!
//! ```no_run
//! use std::path::Path;
//! use drivesync_cache::{DatabasePool, StoreSerializer};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let pool = DatabasePool::new(Path::new("/home/user/.local/share/drivesync/records.db")).await?;
//! let store = StoreSerializer::spawn(pool, 100);
//! // Use store as IRecordStore...
//! # Ok(())
//! # }
//! ```

pub mod pool;
pub mod repository;
pub mod serializer;

pub use pool::DatabasePool;
pub use repository::SqliteRecordRepository;
pub use serializer::{StoreHandle, StoreSerializer};

/// Errors that can occur during cache operations
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// Failed to establish a database connection
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// A database query failed
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// Schema migration failed
    #[error("Migration failed: {0}")]
    MigrationFailed(String),

    /// Serialization or deserialization of domain types failed
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// The serializer task is no longer running
    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

impl From<sqlx::Error> for CacheError {
    fn from(e: sqlx::Error) -> Self {
        CacheError::QueryFailed(e.to_string())
    }
}
