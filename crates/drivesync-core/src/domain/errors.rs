//! Domain error types
//!
//! This module defines the error vocabulary surfaced to callers of the
//! synchronization operations:
//! - [`SyncError`] - the closed taxonomy every remote failure is classified into
//! - [`RecordError`] / [`FileError`] - per-record and per-attachment wrappers
//! - [`DomainError`] - validation failures when constructing domain values

use thiserror::Error;

use super::record::RecordKey;

/// Why an authorization is no longer usable
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthExpiry {
    /// The user has never signed in on this device, or signed out
    NoSavedCredentials,
    /// The provider rejected the current access token
    TokenExpired,
}

impl std::fmt::Display for AuthExpiry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AuthExpiry::NoSavedCredentials => write!(f, "no saved credentials"),
            AuthExpiry::TokenExpired => write!(f, "token expired"),
        }
    }
}

/// Classified outcome of a failed synchronization operation
///
/// Every provider-specific failure is translated into one of these variants
/// by the drive adapter's classifier before it reaches the caller.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SyncError {
    /// The operation was cancelled through its progress handle or by the user
    #[error("Operation cancelled")]
    Cancelled,

    /// The session must be re-authorized before retrying
    #[error("Authorization expired: {0}")]
    AuthExpired(AuthExpiry),

    /// The provider is throttling this client
    #[error("Rate limited by the remote service")]
    RateLimited,

    /// The remote item does not exist
    #[error("Remote item not found")]
    ItemNotFound,

    /// A successful response was missing expected fields
    #[error("Invalid response from the remote service")]
    InvalidResponse,

    /// The change token could not be decoded into a page cursor
    #[error("Invalid change token: {0:?}")]
    InvalidChangeToken(Vec<u8>),

    /// Any other network or provider failure, with its original detail
    #[error("Transport error: {0}")]
    Transport(String),

    /// The local store failed while applying or reverting remote state
    #[error("Local store error: {0}")]
    Store(String),

    /// Defensive fallback for states that the join logic cannot reach
    #[error("Unknown error")]
    Unknown,
}

impl SyncError {
    /// Returns true if the caller may retry the same request unchanged
    ///
    /// Nothing is retried internally; this only informs the calling framework.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            SyncError::RateLimited | SyncError::Transport(_) | SyncError::InvalidResponse
        )
    }
}

/// Failure of an operation on a single record
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RecordError {
    /// The remote call for this record failed
    #[error("Record {key}: {source}")]
    Sync {
        key: RecordKey,
        #[source]
        source: SyncError,
    },

    /// An upload was requested for a record without a local half
    #[error("Record {0} has no local record")]
    NilLocalRecord(RecordKey),

    /// A remote operation was requested for a record without a remote half
    #[error("Record {0} has no remote record")]
    NilRemoteRecord(RecordKey),

    /// The record payload could not be encoded or decoded
    #[error("Record {key}: codec error: {message}")]
    Codec { key: RecordKey, message: String },
}

impl RecordError {
    /// Wraps a classified sync error for the given record
    pub fn sync(key: &RecordKey, source: SyncError) -> Self {
        RecordError::Sync {
            key: key.clone(),
            source,
        }
    }

    /// Returns true if the failure was a cancellation
    pub fn is_cancelled(&self) -> bool {
        matches!(
            self,
            RecordError::Sync {
                source: SyncError::Cancelled,
                ..
            }
        )
    }
}

/// Failure of an operation on a single attachment file
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FileError {
    /// The remote call for this file failed
    #[error("File {file_id}: {source}")]
    Sync {
        file_id: String,
        #[source]
        source: SyncError,
    },

    /// The remote file no longer exists
    #[error("File {0} does not exist")]
    DoesNotExist(String),

    /// Reading or writing the local copy failed
    #[error("File {file_id}: I/O error: {message}")]
    Io { file_id: String, message: String },
}

impl FileError {
    /// Wraps a classified sync error for the given file, mapping
    /// [`SyncError::ItemNotFound`] to [`FileError::DoesNotExist`]
    pub fn sync(file_id: &str, source: SyncError) -> Self {
        match source {
            SyncError::ItemNotFound => FileError::DoesNotExist(file_id.to_string()),
            source => FileError::Sync {
                file_id: file_id.to_string(),
                source,
            },
        }
    }

    /// Returns true if the failure was a cancellation
    pub fn is_cancelled(&self) -> bool {
        matches!(
            self,
            FileError::Sync {
                source: SyncError::Cancelled,
                ..
            }
        )
    }
}

/// Errors that can occur in domain value construction
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// A remote item name could not be split into a record key
    #[error("Invalid record name: {0}")]
    InvalidRecordName(String),

    /// A remote identifier was empty
    #[error("Invalid remote identifier: {0}")]
    InvalidIdentifier(String),

    /// Generic validation failure
    #[error("Validation failed: {0}")]
    ValidationFailed(String),
}
