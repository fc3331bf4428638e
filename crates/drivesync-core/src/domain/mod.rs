//! Domain entities
//!
//! This module contains the core domain types for DriveSync:
//! - Remote records and their logical keys
//! - Attachment files and revisions
//! - The opaque change token
//! - Domain-specific error types

pub mod change_token;
pub mod errors;
pub mod file;
pub mod local_record;
pub mod record;
pub mod version;

// Re-export commonly used types
pub use change_token::ChangeToken;
pub use errors::{AuthExpiry, DomainError, FileError, RecordError, SyncError};
pub use file::{LocalFile, RemoteFile};
pub use local_record::{LocalRecord, SyncRecord};
pub use record::{Metadata, NamingConvention, RecordKey, RecordStatus, RemoteRecord};
pub use version::Version;
