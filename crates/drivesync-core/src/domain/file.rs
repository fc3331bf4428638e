//! Attachment file types

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::errors::DomainError;
use super::record::Metadata;

/// An attachment stored remotely for one record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteFile {
    /// Local attachment id, recovered from the remote item name
    identifier: String,
    /// Provider-assigned id of the remote item
    remote_identifier: String,
    version_identifier: String,
    size: u64,
    metadata: Metadata,
}

impl RemoteFile {
    /// Create a new RemoteFile
    ///
    /// # Errors
    /// Returns error if any identifier is empty
    pub fn new(
        identifier: impl Into<String>,
        remote_identifier: impl Into<String>,
        version_identifier: impl Into<String>,
        size: u64,
        metadata: Metadata,
    ) -> Result<Self, DomainError> {
        let identifier = identifier.into();
        let remote_identifier = remote_identifier.into();
        let version_identifier = version_identifier.into();

        if identifier.is_empty() || remote_identifier.is_empty() || version_identifier.is_empty() {
            return Err(DomainError::InvalidIdentifier(format!(
                "remote file '{identifier}' ({remote_identifier}@{version_identifier}) is incomplete"
            )));
        }

        Ok(Self {
            identifier,
            remote_identifier,
            version_identifier,
            size,
            metadata,
        })
    }

    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    pub fn remote_identifier(&self) -> &str {
        &self.remote_identifier
    }

    pub fn version_identifier(&self) -> &str {
        &self.version_identifier
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }
}

/// A local attachment: its id and the file holding its bytes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalFile {
    identifier: String,
    path: PathBuf,
}

impl LocalFile {
    pub fn new(identifier: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            identifier: identifier.into(),
            path: path.into(),
        }
    }

    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}
