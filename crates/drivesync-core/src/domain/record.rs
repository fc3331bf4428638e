//! Remote record types
//!
//! A [`RemoteRecord`] is the remote half of a synchronized record: the
//! provider-assigned identity and version of the stored payload, plus the
//! logical [`RecordKey`] recovered from the remote item's display name.

use std::collections::BTreeMap;
use std::fmt::{self, Display, Formatter};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::errors::DomainError;

/// Provider-opaque sidecar metadata attached to a remote item
pub type Metadata = BTreeMap<String, String>;

/// Separator between the components of a remote item name
pub const NAME_SEPARATOR: char = '-';

// ============================================================================
// NamingConvention
// ============================================================================

/// How a remote item name is split into `(type, identifier)`
///
/// Names are always written as `"{type}-{identifier}"`. Reading them back is
/// ambiguous when either half contains the separator, so the convention is
/// explicit and versioned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NamingConvention {
    /// v1: split on the first separator. Identifiers may contain `-` (UUIDs).
    #[default]
    FirstSeparator,
    /// v2: split on the last separator. Types may contain `-`.
    LastSeparator,
}

impl NamingConvention {
    fn split<'a>(&self, name: &'a str) -> Option<(&'a str, &'a str)> {
        match self {
            NamingConvention::FirstSeparator => name.split_once(NAME_SEPARATOR),
            NamingConvention::LastSeparator => name.rsplit_once(NAME_SEPARATOR),
        }
    }
}

// ============================================================================
// RecordKey
// ============================================================================

/// Composite logical key of a record: recorded object type + identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RecordKey {
    recorded_object_type: String,
    recorded_object_identifier: String,
}

impl RecordKey {
    /// Create a new RecordKey
    ///
    /// # Errors
    /// Returns error if either component is empty
    pub fn new(
        recorded_object_type: impl Into<String>,
        recorded_object_identifier: impl Into<String>,
    ) -> Result<Self, DomainError> {
        let recorded_object_type = recorded_object_type.into();
        let recorded_object_identifier = recorded_object_identifier.into();

        if recorded_object_type.is_empty() || recorded_object_identifier.is_empty() {
            return Err(DomainError::InvalidRecordName(format!(
                "{recorded_object_type}{NAME_SEPARATOR}{recorded_object_identifier}"
            )));
        }

        Ok(Self {
            recorded_object_type,
            recorded_object_identifier,
        })
    }

    /// Parse a remote item name using the given convention
    ///
    /// # Errors
    /// Returns error if the name has no separator or an empty component
    pub fn parse(name: &str, convention: NamingConvention) -> Result<Self, DomainError> {
        let (ty, id) = convention
            .split(name)
            .ok_or_else(|| DomainError::InvalidRecordName(name.to_string()))?;
        Self::new(ty, id).map_err(|_| DomainError::InvalidRecordName(name.to_string()))
    }

    /// Remote item name for this key
    pub fn remote_name(&self) -> String {
        self.to_string()
    }

    /// Remote item name for an attachment owned by this record
    pub fn attachment_name(&self, file_identifier: &str) -> String {
        format!("{self}{NAME_SEPARATOR}{file_identifier}")
    }

    /// Recovers the attachment id from an attachment item name
    ///
    /// Returns `None` if the name does not belong to this record.
    pub fn attachment_identifier<'a>(&self, name: &'a str) -> Option<&'a str> {
        let prefix = format!("{self}{NAME_SEPARATOR}");
        name.strip_prefix(prefix.as_str()).filter(|id| !id.is_empty())
    }

    pub fn recorded_object_type(&self) -> &str {
        &self.recorded_object_type
    }

    pub fn recorded_object_identifier(&self) -> &str {
        &self.recorded_object_identifier
    }
}

impl Display for RecordKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{}{}",
            self.recorded_object_type, NAME_SEPARATOR, self.recorded_object_identifier
        )
    }
}

// ============================================================================
// RecordStatus
// ============================================================================

/// Remote status of a record as last observed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordStatus {
    /// Seen in a full listing or written by this client
    #[default]
    Normal,
    /// Reported as modified by a change page
    Updated,
    /// Reported as removed
    Deleted,
}

impl RecordStatus {
    /// Stable lowercase name, used for storage
    pub fn name(&self) -> &'static str {
        match self {
            RecordStatus::Normal => "normal",
            RecordStatus::Updated => "updated",
            RecordStatus::Deleted => "deleted",
        }
    }
}

impl std::str::FromStr for RecordStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "normal" => Ok(RecordStatus::Normal),
            "updated" => Ok(RecordStatus::Updated),
            "deleted" => Ok(RecordStatus::Deleted),
            other => Err(DomainError::ValidationFailed(format!(
                "unknown record status '{other}'"
            ))),
        }
    }
}

// ============================================================================
// RemoteRecord
// ============================================================================

/// One synchronized record as seen remotely
///
/// Equality and hashing use the provider identifier only, so sets of remote
/// records behave like sets of remote items.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteRecord {
    identifier: String,
    version_identifier: String,
    version_date: DateTime<Utc>,
    key: RecordKey,
    metadata: Metadata,
    status: RecordStatus,
}

impl RemoteRecord {
    /// Create a new RemoteRecord
    ///
    /// # Errors
    /// Returns error if the identifier or version identifier is empty
    pub fn new(
        identifier: impl Into<String>,
        version_identifier: impl Into<String>,
        version_date: DateTime<Utc>,
        key: RecordKey,
        metadata: Metadata,
        status: RecordStatus,
    ) -> Result<Self, DomainError> {
        let identifier = identifier.into();
        let version_identifier = version_identifier.into();

        if identifier.is_empty() {
            return Err(DomainError::InvalidIdentifier(
                "remote record identifier cannot be empty".to_string(),
            ));
        }
        if version_identifier.is_empty() {
            return Err(DomainError::InvalidIdentifier(format!(
                "remote record {identifier} has an empty version identifier"
            )));
        }

        Ok(Self {
            identifier,
            version_identifier,
            version_date,
            key,
            metadata,
            status,
        })
    }

    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    pub fn version_identifier(&self) -> &str {
        &self.version_identifier
    }

    pub fn version_date(&self) -> DateTime<Utc> {
        self.version_date
    }

    pub fn key(&self) -> &RecordKey {
        &self.key
    }

    pub fn recorded_object_type(&self) -> &str {
        self.key.recorded_object_type()
    }

    pub fn recorded_object_identifier(&self) -> &str {
        self.key.recorded_object_identifier()
    }

    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    pub fn status(&self) -> RecordStatus {
        self.status
    }

    pub fn set_status(&mut self, status: RecordStatus) {
        self.status = status;
    }
}

impl PartialEq for RemoteRecord {
    fn eq(&self, other: &Self) -> bool {
        self.identifier == other.identifier
    }
}

impl Eq for RemoteRecord {}

impl std::hash::Hash for RemoteRecord {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.identifier.hash(state);
    }
}
