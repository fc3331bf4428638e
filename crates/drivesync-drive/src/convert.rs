//! Conversion of Drive resources into domain values
//!
//! Items that lack a required field are rejected with `None` and logged;
//! callers decide whether that is a skip (listings, change pages) or an
//! invalid response (single-item replies).

use chrono::{DateTime, Utc};
use drivesync_core::domain::{
    NamingConvention, RecordKey, RecordStatus, RemoteFile, RemoteRecord, Version,
};
use tracing::warn;

use crate::api::{DriveFile, Revision};

/// Parses Drive files into records using one naming convention
#[derive(Debug, Clone)]
pub struct RecordParser {
    naming_convention: NamingConvention,
    record_mime_type: String,
}

impl RecordParser {
    pub fn new(naming_convention: NamingConvention, record_mime_type: impl Into<String>) -> Self {
        Self {
            naming_convention,
            record_mime_type: record_mime_type.into(),
        }
    }

    pub fn naming_convention(&self) -> NamingConvention {
        self.naming_convention
    }

    pub fn record_mime_type(&self) -> &str {
        &self.record_mime_type
    }

    /// Builds a record from a listed or changed file
    ///
    /// Files of another content type are not records and are rejected
    /// without a warning.
    pub fn remote_record(&self, file: &DriveFile, status: RecordStatus) -> Option<RemoteRecord> {
        if file.mime_type.as_deref() != Some(self.record_mime_type.as_str()) {
            return None;
        }

        let id = file.id.as_deref();
        let (Some(identifier), Some(version), Some(modified), Some(metadata), Some(name)) = (
            id,
            file.head_revision_id.as_deref(),
            file.modified_time.as_deref(),
            file.app_properties.as_ref(),
            file.name.as_deref(),
        ) else {
            warn!(file_id = ?id, "Skipping record with missing fields");
            return None;
        };

        let Some(version_date) = parse_timestamp(modified) else {
            warn!(file_id = identifier, modified, "Skipping record with invalid modifiedTime");
            return None;
        };

        let key = match RecordKey::parse(name, self.naming_convention) {
            Ok(key) => key,
            Err(error) => {
                warn!(file_id = identifier, %error, "Skipping record with unparseable name");
                return None;
            }
        };

        RemoteRecord::new(
            identifier,
            version,
            version_date,
            key,
            metadata.clone(),
            status,
        )
        .map_err(|error| warn!(file_id = identifier, %error, "Skipping invalid record"))
        .ok()
    }
}

/// Builds the attachment half of an uploaded file
pub fn remote_file(file: &DriveFile, file_identifier: &str) -> Option<RemoteFile> {
    let (Some(remote_identifier), Some(version), Some(size), Some(metadata)) = (
        file.id.as_deref(),
        file.head_revision_id.as_deref(),
        file.size.as_deref().and_then(|s| s.parse::<u64>().ok()),
        file.app_properties.as_ref(),
    ) else {
        warn!(file_id = file_identifier, "Drive file is missing attachment fields");
        return None;
    };

    RemoteFile::new(
        file_identifier,
        remote_identifier,
        version,
        size,
        metadata.clone(),
    )
    .ok()
}

pub fn version(revision: &Revision) -> Option<Version> {
    let identifier = revision.id.as_deref()?;
    let date = parse_timestamp(revision.modified_time.as_deref()?)?;
    Some(Version::new(identifier, date))
}

fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}
