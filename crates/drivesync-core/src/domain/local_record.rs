//! Local record payloads and the local/remote record pair

use serde::{Deserialize, Serialize};

use super::record::{RecordKey, RecordStatus, RemoteRecord};

/// A record's local payload, as encoded by the record codec
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocalRecord {
    pub recorded_object_type: String,
    pub recorded_object_identifier: String,
    /// Application-defined record body
    pub payload: serde_json::Value,
}

impl LocalRecord {
    pub fn new(key: &RecordKey, payload: serde_json::Value) -> Self {
        Self {
            recorded_object_type: key.recorded_object_type().to_string(),
            recorded_object_identifier: key.recorded_object_identifier().to_string(),
            payload,
        }
    }
}

/// A synchronized record: its key plus whichever halves are known
#[derive(Debug, Clone)]
pub struct SyncRecord {
    pub key: RecordKey,
    pub local: Option<LocalRecord>,
    pub remote: Option<RemoteRecord>,
}

impl SyncRecord {
    pub fn new(key: RecordKey) -> Self {
        Self {
            key,
            local: None,
            remote: None,
        }
    }

    pub fn with_local(mut self, local: LocalRecord) -> Self {
        self.local = Some(local);
        self
    }

    pub fn with_remote(mut self, remote: RemoteRecord) -> Self {
        self.remote = Some(remote);
        self
    }

    /// Remote identifier to update in place, if the remote half is live
    pub fn live_remote_identifier(&self) -> Option<&str> {
        self.remote
            .as_ref()
            .filter(|r| r.status() != RecordStatus::Deleted)
            .map(|r| r.identifier())
    }
}
