//! Record codec port
//!
//! Converts a record's local payload to and from the bytes stored as the
//! remote item's content.

use anyhow::Context;

use crate::domain::{LocalRecord, RecordKey};

/// Encoding of local records into remote item content
pub trait RecordCodec: Send + Sync {
    /// MIME type of the encoded content
    fn mime_type(&self) -> &str;

    fn encode(&self, record: &LocalRecord) -> anyhow::Result<Vec<u8>>;

    /// Decodes remote content previously written for `key`
    fn decode(&self, key: &RecordKey, bytes: &[u8]) -> anyhow::Result<LocalRecord>;
}

/// JSON codec: the payload is stored as a JSON document
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonRecordCodec;

impl RecordCodec for JsonRecordCodec {
    fn mime_type(&self) -> &str {
        "application/json"
    }

    fn encode(&self, record: &LocalRecord) -> anyhow::Result<Vec<u8>> {
        serde_json::to_vec(record).context("Failed to encode record as JSON")
    }

    fn decode(&self, key: &RecordKey, bytes: &[u8]) -> anyhow::Result<LocalRecord> {
        let record: LocalRecord = serde_json::from_slice(bytes)
            .with_context(|| format!("Failed to decode record {key} from JSON"))?;

        if record.recorded_object_type != key.recorded_object_type()
            || record.recorded_object_identifier != key.recorded_object_identifier()
        {
            anyhow::bail!(
                "Decoded record {}-{} does not match {key}",
                record.recorded_object_type,
                record.recorded_object_identifier
            );
        }

        Ok(record)
    }
}
