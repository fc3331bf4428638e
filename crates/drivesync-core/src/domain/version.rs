//! Point-in-time revision references

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// An immutable revision of a remote item
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Version {
    pub identifier: String,
    pub date: DateTime<Utc>,
}

impl Version {
    pub fn new(identifier: impl Into<String>, date: DateTime<Utc>) -> Self {
        Self {
            identifier: identifier.into(),
            date,
        }
    }
}
