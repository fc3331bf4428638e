//! Opaque change-feed cursor
//!
//! A [`ChangeToken`] marks "everything processed up to this point" in the
//! provider's change feed. It is produced by the bootstrap and delta
//! synchronizers and stored by the caller between runs. The bytes are
//! opaque to the caller; the adapter decodes them as a UTF-8 page cursor.

use std::fmt::{self, Debug, Formatter};

use serde::{Deserialize, Serialize};

use super::errors::SyncError;

/// Opaque change-feed cursor held by the caller between sync runs
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChangeToken(Vec<u8>);

impl ChangeToken {
    /// Wraps raw bytes previously produced by this adapter
    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    /// Builds a token from a provider page cursor
    pub fn from_page_token(page_token: &str) -> Self {
        Self(page_token.as_bytes().to_vec())
    }

    /// Decodes the provider page cursor carried by this token
    ///
    /// # Errors
    /// Returns [`SyncError::InvalidChangeToken`] if the bytes are not UTF-8
    /// or the cursor is empty.
    pub fn page_token(&self) -> Result<&str, SyncError> {
        match std::str::from_utf8(&self.0) {
            Ok(token) if !token.is_empty() => Ok(token),
            _ => Err(SyncError::InvalidChangeToken(self.0.clone())),
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }
}

impl Debug for ChangeToken {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match std::str::from_utf8(&self.0) {
            Ok(token) => write!(f, "ChangeToken({token:?})"),
            Err(_) => write!(f, "ChangeToken({:?})", self.0),
        }
    }
}

impl From<&str> for ChangeToken {
    fn from(page_token: &str) -> Self {
        Self::from_page_token(page_token)
    }
}
