//! Drive v3 wire types and the remote API client port
//!
//! [`DriveApi`] is the seam between the synchronizers and the network: one
//! method per Drive v3 request the adapter issues. [`DriveClient`] is the
//! reqwest implementation; tests substitute scripted fakes.
//!
//! Every response field is optional on the wire. Deciding which fields are
//! required happens in [`crate::convert`] and the synchronizers, so a single
//! malformed item never fails the decoding of a whole page.
//!
//! [`DriveClient`]: crate::client::DriveClient

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use drivesync_core::domain::Metadata;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::session::AuthError;

// ============================================================================
// Response types
// ============================================================================

/// A Drive file resource, restricted to the fields this adapter requests
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DriveFile {
    pub id: Option<String>,
    pub name: Option<String>,
    pub mime_type: Option<String>,
    pub head_revision_id: Option<String>,
    /// RFC 3339 timestamp of the last modification
    pub modified_time: Option<String>,
    /// int64 encoded as a decimal string, as Drive does
    pub size: Option<String>,
    pub app_properties: Option<Metadata>,
}

/// One page of `files.list`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileList {
    pub files: Option<Vec<DriveFile>>,
    pub next_page_token: Option<String>,
}

/// Response of `changes.getStartPageToken`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartPageToken {
    pub start_page_token: Option<String>,
}

/// One entry of the change feed
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Change {
    /// `"file"` or `"drive"`
    pub change_type: Option<String>,
    /// Older responses carry the change type under `type`
    #[serde(rename = "type")]
    pub legacy_type: Option<String>,
    pub file_id: Option<String>,
    pub removed: Option<bool>,
    pub file: Option<DriveFile>,
}

impl Change {
    /// The change type, preferring `changeType` over `type`
    pub fn kind(&self) -> Option<&str> {
        self.change_type
            .as_deref()
            .or(self.legacy_type.as_deref())
    }
}

/// One page of `changes.list`
///
/// The last page carries `new_start_page_token`; earlier pages carry
/// `next_page_token` instead.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeList {
    pub changes: Option<Vec<Change>>,
    pub next_page_token: Option<String>,
    pub new_start_page_token: Option<String>,
}

/// A revision resource
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Revision {
    pub id: Option<String>,
    pub modified_time: Option<String>,
}

/// One page of `revisions.list`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RevisionList {
    pub revisions: Option<Vec<Revision>>,
    pub next_page_token: Option<String>,
}

// ============================================================================
// Request types
// ============================================================================

/// Metadata half of a create/update request
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parents: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub app_properties: Option<Metadata>,
}

/// Callback receiving the running total of bytes transferred
pub type TransferProgress = Arc<dyn Fn(u64) + Send + Sync>;

/// Content half of a create/update request
pub struct Media {
    pub mime_type: String,
    pub data: Vec<u8>,
    pub on_progress: Option<TransferProgress>,
}

impl Media {
    pub fn new(mime_type: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            mime_type: mime_type.into(),
            data,
            on_progress: None,
        }
    }

    pub fn with_progress(mut self, on_progress: TransferProgress) -> Self {
        self.on_progress = Some(on_progress);
        self
    }
}

impl std::fmt::Debug for Media {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Media")
            .field("mime_type", &self.mime_type)
            .field("len", &self.data.len())
            .finish()
    }
}

// ============================================================================
// ApiError
// ============================================================================

/// Raw failure of a Drive request, before classification
///
/// Nothing outside [`crate::classify`] should branch on these variants.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ApiError {
    /// The provider answered with a non-success status
    #[error("HTTP {status}: {message}")]
    Http { status: u16, message: String },

    /// No usable authorization for the request
    #[error("Authorization unavailable: {0}")]
    Auth(AuthError),

    /// The request never produced a response
    #[error("Network error: {0}")]
    Network(String),

    /// A success response could not be decoded
    #[error("Malformed response: {0}")]
    Decode(String),

    /// Writing downloaded content to disk failed
    #[error("I/O error: {0}")]
    Io(String),
}

impl From<reqwest::Error> for ApiError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_decode() {
            ApiError::Decode(error.to_string())
        } else {
            match error.status() {
                Some(status) => ApiError::Http {
                    status: status.as_u16(),
                    message: error.to_string(),
                },
                None => ApiError::Network(error.to_string()),
            }
        }
    }
}

// ============================================================================
// DriveApi
// ============================================================================

/// The Drive v3 requests issued by the adapter
///
/// Listing methods return one page; callers follow `next_page_token`.
/// All listings are confined to the configured private space.
#[async_trait]
pub trait DriveApi: Send + Sync {
    /// `files.list`, optionally filtered with a Drive query expression
    async fn list_files(
        &self,
        query: Option<&str>,
        page_token: Option<&str>,
    ) -> Result<FileList, ApiError>;

    /// `changes.getStartPageToken`
    async fn get_start_page_token(&self) -> Result<StartPageToken, ApiError>;

    /// `changes.list` with removed items included
    async fn list_changes(&self, page_token: &str) -> Result<ChangeList, ApiError>;

    /// `files.create` with multipart content
    async fn create_file(&self, metadata: &FileMetadata, media: Media)
        -> Result<DriveFile, ApiError>;

    /// `files.update`; metadata only when `media` is `None`
    async fn update_file(
        &self,
        file_id: &str,
        metadata: &FileMetadata,
        media: Option<Media>,
    ) -> Result<DriveFile, ApiError>;

    /// `files.delete`
    async fn delete_file(&self, file_id: &str) -> Result<(), ApiError>;

    /// `revisions.list`
    async fn list_revisions(
        &self,
        file_id: &str,
        page_token: Option<&str>,
    ) -> Result<RevisionList, ApiError>;

    /// `revisions.get?alt=media`, buffered in memory
    async fn download_revision(&self, file_id: &str, revision_id: &str)
        -> Result<Vec<u8>, ApiError>;

    /// `revisions.get?alt=media`, streamed to `destination`
    ///
    /// Returns the number of bytes written.
    async fn download_revision_to(
        &self,
        file_id: &str,
        revision_id: &str,
        destination: &Path,
        on_progress: Option<TransferProgress>,
    ) -> Result<u64, ApiError>;
}
