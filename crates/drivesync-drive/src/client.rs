//! Google Drive v3 REST client
//!
//! Provides [`DriveClient`], the reqwest implementation of [`DriveApi`].
//! Handles authorization headers, field selection, the private-space
//! filter, multipart uploads and streamed downloads.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use drivesync_drive::api::DriveApi;
//! use drivesync_drive::client::DriveClient;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let client = DriveClient::with_access_token("access-token-here");
//! let token = client.get_start_page_token().await?;
//! println!("Changes start at {:?}", token.start_page_token);
//! # Ok(())
//! # }
//! ```

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::header::{CONTENT_LENGTH, CONTENT_TYPE};
use reqwest::{Body, Client, Method, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tokio::io::AsyncWriteExt;
use tracing::{debug, trace};

use drivesync_core::config::{DriveConfig, MAX_PAGE_SIZE};

use crate::api::{
    ApiError, ChangeList, DriveApi, DriveFile, FileList, FileMetadata, Media, RevisionList,
    StartPageToken, TransferProgress,
};
use crate::session::{Authorizer, StaticToken};

/// Base URL for Drive v3 metadata requests
pub const DRIVE_API_BASE_URL: &str = "https://www.googleapis.com/drive/v3";

/// Base URL for Drive v3 media uploads
pub const DRIVE_UPLOAD_BASE_URL: &str = "https://www.googleapis.com/upload/drive/v3";

/// The application's private storage area
pub const APP_DATA_FOLDER: &str = "appDataFolder";

/// File fields requested on every call that returns files
pub const FILE_FIELDS: &str = "id, mimeType, name, headRevisionId, modifiedTime, size, appProperties";

/// Upload bodies are streamed in chunks of this size, one progress report each
const UPLOAD_CHUNK_SIZE: usize = 64 * 1024;

// ============================================================================
// Error envelope
// ============================================================================

/// `{"error": {"code": 404, "message": "File not found: x."}}`
#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: Option<String>,
}

// ============================================================================
// DriveClient
// ============================================================================

/// HTTP client for the Drive v3 API
pub struct DriveClient {
    client: Client,
    api_base_url: String,
    upload_base_url: String,
    space: String,
    page_size: u32,
    authorizer: Arc<dyn Authorizer>,
}

impl DriveClient {
    /// Creates a client against the public Drive endpoints
    pub fn new(authorizer: Arc<dyn Authorizer>) -> Self {
        Self {
            client: Client::new(),
            api_base_url: DRIVE_API_BASE_URL.to_string(),
            upload_base_url: DRIVE_UPLOAD_BASE_URL.to_string(),
            space: APP_DATA_FOLDER.to_string(),
            page_size: MAX_PAGE_SIZE,
            authorizer,
        }
    }

    /// Creates a client that always sends the given access token
    pub fn with_access_token(access_token: impl Into<String>) -> Self {
        Self::new(Arc::new(StaticToken(access_token.into())))
    }

    /// Creates a client with one base URL for both metadata and uploads
    /// (useful for testing)
    pub fn with_base_url(authorizer: Arc<dyn Authorizer>, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into();
        Self {
            upload_base_url: base_url.clone(),
            api_base_url: base_url,
            ..Self::new(authorizer)
        }
    }

    /// Creates a client from the `drive` configuration section
    pub fn from_config(config: &DriveConfig, authorizer: Arc<dyn Authorizer>) -> Self {
        Self {
            api_base_url: config.api_base_url.trim_end_matches('/').to_string(),
            upload_base_url: config.upload_base_url.trim_end_matches('/').to_string(),
            space: config.space.clone(),
            page_size: config.page_size.clamp(1, MAX_PAGE_SIZE),
            ..Self::new(authorizer)
        }
    }

    pub fn api_base_url(&self) -> &str {
        &self.api_base_url
    }

    pub fn space(&self) -> &str {
        &self.space
    }

    pub fn page_size(&self) -> u32 {
        self.page_size
    }

    /// Creates an authorized request builder for an absolute URL
    ///
    /// Fails without touching the network if no access token is available.
    pub fn request(&self, method: Method, url: &str) -> Result<RequestBuilder, ApiError> {
        let token = self.authorizer.access_token().map_err(ApiError::Auth)?;
        Ok(self.client.request(method, url).bearer_auth(token))
    }

    fn api_url(&self, path: &str) -> String {
        format!("{}{}", self.api_base_url, path)
    }

    fn upload_url(&self, path: &str) -> String {
        format!("{}{}", self.upload_base_url, path)
    }

    /// Sends the request and turns non-success statuses into [`ApiError::Http`]
    async fn send(&self, request: RequestBuilder) -> Result<Response, ApiError> {
        let response = request.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ErrorEnvelope>(&body)
            .ok()
            .and_then(|envelope| envelope.error.message)
            .unwrap_or_else(|| {
                if body.is_empty() {
                    status.canonical_reason().unwrap_or("unknown status").to_string()
                } else {
                    body
                }
            });

        debug!(status = status.as_u16(), %message, "Drive request failed");
        Err(ApiError::Http {
            status: status.as_u16(),
            message,
        })
    }

    async fn json<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, ApiError> {
        let bytes = self.send(request).await?.bytes().await?;
        serde_json::from_slice(&bytes).map_err(|e| ApiError::Decode(e.to_string()))
    }

    async fn upload(
        &self,
        method: Method,
        url: &str,
        metadata: &FileMetadata,
        media: Media,
    ) -> Result<DriveFile, ApiError> {
        let boundary = format!("drivesync-{}", uuid::Uuid::new_v4().simple());
        let (body, length) = multipart_body(metadata, media, &boundary)?;

        let request = self
            .request(method, url)?
            .query(&[("uploadType", "multipart"), ("fields", FILE_FIELDS)])
            .header(
                CONTENT_TYPE,
                format!("multipart/related; boundary={boundary}"),
            )
            .header(CONTENT_LENGTH, length)
            .body(body);

        self.json(request).await
    }

    fn media_url(&self, file_id: &str, revision_id: &str) -> String {
        self.api_url(&format!("/files/{file_id}/revisions/{revision_id}"))
    }
}

#[async_trait]
impl DriveApi for DriveClient {
    async fn list_files(
        &self,
        query: Option<&str>,
        page_token: Option<&str>,
    ) -> Result<FileList, ApiError> {
        let mut params = vec![
            ("spaces", self.space.clone()),
            ("pageSize", self.page_size.to_string()),
            ("fields", format!("nextPageToken, files({FILE_FIELDS})")),
        ];
        if let Some(query) = query {
            params.push(("q", query.to_string()));
        }
        if let Some(page_token) = page_token {
            params.push(("pageToken", page_token.to_string()));
        }

        trace!(?query, ?page_token, "files.list");
        let request = self.request(Method::GET, &self.api_url("/files"))?.query(&params);
        self.json(request).await
    }

    async fn get_start_page_token(&self) -> Result<StartPageToken, ApiError> {
        trace!("changes.getStartPageToken");
        let request = self
            .request(Method::GET, &self.api_url("/changes/startPageToken"))?
            .query(&[("fields", "startPageToken")]);
        self.json(request).await
    }

    async fn list_changes(&self, page_token: &str) -> Result<ChangeList, ApiError> {
        let params = [
            ("pageToken", page_token.to_string()),
            ("includeRemoved", "true".to_string()),
            ("pageSize", self.page_size.to_string()),
            ("spaces", self.space.clone()),
            (
                "fields",
                format!(
                    "nextPageToken, newStartPageToken, \
                     changes(fileId, changeType, removed, file({FILE_FIELDS}))"
                ),
            ),
        ];

        trace!(page_token, "changes.list");
        let request = self.request(Method::GET, &self.api_url("/changes"))?.query(&params);
        self.json(request).await
    }

    async fn create_file(
        &self,
        metadata: &FileMetadata,
        media: Media,
    ) -> Result<DriveFile, ApiError> {
        debug!(name = ?metadata.name, "files.create");
        self.upload(Method::POST, &self.upload_url("/files"), metadata, media)
            .await
    }

    async fn update_file(
        &self,
        file_id: &str,
        metadata: &FileMetadata,
        media: Option<Media>,
    ) -> Result<DriveFile, ApiError> {
        debug!(file_id, with_media = media.is_some(), "files.update");
        match media {
            Some(media) => {
                let url = self.upload_url(&format!("/files/{file_id}"));
                self.upload(Method::PATCH, &url, metadata, media).await
            }
            None => {
                let request = self
                    .request(Method::PATCH, &self.api_url(&format!("/files/{file_id}")))?
                    .query(&[("fields", FILE_FIELDS)])
                    .json(metadata);
                self.json(request).await
            }
        }
    }

    async fn delete_file(&self, file_id: &str) -> Result<(), ApiError> {
        debug!(file_id, "files.delete");
        let request = self.request(Method::DELETE, &self.api_url(&format!("/files/{file_id}")))?;
        self.send(request).await?;
        Ok(())
    }

    async fn list_revisions(
        &self,
        file_id: &str,
        page_token: Option<&str>,
    ) -> Result<RevisionList, ApiError> {
        let mut params = vec![
            ("pageSize", self.page_size.to_string()),
            ("fields", "nextPageToken, revisions(id, modifiedTime)".to_string()),
        ];
        if let Some(page_token) = page_token {
            params.push(("pageToken", page_token.to_string()));
        }

        trace!(file_id, ?page_token, "revisions.list");
        let url = self.api_url(&format!("/files/{file_id}/revisions"));
        let request = self.request(Method::GET, &url)?.query(&params);
        self.json(request).await
    }

    async fn download_revision(
        &self,
        file_id: &str,
        revision_id: &str,
    ) -> Result<Vec<u8>, ApiError> {
        debug!(file_id, revision_id, "revisions.get media");
        let request = self
            .request(Method::GET, &self.media_url(file_id, revision_id))?
            .query(&[("alt", "media")]);
        let bytes = self.send(request).await?.bytes().await?;
        Ok(bytes.to_vec())
    }

    async fn download_revision_to(
        &self,
        file_id: &str,
        revision_id: &str,
        destination: &Path,
        on_progress: Option<TransferProgress>,
    ) -> Result<u64, ApiError> {
        debug!(file_id, revision_id, destination = %destination.display(), "revisions.get media to file");
        let request = self
            .request(Method::GET, &self.media_url(file_id, revision_id))?
            .query(&[("alt", "media")]);
        let response = self.send(request).await?;

        let io_error = |e: std::io::Error| ApiError::Io(format!("{}: {e}", destination.display()));
        let mut file = tokio::fs::File::create(destination).await.map_err(io_error)?;
        let mut stream = response.bytes_stream();
        let mut written = 0u64;

        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            file.write_all(&chunk).await.map_err(io_error)?;
            written += chunk.len() as u64;
            if let Some(on_progress) = &on_progress {
                on_progress(written);
            }
        }
        file.flush().await.map_err(io_error)?;

        debug!(file_id, bytes = written, "Download complete");
        Ok(written)
    }
}

// ============================================================================
// Multipart bodies
// ============================================================================

/// Opening and closing delimiters of a `multipart/related` upload
fn multipart_frame(
    metadata: &FileMetadata,
    mime_type: &str,
    boundary: &str,
) -> Result<(Vec<u8>, Vec<u8>), ApiError> {
    let json = serde_json::to_string(metadata).map_err(|e| ApiError::Decode(e.to_string()))?;
    let head = format!(
        "--{boundary}\r\n\
         Content-Type: application/json; charset=UTF-8\r\n\r\n\
         {json}\r\n\
         --{boundary}\r\n\
         Content-Type: {mime_type}\r\n\r\n"
    );
    let tail = format!("\r\n--{boundary}--\r\n");
    Ok((head.into_bytes(), tail.into_bytes()))
}

/// Streams the upload body, reporting media bytes as they are handed to
/// the connection
fn multipart_body(
    metadata: &FileMetadata,
    media: Media,
    boundary: &str,
) -> Result<(Body, u64), ApiError> {
    let (head, tail) = multipart_frame(metadata, &media.mime_type, boundary)?;
    let length = (head.len() + media.data.len() + tail.len()) as u64;

    let mut parts: Vec<(Vec<u8>, bool)> = vec![(head, false)];
    parts.extend(
        media
            .data
            .chunks(UPLOAD_CHUNK_SIZE)
            .map(|chunk| (chunk.to_vec(), true)),
    );
    parts.push((tail, false));

    let on_progress = media.on_progress;
    let mut sent = 0u64;
    let stream = futures_util::stream::iter(parts).map(move |(bytes, is_media)| {
        if is_media {
            sent += bytes.len() as u64;
            if let Some(on_progress) = &on_progress {
                on_progress(sent);
            }
        }
        Ok::<_, std::io::Error>(bytes)
    });

    Ok((Body::wrap_stream(stream), length))
}
