//! Attachment files
//!
//! Attachments are binary items in the private space named
//! `"{record key}-{file id}"`. An upload replaces the content of an existing
//! item with the same name, or creates one. Downloads land in a fresh
//! temporary directory that the caller owns afterwards.

use std::path::PathBuf;
use std::sync::Arc;

use drivesync_core::domain::{
    FileError, LocalFile, Metadata, RecordKey, RemoteFile, SyncError,
};
use drivesync_core::ports::IRecordStore;
use drivesync_core::progress::{ErrorMapper, Operation, Progress};
use tracing::{debug, info, warn};

use crate::api::{DriveApi, FileMetadata, Media, TransferProgress};
use crate::convert;
use crate::query;
use crate::records::store_error;

/// Content type of uploaded attachments
pub const ATTACHMENT_MIME_TYPE: &str = "application/octet-stream";

fn file_errors(file_id: &str) -> ErrorMapper<FileError> {
    let file_id = file_id.to_string();
    Arc::new(move |error| FileError::sync(&file_id, error))
}

/// Reports transferred bytes as completed units
fn byte_progress(progress: &Arc<Progress>) -> TransferProgress {
    let progress = progress.clone();
    Arc::new(move |bytes| progress.set_completed_units(bytes))
}

/// Quotes a value for a `files.list` query
fn quote(value: &str) -> String {
    format!("'{}'", value.replace('\\', "\\\\").replace('\'', "\\'"))
}

/// Attachment operations against Drive
#[derive(Clone)]
pub struct FileOperations {
    api: Arc<dyn DriveApi>,
    store: Arc<dyn IRecordStore>,
    space: String,
}

impl FileOperations {
    pub fn new(api: Arc<dyn DriveApi>, store: Arc<dyn IRecordStore>, space: impl Into<String>) -> Self {
        Self {
            api,
            store,
            space: space.into(),
        }
    }

    /// Uploads `file` as an attachment of the record `key`
    ///
    /// Progress is measured in bytes of file content.
    pub fn upload_file(
        &self,
        file: &LocalFile,
        key: &RecordKey,
        metadata: Metadata,
    ) -> Operation<RemoteFile, FileError> {
        let file_id = file.identifier().to_string();
        let path = file.path().to_path_buf();
        let name = key.attachment_name(&file_id);
        let key = key.clone();

        let this = self.clone();
        Operation::spawn(1, file_errors(&file_id), move |ctx| async move {
            let data = match tokio::fs::read(&path).await {
                Ok(data) => data,
                Err(e) => {
                    ctx.complete(Err(FileError::Io {
                        file_id,
                        message: format!("{}: {e}", path.display()),
                    }));
                    return;
                }
            };
            let size = data.len() as u64;
            ctx.progress.set_total_units(size);

            let token = ctx.cancellation_token();
            let result = async {
                let query = format!("name = {}", quote(&name));
                let existing = query::execute(
                    "files.list",
                    &token,
                    this.api.list_files(Some(&query), None),
                )
                .await?
                .files
                .ok_or(SyncError::InvalidResponse)?
                .into_iter()
                .find_map(|f| f.id);

                let media = Media::new(ATTACHMENT_MIME_TYPE, data)
                    .with_progress(byte_progress(&ctx.progress));
                let mut request = FileMetadata {
                    name: Some(name.clone()),
                    mime_type: Some(ATTACHMENT_MIME_TYPE.to_string()),
                    parents: None,
                    app_properties: Some(metadata),
                };

                let uploaded = match &existing {
                    Some(remote_id) => {
                        debug!(%file_id, %remote_id, bytes = size, "Replacing attachment");
                        query::execute(
                            "files.update",
                            &token,
                            this.api.update_file(remote_id, &request, Some(media)),
                        )
                        .await?
                    }
                    None => {
                        debug!(%file_id, bytes = size, "Creating attachment");
                        request.parents = Some(vec![this.space.clone()]);
                        query::execute("files.create", &token, this.api.create_file(&request, media))
                            .await?
                    }
                };

                let remote =
                    convert::remote_file(&uploaded, &file_id).ok_or(SyncError::InvalidResponse)?;
                this.store
                    .save_remote_file(&key, &remote)
                    .await
                    .map_err(store_error)?;
                Ok::<_, SyncError>(remote)
            }
            .await;

            if let Ok(remote) = &result {
                ctx.progress.set_completed_units(size);
                info!(record = %key, %file_id, remote_id = remote.remote_identifier(), "Uploaded attachment");
            }
            ctx.complete(result.map_err(|e| ctx.error(e)));
        })
    }

    /// Downloads the current revision of `file` into a new temporary directory
    ///
    /// Progress is measured in bytes against the recorded size.
    pub fn download_file(&self, file: &RemoteFile) -> Operation<LocalFile, FileError> {
        let file_id = file.identifier().to_string();
        let remote_id = file.remote_identifier().to_string();
        let revision_id = file.version_identifier().to_string();
        let size = file.size();

        let api = self.api.clone();
        Operation::spawn(size, file_errors(&file_id), move |ctx| async move {
            let directory = download_directory();
            if let Err(e) = tokio::fs::create_dir_all(&directory).await {
                ctx.complete(Err(FileError::Io {
                    file_id,
                    message: format!("{}: {e}", directory.display()),
                }));
                return;
            }
            let path = directory.join(&file_id);

            let token = ctx.cancellation_token();
            let result = query::execute(
                "revisions.get",
                &token,
                api.download_revision_to(
                    &remote_id,
                    &revision_id,
                    &path,
                    Some(byte_progress(&ctx.progress)),
                ),
            )
            .await;

            match result {
                Ok(bytes) => {
                    info!(%file_id, bytes, path = %path.display(), "Downloaded attachment");
                    ctx.complete(Ok(LocalFile::new(file_id, path)));
                }
                Err(e) => {
                    if let Err(cleanup) = tokio::fs::remove_dir_all(&directory).await {
                        warn!(directory = %directory.display(), error = %cleanup, "Failed to remove partial download");
                    }
                    ctx.complete(Err(ctx.error(e)));
                }
            }
        })
    }

    /// Deletes the remote item of `file` and forgets it locally
    pub fn delete_file(&self, file: &RemoteFile) -> Operation<(), FileError> {
        let file_id = file.identifier().to_string();
        let remote_id = file.remote_identifier().to_string();

        let this = self.clone();
        Operation::spawn(1, file_errors(&file_id), move |ctx| async move {
            let token = ctx.cancellation_token();
            let result = async {
                query::execute("files.delete", &token, this.api.delete_file(&remote_id)).await?;
                this.store
                    .delete_remote_file(&remote_id)
                    .await
                    .map_err(store_error)
            }
            .await;

            ctx.progress.complete_units(1);
            if result.is_ok() {
                info!(%file_id, %remote_id, "Deleted attachment");
            }
            ctx.complete(result.map_err(|e| ctx.error(e)));
        })
    }
}

fn download_directory() -> PathBuf {
    std::env::temp_dir().join(format!("drivesync-{}", uuid::Uuid::new_v4()))
}
