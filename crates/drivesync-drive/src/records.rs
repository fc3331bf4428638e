//! Record upload, download, deletion and metadata updates
//!
//! Each record is one JSON item in the private space, named after its key.
//! Uploads update the existing item in place while the remote half is live
//! and create a new item otherwise.

use std::sync::Arc;

use drivesync_core::domain::{
    LocalRecord, Metadata, RecordError, RecordKey, RecordStatus, RemoteRecord, SyncError,
    SyncRecord, Version,
};
use drivesync_core::ports::{IRecordStore, RecordCodec};
use drivesync_core::progress::{ErrorMapper, Operation};
use tracing::{debug, info};

use crate::api::{DriveApi, FileMetadata, Media};
use crate::convert::RecordParser;
use crate::query;

/// Maps classified errors onto the given record
pub(crate) fn record_errors(key: &RecordKey) -> ErrorMapper<RecordError> {
    let key = key.clone();
    Arc::new(move |error| RecordError::sync(&key, error))
}

pub(crate) fn store_error(error: anyhow::Error) -> SyncError {
    SyncError::Store(format!("{error:#}"))
}

/// Record-level operations against Drive
#[derive(Clone)]
pub struct RecordOperations {
    api: Arc<dyn DriveApi>,
    store: Arc<dyn IRecordStore>,
    codec: Arc<dyn RecordCodec>,
    parser: RecordParser,
    space: String,
}

impl RecordOperations {
    pub fn new(
        api: Arc<dyn DriveApi>,
        store: Arc<dyn IRecordStore>,
        codec: Arc<dyn RecordCodec>,
        parser: RecordParser,
        space: impl Into<String>,
    ) -> Self {
        Self {
            api,
            store,
            codec,
            parser,
            space: space.into(),
        }
    }

    /// Uploads the local half of `record` and stores the resulting remote half
    pub fn upload_record(
        &self,
        record: &SyncRecord,
        metadata: Metadata,
    ) -> Operation<RemoteRecord, RecordError> {
        let key = record.key.clone();
        let map_error = record_errors(&key);

        let Some(local) = record.local.as_ref() else {
            return Operation::failed(1, map_error, RecordError::NilLocalRecord(key));
        };
        let data = match self.codec.encode(local) {
            Ok(data) => data,
            Err(e) => {
                let message = format!("{e:#}");
                return Operation::failed(1, map_error, RecordError::Codec { key, message });
            }
        };

        let mut file = FileMetadata {
            name: Some(key.remote_name()),
            mime_type: Some(self.codec.mime_type().to_string()),
            parents: None,
            app_properties: Some(metadata),
        };
        let existing = record.live_remote_identifier().map(str::to_string);
        if existing.is_none() {
            file.parents = Some(vec![self.space.clone()]);
        }
        let media = Media::new(self.codec.mime_type(), data);

        let this = self.clone();
        Operation::spawn(1, map_error, move |ctx| async move {
            let token = ctx.cancellation_token();
            let result = async {
                let uploaded = match &existing {
                    Some(file_id) => {
                        debug!(record = %key, %file_id, "Updating record");
                        query::execute(
                            "files.update",
                            &token,
                            this.api.update_file(file_id, &file, Some(media)),
                        )
                        .await?
                    }
                    None => {
                        debug!(record = %key, "Creating record");
                        query::execute("files.create", &token, this.api.create_file(&file, media))
                            .await?
                    }
                };

                let remote = this
                    .parser
                    .remote_record(&uploaded, RecordStatus::Normal)
                    .ok_or(SyncError::InvalidResponse)?;
                this.store
                    .save_remote_records(&[remote.clone()])
                    .await
                    .map_err(store_error)?;
                Ok::<_, SyncError>(remote)
            }
            .await;

            ctx.progress.complete_units(1);
            if let Ok(remote) = &result {
                info!(record = %key, file_id = remote.identifier(), "Uploaded record");
            }
            ctx.complete(result.map_err(|e| ctx.error(e)));
        })
    }

    /// Downloads and decodes the given revision of `record`
    pub fn download_record(
        &self,
        record: &SyncRecord,
        version: &Version,
    ) -> Operation<LocalRecord, RecordError> {
        let key = record.key.clone();
        let map_error = record_errors(&key);

        let Some(remote) = record.remote.as_ref() else {
            return Operation::failed(1, map_error, RecordError::NilRemoteRecord(key));
        };
        let file_id = remote.identifier().to_string();
        let revision_id = version.identifier.clone();

        let this = self.clone();
        Operation::spawn(1, map_error, move |ctx| async move {
            let token = ctx.cancellation_token();
            let result = query::execute(
                "revisions.get",
                &token,
                this.api.download_revision(&file_id, &revision_id),
            )
            .await
            .map_err(|e| ctx.error(e))
            .and_then(|bytes| {
                this.codec.decode(&key, &bytes).map_err(|e| RecordError::Codec {
                    key: key.clone(),
                    message: format!("{e:#}"),
                })
            });

            ctx.progress.complete_units(1);
            ctx.complete(result);
        })
    }

    /// Deletes the remote item of `record` and forgets it locally
    pub fn delete_record(&self, record: &SyncRecord) -> Operation<(), RecordError> {
        let key = record.key.clone();
        let map_error = record_errors(&key);

        let Some(remote) = record.remote.as_ref() else {
            return Operation::failed(1, map_error, RecordError::NilRemoteRecord(key));
        };
        let file_id = remote.identifier().to_string();

        let this = self.clone();
        Operation::spawn(1, map_error, move |ctx| async move {
            let token = ctx.cancellation_token();
            let result = async {
                query::execute("files.delete", &token, this.api.delete_file(&file_id)).await?;
                this.store
                    .delete_remote_records(&[file_id.clone()])
                    .await
                    .map_err(store_error)
            }
            .await;

            ctx.progress.complete_units(1);
            if result.is_ok() {
                info!(record = %key, %file_id, "Deleted record");
            }
            ctx.complete(result.map_err(|e| ctx.error(e)));
        })
    }

    /// Replaces the sidecar metadata of the remote item without new content
    pub fn update_record_metadata(
        &self,
        record: &SyncRecord,
        metadata: Metadata,
    ) -> Operation<(), RecordError> {
        let key = record.key.clone();
        let map_error = record_errors(&key);

        let Some(remote) = record.remote.as_ref() else {
            return Operation::failed(1, map_error, RecordError::NilRemoteRecord(key));
        };
        let file_id = remote.identifier().to_string();
        let file = FileMetadata {
            name: Some(key.remote_name()),
            mime_type: Some(self.codec.mime_type().to_string()),
            parents: None,
            app_properties: Some(metadata),
        };

        let this = self.clone();
        Operation::spawn(1, map_error, move |ctx| async move {
            let token = ctx.cancellation_token();
            let result = query::execute(
                "files.update",
                &token,
                this.api.update_file(&file_id, &file, None),
            )
            .await
            .map(|_| ());

            ctx.progress.complete_units(1);
            ctx.complete(result.map_err(|e| ctx.error(e)));
        })
    }
}
