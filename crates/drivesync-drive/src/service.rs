//! Facade over every Drive operation for one signed-in account

use std::sync::Arc;

use drivesync_core::config::DriveConfig;
use drivesync_core::domain::{
    ChangeToken, FileError, LocalFile, LocalRecord, Metadata, RecordError, RecordKey,
    RemoteFile, RemoteRecord, SyncRecord, Version,
};
use drivesync_core::ports::{IRecordStore, RecordCodec};
use drivesync_core::progress::Operation;
use tracing::warn;

use crate::api::DriveApi;
use crate::bootstrap::{BootstrapOutput, BootstrapSynchronizer};
use crate::client::DriveClient;
use crate::convert::RecordParser;
use crate::delta::{DeltaChanges, DeltaSynchronizer};
use crate::files::FileOperations;
use crate::records::RecordOperations;
use crate::session::{AuthError, DriveSession};
use crate::versions::VersionHistory;

/// Entry point for applications: owns the session and every synchronizer
///
/// Operations return an [`Operation`] handle immediately; the work runs on
/// the current Tokio runtime.
pub struct DriveService {
    session: Arc<DriveSession>,
    bootstrap: BootstrapSynchronizer,
    delta: DeltaSynchronizer,
    records: RecordOperations,
    versions: VersionHistory,
    files: FileOperations,
}

impl DriveService {
    /// Builds a service talking to Drive through a [`DriveClient`] authorized
    /// by `session`
    pub fn new(
        config: &DriveConfig,
        session: Arc<DriveSession>,
        store: Arc<dyn IRecordStore>,
        codec: Arc<dyn RecordCodec>,
    ) -> Self {
        let client = DriveClient::from_config(config, session.clone());
        Self::with_api(config, session, Arc::new(client), store, codec)
    }

    /// Builds a service over any [`DriveApi`] implementation
    pub fn with_api(
        config: &DriveConfig,
        session: Arc<DriveSession>,
        api: Arc<dyn DriveApi>,
        store: Arc<dyn IRecordStore>,
        codec: Arc<dyn RecordCodec>,
    ) -> Self {
        if codec.mime_type() != config.record_mime_type {
            warn!(
                codec = codec.mime_type(),
                configured = %config.record_mime_type,
                "Record codec writes a MIME type that listings will skip"
            );
        }
        let parser = RecordParser::new(config.naming_convention, config.record_mime_type.clone());

        Self {
            session,
            bootstrap: BootstrapSynchronizer::new(api.clone(), store.clone(), parser.clone()),
            delta: DeltaSynchronizer::new(api.clone(), parser.clone()),
            records: RecordOperations::new(
                api.clone(),
                store.clone(),
                codec,
                parser,
                config.space.clone(),
            ),
            versions: VersionHistory::new(api.clone()),
            files: FileOperations::new(api, store, config.space.clone()),
        }
    }

    pub fn session(&self) -> &Arc<DriveSession> {
        &self.session
    }

    // --- Session ---

    pub async fn authenticate(&self) -> Result<(), AuthError> {
        self.session.authenticate().await
    }

    pub async fn authenticate_in_background(&self) -> Result<(), AuthError> {
        self.session.authenticate_in_background().await
    }

    pub async fn deauthenticate(&self) -> Result<(), AuthError> {
        self.session.deauthenticate().await
    }

    pub fn is_authenticated(&self) -> bool {
        self.session.is_authenticated()
    }

    // --- Synchronization ---

    pub fn fetch_all_remote_records(&self) -> Operation<BootstrapOutput> {
        self.bootstrap.fetch_all_remote_records()
    }

    pub fn fetch_changed_remote_records(&self, change_token: &ChangeToken) -> Operation<DeltaChanges> {
        self.delta.fetch_changed_remote_records(change_token)
    }

    // --- Records ---

    pub fn upload_record(
        &self,
        record: &SyncRecord,
        metadata: Metadata,
    ) -> Operation<RemoteRecord, RecordError> {
        self.records.upload_record(record, metadata)
    }

    pub fn download_record(
        &self,
        record: &SyncRecord,
        version: &Version,
    ) -> Operation<LocalRecord, RecordError> {
        self.records.download_record(record, version)
    }

    pub fn delete_record(&self, record: &SyncRecord) -> Operation<(), RecordError> {
        self.records.delete_record(record)
    }

    pub fn update_record_metadata(
        &self,
        record: &SyncRecord,
        metadata: Metadata,
    ) -> Operation<(), RecordError> {
        self.records.update_record_metadata(record, metadata)
    }

    pub fn fetch_versions(&self, record: &SyncRecord) -> Operation<Vec<Version>, RecordError> {
        self.versions.fetch_versions(record)
    }

    // --- Attachments ---

    pub fn upload_file(
        &self,
        file: &LocalFile,
        key: &RecordKey,
        metadata: Metadata,
    ) -> Operation<RemoteFile, FileError> {
        self.files.upload_file(file, key, metadata)
    }

    pub fn download_file(&self, file: &RemoteFile) -> Operation<LocalFile, FileError> {
        self.files.download_file(file)
    }

    pub fn delete_file(&self, file: &RemoteFile) -> Operation<(), FileError> {
        self.files.delete_file(file)
    }
}
