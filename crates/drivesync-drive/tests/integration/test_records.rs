//! Integration tests for record operations through the service facade

use std::time::Duration;

use serde_json::json;
use wiremock::matchers::{body_string_contains, method, path, query_param, query_param_is_missing};
use wiremock::{Mock, ResponseTemplate};

use drivesync_core::domain::{
    LocalRecord, Metadata, RecordError, RecordStatus, SyncError, SyncRecord, Version,
};
use drivesync_core::ports::IRecordStore;

use crate::common;

fn local_record(id: &str) -> LocalRecord {
    LocalRecord::new(&common::key(id), json!({ "level": 7, "lives": 3 }))
}

fn metadata() -> Metadata {
    let mut metadata = Metadata::new();
    metadata.insert("platform".to_string(), "snes".to_string());
    metadata
}

#[tokio::test]
async fn test_upload_creates_new_record() {
    let (server, _) = common::setup_drive_mock().await;
    let (service, store) = common::setup_service(&server).await;

    Mock::given(method("POST"))
        .and(path("/files"))
        .and(query_param("uploadType", "multipart"))
        .and(body_string_contains("\"parents\":[\"appDataFolder\"]"))
        .and(body_string_contains("\"name\":\"Game-a\""))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(common::drive_file("drive-1", "a", "r1")),
        )
        .expect(1)
        .mount(&server)
        .await;

    let record = SyncRecord::new(common::key("a")).with_local(local_record("a"));
    let remote = service
        .upload_record(&record, metadata())
        .result()
        .await
        .expect("Upload failed");

    assert_eq!(remote.identifier(), "drive-1");
    assert_eq!(remote.status(), RecordStatus::Normal);
    let stored = store.get_remote_record(&common::key("a")).await.unwrap();
    assert_eq!(stored.map(|r| r.version_identifier().to_string()), Some("r1".to_string()));
}

#[tokio::test]
async fn test_upload_updates_live_record_in_place() {
    let (server, _) = common::setup_drive_mock().await;
    let (service, _store) = common::setup_service(&server).await;

    Mock::given(method("PATCH"))
        .and(path("/files/drive-1"))
        .and(query_param("uploadType", "multipart"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(common::drive_file("drive-1", "a", "r2")),
        )
        .expect(1)
        .mount(&server)
        .await;

    let record = SyncRecord::new(common::key("a"))
        .with_local(local_record("a"))
        .with_remote(common::remote_record("drive-1", "a", "r1"));
    let remote = service
        .upload_record(&record, metadata())
        .result()
        .await
        .expect("Upload failed");

    assert_eq!(remote.version_identifier(), "r2");
}

#[tokio::test]
async fn test_upload_recreates_deleted_record() {
    let (server, _) = common::setup_drive_mock().await;
    let (service, _store) = common::setup_service(&server).await;

    Mock::given(method("POST"))
        .and(path("/files"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(common::drive_file("drive-9", "a", "r1")),
        )
        .expect(1)
        .mount(&server)
        .await;

    let mut deleted = common::remote_record("drive-1", "a", "r1");
    deleted.set_status(RecordStatus::Deleted);
    let record = SyncRecord::new(common::key("a"))
        .with_local(local_record("a"))
        .with_remote(deleted);

    let remote = service.upload_record(&record, metadata()).result().await.unwrap();
    assert_eq!(remote.identifier(), "drive-9");
}

#[tokio::test]
async fn test_upload_without_local_half_fails_fast() {
    let (server, _) = common::setup_drive_mock().await;
    let (service, _store) = common::setup_service(&server).await;

    let record = SyncRecord::new(common::key("a"));
    let error = service
        .upload_record(&record, metadata())
        .result()
        .await
        .unwrap_err();

    assert_eq!(error, RecordError::NilLocalRecord(common::key("a")));
    assert!(server.received_requests().await.unwrap_or_default().is_empty());
}

#[tokio::test]
async fn test_upload_with_malformed_reply_is_invalid() {
    let (server, _) = common::setup_drive_mock().await;
    let (service, store) = common::setup_service(&server).await;

    Mock::given(method("POST"))
        .and(path("/files"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": "drive-1" })))
        .mount(&server)
        .await;

    let record = SyncRecord::new(common::key("a")).with_local(local_record("a"));
    let error = service
        .upload_record(&record, metadata())
        .result()
        .await
        .unwrap_err();

    assert_eq!(error, RecordError::sync(&common::key("a"), SyncError::InvalidResponse));
    assert_eq!(store.count_remote_records().await.unwrap(), 0);
}

#[tokio::test]
async fn test_download_decodes_revision() {
    let (server, _) = common::setup_drive_mock().await;
    let (service, _store) = common::setup_service(&server).await;

    let payload = serde_json::to_vec(&local_record("a")).unwrap();
    Mock::given(method("GET"))
        .and(path("/files/drive-1/revisions/r2"))
        .and(query_param("alt", "media"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(payload))
        .mount(&server)
        .await;

    let record = SyncRecord::new(common::key("a"))
        .with_remote(common::remote_record("drive-1", "a", "r2"));
    let version = Version::new("r2", chrono::Utc::now());
    let local = service
        .download_record(&record, &version)
        .result()
        .await
        .expect("Download failed");

    assert_eq!(local, local_record("a"));
}

#[tokio::test]
async fn test_download_of_garbage_is_codec_error() {
    let (server, _) = common::setup_drive_mock().await;
    let (service, _store) = common::setup_service(&server).await;

    Mock::given(method("GET"))
        .and(path("/files/drive-1/revisions/r2"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"not json".to_vec()))
        .mount(&server)
        .await;

    let record = SyncRecord::new(common::key("a"))
        .with_remote(common::remote_record("drive-1", "a", "r2"));
    let version = Version::new("r2", chrono::Utc::now());
    let error = service
        .download_record(&record, &version)
        .result()
        .await
        .unwrap_err();

    assert!(matches!(error, RecordError::Codec { .. }));
}

#[tokio::test]
async fn test_remote_operations_require_remote_half() {
    let (server, _) = common::setup_drive_mock().await;
    let (service, _store) = common::setup_service(&server).await;
    let record = SyncRecord::new(common::key("a")).with_local(local_record("a"));
    let expected = RecordError::NilRemoteRecord(common::key("a"));

    let version = Version::new("r1", chrono::Utc::now());
    assert_eq!(
        service.download_record(&record, &version).result().await.unwrap_err(),
        expected
    );
    assert_eq!(service.delete_record(&record).result().await.unwrap_err(), expected);
    assert_eq!(
        service
            .update_record_metadata(&record, metadata())
            .result()
            .await
            .unwrap_err(),
        expected
    );
}

#[tokio::test]
async fn test_delete_removes_remote_and_stored_record() {
    let (server, _) = common::setup_drive_mock().await;
    let (service, store) = common::setup_service(&server).await;

    let remote = common::remote_record("drive-1", "a", "r1");
    store.save_remote_records(&[remote.clone()]).await.unwrap();

    Mock::given(method("DELETE"))
        .and(path("/files/drive-1"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let record = SyncRecord::new(common::key("a")).with_remote(remote);
    service.delete_record(&record).result().await.expect("Delete failed");

    assert_eq!(store.count_remote_records().await.unwrap(), 0);
}

#[tokio::test]
async fn test_delete_missing_record_is_not_found() {
    let (server, _) = common::setup_drive_mock().await;
    let (service, _store) = common::setup_service(&server).await;

    Mock::given(method("DELETE"))
        .and(path("/files/drive-1"))
        .respond_with(common::error_response(404, "File not found: drive-1"))
        .mount(&server)
        .await;

    let record = SyncRecord::new(common::key("a"))
        .with_remote(common::remote_record("drive-1", "a", "r1"));
    let error = service.delete_record(&record).result().await.unwrap_err();

    assert_eq!(error, RecordError::sync(&common::key("a"), SyncError::ItemNotFound));
}

#[tokio::test]
async fn test_update_metadata_sends_no_media() {
    let (server, _) = common::setup_drive_mock().await;
    let (service, _store) = common::setup_service(&server).await;

    Mock::given(method("PATCH"))
        .and(path("/files/drive-1"))
        .and(query_param_is_missing("uploadType"))
        .and(body_string_contains("\"appProperties\":{\"platform\":\"snes\"}"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(common::drive_file("drive-1", "a", "r1")),
        )
        .expect(1)
        .mount(&server)
        .await;

    let record = SyncRecord::new(common::key("a"))
        .with_remote(common::remote_record("drive-1", "a", "r1"));
    service
        .update_record_metadata(&record, metadata())
        .result()
        .await
        .expect("Metadata update failed");
}

#[tokio::test]
async fn test_cancelled_upload_reports_cancellation() {
    let (server, _) = common::setup_drive_mock().await;
    let (service, store) = common::setup_service(&server).await;

    Mock::given(method("POST"))
        .and(path("/files"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(common::drive_file("drive-1", "a", "r1"))
                .set_delay(Duration::from_secs(10)),
        )
        .mount(&server)
        .await;

    let record = SyncRecord::new(common::key("a")).with_local(local_record("a"));
    let operation = service.upload_record(&record, metadata());
    tokio::time::sleep(Duration::from_millis(100)).await;
    operation.cancel();

    let error = operation.result().await.unwrap_err();
    assert!(error.is_cancelled());
    assert_eq!(store.count_remote_records().await.unwrap(), 0);
}
