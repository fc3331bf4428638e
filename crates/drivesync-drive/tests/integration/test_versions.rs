//! Integration tests for revision history

use serde_json::json;
use wiremock::matchers::{method, path, query_param, query_param_is_missing};
use wiremock::{Mock, ResponseTemplate};

use drivesync_core::domain::{RecordError, SyncError, SyncRecord};

use crate::common;

fn record() -> SyncRecord {
    SyncRecord::new(common::key("a")).with_remote(common::remote_record("drive-1", "a", "r3"))
}

#[tokio::test]
async fn test_versions_are_newest_first_across_pages() {
    let (server, _) = common::setup_drive_mock().await;
    let (service, _store) = common::setup_service(&server).await;

    Mock::given(method("GET"))
        .and(path("/files/drive-1/revisions"))
        .and(query_param_is_missing("pageToken"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "revisions": [
                { "id": "r1", "modifiedTime": "2026-01-01T10:00:00Z" },
                { "id": "r2", "modifiedTime": "2026-01-02T10:00:00Z" }
            ],
            "nextPageToken": "more"
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/files/drive-1/revisions"))
        .and(query_param("pageToken", "more"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "revisions": [
                { "id": "broken" },
                { "id": "r3", "modifiedTime": "2026-01-03T10:00:00Z" }
            ]
        })))
        .mount(&server)
        .await;

    let versions = service
        .fetch_versions(&record())
        .result()
        .await
        .expect("Fetching versions failed");

    let identifiers: Vec<&str> = versions.iter().map(|v| v.identifier.as_str()).collect();
    assert_eq!(identifiers, vec!["r3", "r2", "r1"]);
    assert!(versions[0].date > versions[1].date);
}

#[tokio::test]
async fn test_missing_revisions_is_invalid() {
    let (server, _) = common::setup_drive_mock().await;
    let (service, _store) = common::setup_service(&server).await;

    Mock::given(method("GET"))
        .and(path("/files/drive-1/revisions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .mount(&server)
        .await;

    let error = service.fetch_versions(&record()).result().await.unwrap_err();
    assert_eq!(error, RecordError::sync(&common::key("a"), SyncError::InvalidResponse));
}

#[tokio::test]
async fn test_versions_need_remote_half() {
    let (server, _) = common::setup_drive_mock().await;
    let (service, _store) = common::setup_service(&server).await;

    let error = service
        .fetch_versions(&SyncRecord::new(common::key("a")))
        .result()
        .await
        .unwrap_err();
    assert_eq!(error, RecordError::NilRemoteRecord(common::key("a")));
}
