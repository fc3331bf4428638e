//! Integration tests for bootstrap synchronization
//!
//! Runs the listing and cursor legs against a wiremock Drive API and an
//! in-memory store:
//! - Paginated listing with the start cursor
//! - Malformed and foreign items skipped
//! - Rollback of speculative writes on failure, including restored rows
//! - Listing errors taking precedence over cursor errors
//! - Cancellation while a query is in flight

use std::time::{Duration, Instant};

use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, ResponseTemplate};

use drivesync_core::domain::{AuthExpiry, SyncError};
use drivesync_core::ports::IRecordStore;
use drivesync_drive::BootstrapSynchronizer;

use crate::common;

#[tokio::test]
async fn test_bootstrap_lists_every_page() {
    let (server, api) = common::setup_drive_mock().await;
    let store = common::setup_store().await;

    common::mount_file_page(
        &server,
        None,
        json!([common::drive_file("drive-1", "a", "r1")]),
        Some("page-2"),
    )
    .await;
    common::mount_file_page(
        &server,
        Some("page-2"),
        json!([common::drive_file("drive-2", "b", "r1")]),
        None,
    )
    .await;
    common::mount_start_page_token(&server, "start-42").await;

    let bootstrap = BootstrapSynchronizer::new(api, store.clone(), common::parser());
    let operation = bootstrap.fetch_all_remote_records();
    let progress = operation.progress().clone();

    let (records, change_token) = operation.result().await.expect("Bootstrap failed");

    assert_eq!(records.len(), 2);
    assert_eq!(change_token.page_token().unwrap(), "start-42");
    assert_eq!(progress.completed_units(), 2);
    assert_eq!(progress.total_units(), 2);

    let stored = store.list_remote_records().await.unwrap();
    assert_eq!(stored.len(), 2);
    assert!(stored.iter().all(|r| records.contains(r)));
}

#[tokio::test]
async fn test_bootstrap_skips_malformed_items() {
    let (server, api) = common::setup_drive_mock().await;
    let store = common::setup_store().await;

    let mut malformed = common::drive_file("drive-4", "d", "r1");
    malformed["headRevisionId"] = serde_json::Value::Null;
    let mut attachment = common::drive_file("drive-5", "e", "r1");
    attachment["mimeType"] = json!("application/octet-stream");

    common::mount_file_page(
        &server,
        None,
        json!([
            common::drive_file("drive-1", "a", "r1"),
            common::drive_file("drive-2", "b", "r1"),
            malformed,
            common::drive_file("drive-3", "c", "r1"),
            attachment
        ]),
        None,
    )
    .await;
    common::mount_start_page_token(&server, "start-1").await;

    let bootstrap = BootstrapSynchronizer::new(api, store.clone(), common::parser());
    let (records, _) = bootstrap
        .fetch_all_remote_records()
        .result()
        .await
        .expect("Bootstrap failed");

    let mut identifiers: Vec<&str> = records.iter().map(|r| r.identifier()).collect();
    identifiers.sort();
    assert_eq!(identifiers, vec!["drive-1", "drive-2", "drive-3"]);
    assert_eq!(store.count_remote_records().await.unwrap(), 3);
}

#[tokio::test]
async fn test_cursor_failure_rolls_back_listing() {
    let (server, api) = common::setup_drive_mock().await;
    let store = common::setup_store().await;

    common::mount_file_page(
        &server,
        None,
        json!([
            common::drive_file("drive-1", "a", "r1"),
            common::drive_file("drive-2", "b", "r1")
        ]),
        None,
    )
    .await;
    Mock::given(method("GET"))
        .and(path("/changes/startPageToken"))
        .respond_with(common::error_response(500, "Backend Error"))
        .mount(&server)
        .await;

    let bootstrap = BootstrapSynchronizer::new(api, store.clone(), common::parser());
    let operation = bootstrap.fetch_all_remote_records();
    let progress = operation.progress().clone();

    let error = operation.result().await.unwrap_err();

    assert!(matches!(error, SyncError::Transport(_)));
    assert_eq!(progress.completed_units(), 2);
    assert_eq!(store.count_remote_records().await.unwrap(), 0);
}

#[tokio::test]
async fn test_rollback_restores_replaced_rows() {
    let (server, api) = common::setup_drive_mock().await;
    let store = common::setup_store().await;

    let previous = common::remote_record("drive-1", "a", "old-rev");
    store.save_remote_records(&[previous.clone()]).await.unwrap();

    common::mount_file_page(
        &server,
        None,
        json!([
            common::drive_file("drive-1", "a", "new-rev"),
            common::drive_file("drive-2", "b", "r1")
        ]),
        None,
    )
    .await;
    Mock::given(method("GET"))
        .and(path("/changes/startPageToken"))
        .respond_with(common::error_response(403, "Rate Limit Exceeded"))
        .mount(&server)
        .await;

    let bootstrap = BootstrapSynchronizer::new(api, store.clone(), common::parser());
    let error = bootstrap.fetch_all_remote_records().result().await.unwrap_err();
    assert_eq!(error, SyncError::RateLimited);

    let stored = store.list_remote_records().await.unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].identifier(), "drive-1");
    assert_eq!(stored[0].version_identifier(), "old-rev");
    assert_eq!(stored[0].version_date(), previous.version_date());
}

#[tokio::test]
async fn test_listing_error_takes_precedence() {
    let (server, api) = common::setup_drive_mock().await;
    let store = common::setup_store().await;

    Mock::given(method("GET"))
        .and(path("/files"))
        .respond_with(common::error_response(404, "File not found"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/changes/startPageToken"))
        .respond_with(common::error_response(403, "Rate Limit Exceeded"))
        .mount(&server)
        .await;

    let bootstrap = BootstrapSynchronizer::new(api, store, common::parser());
    let error = bootstrap.fetch_all_remote_records().result().await.unwrap_err();

    assert_eq!(error, SyncError::ItemNotFound);
}

#[tokio::test]
async fn test_missing_fields_are_invalid_responses() {
    let (server, api) = common::setup_drive_mock().await;
    let store = common::setup_store().await;

    Mock::given(method("GET"))
        .and(path("/files"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .mount(&server)
        .await;
    common::mount_start_page_token(&server, "start-1").await;

    let bootstrap = BootstrapSynchronizer::new(api, store.clone(), common::parser());
    let error = bootstrap.fetch_all_remote_records().result().await.unwrap_err();
    assert_eq!(error, SyncError::InvalidResponse);

    let (server, api) = common::setup_drive_mock().await;
    common::mount_file_page(&server, None, json!([common::drive_file("drive-1", "a", "r1")]), None)
        .await;
    common::mount_start_page_token(&server, "").await;

    let bootstrap = BootstrapSynchronizer::new(api, store.clone(), common::parser());
    let error = bootstrap.fetch_all_remote_records().result().await.unwrap_err();
    assert_eq!(error, SyncError::InvalidResponse);
    assert_eq!(store.count_remote_records().await.unwrap(), 0);
}

#[tokio::test]
async fn test_expired_token_is_reported() {
    let (server, api) = common::setup_drive_mock().await;
    let store = common::setup_store().await;

    Mock::given(method("GET"))
        .and(path("/files"))
        .respond_with(common::error_response(401, "Invalid Credentials"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/changes/startPageToken"))
        .respond_with(common::error_response(401, "Invalid Credentials"))
        .mount(&server)
        .await;

    let bootstrap = BootstrapSynchronizer::new(api, store, common::parser());
    let error = bootstrap.fetch_all_remote_records().result().await.unwrap_err();

    assert_eq!(error, SyncError::AuthExpired(AuthExpiry::TokenExpired));
}

#[tokio::test]
async fn test_cancel_delivers_single_cancellation() {
    let (server, api) = common::setup_drive_mock().await;
    let store = common::setup_store().await;

    Mock::given(method("GET"))
        .and(path("/files"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "files": [common::drive_file("drive-1", "a", "r1")] }))
                .set_delay(Duration::from_secs(10)),
        )
        .mount(&server)
        .await;
    common::mount_start_page_token(&server, "start-1").await;

    let bootstrap = BootstrapSynchronizer::new(api, store.clone(), common::parser());
    let operation = bootstrap.fetch_all_remote_records();
    let progress = operation.progress().clone();

    tokio::time::sleep(Duration::from_millis(100)).await;
    let started = Instant::now();
    operation.cancel();

    let error = operation.result().await.unwrap_err();
    assert_eq!(error, SyncError::Cancelled);
    assert!(started.elapsed() < Duration::from_secs(2));

    // Both legs have reported by the time the cancellation is delivered.
    assert_eq!(progress.completed_units(), 2);
    assert_eq!(store.count_remote_records().await.unwrap(), 0);
}

#[tokio::test]
async fn test_cancel_after_listing_rolls_back() {
    let (server, api) = common::setup_drive_mock().await;
    let store = common::setup_store().await;

    let previous = common::remote_record("drive-1", "a", "old-rev");
    store.save_remote_records(&[previous]).await.unwrap();

    common::mount_file_page(
        &server,
        None,
        json!([
            common::drive_file("drive-1", "a", "new-rev"),
            common::drive_file("drive-2", "b", "r1")
        ]),
        None,
    )
    .await;
    Mock::given(method("GET"))
        .and(path("/changes/startPageToken"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "startPageToken": "start-1" }))
                .set_delay(Duration::from_secs(10)),
        )
        .mount(&server)
        .await;

    let bootstrap = BootstrapSynchronizer::new(api, store.clone(), common::parser());
    let operation = bootstrap.fetch_all_remote_records();

    // Let the listing leg save before the cursor leg is cancelled.
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(store.count_remote_records().await.unwrap(), 2);
    operation.cancel();
    assert_eq!(operation.result().await.unwrap_err(), SyncError::Cancelled);

    // Checked as soon as the cancellation arrives.
    let stored = store.list_remote_records().await.unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].identifier(), "drive-1");
    assert_eq!(stored[0].version_identifier(), "old-rev");
}

#[tokio::test]
async fn test_duplicate_items_keep_latest_modification() {
    let (server, api) = common::setup_drive_mock().await;
    let store = common::setup_store().await;

    let mut older = common::drive_file("drive-1", "a", "r1");
    older["modifiedTime"] = json!("2026-01-01T00:00:00Z");
    let newer = common::drive_file("drive-2", "a", "r7");

    common::mount_file_page(
        &server,
        None,
        json!([newer, common::drive_file("drive-3", "b", "r1")]),
        Some("page-2"),
    )
    .await;
    common::mount_file_page(&server, Some("page-2"), json!([older]), None).await;
    common::mount_start_page_token(&server, "start-1").await;

    let bootstrap = BootstrapSynchronizer::new(api, store.clone(), common::parser());
    let (records, _) = bootstrap
        .fetch_all_remote_records()
        .result()
        .await
        .expect("Bootstrap failed");

    let mut returned: Vec<&str> = records.iter().map(|r| r.identifier()).collect();
    returned.sort();
    assert_eq!(returned, vec!["drive-2", "drive-3"]);

    let stored: Vec<String> = store
        .list_remote_records()
        .await
        .unwrap()
        .iter()
        .map(|r| r.identifier().to_string())
        .collect();
    assert_eq!(stored, vec!["drive-2", "drive-3"]);
}
