//! Integration tests for delta (incremental sync) queries
//!
//! Verifies end-to-end behavior of the delta synchronizer against a
//! wiremock-based Drive API:
//! - Undecodable cursors rejected without a request
//! - Pagination through `nextPageToken` up to `newStartPageToken`
//! - Partition into updates and deletions, last entry wins
//! - Non-file changes ignored
//! - Failures leave the old cursor replayable
//! - Replaying an unconsumed cursor returns the same changes
//! - Cancellation of an in-flight page

use std::time::{Duration, Instant};

use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, ResponseTemplate};

use drivesync_core::domain::{ChangeToken, RecordStatus, SyncError};
use drivesync_core::ports::IRecordStore;
use drivesync_drive::DeltaSynchronizer;

use crate::common;

#[tokio::test]
async fn test_invalid_token_fails_without_request() {
    let (server, api) = common::setup_drive_mock().await;

    let delta = DeltaSynchronizer::new(api, common::parser());
    let token = ChangeToken::from_bytes(vec![0xff, 0xfe, 0x00]);
    let error = delta
        .fetch_changed_remote_records(&token)
        .result()
        .await
        .unwrap_err();

    assert_eq!(error, SyncError::InvalidChangeToken(vec![0xff, 0xfe, 0x00]));
    let requests = server.received_requests().await.unwrap_or_default();
    assert!(requests.is_empty());
}

#[tokio::test]
async fn test_delta_partitions_updates_and_deletions() {
    let (server, api) = common::setup_drive_mock().await;

    common::mount_change_page(
        &server,
        "cursor-1",
        json!([
            common::file_change("drive-1", common::drive_file("drive-1", "a", "r2")),
            common::removal("drive-2")
        ]),
        None,
        Some("cursor-2"),
    )
    .await;

    let delta = DeltaSynchronizer::new(api, common::parser());
    let operation = delta.fetch_changed_remote_records(&ChangeToken::from_page_token("cursor-1"));
    let progress = operation.progress().clone();
    let changes = operation.result().await.expect("Delta failed");

    assert_eq!(changes.updated.len(), 1);
    let updated = changes.updated.iter().next().unwrap();
    assert_eq!(updated.identifier(), "drive-1");
    assert_eq!(updated.version_identifier(), "r2");
    assert_eq!(updated.status(), RecordStatus::Updated);
    assert!(changes.deleted.contains("drive-2"));
    assert_eq!(changes.change_token.page_token().unwrap(), "cursor-2");
    assert!(progress.is_finished());
}

#[tokio::test]
async fn test_same_cursor_yields_identical_changes() {
    let (server, api) = common::setup_drive_mock().await;

    common::mount_change_page(
        &server,
        "cursor-1",
        json!([
            common::file_change("drive-1", common::drive_file("drive-1", "a", "r2")),
            common::removal("drive-2"),
            common::file_change("drive-3", common::drive_file("drive-3", "c", "r5"))
        ]),
        Some("page-2"),
        None,
    )
    .await;
    common::mount_change_page(
        &server,
        "page-2",
        json!([common::removal("drive-4")]),
        None,
        Some("cursor-2"),
    )
    .await;

    let delta = DeltaSynchronizer::new(api, common::parser());
    let cursor = ChangeToken::from_page_token("cursor-1");

    let first = delta
        .fetch_changed_remote_records(&cursor)
        .result()
        .await
        .expect("First delta failed");
    let second = delta
        .fetch_changed_remote_records(&cursor)
        .result()
        .await
        .expect("Second delta failed");

    assert_eq!(first, second);
    assert_eq!(second.change_token.page_token().unwrap(), "cursor-2");

    // Record equality is by identifier; compare the versions as well.
    let versions = |changes: &drivesync_drive::DeltaChanges| {
        let mut versions: Vec<(String, String)> = changes
            .updated
            .iter()
            .map(|r| (r.identifier().to_string(), r.version_identifier().to_string()))
            .collect();
        versions.sort();
        versions
    };
    assert_eq!(versions(&first), versions(&second));
    assert_eq!(first.deleted.len(), 2);
}

#[tokio::test]
async fn test_delta_follows_next_page_token() {
    let (server, api) = common::setup_drive_mock().await;

    common::mount_change_page(
        &server,
        "cursor-1",
        json!([common::file_change("drive-1", common::drive_file("drive-1", "a", "r1"))]),
        Some("page-2"),
        None,
    )
    .await;
    common::mount_change_page(
        &server,
        "page-2",
        json!([
            common::removal("drive-1"),
            common::file_change("drive-3", common::drive_file("drive-3", "c", "r1"))
        ]),
        Some("page-3"),
        None,
    )
    .await;
    common::mount_change_page(&server, "page-3", json!([]), None, Some("cursor-9")).await;

    let delta = DeltaSynchronizer::new(api, common::parser());
    let operation = delta.fetch_changed_remote_records(&ChangeToken::from_page_token("cursor-1"));
    let progress = operation.progress().clone();
    let changes = operation.result().await.expect("Delta failed");

    let updated: Vec<&str> = changes.updated.iter().map(|r| r.identifier()).collect();
    assert_eq!(updated, vec!["drive-3"]);
    assert!(changes.deleted.contains("drive-1"));
    assert_eq!(changes.change_token.page_token().unwrap(), "cursor-9");
    assert_eq!(progress.total_units(), 3);
    assert_eq!(progress.completed_units(), 3);
}

#[tokio::test]
async fn test_delta_ignores_non_file_changes() {
    let (server, api) = common::setup_drive_mock().await;

    common::mount_change_page(
        &server,
        "cursor-1",
        json!([
            { "changeType": "drive", "driveId": "shared-1", "removed": false },
            { "changeType": "file", "removed": true },
            common::file_change("drive-1", common::drive_file("drive-1", "a", "r1"))
        ]),
        None,
        Some("cursor-2"),
    )
    .await;

    let delta = DeltaSynchronizer::new(api, common::parser());
    let changes = delta
        .fetch_changed_remote_records(&ChangeToken::from_page_token("cursor-1"))
        .result()
        .await
        .expect("Delta failed");

    assert_eq!(changes.updated.len(), 1);
    assert!(changes.deleted.is_empty());
}

#[tokio::test]
async fn test_failed_delta_can_be_replayed() {
    let (server, api) = common::setup_drive_mock().await;
    let cursor = ChangeToken::from_page_token("cursor-1");

    Mock::given(method("GET"))
        .and(path("/changes"))
        .respond_with(common::error_response(500, "Backend Error"))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    common::mount_change_page(
        &server,
        "cursor-1",
        json!([common::removal("drive-7")]),
        None,
        Some("cursor-2"),
    )
    .await;

    let delta = DeltaSynchronizer::new(api, common::parser());
    let error = delta
        .fetch_changed_remote_records(&cursor)
        .result()
        .await
        .unwrap_err();
    assert!(error.is_retryable());

    let changes = delta
        .fetch_changed_remote_records(&cursor)
        .result()
        .await
        .expect("Replay failed");
    assert!(changes.deleted.contains("drive-7"));
    assert_eq!(changes.change_token.page_token().unwrap(), "cursor-2");
}

#[tokio::test]
async fn test_page_without_any_token_is_invalid() {
    let (server, api) = common::setup_drive_mock().await;

    common::mount_change_page(&server, "cursor-1", json!([]), None, None).await;

    let delta = DeltaSynchronizer::new(api, common::parser());
    let error = delta
        .fetch_changed_remote_records(&ChangeToken::from_page_token("cursor-1"))
        .result()
        .await
        .unwrap_err();
    assert_eq!(error, SyncError::InvalidResponse);
}

#[tokio::test]
async fn test_missing_changes_is_invalid() {
    let (server, api) = common::setup_drive_mock().await;

    Mock::given(method("GET"))
        .and(path("/changes"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "newStartPageToken": "cursor-2" })),
        )
        .mount(&server)
        .await;

    let delta = DeltaSynchronizer::new(api, common::parser());
    let error = delta
        .fetch_changed_remote_records(&ChangeToken::from_page_token("cursor-1"))
        .result()
        .await
        .unwrap_err();
    assert_eq!(error, SyncError::InvalidResponse);
}

#[tokio::test]
async fn test_cancel_drops_pending_page() {
    let (server, api) = common::setup_drive_mock().await;

    Mock::given(method("GET"))
        .and(path("/changes"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "changes": [], "newStartPageToken": "cursor-2" }))
                .set_delay(Duration::from_secs(10)),
        )
        .mount(&server)
        .await;

    let delta = DeltaSynchronizer::new(api, common::parser());
    let operation = delta.fetch_changed_remote_records(&ChangeToken::from_page_token("cursor-1"));

    tokio::time::sleep(Duration::from_millis(100)).await;
    let started = Instant::now();
    operation.cancel();

    assert_eq!(operation.result().await.unwrap_err(), SyncError::Cancelled);
    assert!(started.elapsed() < Duration::from_secs(2));
}

#[tokio::test]
async fn test_applied_changes_update_store() {
    let (server, api) = common::setup_drive_mock().await;
    let store = common::setup_store().await;
    store
        .save_remote_records(&[
            common::remote_record("drive-1", "a", "r1"),
            common::remote_record("drive-2", "b", "r1"),
        ])
        .await
        .unwrap();

    common::mount_change_page(
        &server,
        "cursor-1",
        json!([
            common::file_change("drive-1", common::drive_file("drive-1", "a", "r2")),
            common::removal("drive-2")
        ]),
        None,
        Some("cursor-2"),
    )
    .await;

    let delta = DeltaSynchronizer::new(api, common::parser());
    let changes = delta
        .fetch_changed_remote_records(&ChangeToken::from_page_token("cursor-1"))
        .result()
        .await
        .expect("Delta failed");
    changes.apply(store.as_ref()).await.expect("Apply failed");

    let stored = store.list_remote_records().await.unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].identifier(), "drive-1");
    assert_eq!(stored[0].version_identifier(), "r2");
}
