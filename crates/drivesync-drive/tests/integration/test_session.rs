//! Integration tests for the session seen through the service
//!
//! Covers bearer-token injection, signed-out requests failing before they
//! reach the network, and sign-out.

use std::sync::Arc;

use serde_json::json;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, ResponseTemplate};

use drivesync_core::domain::{AuthExpiry, ChangeToken, SyncError};
use drivesync_core::ports::JsonRecordCodec;
use drivesync_drive::session::DriveSession;
use drivesync_drive::DriveService;

use crate::common;

#[tokio::test]
async fn test_requests_carry_session_token() {
    let (server, _) = common::setup_drive_mock().await;
    let (service, _store) = common::setup_service(&server).await;
    assert!(service.is_authenticated());

    Mock::given(method("GET"))
        .and(path("/changes"))
        .and(header("authorization", format!("Bearer {}", common::ACCESS_TOKEN).as_str()))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "changes": [],
            "newStartPageToken": "cursor-2"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let changes = service
        .fetch_changed_remote_records(&ChangeToken::from_page_token("cursor-1"))
        .result()
        .await
        .expect("Delta failed");
    assert!(changes.is_empty());
}

#[tokio::test]
async fn test_signed_out_session_fails_without_request() {
    let (server, _) = common::setup_drive_mock().await;
    let store = common::setup_store().await;
    let session = DriveSession::new(Arc::new(common::FixedAuthenticator));
    let service = DriveService::new(
        &common::drive_config(&server),
        session,
        store,
        Arc::new(JsonRecordCodec),
    );

    let error = service
        .fetch_all_remote_records()
        .result()
        .await
        .unwrap_err();

    assert_eq!(error, SyncError::AuthExpired(AuthExpiry::NoSavedCredentials));
    assert!(server.received_requests().await.unwrap_or_default().is_empty());
}

#[tokio::test]
async fn test_deauthenticate_signs_out() {
    let (server, _) = common::setup_drive_mock().await;
    let (service, _store) = common::setup_service(&server).await;

    service.deauthenticate().await.expect("Sign-out failed");
    assert!(!service.is_authenticated());

    service.authenticate().await.expect("Sign-in failed");
    assert!(service.is_authenticated());
}
