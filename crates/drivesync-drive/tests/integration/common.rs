//! Shared helpers for Drive adapter integration tests
//!
//! Provides a wiremock server standing in for the Drive v3 API, a client and
//! service pointed at it, and an in-memory record store.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration, TimeZone, Utc};
use serde_json::{json, Value};
use wiremock::matchers::{method, path, query_param, query_param_is_missing};
use wiremock::{Mock, MockServer, ResponseTemplate};

use drivesync_cache::{DatabasePool, StoreSerializer};
use drivesync_core::config::DriveConfig;
use drivesync_core::domain::{Metadata, NamingConvention, RecordKey, RecordStatus, RemoteRecord};
use drivesync_core::ports::{IRecordStore, JsonRecordCodec};
use drivesync_drive::convert::RecordParser;
use drivesync_drive::session::{AuthError, Authenticator, DriveSession, Tokens};
use drivesync_drive::{DriveApi, DriveClient, DriveService, StaticToken};

pub const ACCESS_TOKEN: &str = "test-access-token";
pub const RECORD_MIME_TYPE: &str = "application/json";
pub const MODIFIED_TIME: &str = "2026-02-10T09:30:00Z";

// ============================================================================
// Fixtures
// ============================================================================

pub fn key(id: &str) -> RecordKey {
    RecordKey::new("Game", id).unwrap()
}

pub fn parser() -> RecordParser {
    RecordParser::new(NamingConvention::FirstSeparator, RECORD_MIME_TYPE)
}

/// A record item as Drive returns it
pub fn drive_file(id: &str, record_id: &str, revision: &str) -> Value {
    json!({
        "id": id,
        "name": format!("Game-{record_id}"),
        "mimeType": RECORD_MIME_TYPE,
        "headRevisionId": revision,
        "modifiedTime": MODIFIED_TIME,
        "appProperties": { "platform": "snes" }
    })
}

/// A stored record as bootstrap would have written it
pub fn remote_record(identifier: &str, record_id: &str, revision: &str) -> RemoteRecord {
    let mut metadata = Metadata::new();
    metadata.insert("platform".to_string(), "snes".to_string());

    RemoteRecord::new(
        identifier,
        revision,
        Utc.with_ymd_and_hms(2026, 1, 5, 8, 0, 0).unwrap(),
        key(record_id),
        metadata,
        RecordStatus::Normal,
    )
    .unwrap()
}

pub fn file_change(id: &str, file: Value) -> Value {
    json!({ "changeType": "file", "fileId": id, "removed": false, "file": file })
}

pub fn removal(id: &str) -> Value {
    json!({ "changeType": "file", "fileId": id, "removed": true })
}

// ============================================================================
// Wiring
// ============================================================================

/// Starts a mock server and returns a client authorized with a static token
pub async fn setup_drive_mock() -> (MockServer, Arc<dyn DriveApi>) {
    let server = MockServer::start().await;
    let client = DriveClient::with_base_url(
        Arc::new(StaticToken(ACCESS_TOKEN.to_string())),
        server.uri(),
    );
    (server, Arc::new(client))
}

/// Fresh in-memory store behind its serializer task
pub async fn setup_store() -> Arc<dyn IRecordStore> {
    let pool = DatabasePool::in_memory()
        .await
        .expect("Failed to create in-memory database");
    Arc::new(StoreSerializer::spawn(pool, 16))
}

pub fn drive_config(server: &MockServer) -> DriveConfig {
    DriveConfig {
        api_base_url: server.uri(),
        upload_base_url: server.uri(),
        ..DriveConfig::default()
    }
}

/// Authenticator that hands out a fixed token without user interaction
pub struct FixedAuthenticator;

pub fn tokens() -> Tokens {
    Tokens {
        access_token: ACCESS_TOKEN.to_string(),
        refresh_token: Some("test-refresh-token".to_string()),
        expires_at: Utc::now() + Duration::hours(1),
    }
}

#[async_trait]
impl Authenticator for FixedAuthenticator {
    async fn sign_in(&self) -> Result<Tokens, AuthError> {
        Ok(tokens())
    }

    async fn sign_in_silently(&self) -> Result<Tokens, AuthError> {
        Ok(tokens())
    }

    async fn sign_out(&self) -> Result<(), AuthError> {
        Ok(())
    }
}

/// A signed-in service over the mock server and a fresh store
pub async fn setup_service(server: &MockServer) -> (DriveService, Arc<dyn IRecordStore>) {
    let store = setup_store().await;
    let session = DriveSession::new(Arc::new(FixedAuthenticator));
    session
        .authenticate_in_background()
        .await
        .expect("Silent sign-in failed");

    let service = DriveService::new(
        &drive_config(server),
        session,
        store.clone(),
        Arc::new(JsonRecordCodec),
    );
    (service, store)
}

// ============================================================================
// Mocks
// ============================================================================

/// Mounts one `files.list` page, selected by its page token
pub async fn mount_file_page(
    server: &MockServer,
    page_token: Option<&str>,
    files: Value,
    next_page_token: Option<&str>,
) {
    let mut body = json!({ "files": files });
    if let Some(next) = next_page_token {
        body["nextPageToken"] = json!(next);
    }

    let mock = Mock::given(method("GET")).and(path("/files"));
    let mock = match page_token {
        Some(token) => mock.and(query_param("pageToken", token)),
        None => mock.and(query_param_is_missing("pageToken")),
    };
    mock.respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(server)
        .await;
}

pub async fn mount_start_page_token(server: &MockServer, token: &str) {
    Mock::given(method("GET"))
        .and(path("/changes/startPageToken"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "startPageToken": token })),
        )
        .mount(server)
        .await;
}

/// Mounts one `changes.list` page, selected by its page token
pub async fn mount_change_page(
    server: &MockServer,
    page_token: &str,
    changes: Value,
    next_page_token: Option<&str>,
    new_start_page_token: Option<&str>,
) {
    let mut body = json!({ "changes": changes });
    if let Some(next) = next_page_token {
        body["nextPageToken"] = json!(next);
    }
    if let Some(new_start) = new_start_page_token {
        body["newStartPageToken"] = json!(new_start);
    }

    Mock::given(method("GET"))
        .and(path("/changes"))
        .and(query_param("pageToken", page_token))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(server)
        .await;
}

/// Drive's JSON error envelope with the given status
pub fn error_response(status: u16, message: &str) -> ResponseTemplate {
    ResponseTemplate::new(status).set_body_json(json!({
        "error": { "code": status, "message": message }
    }))
}
