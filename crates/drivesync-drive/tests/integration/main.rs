//! Integration tests for drivesync-drive
//!
//! Uses wiremock to simulate the Google Drive v3 API and an in-memory
//! SQLite store to verify end-to-end behavior of bootstrap and delta
//! synchronization, record and attachment operations, and the session.

mod common;

mod test_bootstrap;
mod test_delta;
mod test_records;
mod test_session;
mod test_versions;
