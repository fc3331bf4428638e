//! Remote query adapter
//!
//! Runs one Drive request as a cancellable unit. The request future races the
//! operation's cancellation token; cancelling drops the in-flight request,
//! which aborts the underlying HTTP exchange. A response that is already
//! complete when cancellation fires may still win the race: delivering exactly
//! one outcome to the caller is the job of [`Completion`], not of this module.
//!
//! [`Completion`]: drivesync_core::progress::Completion

use std::future::Future;

use drivesync_core::domain::SyncError;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::api::ApiError;
use crate::classify::classify;

/// Executes `request` unless `token` is cancelled first
///
/// Errors are classified before they are returned.
pub async fn execute<T, F>(name: &'static str, token: &CancellationToken, request: F) -> Result<T, SyncError>
where
    F: Future<Output = Result<T, ApiError>>,
{
    if token.is_cancelled() {
        debug!(query = name, "Query cancelled before it was sent");
        return Err(SyncError::Cancelled);
    }

    debug!(query = name, "Executing query");
    tokio::select! {
        _ = token.cancelled() => {
            debug!(query = name, "Query cancelled");
            Err(SyncError::Cancelled)
        }
        result = request => {
            if let Err(error) = &result {
                debug!(query = name, %error, "Query failed");
            }
            result.map_err(classify)
        }
    }
}
