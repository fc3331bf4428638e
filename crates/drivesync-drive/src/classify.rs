//! Error classification
//!
//! The one place where Drive failures are translated into [`SyncError`].
//! Every remote query goes through [`crate::query::execute`], which calls
//! [`classify`]; no other module inspects [`ApiError`].

use drivesync_core::domain::{AuthExpiry, SyncError};
use tracing::debug;

use crate::api::ApiError;
use crate::session::AuthError;

/// Maps a raw Drive failure onto the sync error taxonomy
pub fn classify(error: ApiError) -> SyncError {
    let classified = match &error {
        ApiError::Auth(AuthError::Cancelled) => SyncError::Cancelled,
        ApiError::Auth(AuthError::NoSavedCredentials) => {
            SyncError::AuthExpired(AuthExpiry::NoSavedCredentials)
        }
        ApiError::Auth(AuthError::Other(detail)) => SyncError::Transport(detail.clone()),
        ApiError::Http { status: 400 | 401, .. } => {
            SyncError::AuthExpired(AuthExpiry::TokenExpired)
        }
        ApiError::Http { status: 403, .. } => SyncError::RateLimited,
        ApiError::Http { status: 404, .. } => SyncError::ItemNotFound,
        ApiError::Decode(_) => SyncError::InvalidResponse,
        ApiError::Http { .. } | ApiError::Network(_) | ApiError::Io(_) => {
            SyncError::Transport(error.to_string())
        }
    };

    debug!(%error, ?classified, "Classified Drive error");
    classified
}
