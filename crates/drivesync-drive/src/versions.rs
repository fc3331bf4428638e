//! Revision history of a record

use std::sync::Arc;

use drivesync_core::domain::{RecordError, SyncError, SyncRecord, Version};
use drivesync_core::progress::Operation;
use tracing::debug;

use crate::api::DriveApi;
use crate::convert;
use crate::query;
use crate::records::record_errors;

/// Lists the stored revisions of records
#[derive(Clone)]
pub struct VersionHistory {
    api: Arc<dyn DriveApi>,
}

impl VersionHistory {
    pub fn new(api: Arc<dyn DriveApi>) -> Self {
        Self { api }
    }

    /// Fetches every revision of `record`, newest first
    ///
    /// Revisions without an id or a valid modification time are left out.
    pub fn fetch_versions(&self, record: &SyncRecord) -> Operation<Vec<Version>, RecordError> {
        let key = record.key.clone();
        let map_error = record_errors(&key);

        let Some(remote) = record.remote.as_ref() else {
            return Operation::failed(1, map_error, RecordError::NilRemoteRecord(key));
        };
        let file_id = remote.identifier().to_string();

        let api = self.api.clone();
        Operation::spawn(1, map_error, move |ctx| async move {
            let token = ctx.cancellation_token();
            let mut versions = Vec::new();
            let mut page_token: Option<String> = None;

            let result = loop {
                let page = match query::execute(
                    "revisions.list",
                    &token,
                    api.list_revisions(&file_id, page_token.as_deref()),
                )
                .await
                {
                    Ok(page) => page,
                    Err(e) => break Err(e),
                };

                let Some(revisions) = page.revisions else {
                    break Err(SyncError::InvalidResponse);
                };
                versions.extend(revisions.iter().filter_map(convert::version));

                match page.next_page_token {
                    Some(next) => page_token = Some(next),
                    None => break Ok(()),
                }
            };

            ctx.progress.complete_units(1);
            let result = result.map(|()| {
                // Drive lists revisions oldest first.
                versions.reverse();
                debug!(record = %key, versions = versions.len(), "Fetched versions");
                versions
            });
            ctx.complete(result.map_err(|e| ctx.error(e)));
        })
    }
}
