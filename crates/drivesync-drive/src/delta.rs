//! Delta synchronization over the Drive change feed
//!
//! Given the cursor from the previous run, fetches the following change pages
//! and partitions them into records to upsert and identifiers to delete.
//!
//! ## Rules
//!
//! - The cursor is decoded before anything is sent; an undecodable cursor
//!   fails with [`SyncError::InvalidChangeToken`] and no request is made.
//! - Changes are read in feed order in a single pass. Entries that are not
//!   file changes, or lack a file id or removal flag, are ignored.
//! - When the same file appears more than once, the last entry wins: a
//!   removal drops an earlier upsert and an upsert drops an earlier removal.
//! - Upserts with a malformed file payload are dropped for good; the cursor
//!   still advances past them.
//! - Any failure returns no partial result, so the caller keeps its old
//!   cursor and can retry it unchanged.
//! - Progress counts one unit per page; the total grows as pages are
//!   discovered.
//!
//! The synchronizer does not write the store. Callers persist the result
//! with [`DeltaChanges::apply`] before storing the new cursor.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use drivesync_core::domain::{ChangeToken, RecordStatus, RemoteRecord, SyncError};
use drivesync_core::ports::IRecordStore;
use drivesync_core::progress::{Operation, OperationContext};
use tracing::{debug, info};

use crate::api::{Change, DriveApi};
use crate::convert::RecordParser;
use crate::query;

/// Change type of entries that describe files
const FILE_CHANGE: &str = "file";

/// Result of one delta run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeltaChanges {
    /// Created or modified records, with status `Updated`
    pub updated: HashSet<RemoteRecord>,
    /// Remote identifiers of removed records
    pub deleted: HashSet<String>,
    /// Cursor to present on the next run
    pub change_token: ChangeToken,
}

impl DeltaChanges {
    pub fn is_empty(&self) -> bool {
        self.updated.is_empty() && self.deleted.is_empty()
    }

    /// Writes the upserts and deletions to the store in one transaction
    pub async fn apply(&self, store: &dyn IRecordStore) -> Result<(), SyncError> {
        let updated: Vec<RemoteRecord> = self.updated.iter().cloned().collect();
        let deleted: Vec<String> = self.deleted.iter().cloned().collect();

        store
            .apply_remote_changes(&updated, &deleted)
            .await
            .map_err(|e| SyncError::Store(format!("{e:#}")))?;

        debug!(updated = updated.len(), deleted = deleted.len(), "Applied delta");
        Ok(())
    }
}

/// Accumulates change entries with last-entry-wins semantics
#[derive(Debug, Default)]
struct ChangeSet {
    updated: HashMap<String, RemoteRecord>,
    deleted: HashSet<String>,
    ignored: usize,
}

impl ChangeSet {
    fn push(&mut self, change: Change, parser: &RecordParser) {
        if change.kind() != Some(FILE_CHANGE) {
            self.ignored += 1;
            return;
        }
        let (Some(file_id), Some(removed)) = (change.file_id, change.removed) else {
            self.ignored += 1;
            return;
        };

        if removed {
            self.updated.remove(&file_id);
            self.deleted.insert(file_id);
            return;
        }

        let record = change
            .file
            .as_ref()
            .and_then(|file| parser.remote_record(file, RecordStatus::Updated));
        match record {
            Some(record) => {
                self.deleted.remove(&file_id);
                self.updated.insert(file_id, record);
            }
            None => self.ignored += 1,
        }
    }

    fn finish(self, change_token: ChangeToken) -> DeltaChanges {
        DeltaChanges {
            updated: self.updated.into_values().collect(),
            deleted: self.deleted,
            change_token,
        }
    }
}

/// Fetches changes since a cursor
#[derive(Clone)]
pub struct DeltaSynchronizer {
    api: Arc<dyn DriveApi>,
    parser: RecordParser,
}

impl DeltaSynchronizer {
    pub fn new(api: Arc<dyn DriveApi>, parser: RecordParser) -> Self {
        Self { api, parser }
    }

    /// Starts a delta run and returns its handle immediately
    pub fn fetch_changed_remote_records(&self, change_token: &ChangeToken) -> Operation<DeltaChanges> {
        let map_error = Operation::<DeltaChanges>::sync_errors();

        let page_token = match change_token.page_token() {
            Ok(page_token) => page_token.to_string(),
            Err(e) => {
                debug!(?change_token, "Rejecting undecodable change token");
                return Operation::failed(1, map_error, e);
            }
        };

        let this = self.clone();
        Operation::spawn(1, map_error, move |ctx| async move {
            let result = this.run(&ctx, page_token).await;
            if let Ok(changes) = &result {
                info!(
                    updated = changes.updated.len(),
                    deleted = changes.deleted.len(),
                    "Delta complete"
                );
            }
            ctx.complete(result);
        })
    }

    async fn run(
        &self,
        ctx: &OperationContext<DeltaChanges>,
        mut page_token: String,
    ) -> Result<DeltaChanges, SyncError> {
        let token = ctx.cancellation_token();
        let mut changes = ChangeSet::default();
        let mut pages = 0u64;

        loop {
            let page = query::execute(
                "changes.list",
                &token,
                self.api.list_changes(&page_token),
            )
            .await?;
            pages += 1;

            let entries = page.changes.ok_or(SyncError::InvalidResponse)?;
            for change in entries {
                changes.push(change, &self.parser);
            }

            if let Some(new_start) = page.new_start_page_token.filter(|t| !t.is_empty()) {
                ctx.progress.complete_units(1);
                debug!(pages, ignored = changes.ignored, "Change feed drained");
                return Ok(changes.finish(ChangeToken::from_page_token(&new_start)));
            }

            let next = page
                .next_page_token
                .filter(|t| !t.is_empty())
                .ok_or(SyncError::InvalidResponse)?;

            ctx.progress.set_total_units(pages + 1);
            ctx.progress.complete_units(1);
            page_token = next;
        }
    }
}
