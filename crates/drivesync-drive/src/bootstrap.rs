//! Bootstrap synchronization
//!
//! Seeds the local store with every record in the private space and returns
//! the change-feed cursor from which later delta runs continue.
//!
//! ## Flow
//!
//! 1. Two legs run concurrently under one [`Progress`] of two units:
//!    - **listing**: `files.list` over every page, records parsed and saved
//!      to the store speculatively;
//!    - **cursor**: `changes.getStartPageToken`.
//! 2. Each leg completes one unit whether it succeeded or not.
//! 3. The legs are joined only once both have finished.
//! 4. If either leg failed, the speculative save is reverted before the
//!    error is delivered. A listing error takes precedence over a cursor
//!    error.
//! 5. Cancellation only stops the legs. The worker reverts the speculative
//!    save and then delivers `Cancelled`, so a caller that sees the
//!    cancellation never finds records from this run in the store.
//!
//! Items that share a record key are resolved before saving: the one with the
//! latest modification time is kept, so the returned set matches the store.

use std::collections::hash_map::Entry;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use drivesync_core::domain::{ChangeToken, RecordKey, RecordStatus, RemoteRecord, SyncError};
use drivesync_core::ports::IRecordStore;
use drivesync_core::progress::{Operation, OperationContext, Progress};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::api::DriveApi;
use crate::convert::RecordParser;
use crate::query;

/// Units of work: one per leg
const LEGS: u64 = 2;

/// Every record in the private space plus the cursor to resume from
pub type BootstrapOutput = (HashSet<RemoteRecord>, ChangeToken);

/// Store writes made by the listing leg, kept until the join decides
/// whether they stand
#[derive(Debug, Default)]
struct SpeculativeSave {
    written: Vec<String>,
    replaced: Vec<RemoteRecord>,
}

impl SpeculativeSave {
    async fn revert(self, store: &dyn IRecordStore) {
        if self.written.is_empty() {
            return;
        }

        warn!(
            written = self.written.len(),
            restored = self.replaced.len(),
            "Rolling back speculatively saved records"
        );
        if let Err(e) = store
            .revert_remote_records(&self.written, &self.replaced)
            .await
        {
            error!(error = ?e, "Failed to roll back bootstrap records");
        }
    }
}

/// Runs the listing and start-cursor queries as one unit of work
#[derive(Clone)]
pub struct BootstrapSynchronizer {
    api: Arc<dyn DriveApi>,
    store: Arc<dyn IRecordStore>,
    parser: RecordParser,
}

impl BootstrapSynchronizer {
    pub fn new(api: Arc<dyn DriveApi>, store: Arc<dyn IRecordStore>, parser: RecordParser) -> Self {
        Self { api, store, parser }
    }

    /// Starts the bootstrap and returns its handle immediately
    pub fn fetch_all_remote_records(&self) -> Operation<BootstrapOutput> {
        let this = self.clone();
        Operation::spawn(LEGS, Operation::<BootstrapOutput>::sync_errors(), move |ctx| async move {
            this.run(ctx).await
        })
    }

    async fn run(self, ctx: OperationContext<BootstrapOutput>) {
        // The listing leg writes to the store before the join, so a
        // cancellation is reported only after those writes are undone.
        ctx.defer_cancellation();

        let token = ctx.cancellation_token();
        let progress = ctx.progress.clone();
        let store = self.store.clone();

        let listing = async {
            let result = self.listing_leg(&token).await;
            complete_leg(&progress, "listing");
            result
        };
        let cursor = async {
            let result = cursor_leg(self.api.as_ref(), &token).await;
            complete_leg(&progress, "cursor");
            result
        };

        let (listing, cursor) = tokio::join!(listing, cursor);

        let outcome = match (listing, cursor) {
            (Ok((records, save)), Ok(change_token)) => {
                if token.is_cancelled() {
                    debug!("Bootstrap finished after cancellation");
                    save.revert(store.as_ref()).await;
                    Err(SyncError::Cancelled)
                } else {
                    Ok((records, change_token, save))
                }
            }
            (Ok((_, save)), Err(e)) => {
                save.revert(store.as_ref()).await;
                Err(e)
            }
            (Err(e), _) => Err(e),
        };

        match outcome {
            Ok((records, change_token, save)) => {
                let count = records.len();
                match ctx.try_complete(Ok((records, change_token))) {
                    Ok(()) => info!(records = count, "Bootstrap complete"),
                    Err(_) => save.revert(store.as_ref()).await,
                }
            }
            Err(_) if token.is_cancelled() => {
                info!("Bootstrap cancelled");
                ctx.complete_cancelled();
            }
            Err(e) => {
                warn!(error = %e, "Bootstrap failed");
                ctx.complete(Err(e));
            }
        }
    }

    /// Lists every page, parses records and saves them speculatively
    async fn listing_leg(
        &self,
        token: &CancellationToken,
    ) -> Result<(HashSet<RemoteRecord>, SpeculativeSave), SyncError> {
        let mut by_key: HashMap<RecordKey, RemoteRecord> = HashMap::new();
        let mut skipped = 0usize;
        let mut duplicates = 0usize;
        let mut page_token: Option<String> = None;

        loop {
            let page = query::execute(
                "files.list",
                token,
                self.api.list_files(None, page_token.as_deref()),
            )
            .await?;

            let files = page.files.ok_or(SyncError::InvalidResponse)?;
            for file in &files {
                match self.parser.remote_record(file, RecordStatus::Normal) {
                    Some(record) => {
                        if keep_newest(&mut by_key, record) {
                            duplicates += 1;
                        }
                    }
                    None => skipped += 1,
                }
            }

            match page.next_page_token {
                Some(next) => page_token = Some(next),
                None => break,
            }
        }

        let records: HashSet<RemoteRecord> = by_key.into_values().collect();
        debug!(records = records.len(), skipped, duplicates, "Listing complete");

        let batch: Vec<RemoteRecord> = records.iter().cloned().collect();
        let replaced = self
            .store
            .save_remote_records(&batch)
            .await
            .map_err(|e| SyncError::Store(format!("{e:#}")))?;

        let save = SpeculativeSave {
            written: batch.iter().map(|r| r.identifier().to_string()).collect(),
            replaced,
        };
        Ok((records, save))
    }
}

async fn cursor_leg(api: &dyn DriveApi, token: &CancellationToken) -> Result<ChangeToken, SyncError> {
    let response = query::execute(
        "changes.getStartPageToken",
        token,
        api.get_start_page_token(),
    )
    .await?;

    response
        .start_page_token
        .filter(|t| !t.is_empty())
        .map(|t| ChangeToken::from_page_token(&t))
        .ok_or(SyncError::InvalidResponse)
}

/// Inserts `record` unless a newer item with the same key is already held
///
/// Returns true when one of the two was dropped. Ties go to the greater
/// remote identifier so repeated listings pick the same item.
fn keep_newest(by_key: &mut HashMap<RecordKey, RemoteRecord>, record: RemoteRecord) -> bool {
    match by_key.entry(record.key().clone()) {
        Entry::Vacant(slot) => {
            slot.insert(record);
            false
        }
        Entry::Occupied(mut slot) => {
            let held = slot.get();
            let newer = (record.version_date(), record.identifier())
                > (held.version_date(), held.identifier());
            let (kept, dropped) = if newer {
                (record.identifier().to_string(), held.identifier().to_string())
            } else {
                (held.identifier().to_string(), record.identifier().to_string())
            };
            warn!(record = %slot.key(), %kept, %dropped, "Duplicate items for one record");
            if newer {
                slot.insert(record);
            }
            true
        }
    }
}

fn complete_leg(progress: &Progress, leg: &'static str) {
    let completed = progress.complete_units(1);
    debug!(leg, completed, total = progress.total_units(), "Bootstrap leg finished");
}
