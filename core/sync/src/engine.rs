//! The upload-then-download sync pass.
//!
//! One pass uploads every dirty local record, applies the server's
//! verdicts, then downloads records changed since the persisted cursor.
//! The cursor advances to the pass's *start* time once both phases
//! complete, so anything a pass misses is covered again by the next one.
//! Records the server rejects stay dirty and go up again on later
//! passes; a phase that fails outright leaves the cursor untouched.
//! Records are applied last-write-wins.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use spendsync_common::{Error, Result};
use spendsync_net::wire::{SyncBatch, SyncOperation, SyncRecord};
use spendsync_net::{ConnectivityMonitor, ExpenseApi};
use spendsync_store::LocalStore;

use crate::status::SyncStatus;

/// Counters for one completed pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncStats {
    /// Records the server acknowledged this pass.
    pub uploaded: usize,
    /// Records the server rejected; they stay dirty for the next pass.
    pub upload_failures: usize,
    /// Server records applied locally this pass.
    pub downloaded: usize,
}

/// Drives sync passes against a [`LocalStore`] and an [`ExpenseApi`].
///
/// Generic over the API so tests run against [`spendsync_net::MemoryApi`].
/// At most one pass runs at a time; a second caller while a pass is in
/// flight gets `Ok(None)` instead of a concurrent pass.
pub struct SyncEngine<A: ExpenseApi + ?Sized> {
    store: Arc<LocalStore>,
    api: Arc<A>,
    connectivity: ConnectivityMonitor,
    in_flight: AtomicBool,
    status_tx: watch::Sender<SyncStatus>,
}

struct InFlightGuard<'a>(&'a AtomicBool);

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl<A: ExpenseApi + ?Sized> SyncEngine<A> {
    pub fn new(store: Arc<LocalStore>, api: Arc<A>, connectivity: ConnectivityMonitor) -> Self {
        let (status_tx, _) = watch::channel(SyncStatus::Idle);
        Self {
            store,
            api,
            connectivity,
            in_flight: AtomicBool::new(false),
            status_tx,
        }
    }

    pub fn status(&self) -> SyncStatus {
        self.status_tx.borrow().clone()
    }

    /// Watch sync lifecycle transitions, for status UI.
    pub fn subscribe(&self) -> watch::Receiver<SyncStatus> {
        self.status_tx.subscribe()
    }

    pub fn connectivity(&self) -> &ConnectivityMonitor {
        &self.connectivity
    }

    /// Records still waiting for upload, for the status indicator.
    pub fn pending_changes(&self) -> Result<usize> {
        self.store.pending_count()
    }

    fn set_status(&self, status: SyncStatus) {
        self.status_tx.send_replace(status);
    }

    /// Run one sync pass.
    ///
    /// Returns `Ok(None)` when a pass is already in flight. Offline is
    /// surfaced as [`Error::NoConnectivity`] with status `Offline`; the
    /// dirty set is untouched and re-covered once connectivity returns.
    pub async fn sync(&self) -> Result<Option<SyncStats>> {
        if !self.connectivity.is_connected() {
            self.set_status(SyncStatus::Offline);
            return Err(Error::NoConnectivity);
        }

        if self
            .in_flight
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            debug!("sync already in flight, skipping");
            return Ok(None);
        }
        let _guard = InFlightGuard(&self.in_flight);

        self.set_status(SyncStatus::Syncing);
        // Captured before the upload so changes made on the server while
        // this pass runs fall after the new cursor.
        let started = Utc::now();

        match self.run_pass().await {
            Ok(stats) => {
                // Rejected records stay in the dirty set and go up again
                // next pass, so they do not hold the cursor back.
                self.store.set_cursor(started)?;
                if stats.upload_failures > 0 {
                    warn!(
                        failed = stats.upload_failures,
                        "sync pass completed with rejected records"
                    );
                }
                info!(
                    uploaded = stats.uploaded,
                    downloaded = stats.downloaded,
                    "sync pass complete"
                );
                self.set_status(SyncStatus::Success);
                Ok(Some(stats))
            }
            Err(Error::NoConnectivity) => {
                self.set_status(SyncStatus::Offline);
                Err(Error::NoConnectivity)
            }
            Err(e) => {
                warn!(error = %e, "sync pass failed");
                self.set_status(SyncStatus::Failed(e.to_string()));
                Err(e)
            }
        }
    }

    async fn run_pass(&self) -> Result<SyncStats> {
        let mut stats = SyncStats::default();
        self.upload_changes(&mut stats).await?;
        self.download_changes(&mut stats).await?;
        Ok(stats)
    }

    /// Push the dirty set and apply the server's per-record verdicts.
    async fn upload_changes(&self, stats: &mut SyncStats) -> Result<()> {
        let pending = self.store.fetch_unsynced()?;
        let mut batch = Vec::with_capacity(pending.len());

        for stored in &pending {
            // A tombstone the server never saw needs no round trip.
            if stored.is_deleted && !stored.ever_synced {
                debug!(id = %stored.expense.id, "dropping never-synced tombstone");
                self.store.delete_hard(&stored.expense.id)?;
                continue;
            }

            let operation = if stored.is_deleted {
                SyncOperation::Delete
            } else if stored.ever_synced {
                SyncOperation::Update
            } else {
                SyncOperation::Create
            };
            batch.push(SyncRecord::from_expense(
                &stored.expense,
                operation,
                stored.ever_synced,
            ));
        }

        if batch.is_empty() {
            return Ok(());
        }

        info!(count = batch.len(), "uploading local changes");
        let report = self.api.push_changes(&SyncBatch { expenses: batch }).await?;

        for outcome in &report.results {
            let Some(local_id) = &outcome.local_id else {
                warn!("sync result without local id, ignoring");
                continue;
            };
            if outcome.success {
                self.store.mark_synced(local_id, outcome.data.as_ref())?;
                stats.uploaded += 1;
            } else {
                warn!(
                    %local_id,
                    error = outcome.error.as_deref().unwrap_or("unknown"),
                    "server rejected record, keeping it dirty"
                );
                stats.upload_failures += 1;
            }
        }
        Ok(())
    }

    /// Apply everything the server changed since the cursor.
    async fn download_changes(&self, stats: &mut SyncStats) -> Result<()> {
        let since: DateTime<Utc> = self.store.cursor()?;
        let changed = self.api.pull_changes(since).await?;
        if changed.is_empty() {
            return Ok(());
        }

        debug!(count = changed.len(), "applying server changes");
        for mut expense in changed {
            // Server records are clean by definition.
            if expense.synced_at.is_none() {
                expense.synced_at = Some(Utc::now());
            }
            self.store.upsert(&expense, false)?;
            stats.downloaded += 1;
        }
        Ok(())
    }
}
