//! Local-first sync policy
//!
//! `RecordRepository` coordinates the local store and the remote store for
//! one record kind. The local store is authoritative:
//!
//! - reads answer from local data first, then merge whatever the remote
//!   store returns and emit again
//! - writes land locally, then go upstream in the background; a failed
//!   upstream write leaves the record `synced_with_remote = false` until a
//!   sweep (`sync_pending`) succeeds
//!
//! The same policy serves expenses and incomes.

use std::sync::{Arc, Mutex, PoisonError};

use chrono::NaiveDate;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::{AbortHandle, JoinSet};
use tracing::{debug, info, warn};

use crate::db::{Database, RecordChanges, SyncMark};
use crate::error::{Error, Result};
use crate::models::{NewRecord, Record, RecordKind};
use crate::remote::{RemoteClient, RemoteRecord, RemoteStore};
use crate::snapshot::{SnapshotHub, Subscription};
use crate::stats::filter_by_period;

/// Where a snapshot's contents came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SnapshotSource {
    /// Local records only
    Local,
    /// Local records after merging the remote store's documents
    Merged,
}

/// The full list of a user's records at one point in time
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Snapshot {
    pub source: SnapshotSource,
    pub records: Vec<Record>,
}

/// Outcome of a sweep over unsynced records
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub attempted: usize,
    pub pushed: usize,
    pub failed: usize,
}

/// Keeps a remote subscription merging into local storage until dropped
pub struct MirrorHandle {
    task: AbortHandle,
}

impl MirrorHandle {
    pub fn stop(self) {}
}

impl Drop for MirrorHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Local-first repository for one record kind
#[derive(Clone)]
pub struct RecordRepository {
    db: Database,
    remote: RemoteClient,
    kind: RecordKind,
    hub: SnapshotHub<String, Vec<Record>>,
    pending: Arc<Mutex<JoinSet<()>>>,
    /// Upstream writes run one at a time so a record is never created twice
    push_lock: Arc<tokio::sync::Mutex<()>>,
}

impl RecordRepository {
    pub fn new(db: Database, remote: RemoteClient, kind: RecordKind) -> Self {
        Self {
            db,
            remote,
            kind,
            hub: SnapshotHub::new(),
            pending: Arc::new(Mutex::new(JoinSet::new())),
            push_lock: Arc::new(tokio::sync::Mutex::new(())),
        }
    }

    pub fn expenses(db: Database, remote: RemoteClient) -> Self {
        Self::new(db, remote, RecordKind::Expense)
    }

    pub fn incomes(db: Database, remote: RemoteClient) -> Self {
        Self::new(db, remote, RecordKind::Income)
    }

    pub fn kind(&self) -> RecordKind {
        self.kind
    }

    /// Stream snapshots of a user's records
    ///
    /// Emits a `Local` snapshot when local data exists, then a `Merged`
    /// snapshot once the remote fetch succeeds. With no local data and a
    /// failing remote, a single error is emitted. Dropping the receiver
    /// cancels the fetch; records merged so far stay merged.
    pub fn fetch_records(&self, user_id: &str) -> mpsc::Receiver<Result<Snapshot>> {
        let (tx, rx) = mpsc::channel(2);
        let repo = self.clone();
        let user_id = user_id.to_string();

        tokio::spawn(async move {
            repo.run_fetch(&user_id, tx).await;
        });

        rx
    }

    async fn run_fetch(&self, user_id: &str, tx: mpsc::Sender<Result<Snapshot>>) {
        let local = match self.db.list_records(self.kind, user_id) {
            Ok(records) => records,
            Err(e) => {
                let _ = tx.send(Err(e)).await;
                return;
            }
        };

        let had_local = !local.is_empty();
        if had_local {
            let snapshot = Snapshot {
                source: SnapshotSource::Local,
                records: local,
            };
            if tx.send(Ok(snapshot)).await.is_err() {
                return;
            }
        }

        let fetched = tokio::select! {
            _ = tx.closed() => {
                debug!(kind = %self.kind, user_id = %user_id, "Fetch cancelled");
                return;
            }
            result = self.remote.fetch_records(self.kind, user_id) => result,
        };

        let remote_records = match fetched {
            Ok(records) => records,
            Err(e) if had_local => {
                warn!(kind = %self.kind, error = %e, "Remote fetch failed, keeping local snapshot");
                return;
            }
            Err(e) => {
                let _ = tx.send(Err(e)).await;
                return;
            }
        };

        for remote in &remote_records {
            if tx.is_closed() {
                debug!(kind = %self.kind, user_id = %user_id, "Fetch cancelled during merge");
                self.publish(user_id);
                return;
            }
            if let Err(e) = self.merge_one(user_id, remote) {
                let _ = tx.send(Err(e)).await;
                return;
            }
        }

        let merged = match self.db.list_records(self.kind, user_id) {
            Ok(records) => records,
            Err(e) => {
                let _ = tx.send(Err(e)).await;
                return;
            }
        };
        self.publish(user_id);

        debug!(
            kind = %self.kind,
            remote = remote_records.len(),
            merged = merged.len(),
            "Merged remote records"
        );
        let _ = tx
            .send(Ok(Snapshot {
                source: SnapshotSource::Merged,
                records: merged,
            }))
            .await;
    }

    /// Upsert one remote document into local storage; invalid or foreign
    /// documents are skipped
    fn merge_one(&self, user_id: &str, remote: &RemoteRecord) -> Result<bool> {
        if remote.user_id != user_id {
            warn!(kind = %self.kind, remote_id = %remote.remote_id, "Skipping remote document for another user");
            return Ok(false);
        }
        if let Err(e) = remote.validate() {
            warn!(kind = %self.kind, remote_id = %remote.remote_id, error = %e, "Skipping invalid remote document");
            return Ok(false);
        }
        self.db.upsert_remote_record(self.kind, remote)?;
        Ok(true)
    }

    /// Merge a batch of remote documents, returning how many were stored
    pub fn merge_remote(&self, user_id: &str, remote_records: &[RemoteRecord]) -> Result<usize> {
        let mut merged = 0;
        for remote in remote_records {
            if self.merge_one(user_id, remote)? {
                merged += 1;
            }
        }
        self.publish(user_id);
        Ok(merged)
    }

    /// Store a new record locally and push it upstream in the background
    ///
    /// Returns the stored record (with its local id) as soon as the local
    /// insert succeeds. Invalid input is rejected before anything is written.
    pub async fn add_record(&self, user_id: &str, record: NewRecord) -> Result<Record> {
        record.validate()?;

        let id = self.db.insert_record(self.kind, user_id, &record)?;
        let stored = self
            .db
            .get_record(id)?
            .ok_or_else(|| Error::NotFound(format!("{} {}", self.kind, id)))?;
        debug!(kind = %self.kind, id = id, "Stored record locally");

        self.publish(user_id);
        self.spawn_push(stored.id);
        Ok(stored)
    }

    /// Edit a record locally; it stays unsynced until the upstream update lands
    pub async fn update_record(&self, id: i64, changes: RecordChanges) -> Result<Option<Record>> {
        match self.get_record(id)? {
            Some(_) => {}
            None => return Ok(None),
        }

        let Some(updated) = self.db.update_record(id, &changes)? else {
            return Ok(None);
        };
        self.publish(&updated.user_id);
        self.spawn_push(updated.id);
        Ok(Some(updated))
    }

    /// Delete a record locally, then best-effort upstream
    pub async fn delete_record(&self, id: i64) -> Result<bool> {
        let Some(record) = self.get_record(id)? else {
            return Ok(false);
        };

        self.db.delete_record(id)?;
        self.publish(&record.user_id);

        if let Some(remote_id) = &record.remote_id {
            match self.remote.delete_record(self.kind, remote_id).await {
                Ok(()) => debug!(kind = %self.kind, remote_id = %remote_id, "Deleted remote document"),
                Err(e) => warn!(kind = %self.kind, remote_id = %remote_id, error = %e, "Remote delete failed"),
            }
        }
        Ok(true)
    }

    /// A record of this repository's kind by local id
    pub fn get_record(&self, id: i64) -> Result<Option<Record>> {
        Ok(self.db.get_record(id)?.filter(|r| r.kind == self.kind))
    }

    /// Local records for a user, newest first
    pub fn list_local(&self, user_id: &str) -> Result<Vec<Record>> {
        self.db.list_records(self.kind, user_id)
    }

    /// Local records inside the named period
    pub fn records_by_period(
        &self,
        user_id: &str,
        period_tag: &str,
        reference: NaiveDate,
    ) -> Result<Vec<Record>> {
        let records = self.db.list_records(self.kind, user_id)?;
        Ok(filter_by_period(&records, period_tag, reference))
    }

    /// Local records dated within `[from, to]`
    pub fn records_between(
        &self,
        user_id: &str,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<Record>> {
        self.db.list_records_between(self.kind, user_id, from, to)
    }

    pub fn total_for_user(&self, user_id: &str) -> Result<f64> {
        self.db.total_for_user(self.kind, user_id)
    }

    /// Delete every local record of this kind for a user
    pub fn purge_user(&self, user_id: &str) -> Result<usize> {
        let removed = self.db.delete_records_for_user(self.kind, user_id)?;
        self.publish(user_id);
        Ok(removed)
    }

    /// Live view of a user's local records
    pub fn subscribe(&self, user_id: &str) -> Result<Subscription<Vec<Record>>> {
        self.hub.subscribe(user_id.to_string(), || {
            self.db.list_records(self.kind, user_id)
        })
    }

    /// Follow the remote store's push subscription, merging every snapshot
    /// into local storage until the handle is dropped
    pub async fn mirror_remote(&self, user_id: &str) -> Result<MirrorHandle> {
        let mut remote_sub = self.remote.watch_records(self.kind, user_id).await?;
        let repo = self.clone();
        let user_id = user_id.to_string();

        let task = tokio::spawn(async move {
            while let Some(remote_records) = remote_sub.next().await {
                match repo.merge_remote(&user_id, &remote_records) {
                    Ok(merged) => debug!(kind = %repo.kind, merged = merged, "Mirrored remote snapshot"),
                    Err(e) => warn!(kind = %repo.kind, error = %e, "Failed to mirror remote snapshot"),
                }
            }
        });

        Ok(MirrorHandle {
            task: task.abort_handle(),
        })
    }

    /// Re-attempt the upstream write for every unsynced record of a user
    ///
    /// Idempotent: a second sweep with nothing pending attempts nothing.
    /// Local store failures abort the sweep; remote failures are counted.
    pub async fn sync_pending(&self, user_id: &str) -> Result<SweepReport> {
        // Let in-flight background writes settle so nothing is pushed twice
        self.flush_pending().await;

        let pending = self.db.list_unsynced(self.kind, user_id)?;
        let mut report = SweepReport {
            attempted: pending.len(),
            ..Default::default()
        };

        for record in &pending {
            match self.push(record.id).await {
                Ok(true) => report.pushed += 1,
                Ok(false) => {
                    debug!(kind = %self.kind, id = record.id, "Record changed during upload, still pending");
                    report.failed += 1;
                }
                Err(e) if e.is_local_store() => return Err(e),
                Err(e) => {
                    debug!(kind = %self.kind, id = record.id, error = %e, "Sweep push failed");
                    report.failed += 1;
                }
            }
        }

        if report.attempted > 0 {
            info!(
                kind = %self.kind,
                attempted = report.attempted,
                pushed = report.pushed,
                failed = report.failed,
                "Sync sweep finished"
            );
        }
        Ok(report)
    }

    /// Wait for every background upstream write started so far
    pub async fn flush_pending(&self) {
        let mut tasks = std::mem::take(&mut *self.lock_pending());
        while let Some(result) = tasks.join_next().await {
            if let Err(e) = result {
                warn!(kind = %self.kind, error = %e, "Upstream write task failed");
            }
        }
    }

    fn lock_pending(&self) -> std::sync::MutexGuard<'_, JoinSet<()>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn spawn_push(&self, id: i64) {
        if self.remote.is_offline() {
            debug!(kind = %self.kind, id = id, "No remote store, record stays local");
            return;
        }

        let repo = self.clone();
        let mut tasks = self.lock_pending();
        // Reap finished writes
        while tasks.try_join_next().is_some() {}
        tasks.spawn(async move {
            if let Err(e) = repo.push(id).await {
                warn!(kind = %repo.kind, id = id, error = %e, "Upstream write failed, record stays unsynced");
            }
        });
    }

    /// Create or update the remote document for a record, then mark it synced
    ///
    /// The row is read once the previous write has finished, so a queued
    /// push after an edit sees the remote id the earlier create stored.
    /// Returns `false` when the row changed while the write was in flight.
    async fn push(&self, id: i64) -> Result<bool> {
        let _turn = self.push_lock.lock().await;

        let Some(record) = self.get_record(id)? else {
            debug!(kind = %self.kind, id = id, "Record deleted before upload");
            return Ok(true);
        };
        if record.synced_with_remote {
            return Ok(true);
        }

        let (remote_id, created) = match &record.remote_id {
            Some(remote_id) => {
                self.remote
                    .update_record(self.kind, remote_id, &record)
                    .await?;
                (remote_id.clone(), false)
            }
            None => (self.remote.create_record(self.kind, &record).await?, true),
        };

        match self.db.mark_synced(&record, &remote_id)? {
            SyncMark::Synced => {
                debug!(kind = %self.kind, id = id, remote_id = %remote_id, "Record synced");
                self.publish(&record.user_id);
                Ok(true)
            }
            SyncMark::Stale => {
                debug!(kind = %self.kind, id = id, remote_id = %remote_id, "Record edited during upload");
                self.publish(&record.user_id);
                Ok(false)
            }
            SyncMark::Missing => {
                // Deleted locally while the write was in flight
                if created {
                    if let Err(e) = self.remote.delete_record(self.kind, &remote_id).await {
                        warn!(kind = %self.kind, remote_id = %remote_id, error = %e, "Failed to remove orphaned remote document");
                    }
                }
                Ok(true)
            }
        }
    }

    fn publish(&self, user_id: &str) {
        let result = self.hub.publish(&user_id.to_string(), || {
            self.db.list_records(self.kind, user_id)
        });
        if let Err(e) = result {
            warn!(kind = %self.kind, error = %e, "Failed to refresh record subscribers");
        }
    }
}
