//! In-memory remote store for testing
//!
//! Clones share state, so a test can keep a handle, seed documents "from
//! another device", and flip the store unavailable while the code under test
//! holds its own clone.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;

use super::{RemoteDocument, RemoteRecord, RemoteStore};
use crate::error::{Error, Result};
use crate::models::{Record, RecordKind};
use crate::snapshot::{SnapshotHub, Subscription};

type WatchKey = (RecordKind, String);

#[derive(Default)]
struct MockState {
    documents: HashMap<RecordKind, Vec<RemoteRecord>>,
    next_id: u64,
}

/// Mock remote store
#[derive(Clone)]
pub struct MockRemoteStore {
    state: Arc<Mutex<MockState>>,
    available: Arc<AtomicBool>,
    writes: Arc<AtomicUsize>,
    hub: SnapshotHub<WatchKey, Vec<RemoteRecord>>,
}

impl Default for MockRemoteStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MockRemoteStore {
    /// Create an empty, reachable store
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(MockState::default())),
            available: Arc::new(AtomicBool::new(true)),
            writes: Arc::new(AtomicUsize::new(0)),
            hub: SnapshotHub::new(),
        }
    }

    /// Create a store that rejects every call until `set_available(true)`
    pub fn unavailable() -> Self {
        let store = Self::new();
        store.set_available(false);
        store
    }

    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    pub fn is_available(&self) -> bool {
        self.available.load(Ordering::SeqCst)
    }

    /// Number of successful create/update calls so far
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    /// Store a document directly, as if another client had written it
    pub fn seed(&self, kind: RecordKind, record: RemoteRecord) {
        let user_id = record.user_id.clone();
        {
            let mut state = self.lock();
            let docs = state.documents.entry(kind).or_default();
            docs.retain(|d| d.remote_id != record.remote_id);
            docs.push(record);
        }
        self.notify(kind, &user_id);
    }

    /// Every stored document of a kind, regardless of user
    pub fn documents(&self, kind: RecordKind) -> Vec<RemoteRecord> {
        self.lock().documents.get(&kind).cloned().unwrap_or_default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn ensure_available(&self) -> Result<()> {
        if self.is_available() {
            Ok(())
        } else {
            Err(Error::RemoteUnavailable(
                "Mock remote store is offline".to_string(),
            ))
        }
    }

    fn list(&self, kind: RecordKind, user_id: &str) -> Vec<RemoteRecord> {
        let mut records: Vec<RemoteRecord> = self
            .lock()
            .documents
            .get(&kind)
            .map(|docs| {
                docs.iter()
                    .filter(|d| d.user_id == user_id)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        records.sort_by(|a, b| b.date.cmp(&a.date));
        records
    }

    fn notify(&self, kind: RecordKind, user_id: &str) {
        let key = (kind, user_id.to_string());
        // list() never fails, so neither does publish
        let _ = self.hub.publish(&key, || Ok(self.list(kind, user_id)));
    }
}

#[async_trait]
impl RemoteStore for MockRemoteStore {
    async fn fetch_records(&self, kind: RecordKind, user_id: &str) -> Result<Vec<RemoteRecord>> {
        self.ensure_available()?;
        Ok(self.list(kind, user_id))
    }

    async fn create_record(&self, kind: RecordKind, record: &Record) -> Result<String> {
        self.ensure_available()?;
        let remote_id = {
            let mut state = self.lock();
            state.next_id += 1;
            let remote_id = format!("mock-{}-{}", kind.as_str(), state.next_id);
            let doc = RemoteDocument::from_record(record).with_id(remote_id.clone());
            state.documents.entry(kind).or_default().push(doc);
            remote_id
        };
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.notify(kind, &record.user_id);
        Ok(remote_id)
    }

    async fn update_record(
        &self,
        kind: RecordKind,
        remote_id: &str,
        record: &Record,
    ) -> Result<()> {
        self.ensure_available()?;
        {
            let mut state = self.lock();
            let doc = state
                .documents
                .get_mut(&kind)
                .and_then(|docs| docs.iter_mut().find(|d| d.remote_id == remote_id))
                .ok_or_else(|| Error::NotFound(format!("Remote document {}", remote_id)))?;
            *doc = RemoteDocument::from_record(record).with_id(remote_id.to_string());
        }
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.notify(kind, &record.user_id);
        Ok(())
    }

    async fn delete_record(&self, kind: RecordKind, remote_id: &str) -> Result<()> {
        self.ensure_available()?;
        let removed = {
            let mut state = self.lock();
            let docs = state.documents.entry(kind).or_default();
            let position = docs.iter().position(|d| d.remote_id == remote_id);
            position.map(|i| docs.remove(i))
        };
        if let Some(doc) = removed {
            self.notify(kind, &doc.user_id);
        }
        Ok(())
    }

    async fn watch_records(
        &self,
        kind: RecordKind,
        user_id: &str,
    ) -> Result<Subscription<Vec<RemoteRecord>>> {
        self.ensure_available()?;
        self.hub
            .subscribe((kind, user_id.to_string()), || Ok(self.list(kind, user_id)))
    }

    async fn health_check(&self) -> bool {
        self.is_available()
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TimePeriod;

    fn expense(user_id: &str, title: &str) -> Record {
        Record {
            id: 7,
            kind: RecordKind::Expense,
            title: title.to_string(),
            amount: 25.0,
            time_period: TimePeriod::Weekly,
            category: "Transporte".to_string(),
            date: "2025-11-04".to_string(),
            user_id: user_id.to_string(),
            synced_with_remote: false,
            remote_id: None,
        }
    }

    #[tokio::test]
    async fn test_mock_store_scopes_by_user_and_kind() {
        let store = MockRemoteStore::new();
        store
            .create_record(RecordKind::Expense, &expense("u1", "Bus"))
            .await
            .unwrap();
        store
            .create_record(RecordKind::Expense, &expense("u2", "Taxi"))
            .await
            .unwrap();

        let u1 = store.fetch_records(RecordKind::Expense, "u1").await.unwrap();
        assert_eq!(u1.len(), 1);
        assert_eq!(u1[0].title, "Bus");
        assert!(store
            .fetch_records(RecordKind::Income, "u1")
            .await
            .unwrap()
            .is_empty());
        assert_eq!(store.write_count(), 2);
    }

    #[tokio::test]
    async fn test_unavailable_store_rejects_calls() {
        let store = MockRemoteStore::unavailable();
        let shared = store.clone();

        let err = shared
            .create_record(RecordKind::Expense, &expense("u1", "Bus"))
            .await
            .unwrap_err();
        assert!(err.is_remote());
        assert!(!shared.health_check().await);

        store.set_available(true);
        assert!(shared.health_check().await);
        assert_eq!(store.write_count(), 0);
    }

    #[tokio::test]
    async fn test_watch_sees_seeded_documents() {
        let store = MockRemoteStore::new();
        let mut sub = store.watch_records(RecordKind::Expense, "u1").await.unwrap();
        assert_eq!(sub.next().await, Some(vec![]));

        let doc = RemoteDocument::from_record(&expense("u1", "Pasaje")).with_id("r1".to_string());
        store.seed(RecordKind::Expense, doc.clone());

        assert_eq!(sub.next().await, Some(vec![doc]));
    }
}
