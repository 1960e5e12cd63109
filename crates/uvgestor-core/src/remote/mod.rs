//! Pluggable remote document store
//!
//! The remote store is a secondary replica of the user's records. Nothing in
//! the app blocks on it: failures surface as `Error::RemoteUnavailable` and
//! the sync layer decides whether local data can stand in.
//!
//! # Architecture
//!
//! - `RemoteStore` trait: the operations every backend provides
//! - `RemoteClient` enum: concrete wrapper providing Clone + compile-time dispatch
//! - Backends: `HttpRemoteStore` (JSON document API), `MockRemoteStore`
//!   (in-memory), and `RemoteClient::Offline` when nothing is configured
//!
//! # Document shape
//!
//! Records live in the `expenses` and `incomes` collections as
//! `{"id", "title", "amount", "timePeriod", "category", "date", "userId", "createdAt"}`.

mod http;
mod mock;

pub use http::HttpRemoteStore;
pub use mock::MockRemoteStore;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::RemoteConfig;
use crate::error::{Error, Result};
use crate::models::{NewRecord, Record, RecordKind, TimePeriod};
use crate::snapshot::Subscription;

/// A record document as stored remotely
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteRecord {
    #[serde(rename = "id")]
    pub remote_id: String,
    pub title: String,
    pub amount: f64,
    pub time_period: TimePeriod,
    pub category: String,
    pub date: String,
    pub user_id: String,
    /// Milliseconds since the epoch, as written by the client that created it
    #[serde(default)]
    pub created_at: i64,
}

impl RemoteRecord {
    /// Documents written by other clients are not trusted to be valid
    pub fn validate(&self) -> Result<()> {
        if self.remote_id.trim().is_empty() {
            return Err(Error::Validation("Remote document has no id".to_string()));
        }
        NewRecord {
            title: self.title.clone(),
            amount: self.amount,
            time_period: self.time_period,
            category: self.category.clone(),
            date: self.date.clone(),
        }
        .validate()
    }
}

/// Payload sent when creating or updating a remote document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteDocument {
    pub title: String,
    pub amount: f64,
    pub time_period: TimePeriod,
    pub category: String,
    pub date: String,
    pub user_id: String,
    pub created_at: i64,
}

impl RemoteDocument {
    pub fn from_record(record: &Record) -> Self {
        Self {
            title: record.title.clone(),
            amount: record.amount,
            time_period: record.time_period,
            category: record.category.clone(),
            date: record.date.clone(),
            user_id: record.user_id.clone(),
            created_at: chrono::Utc::now().timestamp_millis(),
        }
    }

    pub fn with_id(self, remote_id: String) -> RemoteRecord {
        RemoteRecord {
            remote_id,
            title: self.title,
            amount: self.amount,
            time_period: self.time_period,
            category: self.category,
            date: self.date,
            user_id: self.user_id,
            created_at: self.created_at,
        }
    }
}

/// Trait defining the interface for all remote stores
///
/// Backends must be Send + Sync so upstream writes can run on spawned tasks.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// All documents of a kind belonging to a user, newest date first
    async fn fetch_records(&self, kind: RecordKind, user_id: &str) -> Result<Vec<RemoteRecord>>;

    /// Create a document and return the id the store assigned
    async fn create_record(&self, kind: RecordKind, record: &Record) -> Result<String>;

    /// Overwrite an existing document
    async fn update_record(&self, kind: RecordKind, remote_id: &str, record: &Record)
        -> Result<()>;

    async fn delete_record(&self, kind: RecordKind, remote_id: &str) -> Result<()>;

    /// Push subscription over a user's documents
    ///
    /// The first snapshot is fetched before returning, so an unreachable store
    /// fails here rather than on the first `next()`.
    async fn watch_records(
        &self,
        kind: RecordKind,
        user_id: &str,
    ) -> Result<Subscription<Vec<RemoteRecord>>>;

    /// Check if the store is reachable
    async fn health_check(&self) -> bool;

    /// Short backend name (for logging)
    fn name(&self) -> &'static str;
}

/// Concrete remote client enum
///
/// Provides Clone and compile-time dispatch without Box<dyn> overhead.
#[derive(Clone)]
pub enum RemoteClient {
    /// JSON document API over HTTP
    Http(HttpRemoteStore),
    /// In-memory store for tests and demos
    Mock(MockRemoteStore),
    /// No remote configured; every call reports the store as unavailable
    Offline,
}

impl RemoteClient {
    /// Build a client from the `[remote]` config section
    ///
    /// Returns `Offline` when no URL is configured. The special URL `mock://`
    /// selects an in-memory store.
    pub fn from_config(config: Option<&RemoteConfig>) -> Result<Self> {
        match config {
            Some(cfg) if cfg.url.starts_with("mock://") => Ok(Self::mock()),
            Some(cfg) => Ok(Self::Http(HttpRemoteStore::from_config(cfg)?)),
            None => Ok(Self::Offline),
        }
    }

    pub fn http(base_url: &str) -> Result<Self> {
        Ok(Self::Http(HttpRemoteStore::new(base_url)?))
    }

    /// Create a mock store for testing
    pub fn mock() -> Self {
        Self::Mock(MockRemoteStore::new())
    }

    pub fn is_offline(&self) -> bool {
        matches!(self, Self::Offline)
    }

    fn offline() -> Error {
        Error::RemoteUnavailable("No remote store configured".to_string())
    }
}

// Implement RemoteStore for RemoteClient by delegating to the inner backend
#[async_trait]
impl RemoteStore for RemoteClient {
    async fn fetch_records(&self, kind: RecordKind, user_id: &str) -> Result<Vec<RemoteRecord>> {
        match self {
            Self::Http(s) => s.fetch_records(kind, user_id).await,
            Self::Mock(s) => s.fetch_records(kind, user_id).await,
            Self::Offline => Err(Self::offline()),
        }
    }

    async fn create_record(&self, kind: RecordKind, record: &Record) -> Result<String> {
        match self {
            Self::Http(s) => s.create_record(kind, record).await,
            Self::Mock(s) => s.create_record(kind, record).await,
            Self::Offline => Err(Self::offline()),
        }
    }

    async fn update_record(
        &self,
        kind: RecordKind,
        remote_id: &str,
        record: &Record,
    ) -> Result<()> {
        match self {
            Self::Http(s) => s.update_record(kind, remote_id, record).await,
            Self::Mock(s) => s.update_record(kind, remote_id, record).await,
            Self::Offline => Err(Self::offline()),
        }
    }

    async fn delete_record(&self, kind: RecordKind, remote_id: &str) -> Result<()> {
        match self {
            Self::Http(s) => s.delete_record(kind, remote_id).await,
            Self::Mock(s) => s.delete_record(kind, remote_id).await,
            Self::Offline => Err(Self::offline()),
        }
    }

    async fn watch_records(
        &self,
        kind: RecordKind,
        user_id: &str,
    ) -> Result<Subscription<Vec<RemoteRecord>>> {
        match self {
            Self::Http(s) => s.watch_records(kind, user_id).await,
            Self::Mock(s) => s.watch_records(kind, user_id).await,
            Self::Offline => Err(Self::offline()),
        }
    }

    async fn health_check(&self) -> bool {
        match self {
            Self::Http(s) => s.health_check().await,
            Self::Mock(s) => s.health_check().await,
            Self::Offline => false,
        }
    }

    fn name(&self) -> &'static str {
        match self {
            Self::Http(s) => s.name(),
            Self::Mock(s) => s.name(),
            Self::Offline => "offline",
        }
    }
}
