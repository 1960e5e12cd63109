//! HTTP remote store
//!
//! Talks to a JSON document API:
//! - `GET {base}/{collection}?userId={id}` lists a user's documents
//! - `POST {base}/{collection}` creates one and answers `{"id": "..."}`
//! - `PATCH`/`DELETE {base}/{collection}/{id}` update and remove
//! - `GET {base}/health` for health checks
//!
//! There is no server push, so `watch_records` polls.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use tokio::sync::watch;
use tracing::{debug, warn};

use super::{RemoteDocument, RemoteRecord, RemoteStore};
use crate::config::RemoteConfig;
use crate::error::{Error, Result};
use crate::models::{Record, RecordKind};
use crate::snapshot::Subscription;

/// Default per-request timeout
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Default interval between polls of a watched collection
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(30);

/// Shortest accepted poll interval; a zero period would stall the poller
pub const MIN_POLL_INTERVAL: Duration = Duration::from_millis(10);

#[derive(Deserialize)]
struct CreatedResponse {
    id: String,
}

/// Remote store backed by a JSON document API
#[derive(Clone)]
pub struct HttpRemoteStore {
    http_client: Client,
    base_url: String,
    api_key: Option<String>,
    poll_interval: Duration,
}

impl HttpRemoteStore {
    /// Create a store with the default timeout and poll interval
    pub fn new(base_url: &str) -> Result<Self> {
        Self::with_timeout(base_url, DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(base_url: &str, timeout: Duration) -> Result<Self> {
        let http_client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http_client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: None,
            poll_interval: DEFAULT_POLL_INTERVAL,
        })
    }

    /// Create from the `[remote]` config section
    pub fn from_config(config: &RemoteConfig) -> Result<Self> {
        let store = Self::with_timeout(&config.url, Duration::from_secs(config.timeout_secs))?
            .with_poll_interval(Duration::from_secs(config.poll_interval_secs));
        Ok(match &config.api_key {
            Some(key) => store.with_api_key(key),
            None => store,
        })
    }

    /// Send `Authorization: Bearer <key>` on every request
    pub fn with_api_key(mut self, api_key: &str) -> Self {
        self.api_key = Some(api_key.to_string());
        self
    }

    /// Interval between polls of a watched collection (at least `MIN_POLL_INTERVAL`)
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval.max(MIN_POLL_INTERVAL);
        self
    }

    /// Get the base URL (for logging)
    pub fn host(&self) -> &str {
        &self.base_url
    }

    fn collection_url(&self, kind: RecordKind) -> String {
        format!("{}/{}", self.base_url, kind.collection())
    }

    fn document_url(&self, kind: RecordKind, remote_id: &str) -> String {
        format!("{}/{}/{}", self.base_url, kind.collection(), remote_id)
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.api_key {
            Some(key) => request.bearer_auth(key),
            None => request,
        }
    }

    /// Turn a non-2xx answer into `RemoteUnavailable`
    fn check(response: Response) -> Result<Response> {
        if response.status().is_success() {
            return Ok(response);
        }
        Err(Error::RemoteUnavailable(format!(
            "{} returned {}",
            response.url(),
            response.status()
        )))
    }

    /// Parse a listing, skipping documents that are malformed or invalid
    fn parse_listing(kind: RecordKind, user_id: &str, docs: Vec<serde_json::Value>) -> Vec<RemoteRecord> {
        let mut records: Vec<RemoteRecord> = docs
            .into_iter()
            .filter_map(|doc| match serde_json::from_value::<RemoteRecord>(doc) {
                Ok(record) => match record.validate() {
                    Ok(()) => Some(record),
                    Err(e) => {
                        warn!(kind = %kind, remote_id = %record.remote_id, error = %e, "Skipping invalid remote document");
                        None
                    }
                },
                Err(e) => {
                    warn!(kind = %kind, error = %e, "Skipping unparsable remote document");
                    None
                }
            })
            .filter(|record| record.user_id == user_id)
            .collect();

        records.sort_by(|a, b| b.date.cmp(&a.date));
        records
    }
}

#[async_trait]
impl RemoteStore for HttpRemoteStore {
    async fn fetch_records(&self, kind: RecordKind, user_id: &str) -> Result<Vec<RemoteRecord>> {
        let response = self
            .authorize(self.http_client.get(self.collection_url(kind)))
            .query(&[("userId", user_id)])
            .send()
            .await?;

        let docs: Vec<serde_json::Value> = Self::check(response)?.json().await?;
        Ok(Self::parse_listing(kind, user_id, docs))
    }

    async fn create_record(&self, kind: RecordKind, record: &Record) -> Result<String> {
        let response = self
            .authorize(self.http_client.post(self.collection_url(kind)))
            .json(&RemoteDocument::from_record(record))
            .send()
            .await?;

        let created: CreatedResponse = Self::check(response)?.json().await?;
        debug!(kind = %kind, remote_id = %created.id, "Created remote document");
        Ok(created.id)
    }

    async fn update_record(
        &self,
        kind: RecordKind,
        remote_id: &str,
        record: &Record,
    ) -> Result<()> {
        let response = self
            .authorize(self.http_client.patch(self.document_url(kind, remote_id)))
            .json(&RemoteDocument::from_record(record))
            .send()
            .await?;

        Self::check(response)?;
        Ok(())
    }

    async fn delete_record(&self, kind: RecordKind, remote_id: &str) -> Result<()> {
        let response = self
            .authorize(self.http_client.delete(self.document_url(kind, remote_id)))
            .send()
            .await?;

        // Already gone counts as deleted
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(());
        }
        Self::check(response)?;
        Ok(())
    }

    async fn watch_records(
        &self,
        kind: RecordKind,
        user_id: &str,
    ) -> Result<Subscription<Vec<RemoteRecord>>> {
        let initial = self.fetch_records(kind, user_id).await?;
        let (tx, rx) = watch::channel(initial);

        let store = self.clone();
        let user_id = user_id.to_string();
        let poller = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(store.poll_interval);
            // First tick completes immediately
            ticker.tick().await;
            loop {
                ticker.tick().await;
                if tx.is_closed() {
                    break;
                }
                match store.fetch_records(kind, &user_id).await {
                    Ok(records) => {
                        tx.send_if_modified(|current| {
                            if *current == records {
                                return false;
                            }
                            *current = records;
                            true
                        });
                    }
                    Err(e) => debug!(kind = %kind, error = %e, "Remote poll failed"),
                }
            }
        });

        Ok(Subscription::with_feeder(rx, poller.abort_handle()))
    }

    async fn health_check(&self) -> bool {
        match self
            .authorize(self.http_client.get(format!("{}/health", self.base_url)))
            .send()
            .await
        {
            Ok(resp) => resp.status().is_success(),
            Err(_) => false,
        }
    }

    fn name(&self) -> &'static str {
        "http"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TimePeriod;
    use crate::test_utils::MockRemoteServer;

    fn record(user_id: &str, title: &str, amount: f64, date: &str) -> Record {
        Record {
            id: 1,
            kind: RecordKind::Expense,
            title: title.to_string(),
            amount,
            time_period: TimePeriod::Daily,
            category: "Comida".to_string(),
            date: date.to_string(),
            user_id: user_id.to_string(),
            synced_with_remote: false,
            remote_id: None,
        }
    }

    #[test]
    fn test_parse_listing_skips_bad_documents() {
        let docs = vec![
            serde_json::json!({"id": "a", "title": "Cafe", "amount": 12.0, "timePeriod": "Diario",
                "category": "Comida", "date": "2025-11-01", "userId": "u1"}),
            serde_json::json!({"id": "b", "title": "Broken", "amount": "lots"}),
            serde_json::json!({"id": "c", "title": "Zero", "amount": 0.0, "timePeriod": "Diario",
                "category": "Comida", "date": "2025-11-02", "userId": "u1"}),
            serde_json::json!({"id": "d", "title": "Libro", "amount": 90.0, "timePeriod": "Anual",
                "category": "Estudios", "date": "2025-11-05", "userId": "u1"}),
            serde_json::json!({"id": "e", "title": "Other", "amount": 5.0, "timePeriod": "Diario",
                "category": "Comida", "date": "2025-11-05", "userId": "u2"}),
        ];

        let records = HttpRemoteStore::parse_listing(RecordKind::Expense, "u1", docs);
        let ids: Vec<&str> = records.iter().map(|r| r.remote_id.as_str()).collect();
        assert_eq!(ids, vec!["d", "a"]);
    }

    #[tokio::test]
    async fn test_create_fetch_delete_roundtrip() {
        let server = MockRemoteServer::start().await;
        let store = HttpRemoteStore::new(&server.url()).unwrap();
        assert!(store.health_check().await);

        let remote_id = store
            .create_record(RecordKind::Expense, &record("u1", "Almuerzo", 45.0, "2025-11-03"))
            .await
            .unwrap();
        store
            .create_record(RecordKind::Income, &record("u1", "Beca", 800.0, "2025-11-01"))
            .await
            .unwrap();

        let expenses = store.fetch_records(RecordKind::Expense, "u1").await.unwrap();
        assert_eq!(expenses.len(), 1);
        assert_eq!(expenses[0].remote_id, remote_id);
        assert_eq!(expenses[0].title, "Almuerzo");

        let mut edited = record("u1", "Almuerzo grande", 60.0, "2025-11-03");
        edited.remote_id = Some(remote_id.clone());
        store
            .update_record(RecordKind::Expense, &remote_id, &edited)
            .await
            .unwrap();
        let expenses = store.fetch_records(RecordKind::Expense, "u1").await.unwrap();
        assert_eq!(expenses[0].amount, 60.0);

        store.delete_record(RecordKind::Expense, &remote_id).await.unwrap();
        // Deleting twice is fine
        store.delete_record(RecordKind::Expense, &remote_id).await.unwrap();
        assert!(store
            .fetch_records(RecordKind::Expense, "u1")
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_api_key_is_sent() {
        let server = MockRemoteServer::start_with_api_key("s3cret").await;

        let anonymous = HttpRemoteStore::new(&server.url()).unwrap();
        let err = anonymous
            .fetch_records(RecordKind::Expense, "u1")
            .await
            .unwrap_err();
        assert!(err.is_remote());

        let keyed = HttpRemoteStore::new(&server.url())
            .unwrap()
            .with_api_key("s3cret");
        assert!(keyed.fetch_records(RecordKind::Expense, "u1").await.is_ok());
    }

    #[tokio::test]
    async fn test_unreachable_server_is_remote_error() {
        let mut server = MockRemoteServer::start().await;
        let url = server.url();
        server.stop();
        drop(server);

        let store = HttpRemoteStore::with_timeout(&url, Duration::from_millis(500)).unwrap();
        // Give the server task a moment to release the port
        tokio::time::sleep(Duration::from_millis(50)).await;
        let err = store
            .fetch_records(RecordKind::Expense, "u1")
            .await
            .unwrap_err();
        assert!(err.is_remote());
        assert!(!store.health_check().await);
    }

    #[tokio::test]
    async fn test_watch_polls_for_changes() {
        let server = MockRemoteServer::start().await;
        let store = HttpRemoteStore::new(&server.url())
            .unwrap()
            .with_poll_interval(Duration::from_millis(20));

        let mut sub = store.watch_records(RecordKind::Income, "u1").await.unwrap();
        assert_eq!(sub.next().await, Some(vec![]));

        store
            .create_record(RecordKind::Income, &record("u1", "Mesada", 200.0, "2025-11-01"))
            .await
            .unwrap();

        let next = tokio::time::timeout(Duration::from_secs(2), sub.next())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(next.len(), 1);
        assert_eq!(next[0].title, "Mesada");
    }

    #[tokio::test]
    async fn test_zero_poll_interval_still_delivers_changes() {
        let server = MockRemoteServer::start().await;
        let store = HttpRemoteStore::new(&server.url())
            .unwrap()
            .with_poll_interval(Duration::ZERO);
        assert_eq!(store.poll_interval, MIN_POLL_INTERVAL);

        let mut sub = store.watch_records(RecordKind::Expense, "u1").await.unwrap();
        assert_eq!(sub.next().await, Some(vec![]));

        store
            .create_record(RecordKind::Expense, &record("u1", "Pasaje", 5.0, "2025-11-02"))
            .await
            .unwrap();

        let next = tokio::time::timeout(Duration::from_secs(2), sub.next())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(next.len(), 1);
    }
}
