//! Snapshot subscriptions
//!
//! A `Subscription<T>` is the reactive view of a query: the first `next()`
//! yields the current snapshot, later calls wait for the next change.
//! Dropping the subscription (or calling `cancel`) stops emissions and aborts
//! the background task feeding it, if any.
//!
//! `SnapshotHub` owns one watch channel per key and only re-runs the query
//! on publish while someone is subscribed.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::watch;
use tokio::task::AbortHandle;

use crate::error::Result;

/// Live view over a snapshot query
pub struct Subscription<T> {
    rx: watch::Receiver<T>,
    primed: bool,
    feeder: Option<AbortHandle>,
}

impl<T: Clone> Subscription<T> {
    pub fn new(rx: watch::Receiver<T>) -> Self {
        Self {
            rx,
            primed: false,
            feeder: None,
        }
    }

    /// Subscription fed by a background task that is aborted on drop
    pub fn with_feeder(rx: watch::Receiver<T>, feeder: AbortHandle) -> Self {
        Self {
            rx,
            primed: false,
            feeder: Some(feeder),
        }
    }

    /// Latest snapshot without waiting
    pub fn current(&self) -> T {
        self.rx.borrow().clone()
    }

    /// Next snapshot; `None` once the producer is gone
    pub async fn next(&mut self) -> Option<T> {
        if !self.primed {
            self.primed = true;
            return Some(self.rx.borrow_and_update().clone());
        }
        self.rx.changed().await.ok()?;
        Some(self.rx.borrow_and_update().clone())
    }

    /// Stop receiving snapshots
    pub fn cancel(self) {}
}

impl<T> Drop for Subscription<T> {
    fn drop(&mut self) {
        if let Some(feeder) = self.feeder.take() {
            feeder.abort();
        }
    }
}

/// Keyed registry of snapshot channels
pub struct SnapshotHub<K, T> {
    channels: Arc<Mutex<HashMap<K, watch::Sender<T>>>>,
}

impl<K, T> Clone for SnapshotHub<K, T> {
    fn clone(&self) -> Self {
        Self {
            channels: self.channels.clone(),
        }
    }
}

impl<K, T> Default for SnapshotHub<K, T> {
    fn default() -> Self {
        Self {
            channels: Arc::new(Mutex::new(HashMap::new())),
        }
    }
}

impl<K, T> SnapshotHub<K, T>
where
    K: Eq + Hash + Clone,
    T: Clone,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe to `key`, running `load` for the initial snapshot when no
    /// channel exists yet
    pub fn subscribe<F>(&self, key: K, load: F) -> Result<Subscription<T>>
    where
        F: FnOnce() -> Result<T>,
    {
        let mut channels = self.channels.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(sender) = channels.get(&key) {
            return Ok(Subscription::new(sender.subscribe()));
        }

        let (sender, rx) = watch::channel(load()?);
        channels.insert(key, sender);
        Ok(Subscription::new(rx))
    }

    /// Re-run `load` and push the result to subscribers of `key`
    ///
    /// No-op when nobody is subscribed; channels whose subscribers are all
    /// gone are dropped.
    pub fn publish<F>(&self, key: &K, load: F) -> Result<()>
    where
        F: FnOnce() -> Result<T>,
    {
        if !self.is_watched(key) {
            return Ok(());
        }

        let snapshot = load()?;

        let mut channels = self.channels.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(sender) = channels.get(key) {
            sender.send_replace(snapshot);
        }
        Ok(())
    }

    /// Whether anyone currently listens on `key`
    pub fn is_watched(&self, key: &K) -> bool {
        let mut channels = self.channels.lock().unwrap_or_else(PoisonError::into_inner);
        match channels.get(key) {
            Some(sender) if sender.receiver_count() > 0 => true,
            Some(_) => {
                channels.remove(key);
                false
            }
            None => false,
        }
    }

    /// Re-run `load` for every watched key accepted by `matches`
    pub fn publish_matching<P, F>(&self, matches: P, mut load: F) -> Result<()>
    where
        P: Fn(&K) -> bool,
        F: FnMut(&K) -> Result<T>,
    {
        let keys: Vec<K> = {
            let mut channels = self.channels.lock().unwrap_or_else(PoisonError::into_inner);
            channels.retain(|_, sender| sender.receiver_count() > 0);
            channels.keys().filter(|k| matches(k)).cloned().collect()
        };

        for key in keys {
            let snapshot = load(&key)?;
            let channels = self.channels.lock().unwrap_or_else(PoisonError::into_inner);
            if let Some(sender) = channels.get(&key) {
                sender.send_replace(snapshot);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_subscription_yields_current_then_changes() {
        let hub: SnapshotHub<&str, Vec<i32>> = SnapshotHub::new();
        let mut sub = hub.subscribe("u1", || Ok(vec![1])).unwrap();

        assert_eq!(sub.next().await, Some(vec![1]));

        hub.publish(&"u1", || Ok(vec![1, 2])).unwrap();
        assert_eq!(sub.next().await, Some(vec![1, 2]));
        assert_eq!(sub.current(), vec![1, 2]);
    }

    #[tokio::test]
    async fn test_second_subscriber_shares_channel() {
        let hub: SnapshotHub<&str, i32> = SnapshotHub::new();
        let _first = hub.subscribe("k", || Ok(7)).unwrap();
        // load is not called again while the channel exists
        let mut second = hub
            .subscribe("k", || panic!("initial snapshot loaded twice"))
            .unwrap();
        assert_eq!(second.next().await, Some(7));
    }

    #[test]
    fn test_publish_without_subscribers_skips_load() {
        let hub: SnapshotHub<&str, i32> = SnapshotHub::new();
        hub.publish(&"k", || panic!("should not load")).unwrap();

        let sub = hub.subscribe("k", || Ok(1)).unwrap();
        assert!(hub.is_watched(&"k"));
        drop(sub);
        assert!(!hub.is_watched(&"k"));
        hub.publish(&"k", || panic!("should not load after unsubscribe"))
            .unwrap();
    }

    #[tokio::test]
    async fn test_publish_matching_only_touches_selected_keys() {
        let hub: SnapshotHub<(&str, u32), i32> = SnapshotHub::new();
        let mut oct = hub.subscribe(("u1", 10), || Ok(1)).unwrap();
        let mut nov = hub.subscribe(("u1", 11), || Ok(2)).unwrap();
        let other = hub.subscribe(("u2", 11), || Ok(3)).unwrap();
        assert_eq!(oct.next().await, Some(1));
        assert_eq!(nov.next().await, Some(2));

        hub.publish_matching(|(user, _)| *user == "u1", |_| Ok(0))
            .unwrap();
        assert_eq!(oct.next().await, Some(0));
        assert_eq!(nov.next().await, Some(0));
        assert_eq!(other.current(), 3);
    }

    #[tokio::test]
    async fn test_drop_aborts_feeder() {
        let (tx, rx) = watch::channel(0);
        let task = tokio::spawn(async move {
            loop {
                tokio::time::sleep(std::time::Duration::from_millis(5)).await;
                if tx.send(1).is_err() {
                    break;
                }
            }
        });
        let sub = Subscription::with_feeder(rx, task.abort_handle());
        drop(sub);
        let result = task.await;
        assert!(result.unwrap_err().is_cancelled());
    }
}
