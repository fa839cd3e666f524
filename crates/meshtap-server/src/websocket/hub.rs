//! Record fan-out to registered subscribers.
//!
//! A publish serialises the record once and offers the same frame to every
//! subscriber in a snapshot of the set. A subscriber whose queue is closed,
//! or stays full past the send timeout, is pruned on the spot; the other
//! subscribers are unaffected.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use axum::extract::ws::Utf8Bytes;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use metrics::counter;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::SendTimeoutError;
use tracing::{debug, info, warn};

use super::subscriber::{Subscriber, SubscriberId};
use crate::metrics::{DELIVERIES_FAILED_TOTAL, RECORDS_PUBLISHED_TOTAL};

/// Outcome of one publish pass.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PublishReport {
    /// Subscribers in the snapshot.
    pub recipients: usize,
    /// Successful enqueues.
    pub delivered: usize,
    /// Subscribers pruned during this pass.
    pub pruned: Vec<SubscriberId>,
}

/// The set of live subscribers.
pub struct BroadcastHub {
    subscribers: DashMap<SubscriberId, Subscriber>,
    send_timeout: Duration,
    queue_capacity: usize,
    published: AtomicU64,
}

impl BroadcastHub {
    /// Create a hub with the given per-subscriber send timeout and queue depth.
    pub fn new(send_timeout: Duration, queue_capacity: usize) -> Self {
        Self {
            subscribers: DashMap::new(),
            send_timeout,
            queue_capacity,
            published: AtomicU64::new(0),
        }
    }

    /// Add a subscriber. Returns `false` if its id is already registered.
    pub fn register(&self, subscriber: Subscriber) -> bool {
        match self.subscribers.entry(subscriber.id().clone()) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                debug!(subscriber_id = %subscriber.id(), peer = %subscriber.peer(), "subscriber registered");
                let _ = slot.insert(subscriber);
                true
            }
        }
    }

    /// Remove a subscriber. Returns `false` if it was not registered.
    pub fn deregister(&self, id: &SubscriberId) -> bool {
        self.subscribers.remove(id).is_some()
    }

    /// Create and register a subscriber with the hub's queue depth.
    pub fn subscribe(&self, peer: SocketAddr) -> (SubscriberId, mpsc::Receiver<Utf8Bytes>) {
        let (subscriber, rx) = Subscriber::new(peer, self.queue_capacity);
        let id = subscriber.id().clone();
        let _ = self.register(subscriber);
        (id, rx)
    }

    /// Deliver `record` to every subscriber.
    ///
    /// Never fails: delivery problems prune the affected subscriber and a
    /// serialisation failure drops the record.
    pub async fn publish<T: Serialize + ?Sized>(&self, record: &T) -> PublishReport {
        if self.subscribers.is_empty() {
            return PublishReport::default();
        }

        let frame: Utf8Bytes = match serde_json::to_string(record) {
            Ok(json) => json.into(),
            Err(e) => {
                warn!(error = %e, "failed to serialize record, dropping it");
                return PublishReport::default();
            }
        };

        let snapshot: Vec<(SubscriberId, mpsc::Sender<Utf8Bytes>)> = self
            .subscribers
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().sender()))
            .collect();

        let mut report = PublishReport {
            recipients: snapshot.len(),
            ..PublishReport::default()
        };

        for (id, tx) in snapshot {
            let failure = match tx.send_timeout(frame.clone(), self.send_timeout).await {
                Ok(()) => {
                    report.delivered += 1;
                    continue;
                }
                Err(SendTimeoutError::Timeout(_)) => "send timed out",
                Err(SendTimeoutError::Closed(_)) => "queue closed",
            };
            let removed = self.deregister(&id);
            warn!(subscriber_id = %id, reason = failure, removed, "delivery failed, subscriber pruned");
            counter!(DELIVERIES_FAILED_TOTAL).increment(1);
            report.pruned.push(id);
        }

        if report.delivered > 0 {
            let _ = self.published.fetch_add(1, Ordering::Relaxed);
            counter!(RECORDS_PUBLISHED_TOTAL).increment(1);
        }
        report
    }

    /// Remove every subscriber; their sessions send a normal close frame.
    pub fn close_all(&self) -> usize {
        let ids: Vec<SubscriberId> = self.subscribers.iter().map(|e| e.key().clone()).collect();
        let closed = ids.iter().filter(|id| self.deregister(id)).count();
        info!(closed, "closed all subscribers");
        closed
    }

    /// Registered subscriber count.
    pub fn len(&self) -> usize {
        self.subscribers.len()
    }

    /// Whether no subscriber is registered.
    pub fn is_empty(&self) -> bool {
        self.subscribers.is_empty()
    }

    /// Whether `id` is registered.
    pub fn contains(&self, id: &SubscriberId) -> bool {
        self.subscribers.contains_key(id)
    }

    /// Publish passes that reached at least one subscriber.
    pub fn packets_published(&self) -> u64 {
        self.published.load(Ordering::Relaxed)
    }
}
