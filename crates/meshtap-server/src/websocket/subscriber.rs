//! Subscriber state: identity, outbound queue and liveness.

use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::ws::Utf8Bytes;
use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::mpsc;
use uuid::Uuid;

/// Opaque subscriber identifier, `sub_<uuid v7>`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct SubscriberId(String);

impl SubscriberId {
    /// Generate a fresh, time-ordered id.
    pub fn new() -> Self {
        Self(format!("sub_{}", Uuid::now_v7()))
    }

    /// Borrow as `&str`.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for SubscriberId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Last time the peer showed signs of life.
///
/// Shared between the hub entry and the session's reader and writer.
#[derive(Debug)]
pub struct Liveness {
    last_seen: Mutex<Instant>,
}

impl Liveness {
    pub(crate) fn new() -> Self {
        Self {
            last_seen: Mutex::new(Instant::now()),
        }
    }

    /// Record activity (pong, ping or any inbound frame).
    pub fn mark_alive(&self) {
        *self.last_seen.lock() = Instant::now();
    }

    /// Time since the last recorded activity.
    pub fn idle_for(&self) -> Duration {
        self.last_seen.lock().elapsed()
    }
}

/// One live outbound connection.
///
/// The hub owns the only [`mpsc::Sender`]; dropping the subscriber closes
/// the queue, which ends the session's writer.
pub struct Subscriber {
    id: SubscriberId,
    peer: SocketAddr,
    tx: mpsc::Sender<Utf8Bytes>,
    connected_at: Instant,
    liveness: Arc<Liveness>,
}

impl Subscriber {
    /// Create a subscriber with a bounded queue of `capacity` frames.
    ///
    /// A zero capacity is bumped to one.
    pub fn new(peer: SocketAddr, capacity: usize) -> (Self, mpsc::Receiver<Utf8Bytes>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let subscriber = Self {
            id: SubscriberId::new(),
            peer,
            tx,
            connected_at: Instant::now(),
            liveness: Arc::new(Liveness::new()),
        };
        (subscriber, rx)
    }

    #[cfg(test)]
    pub(crate) fn with_id(
        id: SubscriberId,
        peer: SocketAddr,
        capacity: usize,
    ) -> (Self, mpsc::Receiver<Utf8Bytes>) {
        let (mut subscriber, rx) = Self::new(peer, capacity);
        subscriber.id = id;
        (subscriber, rx)
    }

    /// Subscriber id.
    pub fn id(&self) -> &SubscriberId {
        &self.id
    }

    /// Remote address.
    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    /// Connection age.
    pub fn age(&self) -> Duration {
        self.connected_at.elapsed()
    }

    /// Shared liveness tracker.
    pub fn liveness(&self) -> Arc<Liveness> {
        Arc::clone(&self.liveness)
    }

    pub(crate) fn sender(&self) -> mpsc::Sender<Utf8Bytes> {
        self.tx.clone()
    }
}

impl fmt::Debug for Subscriber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscriber")
            .field("id", &self.id)
            .field("peer", &self.peer)
            .field("age", &self.age())
            .finish_non_exhaustive()
    }
}
