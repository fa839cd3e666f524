//! Connection slots: the `max_connections` budget.
//!
//! A slot is taken before the upgrade and held by the session task until it
//! exits, so concurrent upgrades cannot overshoot the limit and a session the
//! hub has already pruned still counts until its socket is gone.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Shared slot counter.
#[derive(Debug)]
pub struct ConnectionSlots {
    limit: usize,
    taken: AtomicUsize,
}

impl ConnectionSlots {
    /// `limit` of `0` disables the limit.
    pub fn new(limit: usize) -> Self {
        Self {
            limit,
            taken: AtomicUsize::new(0),
        }
    }

    /// Reserve a slot, or `None` when all are taken.
    pub fn try_acquire(self: &Arc<Self>) -> Option<SessionSlot> {
        self.taken
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |taken| {
                (self.limit == 0 || taken < self.limit).then_some(taken + 1)
            })
            .ok()?;
        Some(SessionSlot {
            slots: Arc::clone(self),
        })
    }

    /// Slots currently held.
    pub fn in_use(&self) -> usize {
        self.taken.load(Ordering::Acquire)
    }

    /// Configured limit (`0` is unlimited).
    pub fn limit(&self) -> usize {
        self.limit
    }
}

/// A held slot, released on drop.
#[derive(Debug)]
pub struct SessionSlot {
    slots: Arc<ConnectionSlots>,
}

impl Drop for SessionSlot {
    fn drop(&mut self) {
        let _ = self.slots.taken.fetch_sub(1, Ordering::AcqRel);
    }
}
