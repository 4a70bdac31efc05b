//! In-flight transaction guard.
//!
//! Discovery sweeps overlap: a slow delivery can still be running when the
//! next sweep re-reads the same row. The guard is a concurrent set of
//! transaction ids with load-or-store acquisition so at most one delivery
//! job per transaction exists at a time. Entries also carry an acquisition
//! time and expire after a TTL, so a leaked entry (worker panic, dropped
//! queue) blocks re-delivery for one retry horizon instead of forever.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

pub struct InFlightGuard {
    ttl: Duration,
    entries: Mutex<HashMap<String, Instant>>,
}

impl InFlightGuard {
    /// `ttl` should cover the full retry horizon of a delivery job
    /// (attempt ceiling times back-off delay), otherwise a still-retrying
    /// transaction can be enqueued a second time.
    pub fn new(ttl: Duration) -> Self {
        InFlightGuard {
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Atomically mark a transaction as in flight. Returns false when a live
    /// entry already exists; an expired entry counts as absent and is
    /// replaced.
    pub fn try_acquire(&self, transaction_id: &str) -> bool {
        let mut entries = self.lock_entries();
        if let Some(acquired_at) = entries.get(transaction_id) {
            if acquired_at.elapsed() < self.ttl {
                return false;
            }
        }
        entries.insert(transaction_id.to_string(), Instant::now());
        true
    }

    /// Drop the in-flight mark after the job reached a terminal outcome
    /// (acknowledged, exhausted, or dropped before enqueue).
    pub fn release(&self, transaction_id: &str) {
        self.lock_entries().remove(transaction_id);
    }

    /// Evict expired entries, returning how many were removed.
    pub fn purge_expired(&self) -> usize {
        let mut entries = self.lock_entries();
        let before = entries.len();
        entries.retain(|_, acquired_at| acquired_at.elapsed() < self.ttl);
        before - entries.len()
    }

    pub fn len(&self) -> usize {
        self.lock_entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock_entries().is_empty()
    }

    // A poisoned lock only means another thread panicked mid-insert; the map
    // stays usable for id tracking.
    fn lock_entries(&self) -> MutexGuard<'_, HashMap<String, Instant>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
