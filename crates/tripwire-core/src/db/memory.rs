//! In-process counter store

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::Duration;
use tokio::time::Instant;

use super::{CounterStore, StoreError};

#[derive(Debug, Clone, Copy)]
struct CounterEntry {
    count: u64,
    expires_at: Option<Instant>,
}

impl CounterEntry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

/// How often a write sweeps every expired counter out of the map
pub const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Debug, Default)]
struct Entries {
    counters: HashMap<String, CounterEntry>,
    next_sweep: Option<Instant>,
}

/// A counter store backed by a `HashMap`
///
/// Expiry is lazy: an expired counter is removed when its key is read or
/// written, and the rest are reclaimed by a sweep at most once per
/// [`SWEEP_INTERVAL`] or by [`MemoryStore::cleanup_expired`]. Time comes
/// from `tokio::time`, so a paused test clock controls expiry.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<Entries>,
}

impl MemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live (unexpired) counters
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.entries
            .lock()
            .counters
            .values()
            .filter(|entry| !entry.is_expired(now))
            .count()
    }

    /// Whether the store holds no live counters
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop expired counters
    pub fn cleanup_expired(&self) {
        let now = Instant::now();
        let mut entries = self.entries.lock();
        entries.sweep(now);
    }

    /// Drop every counter
    pub fn clear(&self) {
        self.entries.lock().counters.clear();
    }
}

impl Entries {
    fn sweep(&mut self, now: Instant) {
        self.counters.retain(|_, entry| !entry.is_expired(now));
        self.next_sweep = Some(now + SWEEP_INTERVAL);
    }

    fn sweep_due(&self, now: Instant) -> bool {
        self.next_sweep.map_or(true, |at| now >= at)
    }
}

#[async_trait]
impl CounterStore for MemoryStore {
    async fn read(&self, key: &str) -> Result<Option<u64>, StoreError> {
        let now = Instant::now();
        let mut entries = self.entries.lock();

        let expired = match entries.counters.get(key) {
            Some(entry) if !entry.is_expired(now) => return Ok(Some(entry.count)),
            Some(_) => true,
            None => false,
        };
        if expired {
            entries.counters.remove(key);
        }
        Ok(None)
    }

    async fn write(&self, key: &str, value: u64, ttl: Duration) -> Result<(), StoreError> {
        let now = Instant::now();
        let expires_at = if ttl.is_zero() { None } else { Some(now + ttl) };

        let mut entries = self.entries.lock();
        if entries.sweep_due(now) {
            entries.sweep(now);
        }
        entries.counters.insert(
            key.to_string(),
            CounterEntry {
                count: value,
                expires_at,
            },
        );

        Ok(())
    }
}
