//! Process-local fixed-window counters.

use std::{
    sync::atomic::{AtomicUsize, Ordering},
    time::Duration,
};

use dashmap::DashMap;
use tokio::time::Instant;

use super::{CounterState, CounterStore, StorageError};

/// Number of keys after which expired windows are swept on insert.
const DEFAULT_CAPACITY: usize = 10_000;

#[derive(Debug, Clone, Copy)]
struct CounterRecord {
    count: u64,
    window_start: Instant,
    window: Duration,
}

impl CounterRecord {
    fn open(now: Instant, window: Duration) -> Self {
        Self {
            count: 0,
            window_start: now,
            window,
        }
    }

    fn is_expired(&self, now: Instant) -> bool {
        now.duration_since(self.window_start) >= self.window
    }

    fn resets_in(&self, now: Instant) -> Duration {
        (self.window_start + self.window).saturating_duration_since(now)
    }
}

/// In-memory counter store.
///
/// Windows start at the first request for a key and are reset lazily on the next access
/// after they elapse. Each key lives in its own shard entry, so increments of the same key
/// are serialized and never lost.
pub struct InMemoryStorage {
    counters: DashMap<String, CounterRecord>,
    capacity: usize,
    /// Length at which the next sweep runs. Doubles the live set after each sweep so that a
    /// map full of live windows is not scanned on every new key.
    sweep_at: AtomicUsize,
}

impl InMemoryStorage {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// Creates an empty store that sweeps expired windows once it holds `capacity` keys.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            counters: DashMap::new(),
            capacity,
            sweep_at: AtomicUsize::new(capacity),
        }
    }

    /// Number of keys currently tracked, expired windows included.
    pub fn len(&self) -> usize {
        self.counters.len()
    }

    /// Whether no key is tracked.
    pub fn is_empty(&self) -> bool {
        self.counters.is_empty()
    }

    fn increment_now(&self, key: &str, window: Duration) -> CounterState {
        let now = Instant::now();

        if let Some(mut record) = self.counters.get_mut(key) {
            return bump(&mut record, now, window);
        }

        // No guard may be held here: retain locks every shard.
        if self.counters.len() >= self.sweep_at.load(Ordering::Relaxed) {
            self.counters.retain(|_, record| !record.is_expired(now));

            let live = self.counters.len();
            self.sweep_at.store(self.capacity.max(live * 2), Ordering::Relaxed);
        }

        let mut record = self
            .counters
            .entry(key.to_string())
            .or_insert_with(|| CounterRecord::open(now, window));

        bump(&mut record, now, window)
    }
}

fn bump(record: &mut CounterRecord, now: Instant, window: Duration) -> CounterState {
    if record.is_expired(now) {
        *record = CounterRecord::open(now, window);
    }

    record.count += 1;

    CounterState {
        count: record.count,
        resets_in: record.resets_in(now),
    }
}

impl Default for InMemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl CounterStore for InMemoryStorage {
    async fn increment(&self, key: &str, window: Duration) -> Result<CounterState, StorageError> {
        Ok(self.increment_now(key, window))
    }
}
