//! In-memory DHT.
//!
//! Stands in for the external DHT in tests, the demo, and any setup where
//! several nodes live in one process and share a handle. Supports simulated
//! outages, dropped keys and slow reads for failure testing.

use super::traits::*;
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

/// Shared in-memory key-value store.
#[derive(Clone, Default)]
pub struct MemoryDht {
    state: Arc<Mutex<MemoryState>>,
}

#[derive(Default)]
struct MemoryState {
    entries: HashMap<String, Vec<u8>>,
    offline: bool,
    dropped_writes: HashSet<String>,
    read_delays: HashMap<String, Duration>,
    writes: usize,
}

impl MemoryDht {
    /// Create new empty store.
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, MemoryState> {
        // A panic while holding the lock cannot leave the map half-updated
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Make every operation fail with `Unavailable` (or recover).
    pub fn set_offline(&self, offline: bool) {
        self.state().offline = offline;
    }

    /// Silently discard future writes to `key`, as a lossy DHT might.
    pub fn drop_writes_to(&self, key: &str) {
        self.state().dropped_writes.insert(key.to_string());
    }

    /// Delay every `get` of `key` by `delay`, as a slow DHT lookup might.
    pub fn delay_reads_of(&self, key: &str, delay: Duration) {
        self.state().read_delays.insert(key.to_string(), delay);
    }

    /// Remove a key (for test setup).
    pub fn remove(&self, key: &str) -> Option<Vec<u8>> {
        self.state().entries.remove(key)
    }

    /// Number of keys currently stored.
    pub fn len(&self) -> usize {
        self.state().entries.len()
    }

    /// Whether the store is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Total accepted `set` calls, including overwrites.
    pub fn write_count(&self) -> usize {
        self.state().writes
    }
}

#[async_trait]
impl KeyValueStore for MemoryDht {
    async fn set(&self, key: &str, value: Vec<u8>) -> DhtResult<()> {
        let mut state = self.state();
        if state.offline {
            return Err(DhtError::Unavailable("memory DHT offline".to_string()));
        }
        state.writes += 1;
        if !state.dropped_writes.contains(key) {
            state.entries.insert(key.to_string(), value);
        }
        Ok(())
    }

    async fn get(&self, key: &str) -> DhtResult<Option<Vec<u8>>> {
        let delay = self.state().read_delays.get(key).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let state = self.state();
        if state.offline {
            return Err(DhtError::Unavailable("memory DHT offline".to_string()));
        }
        Ok(state.entries.get(key).cloned())
    }
}
