//! Local fragment registry.
//!
//! Content-addressed cache of resident fragments plus the index of files this
//! node has ingested. Shared by every ingestion and retrieval on a node, so
//! all access goes through a lock; clones share the same state.
//!
//! No eviction: the registry lives as long as the node.

use crate::fragment::{ContentHash, Fragment};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

#[derive(Default)]
struct LocalState {
    fragments: HashMap<ContentHash, Fragment>,
    files: BTreeMap<String, Vec<ContentHash>>,
}

/// Node-local fragment cache and file index.
#[derive(Clone, Default)]
pub struct FragmentRegistry {
    state: Arc<RwLock<LocalState>>,
}

impl FragmentRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    // Writers never leave the maps in a partial state, so a poisoned lock
    // is still safe to use.
    fn read(&self) -> RwLockReadGuard<'_, LocalState> {
        self.state.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, LocalState> {
        self.state.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Cache a fragment under its content hash (last write wins).
    pub fn insert(&self, fragment: Fragment) {
        self.write().fragments.insert(fragment.content_hash, fragment);
    }

    /// Look up a resident fragment.
    pub fn get(&self, hash: &ContentHash) -> Option<Fragment> {
        self.read().fragments.get(hash).cloned()
    }

    /// Bytes of a resident fragment.
    pub fn data(&self, hash: &ContentHash) -> Option<Vec<u8>> {
        self.read()
            .fragments
            .get(hash)
            .and_then(|fragment| fragment.data.clone())
    }

    /// Whether a fragment is resident.
    pub fn contains(&self, hash: &ContentHash) -> bool {
        self.read().fragments.contains_key(hash)
    }

    /// Record the ordered fragment hashes of an ingested file.
    pub fn record_file(&self, filename: &str, hashes: Vec<ContentHash>) {
        self.write().files.insert(filename.to_string(), hashes);
    }

    /// Ordered fragment hashes of a locally ingested file.
    pub fn file_hashes(&self, filename: &str) -> Option<Vec<ContentHash>> {
        self.read().files.get(filename).cloned()
    }

    /// Names of locally ingested files, sorted.
    pub fn list_files(&self) -> Vec<String> {
        self.read().files.keys().cloned().collect()
    }

    /// Number of resident fragments.
    pub fn fragment_count(&self) -> usize {
        self.read().fragments.len()
    }

    /// Number of locally ingested files.
    pub fn file_count(&self) -> usize {
        self.read().files.len()
    }

    /// Total resident payload bytes.
    pub fn bytes_stored(&self) -> u64 {
        self.read()
            .fragments
            .values()
            .map(|fragment| fragment.size as u64)
            .sum()
    }
}
