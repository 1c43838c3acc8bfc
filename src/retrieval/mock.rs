//! Mock peer fetcher for testing.
//!
//! Holds fragment bytes in memory as if they lived on remote peers, with
//! per-hash failure, delay and corruption injection.

use super::fetcher::{FetchError, PeerFetcher};
use crate::fragment::ContentHash;
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

/// In-memory stand-in for remote peers.
#[derive(Clone, Default)]
pub struct MockPeerFetcher {
    state: Arc<Mutex<MockState>>,
}

#[derive(Default)]
struct MockState {
    fragments: HashMap<ContentHash, Vec<u8>>,
    failing: HashSet<ContentHash>,
    corrupt: HashSet<ContentHash>,
    delays: HashMap<ContentHash, Duration>,
    calls: Vec<(ContentHash, String)>,
}

impl MockPeerFetcher {
    /// Create new mock fetcher.
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Make a fragment available (for test setup).
    pub fn insert(&self, hash: ContentHash, data: Vec<u8>) {
        self.state().fragments.insert(hash, data);
    }

    /// Make fetches of `hash` fail with a network error (or succeed again).
    pub fn set_failing(&self, hash: ContentHash, failing: bool) {
        let mut state = self.state();
        if failing {
            state.failing.insert(hash);
        } else {
            state.failing.remove(&hash);
        }
    }

    /// Serve `hash` with its first byte flipped.
    pub fn set_corrupt(&self, hash: ContentHash) {
        self.state().corrupt.insert(hash);
    }

    /// Delay responses for `hash`.
    pub fn set_delay(&self, hash: ContentHash, delay: Duration) {
        self.state().delays.insert(hash, delay);
    }

    /// Every `(hash, peer)` fetch attempted so far.
    pub fn calls(&self) -> Vec<(ContentHash, String)> {
        self.state().calls.clone()
    }
}

#[async_trait]
impl PeerFetcher for MockPeerFetcher {
    async fn fetch(
        &self,
        hash: &ContentHash,
        peer_address: &str,
        _timeout: Duration,
    ) -> Result<Vec<u8>, FetchError> {
        let delay = {
            let mut state = self.state();
            state.calls.push((*hash, peer_address.to_string()));
            state.delays.get(hash).copied()
        };

        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let state = self.state();
        if state.failing.contains(hash) {
            return Err(FetchError::Network(format!(
                "simulated failure reaching {peer_address}"
            )));
        }

        let mut data = state
            .fragments
            .get(hash)
            .cloned()
            .ok_or_else(|| FetchError::NotFound {
                hash: *hash,
                peer: peer_address.to_string(),
            })?;

        if state.corrupt.contains(hash) {
            if let Some(first) = data.first_mut() {
                *first ^= 0xFF;
            }
        }

        Ok(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_fetch_and_failures() {
        let fetcher = MockPeerFetcher::new();
        let hash = ContentHash::digest(b"abc");
        fetcher.insert(hash, b"abc".to_vec());

        let timeout = Duration::from_secs(1);
        assert_eq!(fetcher.fetch(&hash, "p", timeout).await.unwrap(), b"abc");

        fetcher.set_failing(hash, true);
        assert!(matches!(
            fetcher.fetch(&hash, "p", timeout).await,
            Err(FetchError::Network(_))
        ));

        fetcher.set_failing(hash, false);
        fetcher.set_corrupt(hash);
        assert_eq!(fetcher.fetch(&hash, "p", timeout).await.unwrap()[0], b'a' ^ 0xFF);
        assert_eq!(fetcher.calls().len(), 3);
    }

    #[tokio::test]
    async fn test_mock_unknown_hash_not_found() {
        let fetcher = MockPeerFetcher::new();
        let result = fetcher
            .fetch(&ContentHash::digest(b"?"), "p", Duration::from_secs(1))
            .await;
        assert!(matches!(result, Err(FetchError::NotFound { .. })));
    }
}
