//! Peer fetch boundary.
//!
//! The coordinator never speaks a wire protocol itself. It asks a
//! [`PeerFetcher`] for a fragment's bytes by content hash, and every failure
//! comes back addressable by that hash so the caller can retry exactly the
//! fragments that failed.

use crate::fragment::ContentHash;
use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

/// Errors a single fragment fetch can produce
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    #[error("Fragment {hash} not held by {peer}")]
    NotFound { hash: ContentHash, peer: String },

    #[error("Network error: {0}")]
    Network(String),

    #[error("Timeout after {0:?}")]
    Timeout(Duration),

    #[error("Fragment {hash} has {actual} bytes, location record says {expected}")]
    SizeMismatch {
        hash: ContentHash,
        expected: usize,
        actual: usize,
    },
}

/// Remote fragment transfer.
///
/// Implementations:
/// - **TCP**: [`crate::transport::TcpPeerFetcher`], the node-to-node protocol
/// - **Mock**: [`crate::retrieval::MockPeerFetcher`], in-memory peers with
///   injectable failures for testing
#[async_trait]
pub trait PeerFetcher: Send + Sync {
    /// Fetch the bytes of `hash` from the peer at `peer_address`.
    ///
    /// The returned bytes are NOT verified here; integrity is checked once,
    /// at assembly.
    async fn fetch(
        &self,
        hash: &ContentHash,
        peer_address: &str,
        timeout: Duration,
    ) -> Result<Vec<u8>, FetchError>;
}
