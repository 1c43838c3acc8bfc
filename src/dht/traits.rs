//! Trait abstraction for the external DHT.
//!
//! The DHT is consumed as an opaque key-value service. Nothing here assumes
//! buckets, routing or replication; only best-effort, eventually consistent
//! `get`/`set` semantics.

use async_trait::async_trait;
use thiserror::Error;

/// Result type for DHT operations.
pub type DhtResult<T> = Result<T, DhtError>;

/// DHT operation errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DhtError {
    /// The service could not be reached.
    #[error("DHT unavailable: {0}")]
    Unavailable(String),

    /// The service rejected the write.
    #[error("DHT rejected write for key '{key}': {reason}")]
    Rejected { key: String, reason: String },

    /// Other error with message.
    #[error("{0}")]
    Other(String),
}

/// Key-value facade over a distributed hash table.
///
/// Absent keys are `Ok(None)`, never an error.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Store `value` under `key`, replacing any previous value.
    async fn set(&self, key: &str, value: Vec<u8>) -> DhtResult<()>;

    /// Fetch the value stored under `key`.
    async fn get(&self, key: &str) -> DhtResult<Option<Vec<u8>>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dht_error_display() {
        assert_eq!(
            DhtError::Unavailable("no peers".to_string()).to_string(),
            "DHT unavailable: no peers"
        );
        assert_eq!(DhtError::Other("boom".to_string()).to_string(), "boom");
        assert_eq!(
            DhtError::Rejected {
                key: "file:a".to_string(),
                reason: "too large".to_string()
            }
            .to_string(),
            "DHT rejected write for key 'file:a': too large"
        );
    }
}
