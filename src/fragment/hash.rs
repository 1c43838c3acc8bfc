//! Content addresses for fragments.
//!
//! A fragment is identified by the SHA-256 digest of its raw bytes. The same
//! digest doubles as the integrity check on reassembly and as the DHT key for
//! the fragment's location record (rendered as lowercase hex).

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Length of a content hash in bytes (SHA-256).
pub const HASH_LEN: usize = 32;

/// SHA-256 content address of a byte block.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContentHash([u8; HASH_LEN]);

/// Error parsing a hex-encoded content hash.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseHashError {
    #[error("invalid hex: {0}")]
    InvalidHex(String),

    #[error("expected {HASH_LEN} bytes, got {0}")]
    InvalidLength(usize),
}

impl ContentHash {
    /// Digest `data` with SHA-256.
    pub fn digest(data: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(data);
        Self(hasher.finalize().into())
    }

    /// Wrap raw digest bytes.
    pub fn from_bytes(bytes: [u8; HASH_LEN]) -> Self {
        Self(bytes)
    }

    /// Get bytes.
    pub fn as_bytes(&self) -> &[u8; HASH_LEN] {
        &self.0
    }

    /// Lowercase hex rendering, used as the DHT key.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Whether `data` digests to this hash.
    pub fn matches(&self, data: &[u8]) -> bool {
        Self::digest(data) == *self
    }

    /// First 8 hex chars, for log lines.
    pub fn short(&self) -> String {
        hex::encode(&self.0[..4])
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl fmt::Debug for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContentHash({})", self.short())
    }
}

impl FromStr for ContentHash {
    type Err = ParseHashError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = hex::decode(s).map_err(|e| ParseHashError::InvalidHex(e.to_string()))?;
        let array: [u8; HASH_LEN] = bytes
            .as_slice()
            .try_into()
            .map_err(|_| ParseHashError::InvalidLength(bytes.len()))?;
        Ok(Self(array))
    }
}

// Serialized as a hex string so records stay readable when dumped as JSON.
impl Serialize for ContentHash {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for ContentHash {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
