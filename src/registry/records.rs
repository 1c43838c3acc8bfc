//! Records published to the DHT.
//!
//! ## Keys
//!
//! ```text
//! <hex content hash>   -> FragmentLocation
//! file:<filename>      -> FileManifest
//! ```
//!
//! Values are CBOR-encoded (see [`crate::codec`]).

use crate::codec::{self, CodecError};
use crate::fragment::{ContentHash, Fragment};
use serde::{Deserialize, Serialize};

/// DHT key prefix for manifests.
pub const MANIFEST_KEY_PREFIX: &str = "file:";

/// DHT key for a file's manifest.
pub fn manifest_key(filename: &str) -> String {
    format!("{MANIFEST_KEY_PREFIX}{filename}")
}

/// DHT key for a fragment's location record.
pub fn location_key(hash: &ContentHash) -> String {
    hash.to_hex()
}

/// Ordered description of how to rebuild one file.
///
/// Immutable once created at ingestion time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileManifest {
    /// Logical file name
    pub filename: String,

    /// Fragment hashes in index order
    pub fragment_hashes: Vec<ContentHash>,

    /// Number of fragments (equals `fragment_hashes.len()`)
    pub total_fragments: u32,

    /// Sum of fragment sizes
    pub file_size: u64,

    /// Node that ingested the file
    pub owner_node_id: String,
}

impl FileManifest {
    /// Build a manifest from a file's complete, index-ordered fragments.
    pub fn from_fragments(filename: &str, fragments: &[Fragment], owner_node_id: &str) -> Self {
        Self {
            filename: filename.to_string(),
            fragment_hashes: fragments.iter().map(|f| f.content_hash).collect(),
            total_fragments: fragments.len() as u32,
            file_size: fragments.iter().map(|f| f.size as u64).sum(),
            owner_node_id: owner_node_id.to_string(),
        }
    }

    /// Whether the hash list agrees with the declared fragment count.
    pub fn is_consistent(&self) -> bool {
        self.fragment_hashes.len() == self.total_fragments as usize
    }

    /// Content address of the manifest itself (SHA-256 of its encoding).
    ///
    /// Two publishes of the same file content by the same owner produce the
    /// same manifest hash.
    pub fn manifest_hash(&self) -> Result<ContentHash, CodecError> {
        Ok(ContentHash::digest(&codec::encode(self)?))
    }
}

/// Where a fragment lives and where it fits in its file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FragmentLocation {
    /// Fragment content hash (also the DHT key)
    pub content_hash: ContentHash,

    /// Node holding the fragment
    pub owner_node_id: String,

    /// Address the owner serves fragments on (`host:port`)
    pub owner_address: String,

    /// Logical parent file name
    pub filename: String,

    /// Position in the parent file
    pub index: u32,

    /// Fragment count of the parent file
    pub total_fragments: u32,

    /// Payload size in bytes
    pub size: usize,
}

impl FragmentLocation {
    /// Location record for a fragment held by `owner_node_id`.
    pub fn for_fragment(fragment: &Fragment, owner_node_id: &str, owner_address: &str) -> Self {
        Self {
            content_hash: fragment.content_hash,
            owner_node_id: owner_node_id.to_string(),
            owner_address: owner_address.to_string(),
            filename: fragment.filename.clone(),
            index: fragment.index,
            total_fragments: fragment.total_fragments,
            size: fragment.size,
        }
    }
}
