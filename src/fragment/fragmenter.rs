//! File fragmentation.
//!
//! Splits a byte stream into fixed-size, content-addressed fragments.
//!
//! ## Design
//!
//! - **Fragment Size**: 256 KiB by default, configurable per node
//! - **Addressing**: SHA-256 of each fragment's raw bytes
//! - **Cross-linking**: every fragment carries its index and the file's total
//!   fragment count, so a set of fragments is self-describing
//! - **Determinism**: the same bytes and fragment size always produce the
//!   same fragment hashes, in the same order
//!
//! An empty file produces exactly one zero-size fragment so that
//! `total_fragments` stays well-defined (never 0).

use super::hash::ContentHash;
use crate::registry::FragmentRegistry;
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Default fragment size: 256 KiB.
pub const DEFAULT_FRAGMENT_SIZE: usize = 256 * 1024;

/// Largest fragment size accepted: 32 MiB, half the transport frame limit.
pub const MAX_FRAGMENT_SIZE: usize = 32 * 1024 * 1024;

/// A single fragment of a file.
///
/// `data` is `None` when only metadata is known (e.g. from a location record
/// before the bytes have been fetched).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fragment {
    /// SHA-256 of `data`
    pub content_hash: ContentHash,

    /// Payload length in bytes
    pub size: usize,

    /// Position within the parent file (0-based)
    pub index: u32,

    /// Number of fragments composing the parent file
    pub total_fragments: u32,

    /// Logical name of the parent file
    pub filename: String,

    /// Fragment bytes, when resident
    #[serde(default, with = "serde_bytes")]
    pub data: Option<Vec<u8>>,
}

impl Fragment {
    /// Create a resident fragment from its bytes.
    pub fn new(filename: &str, index: u32, total_fragments: u32, data: Vec<u8>) -> Self {
        Self {
            content_hash: ContentHash::digest(&data),
            size: data.len(),
            index,
            total_fragments,
            filename: filename.to_string(),
            data: Some(data),
        }
    }

    /// Drop the payload, keeping only metadata.
    pub fn without_data(&self) -> Self {
        Self {
            data: None,
            ..self.clone()
        }
    }

    /// Whether the payload is present and digests to `content_hash`.
    pub fn is_intact(&self) -> bool {
        self.data
            .as_deref()
            .is_some_and(|data| self.content_hash.matches(data))
    }
}

/// Errors that can occur while fragmenting
#[derive(Debug, Error)]
pub enum FragmentError {
    #[error("Fragment size must be greater than zero")]
    InvalidFragmentSize,

    #[error("Fragment size {0} exceeds the {MAX_FRAGMENT_SIZE} byte limit")]
    FragmentSizeTooLarge(usize),

    #[error("Cannot derive a filename from path '{0}'")]
    InvalidFilename(String),

    #[error("Too many fragments: {0} exceeds u32 range")]
    TooManyFragments(usize),

    #[error("IO error reading '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Splits files into content-addressed fragments.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Fragmenter {
    fragment_size: usize,
}

impl Default for Fragmenter {
    fn default() -> Self {
        Self {
            fragment_size: DEFAULT_FRAGMENT_SIZE,
        }
    }
}

impl Fragmenter {
    /// Create a fragmenter with the given maximum fragment size
    /// (1 to [`MAX_FRAGMENT_SIZE`] bytes).
    pub fn new(fragment_size: usize) -> Result<Self, FragmentError> {
        if fragment_size == 0 {
            return Err(FragmentError::InvalidFragmentSize);
        }
        if fragment_size > MAX_FRAGMENT_SIZE {
            return Err(FragmentError::FragmentSizeTooLarge(fragment_size));
        }
        Ok(Self { fragment_size })
    }

    /// Maximum fragment size in bytes.
    pub fn fragment_size(&self) -> usize {
        self.fragment_size
    }

    /// Split `bytes` into fragments of at most `fragment_size` bytes.
    ///
    /// # Returns
    ///
    /// `ceil(len / fragment_size)` fragments with contiguous indices and a
    /// shared `total_fragments`, or a single empty fragment for empty input.
    pub fn fragment(&self, bytes: &[u8], filename: &str) -> Result<Vec<Fragment>, FragmentError> {
        if bytes.is_empty() {
            return Ok(vec![Fragment::new(filename, 0, 1, Vec::new())]);
        }

        let count = bytes.len().div_ceil(self.fragment_size);
        let total = u32::try_from(count).map_err(|_| FragmentError::TooManyFragments(count))?;

        let fragments = bytes
            .chunks(self.fragment_size)
            .zip(0u32..)
            .map(|(chunk, index)| Fragment::new(filename, index, total, chunk.to_vec()))
            .collect();

        Ok(fragments)
    }

    /// Fragment `bytes` and cache every fragment in the local registry.
    pub fn fragment_into(
        &self,
        bytes: &[u8],
        filename: &str,
        registry: &FragmentRegistry,
    ) -> Result<Vec<Fragment>, FragmentError> {
        let fragments = self.fragment(bytes, filename)?;
        cache(&fragments, registry);
        Ok(fragments)
    }

    /// Read a file from disk and fragment it.
    ///
    /// The logical filename is the path's base name.
    pub async fn fragment_file(
        &self,
        path: &Path,
    ) -> Result<(String, Vec<Fragment>), FragmentError> {
        let filename = logical_filename(path)?;
        let bytes = tokio::fs::read(path).await.map_err(|source| FragmentError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let fragments = self.fragment(&bytes, &filename)?;
        Ok((filename, fragments))
    }

    /// [`Fragmenter::fragment_file`], caching every fragment in the registry.
    pub async fn fragment_file_into(
        &self,
        path: &Path,
        registry: &FragmentRegistry,
    ) -> Result<(String, Vec<Fragment>), FragmentError> {
        let (filename, fragments) = self.fragment_file(path).await?;
        cache(&fragments, registry);
        Ok((filename, fragments))
    }
}

fn cache(fragments: &[Fragment], registry: &FragmentRegistry) {
    for fragment in fragments {
        registry.insert(fragment.clone());
    }
}

/// Logical filename for a path: its final component.
pub fn logical_filename(path: &Path) -> Result<String, FragmentError> {
    path.file_name()
        .and_then(|name| name.to_str())
        .map(str::to_string)
        .ok_or_else(|| FragmentError::InvalidFilename(path.display().to_string()))
}
