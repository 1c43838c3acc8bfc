//! Reassembly of fragments into a file.
//!
//! # Flow
//!
//! 1. Sort fragments by index (arrival order never matters)
//! 2. Verify the set is complete: count, agreed total, indices `0..total`
//! 3. Verify every fragment's bytes against its content hash
//! 4. Concatenate in index order
//! 5. Write to a temp file next to the destination, rename on success
//!
//! Nothing reaches the destination path unless every fragment passed. A
//! failed assembly leaves no file behind.

use super::fragmenter::Fragment;
use super::hash::ContentHash;
use std::io::Write;
use std::path::Path;
use thiserror::Error;

/// Errors that can occur during assembly
#[derive(Debug, Error)]
pub enum AssemblyError {
    #[error("No fragments to assemble")]
    EmptyInput,

    #[error("Incomplete fragment set: expected {expected}, got {actual}")]
    Incomplete { expected: u32, actual: usize },

    #[error("Fragment {index} claims {claimed} total fragments, expected {expected}")]
    InconsistentTotal {
        index: u32,
        claimed: u32,
        expected: u32,
    },

    #[error("Duplicate fragment index {0}")]
    DuplicateIndex(u32),

    #[error("Missing fragment index {0}")]
    MissingIndex(u32),

    #[error("Fragment {index} has no data")]
    MissingData { index: u32 },

    #[error("Integrity check failed for fragment {index}: expected {expected}, got {actual}")]
    Integrity {
        index: u32,
        expected: ContentHash,
        actual: ContentHash,
    },

    #[error("IO error writing '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

impl AssemblyError {
    /// Structural problems with the fragment set (count, indices, totals).
    pub fn is_completeness_failure(&self) -> bool {
        matches!(
            self,
            Self::Incomplete { .. }
                | Self::InconsistentTotal { .. }
                | Self::DuplicateIndex(_)
                | Self::MissingIndex(_)
        )
    }
}

/// Outcome of a successful assembly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AssemblyReport {
    /// Bytes written
    pub bytes: u64,

    /// Fragments consumed
    pub fragments: u32,
}

/// Verify a fragment set and concatenate it in index order.
///
/// Order of `fragments` does not matter. See [`AssemblyError`] for the
/// structural and integrity checks applied.
pub fn assemble_to_vec(fragments: &[Fragment]) -> Result<Vec<u8>, AssemblyError> {
    let ordered = verify_complete(fragments)?;

    let capacity = ordered.iter().map(|f| f.size).sum();
    let mut output = Vec::with_capacity(capacity);

    for fragment in ordered {
        let data = fragment
            .data
            .as_deref()
            .ok_or(AssemblyError::MissingData {
                index: fragment.index,
            })?;

        let actual = ContentHash::digest(data);
        if actual != fragment.content_hash {
            return Err(AssemblyError::Integrity {
                index: fragment.index,
                expected: fragment.content_hash,
                actual,
            });
        }

        output.extend_from_slice(data);
    }

    Ok(output)
}

/// Verify, concatenate and atomically write a fragment set to `output_path`.
///
/// The bytes are written to a temporary file in the destination directory
/// and renamed into place only after a successful flush.
pub fn assemble(
    fragments: &[Fragment],
    output_path: &Path,
) -> Result<AssemblyReport, AssemblyError> {
    let bytes = assemble_to_vec(fragments)?;
    write_atomically(output_path, &bytes)?;

    Ok(AssemblyReport {
        bytes: bytes.len() as u64,
        fragments: fragments.len() as u32,
    })
}

/// Sort by index and check the set describes exactly one complete file.
fn verify_complete(fragments: &[Fragment]) -> Result<Vec<&Fragment>, AssemblyError> {
    if fragments.is_empty() {
        return Err(AssemblyError::EmptyInput);
    }

    let mut ordered: Vec<&Fragment> = fragments.iter().collect();
    ordered.sort_by_key(|f| f.index);

    let expected = ordered[0].total_fragments;
    if ordered.len() != expected as usize {
        return Err(AssemblyError::Incomplete {
            expected,
            actual: ordered.len(),
        });
    }

    for (position, fragment) in ordered.iter().enumerate() {
        if fragment.total_fragments != expected {
            return Err(AssemblyError::InconsistentTotal {
                index: fragment.index,
                claimed: fragment.total_fragments,
                expected,
            });
        }

        let position = position as u32;
        if fragment.index != position {
            // Sorted, so a lower index here means we've seen it already
            return Err(if fragment.index < position {
                AssemblyError::DuplicateIndex(fragment.index)
            } else {
                AssemblyError::MissingIndex(position)
            });
        }
    }

    Ok(ordered)
}

fn write_atomically(output_path: &Path, bytes: &[u8]) -> Result<(), AssemblyError> {
    let io_err = |source| AssemblyError::Io {
        path: output_path.display().to_string(),
        source,
    };

    let dir = match output_path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    let mut temp = tempfile::NamedTempFile::new_in(dir).map_err(io_err)?;
    temp.write_all(bytes).map_err(io_err)?;
    temp.as_file().sync_all().map_err(io_err)?;
    temp.persist(output_path).map_err(|e| io_err(e.error))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fragment::Fragmenter;
    use tempfile::TempDir;

    fn sample(len: usize, fragment_size: usize) -> (Vec<u8>, Vec<Fragment>) {
        let data: Vec<u8> = (0..len).map(|i| (i * 7 % 256) as u8).collect();
        let fragments = Fragmenter::new(fragment_size)
            .unwrap()
            .fragment(&data, "sample.bin")
            .unwrap();
        (data, fragments)
    }

    #[test]
    fn test_roundtrip() {
        let (data, fragments) = sample(1000, 64);
        assert_eq!(assemble_to_vec(&fragments).unwrap(), data);
    }

    #[test]
    fn test_reverse_order_600000() {
        let (data, mut fragments) = sample(600_000, 262_144);
        fragments.reverse();
        assert_eq!(assemble_to_vec(&fragments).unwrap(), data);
    }

    #[test]
    fn test_empty_input() {
        assert!(matches!(assemble_to_vec(&[]), Err(AssemblyError::EmptyInput)));
    }

    #[test]
    fn test_missing_fragment() {
        let (_, mut fragments) = sample(300, 100);
        fragments.remove(1);

        let err = assemble_to_vec(&fragments).unwrap_err();
        assert!(matches!(
            err,
            AssemblyError::Incomplete {
                expected: 3,
                actual: 2
            }
        ));
        assert!(err.is_completeness_failure());
    }

    #[test]
    fn test_duplicate_index_with_correct_count() {
        let (_, mut fragments) = sample(300, 100);
        fragments[2] = fragments[1].clone();

        let err = assemble_to_vec(&fragments).unwrap_err();
        assert!(matches!(err, AssemblyError::DuplicateIndex(1)));
    }

    #[test]
    fn test_gap_with_correct_count() {
        let (_, mut fragments) = sample(300, 100);
        fragments[1].index = 5;

        let err = assemble_to_vec(&fragments).unwrap_err();
        assert!(matches!(err, AssemblyError::MissingIndex(1)));
    }

    #[test]
    fn test_inconsistent_total() {
        let (_, mut fragments) = sample(300, 100);
        fragments[2].total_fragments = 4;

        let err = assemble_to_vec(&fragments).unwrap_err();
        assert!(matches!(
            err,
            AssemblyError::InconsistentTotal {
                index: 2,
                claimed: 4,
                expected: 3
            }
        ));
    }

    #[test]
    fn test_missing_data() {
        let (_, mut fragments) = sample(300, 100);
        fragments[0] = fragments[0].without_data();

        assert!(matches!(
            assemble_to_vec(&fragments),
            Err(AssemblyError::MissingData { index: 0 })
        ));
    }

    #[test]
    fn test_tamper_detected() {
        let (_, mut fragments) = sample(300, 100);
        if let Some(data) = fragments[2].data.as_mut() {
            data[99] ^= 0xFF;
        }

        assert!(matches!(
            assemble_to_vec(&fragments),
            Err(AssemblyError::Integrity { index: 2, .. })
        ));
    }

    #[test]
    fn test_assemble_writes_file() {
        let dir = TempDir::new().unwrap();
        let out = dir.path().join("out.bin");
        let (data, fragments) = sample(5000, 512);

        let report = assemble(&fragments, &out).unwrap();

        assert_eq!(report.bytes, 5000);
        assert_eq!(report.fragments, 10);
        assert_eq!(std::fs::read(&out).unwrap(), data);
    }

    #[test]
    fn test_failed_assembly_leaves_no_file() {
        let dir = TempDir::new().unwrap();
        let out = dir.path().join("corrupt.bin");
        let (_, mut fragments) = sample(5000, 512);
        if let Some(data) = fragments[9].data.as_mut() {
            data[0] ^= 0x01;
        }

        assert!(assemble(&fragments, &out).is_err());
        assert!(!out.exists());
        // No stray temp files either
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_existing_file_untouched_on_failure() {
        let dir = TempDir::new().unwrap();
        let out = dir.path().join("keep.bin");
        std::fs::write(&out, b"previous contents").unwrap();

        let (_, mut fragments) = sample(300, 100);
        fragments.pop();

        assert!(assemble(&fragments, &out).is_err());
        assert_eq!(std::fs::read(&out).unwrap(), b"previous contents");
    }
}
