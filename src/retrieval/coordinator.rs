//! Retrieval orchestration.
//!
//! This module implements the full download flow for one file:
//! 1. Resolve the file's manifest from the DHT
//! 2. Locate every fragment (a file is only as retrievable as its
//!    least-located fragment)
//! 3. Fetch all fragments concurrently, from the local registry when
//!    resident, otherwise from the owning peer
//! 4. Join, reporting failures by content hash
//! 5. Check the fetched sizes against the manifest
//! 6. Assemble (integrity-checked, atomic write) on the blocking pool
//!
//! Steps 1 to 4 race one overall deadline and an optional cancel signal.
//!
//! ## Design
//!
//! - **Independence**: one peer's failure or slowness never blocks the
//!   others; failed fetches are collected, not propagated
//! - **No auto-retry**: an incomplete retrieval returns the failed hashes and
//!   the fragments that did arrive; [`RetrievalCoordinator::fetch_fragments`]
//!   re-fetches just the failed ones
//! - **Cancellation**: on deadline or cancel the pending DHT lookup or the
//!   in-flight fetches are dropped and the retrieval is reported incomplete,
//!   never partially written
//! - **Duplicate content**: identical fragments within a file share one
//!   hash; each unique hash is located and fetched once

use super::fetcher::{FetchError, PeerFetcher};
use crate::fragment::{assemble, AssemblyError, ContentHash, Fragment};
use crate::registry::{
    DhtDirectory, FileManifest, FragmentLocation, FragmentRegistry, RegistryError,
};
use futures::stream::{FuturesUnordered, StreamExt};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::future::Future;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;

/// Why a retrieval ended without every fragment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IncompleteReason {
    /// One or more fetches failed
    FetchFailures,
    /// The retrieval deadline elapsed
    Deadline,
    /// The caller cancelled
    Cancelled,
}

impl fmt::Display for IncompleteReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FetchFailures => write!(f, "fetch failures"),
            Self::Deadline => write!(f, "deadline elapsed"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Errors that can occur during retrieval
#[derive(Debug, Error)]
pub enum RetrievalError {
    #[error("File not found: {0}")]
    NotFound(String),

    #[error("No location record for {} fragment(s) of '{filename}'", .missing.len())]
    Unlocated {
        filename: String,
        missing: Vec<ContentHash>,
    },

    #[error("Incomplete retrieval of '{filename}' ({reason}): {} of {total} fragment(s) failed", .failed.len())]
    Incomplete {
        filename: String,
        total: u32,
        reason: IncompleteReason,
        /// Unique hashes that were not retrieved, in manifest order
        failed: Vec<ContentHash>,
        /// Fragments that did arrive, ready to combine with a retry
        retrieved: Vec<Fragment>,
    },

    #[error("Manifest for '{0}' is inconsistent")]
    InconsistentManifest(String),

    #[error("Fetched {actual} bytes of '{filename}', manifest says {expected}")]
    SizeMismatch {
        filename: String,
        expected: u64,
        actual: u64,
    },

    #[error("Assembly task failed: {0}")]
    Task(String),

    #[error("Assembly failed: {0}")]
    Assembly(#[from] AssemblyError),

    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),
}

impl RetrievalError {
    /// Hashes the caller could retry: unlocated or failed fragments.
    pub fn failed_hashes(&self) -> &[ContentHash] {
        match self {
            Self::Unlocated { missing, .. } => missing,
            Self::Incomplete { failed, .. } => failed,
            _ => &[],
        }
    }

    /// Fewer fragments were obtained than the manifest requires.
    pub fn is_incomplete(&self) -> bool {
        matches!(self, Self::Unlocated { .. } | Self::Incomplete { .. })
    }

    /// A fragment's bytes did not match its content hash.
    pub fn is_integrity_failure(&self) -> bool {
        matches!(self, Self::Assembly(AssemblyError::Integrity { .. }))
    }
}

/// Retrieval timeouts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetrievalConfig {
    /// Timeout per fragment fetch (default: 5s)
    pub fetch_timeout: Duration,

    /// Deadline for the lookups and fetches of one retrieval (default: 60s)
    pub retrieval_timeout: Duration,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            fetch_timeout: Duration::from_secs(5),
            retrieval_timeout: Duration::from_secs(60),
        }
    }
}

/// Fragments obtained by one fetch phase.
#[derive(Debug, Clone)]
pub struct FetchOutcome {
    /// Fragments obtained, in manifest order
    pub fragments: Vec<Fragment>,

    /// Unique hashes not obtained, in manifest order
    pub failed: Vec<ContentHash>,

    /// Set when the phase was cut short
    pub interrupted: Option<IncompleteReason>,

    /// Fetches served from the local registry
    pub local_hits: u32,

    /// Fetches served by remote peers
    pub remote_fetches: u32,

    /// Wall time of the locate/fetch/join phase
    pub elapsed: Duration,
}

impl FetchOutcome {
    /// Whether every requested fragment arrived.
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }

    /// Payload bytes obtained.
    pub fn bytes(&self) -> u64 {
        self.fragments.iter().map(|f| f.size as u64).sum()
    }
}

/// Statistics for a completed retrieval.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievalReport {
    /// Logical file name
    pub filename: String,

    /// Bytes assembled
    pub bytes: u64,

    /// Fragments assembled
    pub fragments: u32,

    /// Wall time of the locate/fetch/join phase
    pub fetch_elapsed: Duration,

    /// Fragments served from the local registry
    pub local_hits: u32,

    /// Fragments fetched from remote peers
    pub remote_fetches: u32,
}

impl RetrievalReport {
    /// Effective transfer rate over the fetch phase.
    pub fn throughput_bytes_per_sec(&self) -> f64 {
        self.bytes as f64 / self.fetch_elapsed.as_secs_f64().max(f64::EPSILON)
    }
}

/// Decrements the active-retrieval counter when a retrieval ends.
struct ActiveRetrieval(Arc<AtomicUsize>);

impl ActiveRetrieval {
    fn enter(counter: &Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(Arc::clone(counter))
    }
}

impl Drop for ActiveRetrieval {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Coordinates manifest resolution, concurrent fetches and assembly.
#[derive(Clone)]
pub struct RetrievalCoordinator {
    directory: DhtDirectory,
    registry: FragmentRegistry,
    fetcher: Arc<dyn PeerFetcher>,
    config: RetrievalConfig,
    active: Arc<AtomicUsize>,
}

impl RetrievalCoordinator {
    /// Create a coordinator over a node's directory, local registry and fetcher.
    pub fn new(
        directory: DhtDirectory,
        registry: FragmentRegistry,
        fetcher: Arc<dyn PeerFetcher>,
        config: RetrievalConfig,
    ) -> Self {
        Self {
            directory,
            registry,
            fetcher,
            config,
            active: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Retrievals currently in progress.
    pub fn active_retrievals(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    /// Retrieve `filename` and write it to `output_path`.
    pub async fn retrieve(
        &self,
        filename: &str,
        output_path: &Path,
    ) -> Result<RetrievalReport, RetrievalError> {
        self.retrieve_with_cancel(filename, output_path, std::future::pending())
            .await
    }

    /// Retrieve `filename`, aborting when `cancel` completes.
    ///
    /// The deadline and `cancel` cover the manifest lookup, the location
    /// lookups and the fetches. Assembly starts only after all of them.
    ///
    /// # Errors
    ///
    /// - `NotFound`: no manifest published for `filename`
    /// - `Unlocated`: some fragment has no location record
    /// - `Incomplete`: some fetch failed, or the deadline/cancel fired
    /// - `SizeMismatch`: the fetched bytes disagree with the manifest size
    /// - `Assembly`: completeness or integrity failure in the fetched set
    pub async fn retrieve_with_cancel<F>(
        &self,
        filename: &str,
        output_path: &Path,
        cancel: F,
    ) -> Result<RetrievalReport, RetrievalError>
    where
        F: Future<Output = ()>,
    {
        let _active = ActiveRetrieval::enter(&self.active);

        let deadline = tokio::time::sleep(self.config.retrieval_timeout);
        let interrupt = async move {
            tokio::select! {
                () = deadline => IncompleteReason::Deadline,
                () = cancel => IncompleteReason::Cancelled,
            }
        };
        tokio::pin!(interrupt);

        let manifest = tokio::select! {
            resolved = self.resolve(filename) => resolved?,
            reason = &mut interrupt => {
                tracing::warn!(filename = %filename, %reason, "retrieval interrupted before manifest");
                return Err(RetrievalError::Incomplete {
                    filename: filename.to_string(),
                    total: 0,
                    reason,
                    failed: Vec::new(),
                    retrieved: Vec::new(),
                });
            }
        };
        tracing::info!(
            filename = %filename,
            fragments = manifest.total_fragments,
            bytes = manifest.file_size,
            "starting retrieval"
        );

        let positions = manifest_positions(&manifest);
        let outcome = self
            .fetch_positions(&manifest, &positions, &mut interrupt)
            .await?;

        if !outcome.is_complete() {
            let reason = outcome
                .interrupted
                .unwrap_or(IncompleteReason::FetchFailures);
            tracing::warn!(
                filename = %filename,
                failed = outcome.failed.len(),
                total = manifest.total_fragments,
                %reason,
                "retrieval incomplete"
            );
            return Err(RetrievalError::Incomplete {
                filename: filename.to_string(),
                total: manifest.total_fragments,
                reason,
                failed: outcome.failed,
                retrieved: outcome.fragments,
            });
        }

        let fetched_bytes = outcome.bytes();
        if fetched_bytes != manifest.file_size {
            tracing::warn!(
                filename = %filename,
                expected = manifest.file_size,
                actual = fetched_bytes,
                "fetched size disagrees with manifest"
            );
            return Err(RetrievalError::SizeMismatch {
                filename: filename.to_string(),
                expected: manifest.file_size,
                actual: fetched_bytes,
            });
        }

        let fragments = outcome.fragments;
        let path = output_path.to_path_buf();
        let assembled = tokio::task::spawn_blocking(move || assemble(&fragments, &path))
            .await
            .map_err(|e| RetrievalError::Task(e.to_string()))??;

        let report = RetrievalReport {
            filename: filename.to_string(),
            bytes: assembled.bytes,
            fragments: assembled.fragments,
            fetch_elapsed: outcome.elapsed,
            local_hits: outcome.local_hits,
            remote_fetches: outcome.remote_fetches,
        };

        tracing::info!(
            filename = %filename,
            bytes = report.bytes,
            elapsed_ms = report.fetch_elapsed.as_millis() as u64,
            mib_per_sec = report.throughput_bytes_per_sec() / (1024.0 * 1024.0),
            "retrieval complete"
        );
        Ok(report)
    }

    /// Fetch only the fragments of `filename` whose hash is in `hashes`.
    ///
    /// Used to retry the failures of an incomplete retrieval, under the same
    /// deadline as a full retrieval. Hashes that are not part of the manifest
    /// are reported as failed.
    pub async fn fetch_fragments(
        &self,
        filename: &str,
        hashes: &[ContentHash],
    ) -> Result<FetchOutcome, RetrievalError> {
        let manifest = self.resolve(filename).await?;
        let wanted: HashSet<&ContentHash> = hashes.iter().collect();
        let positions: Vec<(u32, ContentHash)> = manifest_positions(&manifest)
            .into_iter()
            .filter(|(_, hash)| wanted.contains(hash))
            .collect();

        let known: HashSet<&ContentHash> = manifest.fragment_hashes.iter().collect();
        let mut unknown = Vec::new();
        for hash in hashes {
            if !known.contains(hash) && !unknown.contains(hash) {
                unknown.push(*hash);
            }
        }

        let timeout = self.config.retrieval_timeout;
        let interrupt = async move {
            tokio::time::sleep(timeout).await;
            IncompleteReason::Deadline
        };
        tokio::pin!(interrupt);

        let mut outcome = self
            .fetch_positions(&manifest, &positions, &mut interrupt)
            .await?;
        if !unknown.is_empty() {
            tracing::warn!(filename = %filename, unknown = unknown.len(), "hashes not in manifest");
            outcome.failed.extend(unknown);
        }
        Ok(outcome)
    }

    /// Look up and sanity-check a file's manifest.
    pub async fn resolve(&self, filename: &str) -> Result<FileManifest, RetrievalError> {
        let manifest = self
            .directory
            .lookup_manifest(filename)
            .await?
            .ok_or_else(|| RetrievalError::NotFound(filename.to_string()))?;

        if !manifest.is_consistent() || manifest.total_fragments == 0 {
            return Err(RetrievalError::InconsistentManifest(filename.to_string()));
        }
        Ok(manifest)
    }

    /// Locate, fetch and join the fragments at `positions` of `manifest`.
    ///
    /// Stops early when `interrupt` completes, reporting every hash not yet
    /// fetched as failed.
    async fn fetch_positions<I>(
        &self,
        manifest: &FileManifest,
        positions: &[(u32, ContentHash)],
        interrupt: &mut I,
    ) -> Result<FetchOutcome, RetrievalError>
    where
        I: Future<Output = IncompleteReason> + Unpin,
    {
        let unique = unique_hashes(positions);
        let start = Instant::now();
        let mut fetched: HashMap<ContentHash, Vec<u8>> = HashMap::with_capacity(unique.len());
        let mut interrupted = None;
        let mut local_hits = 0;
        let mut remote_fetches = 0;

        let located = tokio::select! {
            located = self.locate(&manifest.filename, &unique) => Some(located?),
            reason = &mut *interrupt => {
                interrupted = Some(reason);
                None
            }
        };

        if let Some(locations) = located {
            let mut in_flight: FuturesUnordered<_> = locations
                .iter()
                .map(|location| self.fetch_one(location))
                .collect();

            loop {
                tokio::select! {
                    next = in_flight.next() => match next {
                        Some((hash, Ok(fetch))) => {
                            if fetch.local {
                                local_hits += 1;
                            } else {
                                remote_fetches += 1;
                            }
                            tracing::debug!(hash = %hash.short(), local = fetch.local, "fragment fetched");
                            fetched.insert(hash, fetch.data);
                        }
                        Some((hash, Err(error))) => {
                            tracing::warn!(hash = %hash.short(), %error, "fragment fetch failed");
                        }
                        None => break,
                    },
                    reason = &mut *interrupt => {
                        interrupted = Some(reason);
                        break;
                    }
                }
            }
            // Dropping `in_flight` here cancels any fetch still pending
        }

        let elapsed = start.elapsed();
        let mut fragments = Vec::with_capacity(positions.len());
        let mut failed = Vec::new();
        let mut reported = HashSet::new();

        for &(index, hash) in positions {
            match fetched.get(&hash) {
                Some(data) => fragments.push(Fragment {
                    content_hash: hash,
                    size: data.len(),
                    index,
                    total_fragments: manifest.total_fragments,
                    filename: manifest.filename.clone(),
                    data: Some(data.clone()),
                }),
                None => {
                    if reported.insert(hash) {
                        failed.push(hash);
                    }
                }
            }
        }

        Ok(FetchOutcome {
            fragments,
            failed,
            interrupted,
            local_hits,
            remote_fetches,
            elapsed,
        })
    }

    /// Look up the location of every hash, failing if any is absent.
    async fn locate(
        &self,
        filename: &str,
        hashes: &[ContentHash],
    ) -> Result<Vec<FragmentLocation>, RetrievalError> {
        let lookups = hashes
            .iter()
            .map(|hash| self.directory.lookup_fragment_location(hash));
        let results = futures::future::join_all(lookups).await;

        let mut locations = Vec::with_capacity(hashes.len());
        let mut missing = Vec::new();
        for (hash, result) in hashes.iter().zip(results) {
            match result? {
                Some(location) => locations.push(location),
                None => missing.push(*hash),
            }
        }

        if !missing.is_empty() {
            tracing::warn!(filename = %filename, missing = missing.len(), "fragments without location");
            return Err(RetrievalError::Unlocated {
                filename: filename.to_string(),
                missing,
            });
        }
        Ok(locations)
    }

    /// Fetch one fragment: local registry first, then the owning peer.
    ///
    /// Bytes whose length disagrees with the location record count as a
    /// failed fetch.
    async fn fetch_one(
        &self,
        location: &FragmentLocation,
    ) -> (ContentHash, Result<Fetched, FetchError>) {
        let hash = location.content_hash;

        let result = match self.registry.data(&hash) {
            Some(data) => Ok(Fetched { data, local: true }),
            None => {
                let timeout = self.config.fetch_timeout;
                tokio::time::timeout(
                    timeout,
                    self.fetcher.fetch(&hash, &location.owner_address, timeout),
                )
                .await
                .unwrap_or(Err(FetchError::Timeout(timeout)))
                .map(|data| Fetched { data, local: false })
            }
        };

        let result = result.and_then(|fetched| {
            if fetched.data.len() == location.size {
                Ok(fetched)
            } else {
                Err(FetchError::SizeMismatch {
                    hash,
                    expected: location.size,
                    actual: fetched.data.len(),
                })
            }
        });
        (hash, result)
    }
}

struct Fetched {
    data: Vec<u8>,
    local: bool,
}

fn manifest_positions(manifest: &FileManifest) -> Vec<(u32, ContentHash)> {
    (0u32..).zip(manifest.fragment_hashes.iter().copied()).collect()
}

fn unique_hashes(positions: &[(u32, ContentHash)]) -> Vec<ContentHash> {
    let mut seen = HashSet::new();
    positions
        .iter()
        .map(|&(_, hash)| hash)
        .filter(|hash| seen.insert(*hash))
        .collect()
}
