//! Publish/lookup facade over the external DHT.
//!
//! ## Semantics
//!
//! - **Fragment locations**: keyed by hex content hash, republishing is a
//!   harmless overwrite
//! - **Manifests**: keyed by `file:<filename>`. A publish that would replace
//!   a *different* manifest for the same name is rejected with
//!   [`RegistryError::ManifestConflict`]; republishing an identical manifest
//!   succeeds
//! - **Lookups**: absent keys are `Ok(None)`, never errors
//!
//! Publishing N locations plus one manifest is not atomic. Callers check the
//! name with [`DhtDirectory::check_manifest`], publish locations, then the
//! manifest, and can confirm the result with [`DhtDirectory::verify_published`].

use super::records::{location_key, manifest_key, FileManifest, FragmentLocation};
use crate::codec::{self, CodecError};
use crate::dht::{DhtError, KeyValueStore};
use crate::fragment::ContentHash;
use std::sync::Arc;
use thiserror::Error;

/// Errors that can occur talking to the DHT directory
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("DHT error: {0}")]
    Dht(#[from] DhtError),

    #[error("Record encoding error: {0}")]
    Codec(#[from] CodecError),

    #[error("Manifest conflict for '{filename}': existing {existing}, attempted {attempted}")]
    ManifestConflict {
        filename: String,
        existing: ContentHash,
        attempted: ContentHash,
    },

    #[error("Inconsistent manifest for '{0}': hash count does not match total_fragments")]
    InconsistentManifest(String),
}

/// Result of checking that a file's records are all visible in the DHT.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishCheck {
    /// Whether the manifest itself was found
    pub manifest_found: bool,

    /// Hashes whose location record is absent
    pub missing_locations: Vec<ContentHash>,
}

impl PublishCheck {
    /// Manifest and every location present.
    pub fn is_complete(&self) -> bool {
        self.manifest_found && self.missing_locations.is_empty()
    }
}

/// DHT-backed directory of manifests and fragment locations.
#[derive(Clone)]
pub struct DhtDirectory {
    dht: Arc<dyn KeyValueStore>,
}

impl DhtDirectory {
    /// Wrap a DHT handle.
    pub fn new(dht: Arc<dyn KeyValueStore>) -> Self {
        Self { dht }
    }

    /// Publish one fragment location record.
    pub async fn publish_fragment(&self, location: &FragmentLocation) -> Result<(), RegistryError> {
        let value = codec::encode(location)?;
        self.dht
            .set(&location_key(&location.content_hash), value)
            .await?;

        tracing::debug!(
            hash = %location.content_hash.short(),
            index = location.index,
            filename = %location.filename,
            "fragment location published"
        );
        Ok(())
    }

    /// Check that `manifest` may be published under its filename.
    ///
    /// Passes when the name is free or already holds this exact manifest.
    /// Callers run this before writing any location record, so a rejected
    /// publish leaves the name's existing records alone.
    ///
    /// # Errors
    ///
    /// - `InconsistentManifest`: hash list and total disagree
    /// - `ManifestConflict`: a different manifest already owns this name
    pub async fn check_manifest(&self, manifest: &FileManifest) -> Result<(), RegistryError> {
        if !manifest.is_consistent() {
            return Err(RegistryError::InconsistentManifest(
                manifest.filename.clone(),
            ));
        }

        let Some(existing) = self.lookup_manifest(&manifest.filename).await? else {
            return Ok(());
        };
        let existing = existing.manifest_hash()?;
        let attempted = manifest.manifest_hash()?;
        if existing != attempted {
            tracing::warn!(
                filename = %manifest.filename,
                existing = %existing.short(),
                attempted = %attempted.short(),
                "manifest conflict"
            );
            return Err(RegistryError::ManifestConflict {
                filename: manifest.filename.clone(),
                existing,
                attempted,
            });
        }
        Ok(())
    }

    /// Publish a file manifest, after [`DhtDirectory::check_manifest`].
    pub async fn publish_manifest(&self, manifest: &FileManifest) -> Result<(), RegistryError> {
        self.check_manifest(manifest).await?;

        self.dht
            .set(&manifest_key(&manifest.filename), codec::encode(manifest)?)
            .await?;

        tracing::info!(
            filename = %manifest.filename,
            fragments = manifest.total_fragments,
            bytes = manifest.file_size,
            "manifest published"
        );
        Ok(())
    }

    /// Look up a file manifest by name.
    pub async fn lookup_manifest(
        &self,
        filename: &str,
    ) -> Result<Option<FileManifest>, RegistryError> {
        match self.dht.get(&manifest_key(filename)).await? {
            Some(bytes) => Ok(Some(codec::decode(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Look up the location record of a fragment.
    pub async fn lookup_fragment_location(
        &self,
        hash: &ContentHash,
    ) -> Result<Option<FragmentLocation>, RegistryError> {
        match self.dht.get(&location_key(hash)).await? {
            Some(bytes) => Ok(Some(codec::decode(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Re-read a file's manifest and every location record it references.
    pub async fn verify_published(&self, filename: &str) -> Result<PublishCheck, RegistryError> {
        let Some(manifest) = self.lookup_manifest(filename).await? else {
            return Ok(PublishCheck {
                manifest_found: false,
                missing_locations: Vec::new(),
            });
        };

        let mut missing_locations = Vec::new();
        for hash in &manifest.fragment_hashes {
            if self.lookup_fragment_location(hash).await?.is_none() {
                missing_locations.push(*hash);
            }
        }

        Ok(PublishCheck {
            manifest_found: true,
            missing_locations,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dht::MemoryDht;
    use crate::fragment::{Fragment, Fragmenter};

    fn setup() -> (MemoryDht, DhtDirectory) {
        let dht = MemoryDht::new();
        let directory = DhtDirectory::new(Arc::new(dht.clone()));
        (dht, directory)
    }

    fn sample_file(content: &[u8]) -> (Vec<Fragment>, FileManifest) {
        let fragments = Fragmenter::new(4).unwrap().fragment(content, "doc.txt").unwrap();
        let manifest = FileManifest::from_fragments("doc.txt", &fragments, "node-a");
        (fragments, manifest)
    }

    #[tokio::test]
    async fn test_publish_and_lookup_manifest() {
        let (_, directory) = setup();
        let (_, manifest) = sample_file(b"hello world");

        directory.publish_manifest(&manifest).await.unwrap();
        let found = directory.lookup_manifest("doc.txt").await.unwrap();

        assert_eq!(found, Some(manifest));
    }

    #[tokio::test]
    async fn test_lookup_absent_manifest_is_none() {
        let (_, directory) = setup();
        assert_eq!(directory.lookup_manifest("nope").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_publish_and_lookup_location() {
        let (_, directory) = setup();
        let (fragments, _) = sample_file(b"hello world");
        let location = FragmentLocation::for_fragment(&fragments[1], "node-a", "127.0.0.1:4000");

        directory.publish_fragment(&location).await.unwrap();
        // Idempotent
        directory.publish_fragment(&location).await.unwrap();

        let found = directory
            .lookup_fragment_location(&fragments[1].content_hash)
            .await
            .unwrap();
        assert_eq!(found, Some(location));
    }

    #[tokio::test]
    async fn test_identical_republish_allowed() {
        let (dht, directory) = setup();
        let (_, manifest) = sample_file(b"same bytes");

        directory.publish_manifest(&manifest).await.unwrap();
        directory.publish_manifest(&manifest).await.unwrap();

        assert_eq!(dht.len(), 1);
    }

    #[tokio::test]
    async fn test_conflicting_manifest_rejected() {
        let (_, directory) = setup();
        let (_, original) = sample_file(b"version one");
        let (_, replacement) = sample_file(b"version two");

        directory.publish_manifest(&original).await.unwrap();
        let result = directory.publish_manifest(&replacement).await;

        assert!(matches!(result, Err(RegistryError::ManifestConflict { .. })));
        assert_eq!(
            directory.lookup_manifest("doc.txt").await.unwrap(),
            Some(original)
        );
    }

    #[tokio::test]
    async fn test_same_content_different_owner_conflicts() {
        let (_, directory) = setup();
        let (_, mine) = sample_file(b"shared name");
        let theirs = FileManifest {
            owner_node_id: "node-b".to_string(),
            ..mine.clone()
        };

        directory.publish_manifest(&mine).await.unwrap();
        assert!(matches!(
            directory.publish_manifest(&theirs).await,
            Err(RegistryError::ManifestConflict { .. })
        ));
    }

    #[tokio::test]
    async fn test_check_manifest_writes_nothing() {
        let (dht, directory) = setup();
        let (_, original) = sample_file(b"version one");
        let (_, replacement) = sample_file(b"version two");

        directory.check_manifest(&original).await.unwrap();
        assert_eq!(dht.len(), 0);

        directory.publish_manifest(&original).await.unwrap();
        directory.check_manifest(&original).await.unwrap();
        assert!(matches!(
            directory.check_manifest(&replacement).await,
            Err(RegistryError::ManifestConflict { .. })
        ));
        assert_eq!(dht.len(), 1);
    }

    #[tokio::test]
    async fn test_inconsistent_manifest_rejected() {
        let (_, directory) = setup();
        let (_, mut manifest) = sample_file(b"abcdefgh");
        manifest.total_fragments = 5;

        assert!(matches!(
            directory.publish_manifest(&manifest).await,
            Err(RegistryError::InconsistentManifest(_))
        ));
    }

    #[tokio::test]
    async fn test_verify_published_reports_missing_locations() {
        let (dht, directory) = setup();
        let (fragments, manifest) = sample_file(b"0123456789ab");
        dht.drop_writes_to(&location_key(&fragments[1].content_hash));

        for fragment in &fragments {
            let location = FragmentLocation::for_fragment(fragment, "node-a", "127.0.0.1:1");
            directory.publish_fragment(&location).await.unwrap();
        }
        directory.publish_manifest(&manifest).await.unwrap();

        let check = directory.verify_published("doc.txt").await.unwrap();
        assert!(check.manifest_found);
        assert_eq!(check.missing_locations, vec![fragments[1].content_hash]);
        assert!(!check.is_complete());
    }

    #[tokio::test]
    async fn test_verify_published_without_manifest() {
        let (_, directory) = setup();
        let check = directory.verify_published("ghost").await.unwrap();
        assert!(!check.manifest_found);
        assert!(!check.is_complete());
    }

    #[tokio::test]
    async fn test_dht_outage_surfaces() {
        let (dht, directory) = setup();
        dht.set_offline(true);

        assert!(matches!(
            directory.lookup_manifest("doc.txt").await,
            Err(RegistryError::Dht(DhtError::Unavailable(_)))
        ));
    }

    #[tokio::test]
    async fn test_corrupt_record_is_codec_error() {
        let (dht, directory) = setup();
        dht.set(&manifest_key("bad"), vec![0xff, 0xff]).await.unwrap();

        assert!(matches!(
            directory.lookup_manifest("bad").await,
            Err(RegistryError::Codec(_))
        ));
    }
}
