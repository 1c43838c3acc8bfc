//! Fragment registry.
//!
//! This module keeps track of which fragments make up which files:
//! - a node-local, content-addressed fragment cache and file index
//! - the records published to the DHT (manifests and fragment locations)
//! - the publish/lookup facade over the DHT

pub mod directory;
pub mod local;
pub mod records;

pub use directory::{DhtDirectory, PublishCheck, RegistryError};
pub use local::FragmentRegistry;
pub use records::{location_key, manifest_key, FileManifest, FragmentLocation, MANIFEST_KEY_PREFIX};
