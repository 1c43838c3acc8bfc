//! A participating node.
//!
//! Ties the pieces together: ingestion (fragment, cache locally, publish to
//! the DHT), lookup, and distributed download. Nodes in one process share
//! nothing but the DHT handle they are given.

use crate::dht::KeyValueStore;
use crate::fragment::{
    ContentHash, Fragment, FragmentError, Fragmenter, DEFAULT_FRAGMENT_SIZE, MAX_FRAGMENT_SIZE,
};
use crate::registry::{
    DhtDirectory, FileManifest, FragmentLocation, FragmentRegistry, RegistryError,
};
use crate::retrieval::{
    PeerFetcher, RetrievalConfig, RetrievalCoordinator, RetrievalError, RetrievalReport,
};
use crate::transport::{FragmentServer, ServerHandle, TcpPeerFetcher};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;

/// Errors surfaced by node operations
#[derive(Debug, Error)]
pub enum NodeError {
    #[error("Invalid node configuration: {0}")]
    InvalidConfig(String),

    #[error("Fragmentation failed: {0}")]
    Fragment(#[from] FragmentError),

    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("Retrieval failed: {0}")]
    Retrieval(#[from] RetrievalError),

    #[error("Publish of '{filename}' not visible: manifest found = {manifest_found}, {} location(s) missing", .missing.len())]
    IncompletePublish {
        filename: String,
        manifest_found: bool,
        missing: Vec<ContentHash>,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl NodeError {
    /// No manifest exists for the requested file.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Retrieval(RetrievalError::NotFound(_)))
    }

    /// Some fragments could not be located or fetched.
    pub fn is_incomplete(&self) -> bool {
        matches!(self, Self::Retrieval(e) if e.is_incomplete())
    }

    /// A fragment failed hash verification.
    pub fn is_integrity_failure(&self) -> bool {
        matches!(self, Self::Retrieval(e) if e.is_integrity_failure())
    }
}

/// Runtime settings for one node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeConfig {
    /// Identifier recorded as owner in published records
    pub node_id: String,

    /// Address the fragment server binds to (port 0 picks one)
    pub listen_address: String,

    /// Fragment size for ingestion (default: 256 KiB)
    pub fragment_size: usize,

    pub retrieval: RetrievalConfig,
}

impl NodeConfig {
    /// Default settings under the given node id.
    pub fn with_id(node_id: impl Into<String>) -> Self {
        Self {
            node_id: node_id.into(),
            ..Self::default()
        }
    }

    /// Check invariants before a node is built from this config.
    pub fn validate(&self) -> Result<(), NodeError> {
        if self.node_id.trim().is_empty() {
            return Err(NodeError::InvalidConfig("node_id is empty".to_string()));
        }
        if self.fragment_size == 0 {
            return Err(NodeError::InvalidConfig(
                "fragment_size must be positive".to_string(),
            ));
        }
        if self.fragment_size > MAX_FRAGMENT_SIZE {
            return Err(NodeError::InvalidConfig(format!(
                "fragment_size must be at most {MAX_FRAGMENT_SIZE} bytes"
            )));
        }
        if self.retrieval.fetch_timeout.is_zero() || self.retrieval.retrieval_timeout.is_zero() {
            return Err(NodeError::InvalidConfig(
                "retrieval timeouts must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            node_id: generate_node_id(),
            listen_address: "127.0.0.1:0".to_string(),
            fragment_size: DEFAULT_FRAGMENT_SIZE,
            retrieval: RetrievalConfig::default(),
        }
    }
}

/// Random node id of the form `node-xxxxxxxx`.
pub fn generate_node_id() -> String {
    let id = uuid::Uuid::new_v4().simple().to_string();
    format!("node-{}", &id[..8])
}

/// Point-in-time node statistics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeStats {
    pub node_id: String,
    pub address: String,
    pub stored_fragments: usize,
    pub stored_files: usize,
    pub stored_bytes: u64,
    pub active_retrievals: usize,
}

/// A node: local fragment cache, DHT directory and retrieval coordinator.
pub struct Node {
    node_id: String,
    address: String,
    fragmenter: Fragmenter,
    registry: FragmentRegistry,
    directory: DhtDirectory,
    coordinator: RetrievalCoordinator,
    server: Option<ServerHandle>,
}

impl Node {
    /// Build a node without a fragment server.
    ///
    /// Published records advertise `config.listen_address`; remote fetches
    /// go through `fetcher`.
    pub fn new(
        config: NodeConfig,
        dht: Arc<dyn KeyValueStore>,
        fetcher: Arc<dyn PeerFetcher>,
    ) -> Result<Self, NodeError> {
        config.validate()?;
        let address = config.listen_address.clone();
        Self::build(config, address, FragmentRegistry::new(), dht, fetcher, None)
    }

    /// Bind a TCP fragment server and build a node that fetches over TCP.
    ///
    /// Published records advertise the address actually bound.
    pub async fn start(config: NodeConfig, dht: Arc<dyn KeyValueStore>) -> Result<Self, NodeError> {
        config.validate()?;
        let registry = FragmentRegistry::new();
        let server = FragmentServer::bind(&config.listen_address, registry.clone())
            .await?
            .spawn()?;
        let address = server.address().to_string();

        Self::build(
            config,
            address,
            registry,
            dht,
            Arc::new(TcpPeerFetcher::new()),
            Some(server),
        )
    }

    fn build(
        config: NodeConfig,
        address: String,
        registry: FragmentRegistry,
        dht: Arc<dyn KeyValueStore>,
        fetcher: Arc<dyn PeerFetcher>,
        server: Option<ServerHandle>,
    ) -> Result<Self, NodeError> {
        let fragmenter = Fragmenter::new(config.fragment_size)?;
        let directory = DhtDirectory::new(dht);
        let coordinator = RetrievalCoordinator::new(
            directory.clone(),
            registry.clone(),
            fetcher,
            config.retrieval,
        );

        tracing::info!(node_id = %config.node_id, %address, "node ready");

        Ok(Self {
            node_id: config.node_id,
            address,
            fragmenter,
            registry,
            directory,
            coordinator,
            server,
        })
    }

    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    /// Address advertised in this node's location records.
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Local fragment cache.
    pub fn registry(&self) -> &FragmentRegistry {
        &self.registry
    }

    /// Coordinator, for re-fetching the failures of an incomplete download.
    pub fn coordinator(&self) -> &RetrievalCoordinator {
        &self.coordinator
    }

    /// Ingest a file from disk.
    ///
    /// Fragments the file and checks that its name is free (or already holds
    /// this exact manifest) before anything is cached or published. Then
    /// caches every fragment locally, publishes one location record per
    /// fragment and the manifest, and re-reads the DHT to confirm every
    /// record is visible. Storing the same content again is idempotent.
    ///
    /// # Errors
    ///
    /// - `Fragment`: unreadable file or unusable name
    /// - `Registry`: DHT failure, or a different manifest already published
    ///   under this name
    /// - `IncompletePublish`: some record did not become visible
    pub async fn store_file(&self, path: &Path) -> Result<FileManifest, NodeError> {
        let (filename, fragments) = self.fragmenter.fragment_file(path).await?;
        self.publish(&filename, fragments).await
    }

    /// Ingest in-memory bytes under a logical filename.
    pub async fn store_bytes(
        &self,
        filename: &str,
        bytes: &[u8],
    ) -> Result<FileManifest, NodeError> {
        let fragments = self.fragmenter.fragment(bytes, filename)?;
        self.publish(filename, fragments).await
    }

    /// Cache, index and publish freshly fragmented content.
    async fn publish(
        &self,
        filename: &str,
        fragments: Vec<Fragment>,
    ) -> Result<FileManifest, NodeError> {
        let manifest = FileManifest::from_fragments(filename, &fragments, &self.node_id);

        // A rejected name leaves both the DHT and the local cache untouched
        self.directory.check_manifest(&manifest).await?;

        let locations: Vec<FragmentLocation> = fragments
            .iter()
            .map(|fragment| FragmentLocation::for_fragment(fragment, &self.node_id, &self.address))
            .collect();
        for fragment in fragments {
            self.registry.insert(fragment);
        }

        // Locations first: a visible manifest never points at records that
        // were never attempted.
        for location in &locations {
            self.directory.publish_fragment(location).await?;
        }
        self.directory.publish_manifest(&manifest).await?;
        self.registry
            .record_file(filename, manifest.fragment_hashes.clone());

        let check = self.directory.verify_published(filename).await?;
        if !check.is_complete() {
            tracing::warn!(
                filename = %filename,
                manifest_found = check.manifest_found,
                missing = check.missing_locations.len(),
                "published records not visible"
            );
            return Err(NodeError::IncompletePublish {
                filename: filename.to_string(),
                manifest_found: check.manifest_found,
                missing: check.missing_locations,
            });
        }

        tracing::info!(
            filename = %filename,
            fragments = manifest.total_fragments,
            bytes = manifest.file_size,
            "file stored"
        );
        Ok(manifest)
    }

    /// Look up a file's manifest in the DHT.
    pub async fn search_file(&self, filename: &str) -> Result<Option<FileManifest>, NodeError> {
        Ok(self.directory.lookup_manifest(filename).await?)
    }

    /// Retrieve a file from the network and write it to `output_path`.
    ///
    /// Nothing is written unless every fragment arrived and verified.
    pub async fn download_file(
        &self,
        filename: &str,
        output_path: &Path,
    ) -> Result<RetrievalReport, NodeError> {
        Ok(self.coordinator.retrieve(filename, output_path).await?)
    }

    /// Like [`Node::download_file`], aborting when `cancel` completes.
    pub async fn download_file_with_cancel<F>(
        &self,
        filename: &str,
        output_path: &Path,
        cancel: F,
    ) -> Result<RetrievalReport, NodeError>
    where
        F: Future<Output = ()>,
    {
        Ok(self
            .coordinator
            .retrieve_with_cancel(filename, output_path, cancel)
            .await?)
    }

    /// Files ingested by this node, sorted.
    pub fn list_stored_files(&self) -> Vec<String> {
        self.registry.list_files()
    }

    pub fn get_stats(&self) -> NodeStats {
        NodeStats {
            node_id: self.node_id.clone(),
            address: self.address.clone(),
            stored_fragments: self.registry.fragment_count(),
            stored_files: self.registry.file_count(),
            stored_bytes: self.registry.bytes_stored(),
            active_retrievals: self.coordinator.active_retrievals(),
        }
    }

    /// Stop serving fragments to peers.
    pub fn shutdown(&self) {
        if let Some(server) = &self.server {
            server.shutdown();
            tracing::info!(node_id = %self.node_id, "fragment server stopped");
        }
    }
}
