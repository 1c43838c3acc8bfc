//! Fragnet - Content-Addressed File Fragmentation Network
//!
//! Splits files into fixed-size, SHA-256-addressed fragments, publishes
//! where each fragment lives to a DHT, and reassembles files from fragments
//! fetched concurrently from many peers.
//!
//! Key principles:
//! - Content addressing: a fragment's identity is the hash of its bytes
//! - Verify before write: nothing reaches the output path until every
//!   fragment is present and hash-checked
//! - Failures are addressable: an incomplete retrieval names exactly the
//!   fragments to re-fetch
//! - The DHT and the peer transport are collaborators behind traits

pub mod codec;
pub mod dht;
pub mod fragment;
pub mod node;
pub mod registry;
pub mod retrieval;
pub mod transport;

pub use node::{Node, NodeConfig, NodeError, NodeStats};
