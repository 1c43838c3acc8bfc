//! Node-to-node fragment transfer over TCP.

pub mod client;
pub mod server;
pub mod wire;

pub use client::TcpPeerFetcher;
pub use server::{FragmentServer, ServerHandle};
pub use wire::{FragmentRequest, FragmentResponse, WireError, PROTOCOL_ID};
