//! Distributed retrieval of fragmented files.
//!
//! Resolves a file's manifest and fragment locations from the DHT, fetches
//! the fragments concurrently from their owners, and hands the complete set
//! to the assembler.

pub mod coordinator;
pub mod fetcher;
pub mod mock;

pub use coordinator::{
    FetchOutcome, IncompleteReason, RetrievalConfig, RetrievalCoordinator, RetrievalError,
    RetrievalReport,
};
pub use fetcher::{FetchError, PeerFetcher};
pub use mock::MockPeerFetcher;
