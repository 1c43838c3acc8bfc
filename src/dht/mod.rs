//! External DHT boundary.
//!
//! - Key-value trait consumed by the fragment directory
//! - In-memory implementation for tests and single-process networks

pub mod memory;
pub mod traits;

pub use memory::MemoryDht;
pub use traits::{DhtError, DhtResult, KeyValueStore};
