//! Content-addressed fragmentation and reassembly.
//!
//! Files are split into fixed-size fragments identified by the SHA-256 of
//! their bytes, and reassembled only after every fragment has been checked
//! for completeness and integrity.

pub mod assembler;
pub mod fragmenter;
pub mod hash;

#[cfg(test)]
mod proptests;

pub use assembler::{assemble, assemble_to_vec, AssemblyError, AssemblyReport};
pub use fragmenter::{
    logical_filename, Fragment, FragmentError, Fragmenter, DEFAULT_FRAGMENT_SIZE, MAX_FRAGMENT_SIZE,
};
pub use hash::{ContentHash, ParseHashError, HASH_LEN};
