//! Content-addressed blob storage for the stowage vault.
//!
//! Every distinct byte sequence is stored exactly once, compressed as a
//! single zstd frame, under a path derived from its BLAKE3 hash (its
//! [`Identity`]). Installation is atomic: bytes land in a temp file first
//! and only become visible via a single rename, so a crash mid-operation
//! leaves either nothing or a complete object, never a truncated one.
//!
//! The store is safe to share between threads and cooperating processes on
//! the same host without external locking; see [`ContentStore`] for the
//! per-operation guarantees.

pub mod error;
mod identity;
mod layout;
mod store;

pub use crate::error::{Error, ErrorKind, Result};
pub use crate::identity::Identity;
pub use crate::layout::{NameGen, RandomNames};
pub use crate::store::{ContentStore, identify_file};
