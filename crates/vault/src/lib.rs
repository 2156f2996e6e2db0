//! Orchestration of the content archive and the metadata index.
//!
//! A vault ties a local folder to an archive directory. `push` walks the
//! local folder and records a deduplicated snapshot; `pop` materializes the
//! recorded snapshot back onto disk. The two halves stay consistent because
//! every blob is indexed (as `Pending`) before its object is archived, and
//! only flipped to `Ready` afterwards.

pub mod error;
mod vault;

pub use crate::error::{Error, ErrorKind, Result};
pub use crate::vault::{INDEX_FILENAME, PopReport, PushReport, Vault};
