//! SQLite metadata index for the vault.
//!
//! This crate tracks which paths under a local root map to which deduplicated
//! content. The index is authoritative for structure (folders, files, and
//! which blob each file references); the archive's object directory is
//! authoritative for the content itself.
//!
//! # Architecture
//! Three entity types:
//! - **Blobs**: Deduplicated content, keyed by a 32-byte content identity.
//!   A blob is `Pending` until its object is installed in the archive, then
//!   `Ready`. Blobs with no referencing files are collected by triggers.
//! - **Folders**: The directory tree, anchored at a synthetic `ROOT` folder.
//!   Sibling names are unique case-insensitively.
//! - **Files**: Named references from a folder to a blob.

mod db;
pub mod error;
pub mod models;
mod repo;

pub use crate::db::Database;
pub use crate::repo::{ROOT_FOLDER, Repository};
