//! Index Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction.

use derive_more::{Display, Error};
use std::io::Error as IoError;
use std::path::PathBuf;

/// An index error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for index operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// These describe what the caller should *do*, not what went wrong
/// internally. Integrity errors (`OutsideRoot`, `NoFileName`) are raised
/// before any mutation occurs; everything inside a transaction rolls back
/// on failure, so the index is never left half-updated.
#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    #[display("database error")]
    Database,
    #[display("database migration error")]
    Migration,
    /// The imported path does not live under the configured local root.
    #[display("path is outside the vault root: {}", _0.display())]
    OutsideRoot(#[error(not(source))] PathBuf),
    /// The imported path has no filename component.
    #[display("path has no filename component: {}", _0.display())]
    NoFileName(#[error(not(source))] PathBuf),
    /// A blob row disappeared between operations.
    #[display("blob not found")]
    BlobNotFound,
    /// Underlying I/O error (resolving paths against the local root).
    #[display("I/O error: {_0}")]
    Io(IoError),
    /// A row holds data the model can't represent.
    #[display("invalid index data: {_0}")]
    InvalidData(#[error(not(source))] &'static str),
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        false
    }
}
