//! Content Store Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction.

use crate::identity::Identity;
use derive_more::{Display, Error};
use std::io::Error as IoError;
use std::path::PathBuf;

/// A content store error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for content store operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// These describe what the caller should *do*, not what went wrong
/// internally. `NotFound` and `Corrupt` are deliberately distinct from
/// plain `Io` so operators can tell "missing" from "damaged".
#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// No object exists for the given identity.
    #[display("object not found: {_0}")]
    NotFound(#[error(not(source))] Identity),
    /// The stored object exists but its compressed stream is truncated or
    /// fails validation on decode. Don't retry; the object is damaged.
    #[display("corrupt object: {_0}")]
    Corrupt(#[error(not(source))] Identity),
    /// Underlying I/O error.
    #[display("I/O error: {_0}")]
    Io(IoError),
    /// The string is not a valid 64-character lowercase hex identity.
    #[display("invalid identity: {_0:?}")]
    InvalidIdentity(#[error(not(source))] String),
    /// A destination path has no filename component.
    #[display("invalid destination path: {}", _0.display())]
    InvalidPath(#[error(not(source))] PathBuf),
    /// A blocking worker task failed to complete.
    #[display("background task failed")]
    Task,
}
impl From<IoError> for ErrorKind {
    fn from(err: IoError) -> Self {
        Self::Io(err)
    }
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Io(_) | Self::Task)
    }
}
