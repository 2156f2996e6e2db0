//! Vault Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction.

use derive_more::{Display, Error};
use std::io::Error as IoError;

/// A vault error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for vault operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level failure categories for snapshot and restore.
///
/// The interesting detail lives in the wrapped source error; these kinds
/// answer the caller's first question: which half of the vault broke.
#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// The content archive failed (hashing, storing or retrieving an object).
    #[display("archive operation failed")]
    Archive,
    /// The metadata index failed (connecting, importing or listing).
    #[display("index operation failed")]
    Index,
    /// Walking or preparing the local folder failed.
    #[display("I/O error: {_0}")]
    Io(IoError),
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Io(_))
    }
}
