//! Store error types.

use std::io;
use thiserror::Error;

use crate::address::ContentAddress;

/// Store error type.
#[derive(Debug, Error)]
pub enum StoreError {
    /// No content was ever stored under this address.
    #[error("blob not found: {0}")]
    NotFound(ContentAddress),

    /// Stored bytes do not match the requested blob.
    #[error("blob {address} is corrupt: {reason}")]
    Corrupt {
        address: ContentAddress,
        reason: String,
    },

    /// Malformed content address.
    #[error("invalid content address: {0}")]
    InvalidAddress(String),

    /// I/O error from the backing medium.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl StoreError {
    /// Create a Corrupt error.
    pub fn corrupt(address: ContentAddress, reason: impl Into<String>) -> Self {
        Self::Corrupt {
            address,
            reason: reason.into(),
        }
    }
}

/// Store result type.
pub type StoreResult<T> = Result<T, StoreError>;
