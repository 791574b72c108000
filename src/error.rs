//! Closed error taxonomy for the directory cache and connection pool.
//!
//! Callers match on variants, never on the rendered message — the message
//! text is for logs and HTTP error bodies only.

use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum CoreError {
    #[error("invalid credentials")]
    InvalidCredentials,

    #[error("connection acquire timed out after {0:?}")]
    ConnectionTimeout(Duration),

    #[error("pool is closed")]
    PoolClosed,

    #[error("user not found: {0}")]
    UserNotFound(String),

    #[error("group not found: {0}")]
    GroupNotFound(String),

    #[error("directory connectivity error: {0}")]
    Directory(String),

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("operation cancelled")]
    Cancelled,
}

impl CoreError {
    /// Transient directory I/O failures are the only kind the retry engine
    /// should ever re-attempt; everything else is either terminal or a
    /// caller-visible business outcome (not-found, bad credentials).
    pub fn is_retryable(&self) -> bool {
        matches!(self, CoreError::Directory(_))
    }
}

pub type Result<T> = std::result::Result<T, CoreError>;
