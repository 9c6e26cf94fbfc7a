//! Storage Errors
//!
//! Absence of a key is never an error: a key that was never set, was removed,
//! or has expired is reported as `None` by the read operations. The errors
//! below are all raised at construction or shutdown time.

use thiserror::Error;
use tokio::task::JoinError;

/// Errors that can occur while building or shutting down a [`Storage`](super::Storage).
#[derive(Debug, Error)]
pub enum StorageError {
    /// The storage was asked to run with zero shards
    #[error("shard count must be at least 1")]
    InvalidShardCount,

    /// An expiration setting is out of range
    #[error("invalid expiry config: {0}")]
    InvalidExpiryConfig(&'static str),

    /// Shard tasks need a Tokio runtime to be spawned on
    #[error("storage must be created from within a Tokio runtime")]
    NoRuntime,

    /// A shard expiration task panicked or was aborted
    #[error("shard task failed: {0}")]
    TaskFailed(#[from] JoinError),
}

/// Result type for storage operations that can fail.
pub type Result<T> = std::result::Result<T, StorageError>;
