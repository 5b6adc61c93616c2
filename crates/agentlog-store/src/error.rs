//! Error types for agentlog-store

use thiserror::Error;

/// Errors from the object store boundary and durable state.
#[derive(Error, Debug)]
pub enum StoreError {
    /// Network or server hiccup; retried with backoff, never fatal.
    #[error("Transient store failure: {0}")]
    Transient(String),

    /// Persistent inability to reach the store (auth/config); surfaced as a
    /// degraded-mode signal, not retried on the fast path.
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// Object not present (or not yet visible) under the requested key.
    #[error("Object not found: {key}")]
    NotFound { key: String },

    /// Bucket alias does not resolve on this server.
    #[error("Bucket not found: {0}")]
    BucketNotFound(String),

    /// Payload could not be serialized or decoded.
    #[error("Serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Local durable state I/O error.
    #[error("State I/O failed: {0}")]
    Io(#[from] std::io::Error),
}

impl StoreError {
    /// Whether the scheduler should retry the operation with backoff.
    ///
    /// `NotFound` is deliberately not retriable here: during retrieval it is
    /// treated as a gap, and a put never produces it.
    pub fn is_retriable(&self) -> bool {
        matches!(self, StoreError::Transient(_))
    }
}

/// Result type for store operations
pub type StoreResult<T> = std::result::Result<T, StoreError>;
