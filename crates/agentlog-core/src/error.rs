//! Error types for agentlog-core

use thiserror::Error;

/// Errors surfaced synchronously by the log buffer.
#[derive(Error, Debug)]
pub enum BufferError {
    /// Hard memory ceiling exceeded under the reject-new policy.
    #[error("Buffer overflow: {pending_bytes} bytes pending, ceiling {max_bytes}")]
    Overflow {
        pending_bytes: usize,
        max_bytes: usize,
    },
}

/// Errors from the core data layer.
#[derive(Error, Debug)]
pub enum CoreError {
    /// Buffer capacity error
    #[error(transparent)]
    Buffer(#[from] BufferError),

    /// Batch serialization error
    #[error("Serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Invalid configuration value
    #[error("Config error: {0}")]
    Config(String),
}

/// Result type for agentlog-core operations
pub type Result<T> = std::result::Result<T, CoreError>;
