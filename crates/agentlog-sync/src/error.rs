//! Error types for agentlog-sync

use thiserror::Error;

use agentlog_core::{BufferError, CoreError};
use agentlog_store::StoreError;

/// Errors surfaced through the engine API.
#[derive(Error, Debug)]
pub enum SyncError {
    /// Local buffer rejected the entry (reject-new policy).
    #[error(transparent)]
    Buffer(#[from] BufferError),

    /// Core data-layer error (config, serialization).
    #[error(transparent)]
    Core(#[from] CoreError),

    /// Object store boundary error.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// The scheduler task is no longer running.
    #[error("Sync scheduler stopped")]
    SchedulerStopped,
}

/// Result type for agentlog-sync operations
pub type Result<T> = std::result::Result<T, SyncError>;
