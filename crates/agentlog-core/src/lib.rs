//! agentlog Core Library
//!
//! Data model and local-side machinery for the log sync engine: log entries,
//! the in-memory append buffer, the batch builder, configuration, and the
//! shared error taxonomy.
//!
//! Remote persistence lives in `agentlog-store`; the scheduler and retrieval
//! service live in `agentlog-sync`.

pub mod batch;
pub mod buffer;
pub mod config;
pub mod entry;
pub mod error;
pub mod obs;
pub mod telemetry;

pub use batch::{build_batches, Batch, BatchId};
pub use buffer::{LogBuffer, OverflowPolicy};
pub use config::SyncConfig;
pub use entry::{EntryContent, LogEntry};
pub use error::{BufferError, CoreError, Result};
pub use telemetry::init_tracing;

/// agentlog version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
