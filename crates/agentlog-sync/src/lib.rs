//! agentlog-sync: scheduler, retrieval, and the engine handle.
//!
//! ## Key components
//!
//! - [`SyncScheduler`]: background flush loop with explicit retry state
//!   machine and capped exponential backoff
//! - [`RetrievalService`]: reassembles recent entries for context injection
//! - [`Engine`]: the handle the reasoning loop talks to (`log`,
//!   `get_context`, `flush_now`, `shutdown`)

pub mod backoff;
pub mod engine;
mod error;
pub mod retrieval;
pub mod scheduler;

pub use backoff::Backoff;
pub use engine::Engine;
pub use error::{Result, SyncError};
pub use retrieval::{ContextWindow, RecentWindow, RetrievalService};
pub use scheduler::{FlushOutcome, SchedulerPhase, SyncScheduler};
