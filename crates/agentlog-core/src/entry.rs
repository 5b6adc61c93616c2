//! Log entry model: one chain-of-thought reasoning step.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Payload of a log entry.
///
/// Agents emit both free-form console transcripts and structured step
/// records; both are first-class here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryContent {
    Text(String),
    Structured(serde_json::Value),
}

impl EntryContent {
    /// Approximate serialized size in bytes, used for batch packing and
    /// buffer accounting.
    pub fn size_bytes(&self) -> usize {
        match self {
            Self::Text(s) => s.len(),
            Self::Structured(v) => serde_json::to_vec(v).map(|b| b.len()).unwrap_or(0),
        }
    }
}

/// A single reasoning step awaiting upload.
///
/// Immutable once created. `offset` is assigned by the buffer at append time
/// and is strictly monotonic within one engine instance; the sync cursor
/// (`SyncState.last_flushed_offset`) is expressed in these offsets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    /// Monotonic append offset within this engine's stream.
    pub offset: u64,
    /// When the reasoning step was produced.
    pub timestamp: DateTime<Utc>,
    /// Agent that produced the step.
    pub agent_id: String,
    /// Step index within the agent's own run.
    pub step_index: u64,
    /// Step payload.
    pub content: EntryContent,
    /// Cached payload size, computed at append time.
    pub size_bytes: usize,
}

impl LogEntry {
    /// Build an entry, stamping the current time and payload size.
    pub fn new(offset: u64, agent_id: &str, step_index: u64, content: EntryContent) -> Self {
        let size_bytes = content.size_bytes();
        Self {
            offset,
            timestamp: Utc::now(),
            agent_id: agent_id.to_string(),
            step_index,
            content,
            size_bytes,
        }
    }
}
