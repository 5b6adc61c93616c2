//! Batch model and the batch builder.
//!
//! A batch is a sealed, size-bounded, order-preserving group of log entries
//! that is uploaded to the remote store as a single object.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::entry::LogEntry;

/// Unique identifier for a batch.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BatchId(pub String);

impl BatchId {
    /// Generate a new random BatchId.
    pub fn new() -> Self {
        BatchId(Uuid::new_v4().to_string())
    }

    /// Short form (first 8 chars), used in object keys.
    pub fn short(&self) -> &str {
        &self.0[..8.min(self.0.len())]
    }
}

impl Default for BatchId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for BatchId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A sealed group of entries ready for upload.
///
/// Invariants:
/// - `entries` preserve append order; `first_offset..=last_offset` is
///   contiguous within one buffer's stream.
/// - `total_size_bytes <= max_batch_bytes` used at build time, unless the
///   batch holds exactly one oversized entry (entries are never split).
/// - Immutable once built; the scheduler only moves batches around.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Batch {
    pub batch_id: BatchId,
    pub created_at: DateTime<Utc>,
    pub first_offset: u64,
    pub last_offset: u64,
    pub total_size_bytes: usize,
    pub entry_count: usize,
    pub entries: Vec<LogEntry>,
}

impl Batch {
    fn seal(entries: Vec<LogEntry>) -> Self {
        debug_assert!(!entries.is_empty(), "a batch always holds at least one entry");
        let total_size_bytes = entries.iter().map(|e| e.size_bytes).sum();
        Self {
            batch_id: BatchId::new(),
            created_at: Utc::now(),
            first_offset: entries.first().map(|e| e.offset).unwrap_or(0),
            last_offset: entries.last().map(|e| e.offset).unwrap_or(0),
            total_size_bytes,
            entry_count: entries.len(),
            entries,
        }
    }

    /// Object key under `prefix` for this batch.
    ///
    /// Millisecond UTC timestamp first so keys sort lexically in
    /// chronological order (single writer per prefix). The zero-padded
    /// first offset breaks ties between batches sealed within the same
    /// millisecond; the short batch id makes the key unique.
    pub fn object_key(&self, prefix: &str) -> String {
        format!(
            "{}/{}-{:020}-{}",
            prefix,
            self.created_at.format("%Y%m%dT%H%M%S%.3fZ"),
            self.first_offset,
            self.batch_id.short()
        )
    }

    /// Serialize the batch to its upload payload.
    pub fn to_payload(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec(self)
    }

    /// Decode a batch from a downloaded payload.
    pub fn from_payload(payload: &[u8]) -> serde_json::Result<Self> {
        serde_json::from_slice(payload)
    }
}

/// Pack drained entries into sealed batches.
///
/// First-fit in arrival order: entries are never reordered (reasoning steps
/// are causally ordered) and never split. An entry larger than
/// `max_batch_bytes` is sealed alone in its own batch rather than rejected.
pub fn build_batches(entries: Vec<LogEntry>, max_batch_bytes: usize) -> Vec<Batch> {
    let mut batches = Vec::new();
    let mut current: Vec<LogEntry> = Vec::new();
    let mut current_bytes = 0usize;

    for entry in entries {
        if !current.is_empty() && current_bytes + entry.size_bytes > max_batch_bytes {
            batches.push(Batch::seal(std::mem::take(&mut current)));
            current_bytes = 0;
        }
        current_bytes += entry.size_bytes;
        current.push(entry);
        // An oversized entry fills its batch immediately.
        if current_bytes > max_batch_bytes {
            batches.push(Batch::seal(std::mem::take(&mut current)));
            current_bytes = 0;
        }
    }

    if !current.is_empty() {
        batches.push(Batch::seal(current));
    }

    batches
}
