//! Structured observability hooks for sync lifecycle events.
//!
//! Emission functions for the key lifecycle events: flush start/finish,
//! batch upload, backoff, degraded mode, retrieval. The scheduler wraps
//! each flush attempt in an `agentlog.flush` span (via
//! `tracing::Instrument`, safe to hold across awaits); these events land
//! inside it.
//!
//! Events are emitted at `info!` level; failures at `warn!`.

use tracing::{info, warn};

/// Emit event: a flush attempt started with this many pending batches.
pub fn emit_flush_started(pending_batches: usize, pending_bytes: usize) {
    info!(
        event = "flush.started",
        pending_batches = pending_batches,
        pending_bytes = pending_bytes,
    );
}

/// Emit event: one batch uploaded and confirmed.
pub fn emit_batch_uploaded(batch_id: &str, key: &str, entry_count: usize, last_offset: u64) {
    info!(
        event = "flush.batch_uploaded",
        batch_id = %batch_id,
        key = %key,
        entry_count = entry_count,
        last_offset = last_offset,
    );
}

/// Emit event: a flush attempt finished; `flushed` batches confirmed.
pub fn emit_flush_finished(flushed: usize, remaining: usize) {
    info!(event = "flush.finished", flushed = flushed, remaining = remaining);
}

/// Emit event: a batch upload failed transiently and will be retried.
pub fn emit_flush_retry(batch_id: &str, delay_ms: u64, error: &dyn std::fmt::Display) {
    warn!(
        event = "flush.retry",
        batch_id = %batch_id,
        delay_ms = delay_ms,
        error = %error,
    );
}

/// Emit event: sync entered or left degraded mode.
pub fn emit_sync_degraded(degraded: bool, error: Option<&dyn std::fmt::Display>) {
    match error {
        Some(e) if degraded => warn!(event = "sync.degraded", degraded = true, error = %e),
        _ => info!(event = "sync.degraded", degraded = degraded),
    }
}

/// Emit event: buffer ceiling hit and oldest entries evicted.
pub fn emit_entries_dropped(dropped: usize, pending_bytes: usize) {
    warn!(
        event = "buffer.entries_dropped",
        dropped = dropped,
        pending_bytes = pending_bytes,
    );
}

/// Emit event: a retrieval call completed.
pub fn emit_context_fetched(entries: usize, objects: usize, incomplete: bool) {
    info!(
        event = "retrieval.context_fetched",
        entries = entries,
        objects = objects,
        incomplete = incomplete,
    );
}
