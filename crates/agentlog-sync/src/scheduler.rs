//! Background sync scheduler.
//!
//! One scheduler task owns the flush pipeline: drain the buffer, seal
//! batches, upload them, and advance the durable cursor. The retry loop is
//! an explicit state machine:
//!
//! ```text
//! Idle -> Flushing -> (Idle | BackoffWait -> Flushing)
//! ```
//!
//! A flush is triggered when the sync interval elapses since the last
//! success, when pending buffer bytes cross the batch-size threshold, or on
//! an explicit flush request — whichever comes first. Failed batches are
//! requeued at the front and never dropped; non-retriable failures flip a
//! degraded-mode watch flag instead of crashing anything.

use std::collections::VecDeque;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::{interval, Duration, Instant, MissedTickBehavior};
use tracing::{info_span, warn, Instrument};

use agentlog_core::{build_batches, obs, LogBuffer, SyncConfig};
use agentlog_store::{BucketId, ObjectStore, SyncState, SyncStateFile};

use crate::backoff::Backoff;

/// How often trigger conditions are re-checked.
const TICK: Duration = Duration::from_millis(100);

/// Where the scheduler currently is in its retry state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerPhase {
    Idle,
    Flushing,
    BackoffWait,
}

/// Result of one flush cycle, also sent back on explicit flush requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlushOutcome {
    /// Batches uploaded and confirmed in this cycle.
    pub uploaded: usize,
    /// Batches still pending (requeued or unattempted).
    pub remaining: usize,
    /// Whether the store is currently unreachable for non-retriable reasons.
    pub degraded: bool,
}

/// An explicit flush request from the engine handle.
pub(crate) struct FlushRequest {
    pub ack: oneshot::Sender<FlushOutcome>,
}

pub struct SyncScheduler {
    config: SyncConfig,
    buffer: Arc<LogBuffer>,
    store: Arc<dyn ObjectStore>,
    state_file: SyncStateFile,
    state: SyncState,
    bucket: Option<BucketId>,
    /// Sealed batches awaiting confirmation; failures requeue at the front.
    pending: VecDeque<agentlog_core::Batch>,
    backoff: Backoff,
    phase: SchedulerPhase,
    degraded: bool,
    degraded_tx: watch::Sender<bool>,
    attempt: u64,
    last_success: Instant,
    /// Gate on the next automatic flush while backing off or degraded.
    next_retry_at: Option<Instant>,
}

impl SyncScheduler {
    pub fn new(
        config: SyncConfig,
        buffer: Arc<LogBuffer>,
        store: Arc<dyn ObjectStore>,
        degraded_tx: watch::Sender<bool>,
    ) -> Self {
        let state_file = SyncStateFile::new(&config.state_path);
        let state = state_file.load();
        // Resume the offset stream past the cursor: a fresh buffer restarts
        // at 0, and offsets at or below `last_flushed_offset` would be
        // misread as already-confirmed batches.
        if let Some(flushed) = state.last_flushed_offset {
            buffer.resume_from(flushed + 1);
        }
        let backoff = Backoff::new(config.initial_backoff, config.max_backoff);
        Self {
            config,
            buffer,
            store,
            state_file,
            state,
            bucket: None,
            pending: VecDeque::new(),
            backoff,
            phase: SchedulerPhase::Idle,
            degraded: false,
            degraded_tx,
            attempt: 0,
            last_success: Instant::now(),
            next_retry_at: None,
        }
    }

    pub fn phase(&self) -> SchedulerPhase {
        self.phase
    }

    pub fn state(&self) -> &SyncState {
        &self.state
    }

    /// Drive the scheduler until shutdown, then run one bounded final flush.
    ///
    /// Returns the final sync state (also persisted) so callers can inspect
    /// what remained pending.
    pub(crate) async fn run(
        mut self,
        mut shutdown_rx: watch::Receiver<bool>,
        mut flush_rx: mpsc::Receiver<FlushRequest>,
    ) -> SyncState {
        let mut tick = interval(TICK);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = tick.tick() => {
                    if self.due() {
                        self.flush_cycle(Some(&shutdown_rx)).await;
                    }
                }
                Some(req) = flush_rx.recv() => {
                    let outcome = self.flush_cycle(Some(&shutdown_rx)).await;
                    let _ = req.ack.send(outcome);
                }
                changed = shutdown_rx.changed() => {
                    // Sender dropped counts as shutdown too.
                    if changed.is_err() || *shutdown_rx.borrow() {
                        break;
                    }
                }
            }
        }

        // Best-effort final flush, bounded so shutdown never hangs. Whatever
        // does not make it stays recorded as pending for the next startup.
        let deadline = self.config.shutdown_timeout;
        if tokio::time::timeout(deadline, self.flush_cycle(None)).await.is_err() {
            warn!(event = "flush.shutdown_timeout", timeout_ms = deadline.as_millis() as u64);
        }
        self.persist_state();
        self.state
    }

    /// Whether an automatic flush should start now.
    fn due(&self) -> bool {
        if let Some(at) = self.next_retry_at {
            return Instant::now() >= at;
        }
        if !self.pending.is_empty() {
            return true;
        }
        if self.buffer.pending_bytes() >= self.config.batch_size_bytes {
            return true;
        }
        Instant::now().duration_since(self.last_success) >= self.config.sync_interval
    }

    /// One flush attempt: drain, seal, upload until done or first failure.
    ///
    /// Public so that one-shot callers (CLI, tests) can flush without the
    /// run loop; cancellation is checked between batch uploads.
    pub async fn flush_cycle(&mut self, shutdown: Option<&watch::Receiver<bool>>) -> FlushOutcome {
        self.attempt += 1;
        // The span is attached with Instrument, not an entered guard: the
        // flush future moves across threads between awaits.
        let span = info_span!("agentlog.flush", attempt = self.attempt);
        self.flush_attempt(shutdown).instrument(span).await
    }

    async fn flush_attempt(&mut self, shutdown: Option<&watch::Receiver<bool>>) -> FlushOutcome {
        self.phase = SchedulerPhase::Flushing;
        self.next_retry_at = None;
        self.state.last_sync_attempt_at = Some(Utc::now());

        let drained = self.buffer.drain_all();
        if !drained.is_empty() {
            self.pending
                .extend(build_batches(drained, self.config.batch_size_bytes));
        }
        self.record_pending_ids();

        let pending_bytes: usize = self.pending.iter().map(|b| b.total_size_bytes).sum();
        obs::emit_flush_started(self.pending.len(), pending_bytes);

        let mut uploaded = 0usize;

        if self.bucket.is_none() {
            match self.store.create_bucket(&self.config.bucket_alias).await {
                Ok(bucket) => self.bucket = Some(bucket),
                Err(e) => return self.fail_cycle(uploaded, e),
            }
        }
        let bucket = self.bucket.clone().expect("bucket resolved above");

        loop {
            if let Some(rx) = shutdown {
                if *rx.borrow() {
                    break;
                }
            }

            let (batch_id, last_offset, entry_count, key, payload) = match self.pending.front() {
                None => break,
                Some(batch) => (
                    batch.batch_id.clone(),
                    batch.last_offset,
                    batch.entry_count,
                    batch.object_key(&self.config.log_prefix),
                    batch.to_payload(),
                ),
            };

            // Crash replay: a batch whose offsets the durable cursor already
            // covers was confirmed in a previous run. Skip, don't re-send.
            if self.state.covers(last_offset) {
                self.pending.pop_front();
                self.record_pending_ids();
                continue;
            }

            let payload = match payload {
                Ok(p) => p,
                Err(e) => {
                    // Permanent: a batch that cannot serialize would wedge
                    // the queue forever if requeued.
                    warn!(event = "flush.batch_unserializable", batch_id = %batch_id, error = %e);
                    self.pending.pop_front();
                    self.record_pending_ids();
                    continue;
                }
            };

            match self.store.put_object(&bucket, &key, &payload).await {
                Ok(put) => {
                    self.pending.pop_front();
                    self.state.advance_to(last_offset);
                    self.record_pending_ids();
                    self.persist_state();
                    obs::emit_batch_uploaded(&batch_id.to_string(), &put.key, entry_count, last_offset);
                    uploaded += 1;
                    self.backoff.reset();
                    self.set_degraded(false, None);
                }
                Err(e) if e.is_retriable() => {
                    // Batch stays at the front for the next attempt.
                    let delay = self.backoff.next_delay();
                    obs::emit_flush_retry(&batch_id.to_string(), delay.as_millis() as u64, &e);
                    self.next_retry_at = Some(Instant::now() + delay);
                    self.phase = SchedulerPhase::BackoffWait;
                    self.persist_state();
                    return FlushOutcome {
                        uploaded,
                        remaining: self.pending.len(),
                        degraded: self.degraded,
                    };
                }
                Err(e) => return self.fail_cycle(uploaded, e),
            }
        }

        if self.pending.is_empty() {
            self.state.last_sync_success_at = Some(Utc::now());
            self.last_success = Instant::now();
        }
        self.persist_state();
        self.phase = SchedulerPhase::Idle;
        obs::emit_flush_finished(uploaded, self.pending.len());
        FlushOutcome {
            uploaded,
            remaining: self.pending.len(),
            degraded: self.degraded,
        }
    }

    /// Non-retriable failure: enter degraded mode and retry on the normal
    /// interval cadence. Buffering continues; nothing is dropped.
    fn fail_cycle(&mut self, uploaded: usize, error: agentlog_store::StoreError) -> FlushOutcome {
        self.set_degraded(true, Some(&error));
        self.next_retry_at = Some(Instant::now() + self.config.sync_interval);
        self.phase = SchedulerPhase::Idle;
        self.persist_state();
        FlushOutcome {
            uploaded,
            remaining: self.pending.len(),
            degraded: true,
        }
    }

    fn set_degraded(&mut self, degraded: bool, error: Option<&agentlog_store::StoreError>) {
        if self.degraded != degraded {
            self.degraded = degraded;
            obs::emit_sync_degraded(degraded, error.map(|e| e as &dyn std::fmt::Display));
            let _ = self.degraded_tx.send(degraded);
        }
    }

    fn record_pending_ids(&mut self) {
        self.state.pending_batch_ids = self
            .pending
            .iter()
            .map(|b| b.batch_id.to_string())
            .collect();
    }

    fn persist_state(&self) {
        if let Err(e) = self.state_file.save(&self.state) {
            warn!(event = "sync_state.save_failed", error = %e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentlog_core::EntryContent;
    use agentlog_store::MemoryObjectStore;

    fn setup(dir: &tempfile::TempDir, store: Arc<MemoryObjectStore>) -> (SyncScheduler, Arc<LogBuffer>, watch::Receiver<bool>) {
        let config = SyncConfig::new("test-bucket", "cot")
            .with_batch_size_bytes(2048)
            .with_state_path(dir.path().join("state.json"));
        let buffer = Arc::new(LogBuffer::unbounded());
        let (degraded_tx, degraded_rx) = watch::channel(false);
        let scheduler = SyncScheduler::new(config, Arc::clone(&buffer), store, degraded_tx);
        (scheduler, buffer, degraded_rx)
    }

    fn append_kb(buffer: &LogBuffer, n: usize) {
        for i in 0..n {
            buffer
                .append("agent", i as u64, EntryContent::Text("x".repeat(1024)))
                .unwrap();
        }
    }

    #[tokio::test]
    async fn test_flush_uploads_and_advances_cursor() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(MemoryObjectStore::new());
        let (mut scheduler, buffer, _rx) = setup(&dir, Arc::clone(&store));
        append_kb(&buffer, 3);

        let outcome = scheduler.flush_cycle(None).await;
        // 3 x 1KB with 2048-byte batches -> two objects.
        assert_eq!(outcome, FlushOutcome { uploaded: 2, remaining: 0, degraded: false });
        assert_eq!(scheduler.state().last_flushed_offset, Some(2));
        assert!(scheduler.state().pending_batch_ids.is_empty());
        assert!(scheduler.state().last_sync_success_at.is_some());
        assert_eq!(scheduler.phase(), SchedulerPhase::Idle);

        // Cursor survives on disk.
        let reloaded = SyncStateFile::new(dir.path().join("state.json")).load();
        assert_eq!(reloaded.last_flushed_offset, Some(2));
    }

    #[tokio::test]
    async fn test_transient_failure_requeues_without_duplicates() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(MemoryObjectStore::new());
        let (mut scheduler, buffer, _rx) = setup(&dir, Arc::clone(&store));
        append_kb(&buffer, 1);

        store.fail_next_puts(2);
        let o1 = scheduler.flush_cycle(None).await;
        assert_eq!(o1.uploaded, 0);
        assert_eq!(o1.remaining, 1);
        assert_eq!(scheduler.phase(), SchedulerPhase::BackoffWait);
        assert_eq!(scheduler.state().pending_batch_ids.len(), 1);

        let o2 = scheduler.flush_cycle(None).await;
        assert_eq!(o2.remaining, 1);

        let o3 = scheduler.flush_cycle(None).await;
        assert_eq!(o3, FlushOutcome { uploaded: 1, remaining: 0, degraded: false });
        // The object landed exactly once.
        assert_eq!(store.put_log().len(), 1);
        assert_eq!(scheduler.state().last_flushed_offset, Some(0));
    }

    #[tokio::test]
    async fn test_backoff_delays_nondecreasing_across_failures() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(MemoryObjectStore::new());
        let (mut scheduler, buffer, _rx) = setup(&dir, Arc::clone(&store));
        append_kb(&buffer, 1);

        store.fail_next_puts(4);
        let mut last_gap = Duration::ZERO;
        for _ in 0..4 {
            let before = Instant::now();
            scheduler.flush_cycle(None).await;
            let gap = scheduler.next_retry_at.unwrap() - before;
            assert!(gap >= last_gap, "backoff must not shrink");
            last_gap = gap;
        }
    }

    #[tokio::test]
    async fn test_unavailable_flips_degraded_watch() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(MemoryObjectStore::new());
        let (mut scheduler, buffer, degraded_rx) = setup(&dir, Arc::clone(&store));
        append_kb(&buffer, 1);

        store.set_unavailable(true);
        let outcome = scheduler.flush_cycle(None).await;
        assert!(outcome.degraded);
        assert!(*degraded_rx.borrow());
        // Entries are still held pending, not dropped.
        assert_eq!(outcome.remaining, 1);

        store.set_unavailable(false);
        let outcome = scheduler.flush_cycle(None).await;
        assert!(!outcome.degraded);
        assert!(!*degraded_rx.borrow());
        assert_eq!(outcome.uploaded, 1);
    }

    #[tokio::test]
    async fn test_restart_resumes_offsets_past_cursor() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(MemoryObjectStore::new());

        // First run: flush everything.
        {
            let (mut scheduler, buffer, _rx) = setup(&dir, Arc::clone(&store));
            append_kb(&buffer, 2);
            scheduler.flush_cycle(None).await;
        }
        let uploads_before = store.put_log().len();

        // Restart: a new scheduler loads the durable cursor and fast-forwards
        // the fresh buffer past it, so new appends get offsets the cursor
        // does not cover and are uploaded, not skipped.
        let (mut scheduler, buffer, _rx) = setup(&dir, Arc::clone(&store));
        assert_eq!(scheduler.state().last_flushed_offset, Some(1));
        assert_eq!(buffer.next_offset(), 2);

        append_kb(&buffer, 1);
        let outcome = scheduler.flush_cycle(None).await;
        assert_eq!(outcome.uploaded, 1);
        assert_eq!(store.put_log().len(), uploads_before + 1);
        assert_eq!(scheduler.state().last_flushed_offset, Some(2));
    }

    #[tokio::test]
    async fn test_run_is_spawnable() {
        // tokio::spawn requires the run future to be Send; no span guard or
        // other non-Send value may be held across its awaits.
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(MemoryObjectStore::new());
        let (scheduler, buffer, _rx) = setup(&dir, store);
        append_kb(&buffer, 1);

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (_flush_tx, flush_rx) = mpsc::channel(1);
        let task = tokio::spawn(scheduler.run(shutdown_rx, flush_rx));
        shutdown_tx.send(true).unwrap();
        let state = task.await.unwrap();
        assert_eq!(state.last_flushed_offset, Some(0));
    }

    #[tokio::test]
    async fn test_run_loop_flush_request_and_shutdown() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(MemoryObjectStore::new());
        let (scheduler, buffer, _rx) = setup(&dir, Arc::clone(&store));
        append_kb(&buffer, 1);

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (flush_tx, flush_rx) = mpsc::channel(4);
        let task = tokio::spawn(scheduler.run(shutdown_rx, flush_rx));

        let (ack_tx, ack_rx) = oneshot::channel();
        flush_tx.send(FlushRequest { ack: ack_tx }).await.unwrap();
        let outcome = ack_rx.await.unwrap();
        assert_eq!(outcome.uploaded, 1);

        shutdown_tx.send(true).unwrap();
        let final_state = task.await.unwrap();
        assert_eq!(final_state.last_flushed_offset, Some(0));
    }

    #[tokio::test(start_paused = true)]
    async fn test_interval_trigger_under_simulated_time() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(MemoryObjectStore::new());
        let config = SyncConfig::new("test-bucket", "cot")
            .with_batch_size_bytes(1 << 20) // size trigger out of the way
            .with_sync_interval(Duration::from_secs(120))
            .with_state_path(dir.path().join("state.json"));
        let buffer = Arc::new(LogBuffer::unbounded());
        let (degraded_tx, _degraded_rx) = watch::channel(false);
        let scheduler =
            SyncScheduler::new(config, Arc::clone(&buffer), Arc::clone(&store) as Arc<dyn ObjectStore>, degraded_tx);

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (_flush_tx, flush_rx) = mpsc::channel(1);
        let task = tokio::spawn(scheduler.run(shutdown_rx, flush_rx));

        buffer.append("agent", 0, EntryContent::Text("hello".into())).unwrap();
        // Well under the interval: nothing flushed yet.
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(store.put_log().len(), 0);
        // Past the interval: the timer trigger fires.
        tokio::time::sleep(Duration::from_secs(120)).await;
        assert_eq!(store.put_log().len(), 1);

        shutdown_tx.send(true).unwrap();
        task.await.unwrap();
    }
}
