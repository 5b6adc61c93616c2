//! Collaborator-facing engine handle.
//!
//! An `Engine` is an explicitly owned instance — no process-wide singleton —
//! holding the log buffer and driving one background scheduler task. The
//! reasoning loop only ever touches `log`, `get_context`, and `shutdown`,
//! with no knowledge of sync timing.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::warn;

use agentlog_core::{EntryContent, LogBuffer, SyncConfig};
use agentlog_store::{ObjectStore, SyncState};

use crate::error::{Result, SyncError};
use crate::retrieval::{ContextWindow, RecentWindow, RetrievalService};
use crate::scheduler::{FlushOutcome, FlushRequest, SyncScheduler};

/// Handle to a running log sync engine.
pub struct Engine {
    config: SyncConfig,
    buffer: Arc<LogBuffer>,
    retrieval: RetrievalService,
    flush_tx: mpsc::Sender<FlushRequest>,
    shutdown_tx: watch::Sender<bool>,
    degraded_rx: watch::Receiver<bool>,
    scheduler_task: JoinHandle<SyncState>,
}

impl Engine {
    /// Validate config, load the durable cursor, and spawn the scheduler.
    pub fn start(config: SyncConfig, store: Arc<dyn ObjectStore>) -> Result<Self> {
        config.validate()?;

        let buffer = Arc::new(LogBuffer::new(
            config.max_buffer_bytes,
            config.overflow_policy,
        ));
        let retrieval = RetrievalService::new(Arc::clone(&store), config.retrieval_timeout);

        let (degraded_tx, degraded_rx) = watch::channel(false);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (flush_tx, flush_rx) = mpsc::channel(16);

        let scheduler =
            SyncScheduler::new(config.clone(), Arc::clone(&buffer), store, degraded_tx);
        let scheduler_task = tokio::spawn(scheduler.run(shutdown_rx, flush_rx));

        Ok(Self {
            config,
            buffer,
            retrieval,
            flush_tx,
            shutdown_tx,
            degraded_rx,
            scheduler_task,
        })
    }

    /// Enable the short-lived retrieval cache (one reasoning cycle's worth).
    pub fn with_retrieval_cache(mut self, ttl: Duration) -> Self {
        self.retrieval = self.retrieval.with_cache_ttl(ttl);
        self
    }

    /// Record one reasoning step. Purely local and fast; returns the entry's
    /// stream offset.
    pub fn log(&self, agent_id: &str, step_index: u64, content: EntryContent) -> Result<u64> {
        Ok(self.buffer.append(agent_id, step_index, content)?)
    }

    /// Retrieve recent entries for context assembly.
    ///
    /// Degrades rather than fails: if the store cannot be queried at all,
    /// returns an empty window flagged incomplete — stale context should
    /// lower reasoning quality, not halt the cycle.
    pub async fn get_context(&self, window: RecentWindow) -> ContextWindow {
        match self
            .retrieval
            .fetch_recent(&self.config.bucket_alias, &self.config.log_prefix, &window)
            .await
        {
            Ok(ctx) => ctx,
            Err(e) => {
                warn!(event = "retrieval.unavailable", error = %e);
                ContextWindow {
                    incomplete: true,
                    ..Default::default()
                }
            }
        }
    }

    /// Force a flush now and wait for its outcome.
    pub async fn flush_now(&self) -> Result<FlushOutcome> {
        let (ack_tx, ack_rx) = oneshot::channel();
        self.flush_tx
            .send(FlushRequest { ack: ack_tx })
            .await
            .map_err(|_| SyncError::SchedulerStopped)?;
        ack_rx.await.map_err(|_| SyncError::SchedulerStopped)
    }

    /// Watch the degraded-mode flag. `true` while the store is unreachable
    /// for non-retriable reasons; buffering continues locally either way.
    pub fn degraded(&self) -> watch::Receiver<bool> {
        self.degraded_rx.clone()
    }

    /// Entries currently buffered and awaiting upload.
    pub fn pending_entries(&self) -> usize {
        self.buffer.len()
    }

    /// Signal shutdown, let the scheduler run its bounded final flush, and
    /// return the final durable state (anything unflushed stays pending).
    pub async fn shutdown(self) -> Result<SyncState> {
        let _ = self.shutdown_tx.send(true);
        self.scheduler_task
            .await
            .map_err(|_| SyncError::SchedulerStopped)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentlog_store::MemoryObjectStore;

    fn config(dir: &tempfile::TempDir) -> SyncConfig {
        SyncConfig::new("bucket", "cot")
            .with_batch_size_bytes(2048)
            .with_state_path(dir.path().join("state.json"))
    }

    #[tokio::test]
    async fn test_log_flush_retrieve_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(MemoryObjectStore::new());
        let engine = Engine::start(config(&dir), Arc::clone(&store) as Arc<dyn ObjectStore>).unwrap();

        for i in 0..3 {
            engine
                .log("negotiator", i, EntryContent::Text(format!("step {i}")))
                .unwrap();
        }
        let outcome = engine.flush_now().await.unwrap();
        assert_eq!(outcome.remaining, 0);

        let ctx = engine.get_context(RecentWindow::LastN(10)).await;
        assert!(!ctx.incomplete);
        assert_eq!(ctx.entries.len(), 3);
        assert_eq!(ctx.entries[0].content, EntryContent::Text("step 0".into()));

        let state = engine.shutdown().await.unwrap();
        assert_eq!(state.last_flushed_offset, Some(2));
    }

    #[tokio::test]
    async fn test_get_context_degrades_on_outage() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(MemoryObjectStore::new());
        let engine = Engine::start(config(&dir), Arc::clone(&store) as Arc<dyn ObjectStore>).unwrap();

        store.set_unavailable(true);
        let ctx = engine.get_context(RecentWindow::LastN(5)).await;
        assert!(ctx.incomplete);
        assert!(ctx.entries.is_empty());
        engine.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_shutdown_flushes_buffered_entries() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(MemoryObjectStore::new());
        let engine = Engine::start(config(&dir), Arc::clone(&store) as Arc<dyn ObjectStore>).unwrap();

        engine.log("a", 0, EntryContent::Text("last words".into())).unwrap();
        let state = engine.shutdown().await.unwrap();
        assert_eq!(state.last_flushed_offset, Some(0));
        assert_eq!(store.put_log().len(), 1);
    }

    #[tokio::test]
    async fn test_invalid_config_rejected_at_start() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = config(&dir);
        cfg.bucket_alias.clear();
        let store = Arc::new(MemoryObjectStore::new());
        assert!(Engine::start(cfg, store as Arc<dyn ObjectStore>).is_err());
    }
}
