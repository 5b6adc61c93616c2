//! Retrieval service: rebuild reasoning context from uploaded batches.
//!
//! Lists the most recent objects under a prefix, downloads them
//! concurrently, decodes each back into its log entries, and returns them
//! oldest-first. Objects that are listed but not yet readable (eventual
//! consistency) are treated as "not yet available": the result carries an
//! `incomplete` flag instead of failing the reasoning cycle.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::future::join_all;
use tokio::time::Instant;
use tracing::warn;

use agentlog_core::{obs, Batch, LogEntry};
use agentlog_store::{ObjectStore, StoreError, StoreResult};

/// Which slice of the log stream to retrieve.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecentWindow {
    /// The most recent N uploaded objects.
    LastN(usize),
    /// All entries at or after this instant.
    Since(DateTime<Utc>),
}

/// Entries reassembled for context injection.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ContextWindow {
    /// Decoded entries, oldest first.
    pub entries: Vec<LogEntry>,
    /// Objects successfully fetched and decoded.
    pub objects_fetched: usize,
    /// True when some objects in the window were not yet visible or the
    /// call timed out; the entries present are still valid.
    pub incomplete: bool,
}

type CacheKey = (String, String, String);

/// Read-side client over the object store.
pub struct RetrievalService {
    store: Arc<dyn ObjectStore>,
    timeout: Duration,
    /// Optional short-lived cache for reuse within one reasoning cycle.
    /// Disabled by default: every call re-queries the store.
    cache_ttl: Option<Duration>,
    cache: Mutex<HashMap<CacheKey, (Instant, ContextWindow)>>,
}

fn window_cache_tag(window: &RecentWindow) -> String {
    match window {
        RecentWindow::LastN(n) => format!("last:{n}"),
        RecentWindow::Since(ts) => format!("since:{}", ts.to_rfc3339()),
    }
}

impl RetrievalService {
    pub fn new(store: Arc<dyn ObjectStore>, timeout: Duration) -> Self {
        Self {
            store,
            timeout,
            cache_ttl: None,
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Enable the per-window result cache with the given time-to-live.
    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = Some(ttl);
        self
    }

    /// Fetch and decode recent entries under `prefix` in `bucket_alias`.
    ///
    /// Errors only when the store cannot be queried at all (bucket
    /// resolution or listing); per-object gaps come back as
    /// `incomplete = true`.
    pub async fn fetch_recent(
        &self,
        bucket_alias: &str,
        prefix: &str,
        window: &RecentWindow,
    ) -> StoreResult<ContextWindow> {
        let cache_key = (
            bucket_alias.to_string(),
            prefix.to_string(),
            window_cache_tag(window),
        );
        if let Some(ttl) = self.cache_ttl {
            let cache = self.cache.lock().unwrap();
            if let Some((at, cached)) = cache.get(&cache_key) {
                if at.elapsed() < ttl {
                    return Ok(cached.clone());
                }
            }
        }

        let result = match tokio::time::timeout(
            self.timeout,
            self.fetch_uncached(bucket_alias, prefix, window),
        )
        .await
        {
            Ok(result) => result?,
            Err(_elapsed) => {
                warn!(
                    event = "retrieval.timeout",
                    bucket = %bucket_alias,
                    timeout_ms = self.timeout.as_millis() as u64,
                );
                ContextWindow {
                    incomplete: true,
                    ..Default::default()
                }
            }
        };

        obs::emit_context_fetched(result.entries.len(), result.objects_fetched, result.incomplete);

        if self.cache_ttl.is_some() {
            let mut cache = self.cache.lock().unwrap();
            cache.insert(cache_key, (Instant::now(), result.clone()));
        }
        Ok(result)
    }

    async fn fetch_uncached(
        &self,
        bucket_alias: &str,
        prefix: &str,
        window: &RecentWindow,
    ) -> StoreResult<ContextWindow> {
        let bucket = self.store.create_bucket(bucket_alias).await?;
        let list_prefix = format!("{prefix}/");
        let keys = self.store.list_objects(&bucket, &list_prefix).await?;

        // Keys sort lexically == chronologically, so window selection is a
        // plain suffix/boundary cut on the sorted list.
        let selected: Vec<String> = match window {
            RecentWindow::LastN(n) => {
                let skip = keys.len().saturating_sub(*n);
                keys.into_iter().skip(skip).collect()
            }
            RecentWindow::Since(ts) => {
                let boundary = format!("{}/{}", prefix, ts.format("%Y%m%dT%H%M%S%.3fZ"));
                keys.into_iter().filter(|k| *k >= boundary).collect()
            }
        };

        let downloads = join_all(
            selected
                .iter()
                .map(|key| self.store.get_object(&bucket, key)),
        )
        .await;

        let mut entries = Vec::new();
        let mut objects_fetched = 0usize;
        let mut incomplete = false;

        // Keys are chronological and each batch is internally ordered, so
        // appending in key order yields oldest-first entries.
        for (key, download) in selected.iter().zip(downloads) {
            match download {
                Ok(payload) => match Batch::from_payload(&payload) {
                    Ok(batch) => {
                        objects_fetched += 1;
                        entries.extend(batch.entries);
                    }
                    Err(e) => {
                        // Partially-written object: not yet fully visible.
                        warn!(event = "retrieval.undecodable_object", key = %key, error = %e);
                        incomplete = true;
                    }
                },
                Err(StoreError::NotFound { .. }) => {
                    // Listed but not yet readable.
                    incomplete = true;
                }
                Err(e) => {
                    warn!(event = "retrieval.object_fetch_failed", key = %key, error = %e);
                    incomplete = true;
                }
            }
        }

        if let RecentWindow::Since(ts) = window {
            entries.retain(|e| e.timestamp >= *ts);
        }

        Ok(ContextWindow {
            entries,
            objects_fetched,
            incomplete,
        })
    }
}
