//! Engine configuration, environment-driven with builder-style overrides.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::buffer::OverflowPolicy;
use crate::error::CoreError;

fn env_u64(key: &str) -> Option<u64> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}

/// Configuration for the sync engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Target bucket name/identifier for sync.
    pub bucket_alias: String,
    /// Key prefix under which batches are stored. Multiple logical log
    /// streams can share one bucket under different prefixes.
    pub log_prefix: String,
    /// Time-based flush trigger.
    pub sync_interval: Duration,
    /// Size-based flush trigger and maximum batch size.
    pub batch_size_bytes: usize,
    /// Hard ceiling on locally buffered bytes; `None` = unbounded.
    pub max_buffer_bytes: Option<usize>,
    /// What to do when the ceiling is hit.
    #[serde(skip)]
    pub overflow_policy: OverflowPolicy,
    /// Where the durable sync cursor lives.
    pub state_path: std::path::PathBuf,
    /// First retry delay after a failed flush.
    pub initial_backoff: Duration,
    /// Upper bound on the retry delay.
    pub max_backoff: Duration,
    /// Bound on the final flush at shutdown.
    pub shutdown_timeout: Duration,
    /// Per-call retrieval timeout.
    pub retrieval_timeout: Duration,
    /// Object store server URL (HTTP backend).
    pub server_url: String,
    /// Bearer token for the object store (optional for open buckets).
    pub token: Option<String>,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            bucket_alias: "agentlog".to_string(),
            log_prefix: "cot".to_string(),
            sync_interval: Duration::from_millis(120_000),
            batch_size_bytes: 4096,
            max_buffer_bytes: None,
            overflow_policy: OverflowPolicy::default(),
            state_path: std::path::PathBuf::from(".agentlog/sync_state.json"),
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(60),
            shutdown_timeout: Duration::from_secs(5),
            retrieval_timeout: Duration::from_secs(30),
            server_url: "http://localhost:8080".to_string(),
            token: None,
        }
    }
}

impl SyncConfig {
    /// Read configuration from `AGENTLOG_*` environment variables, falling
    /// back to defaults for anything unset.
    pub fn from_env() -> Self {
        let mut cfg = Self::default();
        if let Ok(v) = std::env::var("AGENTLOG_BUCKET") {
            cfg.bucket_alias = v;
        }
        if let Ok(v) = std::env::var("AGENTLOG_PREFIX") {
            cfg.log_prefix = v;
        }
        if let Some(ms) = env_u64("AGENTLOG_SYNC_INTERVAL_MS") {
            cfg.sync_interval = Duration::from_millis(ms);
        }
        if let Some(b) = env_u64("AGENTLOG_BATCH_BYTES") {
            cfg.batch_size_bytes = b as usize;
        }
        if let Some(b) = env_u64("AGENTLOG_MAX_BUFFER_BYTES") {
            cfg.max_buffer_bytes = Some(b as usize);
        }
        if let Ok(v) = std::env::var("AGENTLOG_OVERFLOW_POLICY") {
            if let Ok(p) = v.parse() {
                cfg.overflow_policy = p;
            }
        }
        if let Ok(v) = std::env::var("AGENTLOG_STATE_PATH") {
            cfg.state_path = v.into();
        }
        if let Ok(v) = std::env::var("AGENTLOG_SERVER") {
            cfg.server_url = v;
        }
        cfg.token = std::env::var("AGENTLOG_TOKEN").ok();
        cfg
    }

    /// Create config for a specific bucket and prefix.
    pub fn new(bucket_alias: &str, log_prefix: &str) -> Self {
        Self {
            bucket_alias: bucket_alias.to_string(),
            log_prefix: log_prefix.to_string(),
            ..Self::default()
        }
    }

    pub fn with_sync_interval(mut self, interval: Duration) -> Self {
        self.sync_interval = interval;
        self
    }

    pub fn with_batch_size_bytes(mut self, bytes: usize) -> Self {
        self.batch_size_bytes = bytes;
        self
    }

    pub fn with_buffer_ceiling(mut self, bytes: usize, policy: OverflowPolicy) -> Self {
        self.max_buffer_bytes = Some(bytes);
        self.overflow_policy = policy;
        self
    }

    pub fn with_state_path(mut self, path: impl Into<std::path::PathBuf>) -> Self {
        self.state_path = path.into();
        self
    }

    pub fn with_backoff(mut self, initial: Duration, max: Duration) -> Self {
        self.initial_backoff = initial;
        self.max_backoff = max;
        self
    }

    pub fn with_token(mut self, token: &str) -> Self {
        self.token = Some(token.to_string());
        self
    }

    /// Reject configurations the engine cannot run with.
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.bucket_alias.is_empty() {
            return Err(CoreError::Config("bucket_alias must not be empty".into()));
        }
        if self.batch_size_bytes == 0 {
            return Err(CoreError::Config("batch_size_bytes must be positive".into()));
        }
        if self.initial_backoff > self.max_backoff {
            return Err(CoreError::Config(
                "initial_backoff must not exceed max_backoff".into(),
            ));
        }
        if let Some(max) = self.max_buffer_bytes {
            if max < self.batch_size_bytes {
                return Err(CoreError::Config(
                    "max_buffer_bytes must be at least batch_size_bytes".into(),
                ));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_documented_values() {
        let cfg = SyncConfig::default();
        assert_eq!(cfg.sync_interval, Duration::from_millis(120_000));
        assert_eq!(cfg.batch_size_bytes, 4096);
        assert_eq!(cfg.log_prefix, "cot");
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_new_sets_bucket_and_prefix() {
        let cfg = SyncConfig::new("negotiations", "party-a");
        assert_eq!(cfg.bucket_alias, "negotiations");
        assert_eq!(cfg.log_prefix, "party-a");
    }

    #[test]
    fn test_builder_overrides() {
        let cfg = SyncConfig::new("b", "p")
            .with_batch_size_bytes(2048)
            .with_sync_interval(Duration::from_secs(1))
            .with_backoff(Duration::from_millis(100), Duration::from_secs(10))
            .with_token("secret");
        assert_eq!(cfg.batch_size_bytes, 2048);
        assert_eq!(cfg.token.as_deref(), Some("secret"));
    }

    #[test]
    fn test_validate_rejects_empty_bucket() {
        let mut cfg = SyncConfig::default();
        cfg.bucket_alias.clear();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_inverted_backoff() {
        let cfg = SyncConfig::default().with_backoff(Duration::from_secs(120), Duration::from_secs(1));
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_ceiling_below_batch_size() {
        let cfg = SyncConfig::default().with_buffer_ceiling(100, OverflowPolicy::RejectNew);
        assert!(cfg.validate().is_err());
    }
}
