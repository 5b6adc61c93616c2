//! agentlogd: long-running sync daemon.
//!
//! Reads reasoning steps from stdin (one entry per line, either plain text
//! or a JSON value), appends them to the local buffer, and lets the engine's
//! scheduler sync them to the bucket on its normal triggers. Ctrl-C drains
//! the buffer with a bounded final flush before exiting.

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn, Level};

use agentlog_core::{init_tracing, EntryContent, SyncConfig};
use agentlog_store::{HttpObjectStore, HttpStoreConfig, ObjectStore};
use agentlog_sync::Engine;

#[derive(Parser)]
#[command(name = "agentlogd")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Chain-of-thought log sync daemon", long_about = None)]
struct Args {
    /// Agent identifier attached to every entry
    #[arg(short, long, default_value = "agent")]
    agent: String,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let level = if args.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    init_tracing(args.json, level);

    let config = SyncConfig::from_env();
    let mut http = HttpStoreConfig::new(&config.server_url);
    if let Some(token) = &config.token {
        http = http.with_token(token);
    }
    let store: Arc<dyn ObjectStore> =
        Arc::new(HttpObjectStore::new(http).context("Failed to build object store client")?);

    info!(
        event = "daemon.started",
        bucket = %config.bucket_alias,
        prefix = %config.log_prefix,
        server = %config.server_url,
    );
    let engine = Engine::start(config, store)?;

    let mut degraded = engine.degraded();
    tokio::spawn(async move {
        while degraded.changed().await.is_ok() {
            if *degraded.borrow() {
                warn!(event = "daemon.degraded", "store unreachable, buffering locally");
            } else {
                info!(event = "daemon.recovered");
            }
        }
    });

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut step_index: u64 = 0;

    loop {
        tokio::select! {
            line = lines.next_line() => {
                match line? {
                    Some(line) if line.trim().is_empty() => {}
                    Some(line) => {
                        let content = match serde_json::from_str(&line) {
                            Ok(value @ serde_json::Value::Object(_)) => {
                                EntryContent::Structured(value)
                            }
                            _ => EntryContent::Text(line),
                        };
                        engine.log(&args.agent, step_index, content)?;
                        step_index += 1;
                    }
                    None => break, // stdin closed
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!(event = "daemon.interrupted");
                break;
            }
        }
    }

    let state = engine.shutdown().await?;
    info!(
        event = "daemon.stopped",
        entries_ingested = step_index,
        last_flushed_offset = ?state.last_flushed_offset,
    );
    Ok(())
}
