//! agentlog - chain-of-thought log sync CLI
//!
//! The `agentlog` command drives the sync engine from scripts and agent
//! harnesses.
//!
//! ## Commands
//!
//! - `append`: Record a reasoning step and sync it to the bucket
//! - `flush`: Run one flush cycle against the configured bucket
//! - `context`: Retrieve recent entries for context assembly
//! - `status`: Show the durable sync cursor

use std::sync::Arc;

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use tracing::Level;

use agentlog_core::{init_tracing, EntryContent, SyncConfig};
use agentlog_store::{HttpObjectStore, HttpStoreConfig, ObjectStore, SyncStateFile};
use agentlog_sync::{ContextWindow, Engine, RecentWindow};

#[derive(Parser)]
#[command(name = "agentlog")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Agent chain-of-thought log sync and retrieval", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted output and log lines
    #[arg(long, global = true)]
    json: bool,

    /// Bucket to sync against (default: AGENTLOG_BUCKET)
    #[arg(long, global = true)]
    bucket: Option<String>,

    /// Key prefix for this log stream (default: AGENTLOG_PREFIX)
    #[arg(long, global = true)]
    prefix: Option<String>,

    /// Object store server URL (default: AGENTLOG_SERVER)
    #[arg(long, global = true)]
    server: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Record one reasoning step and sync it to the bucket
    Append {
        /// Entry text (omit when using --structured)
        text: Option<String>,

        /// Structured entry payload as a JSON value
        #[arg(long, conflicts_with = "text")]
        structured: Option<String>,

        /// Agent identifier
        #[arg(short, long, default_value = "agent")]
        agent: String,

        /// Reasoning step index
        #[arg(short, long, default_value = "0")]
        step: u64,
    },

    /// Run one flush cycle against the configured bucket
    ///
    /// Useful after a crash: replays any batch the durable cursor does not
    /// yet cover.
    Flush,

    /// Retrieve recent entries for context assembly
    Context {
        /// Fetch the most recent N uploaded objects
        #[arg(short, long, default_value = "10", conflicts_with = "since")]
        last: usize,

        /// Fetch all entries at or after this RFC 3339 instant
        #[arg(long)]
        since: Option<String>,
    },

    /// Show the durable sync cursor
    Status,
}

fn build_config(cli: &Cli) -> SyncConfig {
    let mut config = SyncConfig::from_env();
    if let Some(bucket) = &cli.bucket {
        config.bucket_alias = bucket.clone();
    }
    if let Some(prefix) = &cli.prefix {
        config.log_prefix = prefix.clone();
    }
    if let Some(server) = &cli.server {
        config.server_url = server.clone();
    }
    config
}

fn build_store(config: &SyncConfig) -> Result<Arc<dyn ObjectStore>> {
    let mut http = HttpStoreConfig::new(&config.server_url);
    if let Some(token) = &config.token {
        http = http.with_token(token);
    }
    let store = HttpObjectStore::new(http).context("Failed to build object store client")?;
    Ok(Arc::new(store))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::WARN
    };
    init_tracing(cli.json, level);

    let config = build_config(&cli);

    match cli.command {
        Commands::Append {
            text,
            structured,
            agent,
            step,
        } => cmd_append(config, text, structured.as_deref(), &agent, step, cli.json).await,
        Commands::Flush => cmd_flush(config, cli.json).await,
        Commands::Context { last, since } => {
            let window = match since {
                Some(ts) => {
                    let ts: DateTime<Utc> = ts
                        .parse()
                        .with_context(|| format!("Invalid RFC 3339 timestamp: {ts}"))?;
                    RecentWindow::Since(ts)
                }
                None => RecentWindow::LastN(last),
            };
            cmd_context(config, window, cli.json).await
        }
        Commands::Status => cmd_status(&config, cli.json),
    }
}

/// Record one entry and run a synchronous flush before exiting.
async fn cmd_append(
    config: SyncConfig,
    text: Option<String>,
    structured: Option<&str>,
    agent: &str,
    step: u64,
    json: bool,
) -> Result<()> {
    let content = match (text, structured) {
        (Some(text), None) => EntryContent::Text(text),
        (None, Some(raw)) => {
            let value =
                serde_json::from_str(raw).context("--structured must be a valid JSON value")?;
            EntryContent::Structured(value)
        }
        (None, None) => bail!("Provide entry text or --structured"),
        (Some(_), Some(_)) => unreachable!("clap rejects text with --structured"),
    };

    let store = build_store(&config)?;
    let engine = Engine::start(config, store)?;
    let offset = engine.log(agent, step, content)?;
    let outcome = engine.flush_now().await?;
    engine.shutdown().await?;

    if json {
        println!(
            "{}",
            serde_json::json!({
                "offset": offset,
                "uploaded": outcome.uploaded,
                "remaining": outcome.remaining,
                "degraded": outcome.degraded,
            })
        );
    } else if outcome.remaining > 0 {
        println!("Buffered entry at offset {offset} (store unreachable, upload pending)");
    } else {
        println!("Appended entry at offset {offset}");
    }
    Ok(())
}

/// Run one flush cycle. With an empty buffer this still records a sync
/// attempt in the durable state.
async fn cmd_flush(config: SyncConfig, json: bool) -> Result<()> {
    let store = build_store(&config)?;
    let engine = Engine::start(config, store)?;
    let outcome = engine.flush_now().await?;
    let state = engine.shutdown().await?;

    if json {
        println!(
            "{}",
            serde_json::json!({
                "uploaded": outcome.uploaded,
                "remaining": outcome.remaining,
                "degraded": outcome.degraded,
                "last_flushed_offset": state.last_flushed_offset,
            })
        );
    } else {
        println!(
            "Flushed {} batch(es), {} pending",
            outcome.uploaded, outcome.remaining
        );
    }
    Ok(())
}

async fn cmd_context(config: SyncConfig, window: RecentWindow, json: bool) -> Result<()> {
    let store = build_store(&config)?;
    let engine = Engine::start(config, store)?;
    let ctx = engine.get_context(window).await;
    engine.shutdown().await?;

    if json {
        print_context_json(&ctx)?;
    } else {
        print_context_plain(&ctx);
    }
    Ok(())
}

fn print_context_json(ctx: &ContextWindow) -> Result<()> {
    println!(
        "{}",
        serde_json::json!({
            "entries": ctx.entries,
            "objects_fetched": ctx.objects_fetched,
            "incomplete": ctx.incomplete,
        })
    );
    Ok(())
}

fn print_context_plain(ctx: &ContextWindow) {
    for entry in &ctx.entries {
        let rendered = match &entry.content {
            EntryContent::Text(text) => text.clone(),
            EntryContent::Structured(value) => value.to_string(),
        };
        println!(
            "{} [{} #{}] {}",
            entry.timestamp.to_rfc3339(),
            entry.agent_id,
            entry.step_index,
            rendered
        );
    }
    if ctx.incomplete {
        eprintln!("(window incomplete: some objects were not yet readable)");
    }
}

fn cmd_status(config: &SyncConfig, json: bool) -> Result<()> {
    let state = SyncStateFile::new(&config.state_path).load();

    if json {
        println!("{}", serde_json::to_string_pretty(&state)?);
        return Ok(());
    }

    println!("State file:          {}", config.state_path.display());
    match state.last_flushed_offset {
        Some(offset) => println!("Last flushed offset: {offset}"),
        None => println!("Last flushed offset: (nothing confirmed yet)"),
    }
    match &state.last_sync_success_at {
        Some(at) => println!("Last sync success:   {}", at.to_rfc3339()),
        None => println!("Last sync success:   never"),
    }
    if let Some(at) = &state.last_sync_attempt_at {
        println!("Last sync attempt:   {}", at.to_rfc3339());
    }
    if !state.pending_batch_ids.is_empty() {
        println!("Pending batches:     {}", state.pending_batch_ids.join(", "));
    }
    Ok(())
}
