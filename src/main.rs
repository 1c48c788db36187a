//! # Igris CLI (`igris`)
//!
//! Ingest documents into the vector index, search it, check index health and
//! manage the conversation memory file.
//!
//! ## Usage
//!
//! ```bash
//! igris --config ./config/igris.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `igris ingest [PATH]` | Load, chunk and index documents; optionally publish the archive |
//! | `igris search "<query>" [--index-dir D]` | Similarity search over the index |
//! | `igris stats [--index-dir D] [--chunk-store F]` | Index / chunk store parity and pending-update report |
//! | `igris memory show` | Print the saved conversation history |
//! | `igris memory append --role R <TEXT>` | Append one message and save |
//! | `igris memory clear` | Empty the history (previous file kept as `.bak`) |
//!
//! Logging goes to stderr and is controlled with `RUST_LOG` (default `info`).

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

use igris::config::{self, Config};
use igris::embedding::create_embedder;
use igris::memory::{MemoryStore, Role, SnapshotOrigin, TurnMessage};
use igris::pipeline::{IngestRequest, Orchestrator};
use igris::{search, stats};

/// Igris: document ingestion into a persistent semantic index, plus
/// crash-safe conversation memory.
#[derive(Parser)]
#[command(
    name = "igris",
    about = "Incremental document ingestion and durable conversation memory",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Defaults to `./config/igris.toml`. Built-in defaults are used when the
    /// file does not exist.
    #[arg(long, global = true, default_value = "./config/igris.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Ingest a file or directory.
    ///
    /// Runs validate → load → chunk → index → package → publish → cleanup.
    /// Exits non-zero if any stage fails.
    Ingest {
        /// File or directory to ingest. Defaults to `paths.documents_dir`.
        path: Option<PathBuf>,

        /// Upload the packaged archive to this S3 bucket.
        #[arg(long)]
        bucket: Option<String>,

        /// Key prefix for the uploaded archive. Defaults to `publish.prefix`.
        #[arg(long)]
        prefix: Option<String>,

        /// Vector index directory. Defaults to `paths.index_dir`.
        #[arg(long)]
        index_dir: Option<PathBuf>,

        /// Chunk store file. Defaults to `paths.chunk_store`.
        #[arg(long)]
        chunk_store: Option<PathBuf>,
    },

    /// Search the index.
    Search {
        query: String,

        /// Maximum number of results.
        #[arg(long, default_value_t = 5)]
        limit: usize,

        /// Vector index directory. Defaults to `paths.index_dir`.
        #[arg(long)]
        index_dir: Option<PathBuf>,
    },

    /// Show index and chunk store health.
    Stats {
        /// Vector index directory. Defaults to `paths.index_dir`.
        #[arg(long)]
        index_dir: Option<PathBuf>,

        /// Chunk store file. Defaults to `paths.chunk_store`.
        #[arg(long)]
        chunk_store: Option<PathBuf>,
    },

    /// Manage the conversation memory file.
    Memory {
        #[command(subcommand)]
        action: MemoryAction,
    },
}

#[derive(Subcommand)]
enum MemoryAction {
    /// Print the saved history.
    Show,
    /// Append one message and save immediately.
    Append {
        /// human, ai or system.
        #[arg(long, default_value = "human")]
        role: Role,
        text: String,
    },
    /// Replace the history with an empty one.
    Clear,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let mut cfg = if cli.config.exists() {
        config::load_config(&cli.config)?
    } else {
        info!(config = %cli.config.display(), "config file not found, using defaults");
        Config::default()
    };

    match cli.command {
        Commands::Ingest {
            path,
            bucket,
            prefix,
            index_dir,
            chunk_store,
        } => run_ingest(&cfg, path, bucket, prefix, index_dir, chunk_store),
        Commands::Search {
            query,
            limit,
            index_dir,
        } => {
            override_paths(&mut cfg, index_dir, None);
            search::run_search(&cfg, &query, limit)
        }
        Commands::Stats {
            index_dir,
            chunk_store,
        } => {
            override_paths(&mut cfg, index_dir, chunk_store);
            stats::run_stats(&cfg)
        }
        Commands::Memory { action } => run_memory(&cfg, action),
    }
}

fn override_paths(cfg: &mut Config, index_dir: Option<PathBuf>, chunk_store: Option<PathBuf>) {
    if let Some(dir) = index_dir {
        cfg.paths.index_dir = dir;
    }
    if let Some(store) = chunk_store {
        cfg.paths.chunk_store = store;
    }
}

fn run_ingest(
    cfg: &Config,
    path: Option<PathBuf>,
    bucket: Option<String>,
    prefix: Option<String>,
    index_dir: Option<PathBuf>,
    chunk_store: Option<PathBuf>,
) -> Result<()> {
    let path = path.unwrap_or_else(|| cfg.paths.documents_dir.clone());
    let mut request = IngestRequest::new(path, cfg);
    if let Some(dir) = index_dir {
        request = request.with_index_dir(dir);
    }
    if let Some(store) = chunk_store {
        request = request.with_chunk_store(store);
    }
    if let Some(bucket) = bucket {
        request = request.with_bucket(bucket);
    }
    if let Some(prefix) = prefix {
        request = request.with_prefix(prefix);
    }

    let embedder = create_embedder(&cfg.embedding)?;
    let outcome = Orchestrator::new(cfg, embedder.as_ref()).run(request);

    println!("ingest {}", if outcome.is_success() { "ok" } else { "failed" });
    println!("  chunks added: {}", outcome.chunks_added);
    if let Some(report) = &outcome.index_report {
        println!("  indexed total: {}", report.index_total);
        println!("  stored total: {}", report.store_total);
        if report.index_rebuilt {
            println!("  warning: index was unreadable and rebuilt from this batch only");
        }
        if report.store_reset {
            println!("  warning: chunk store was unreadable and restarted from this batch");
        }
    }
    if let Some(uri) = &outcome.remote_uri {
        println!("  published: {}", uri);
    }
    if let Some(dir) = &outcome.leaked_temp_dir {
        println!("  temporary artifact left at: {}", dir.display());
    }

    match (outcome.error, outcome.failed_stage) {
        (Some(error), Some(stage)) => anyhow::bail!("{} failed: {}", stage, error),
        (Some(error), None) => anyhow::bail!(error),
        _ => Ok(()),
    }
}

fn run_memory(cfg: &Config, action: MemoryAction) -> Result<()> {
    let store = MemoryStore::new(&cfg.paths.memory_file);
    match action {
        MemoryAction::Show => {
            let loaded = store.load();
            match loaded.origin {
                SnapshotOrigin::Primary => {}
                SnapshotOrigin::Backup => {
                    println!("(primary memory was corrupt, restored from backup)")
                }
                SnapshotOrigin::Empty => println!("(no saved memory)"),
            }
            for message in &loaded.snapshot.chat_history {
                println!("[{}] {}", message.role, message.content);
            }
        }
        MemoryAction::Append { role, text } => {
            let count = store.append_turn(TurnMessage::new(role, text))?;
            println!("saved {} messages to {}", count, store.path().display());
        }
        MemoryAction::Clear => {
            store.clear()?;
            println!("memory cleared: {}", store.path().display());
        }
    }
    Ok(())
}
