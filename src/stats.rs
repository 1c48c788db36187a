//! Index and chunk store health overview.
//!
//! `igris stats` shows what is indexed and whether the vector index and the
//! chunk store still agree. A mismatch, or a leftover `.pending` marker from
//! an ingestion that never finished, means the pair has diverged.

use anyhow::Result;
use std::path::PathBuf;

use crate::builder::{pending_marker_path, read_pending_marker, PendingUpdate};
use crate::chunk_store;
use crate::config::Config;
use crate::index::VectorIndex;

#[derive(Debug)]
pub struct StoreStats {
    pub index_dir: PathBuf,
    pub chunk_store: PathBuf,
    /// Indexed chunk count, or why the index could not be read.
    pub index_count: std::result::Result<usize, String>,
    pub index_model: Option<String>,
    pub store_count: std::result::Result<usize, String>,
    pub store_bytes: u64,
    pub pending: Option<PendingUpdate>,
    /// A marker file exists but could not be parsed.
    pub pending_unreadable: bool,
}

impl StoreStats {
    /// True when both artifacts are readable, hold the same number of chunks
    /// and no update is pending.
    pub fn in_sync(&self) -> bool {
        matches!((&self.index_count, &self.store_count), (Ok(a), Ok(b)) if a == b)
            && self.pending.is_none()
            && !self.pending_unreadable
    }
}

pub fn collect_stats(config: &Config) -> StoreStats {
    let index_dir = config.paths.index_dir.clone();
    let chunk_store = config.paths.chunk_store.clone();

    let (index_count, index_model) = if !index_dir.exists() {
        (Ok(0), None)
    } else {
        match VectorIndex::load(&index_dir) {
            Ok(index) => (Ok(index.len()), Some(index.model().to_string())),
            Err(e) => (Err(format!("{:#}", e)), None),
        }
    };

    let store_count = if !chunk_store.exists() {
        Ok(0)
    } else {
        chunk_store::load(&chunk_store)
            .map(|chunks| chunks.len())
            .map_err(|e| format!("{:#}", e))
    };
    let store_bytes = std::fs::metadata(&chunk_store).map(|m| m.len()).unwrap_or(0);

    let pending = read_pending_marker(&chunk_store);
    let pending_unreadable = pending.is_none() && pending_marker_path(&chunk_store).exists();

    StoreStats {
        index_dir,
        chunk_store,
        index_count,
        index_model,
        store_count,
        store_bytes,
        pending,
        pending_unreadable,
    }
}

/// Run the stats command and print a summary.
pub fn run_stats(config: &Config) -> Result<()> {
    let stats = collect_stats(config);

    println!("Igris Index Stats");
    println!("=================");
    println!();
    println!("  Index:       {}", stats.index_dir.display());
    match &stats.index_count {
        Ok(n) => println!("  Indexed:     {}", n),
        Err(e) => println!("  Indexed:     unreadable ({})", e),
    }
    if let Some(model) = &stats.index_model {
        println!("  Model:       {}", model);
    }
    println!();
    println!("  Chunk store: {}", stats.chunk_store.display());
    println!("  Size:        {}", format_bytes(stats.store_bytes));
    match &stats.store_count {
        Ok(n) => println!("  Stored:      {}", n),
        Err(e) => println!("  Stored:      unreadable ({})", e),
    }
    println!();

    if let Some(pending) = &stats.pending {
        println!(
            "  Pending:     ingestion of {} chunks started {} never finished",
            pending.batch_size,
            format_ts_relative(pending.started_at.timestamp())
        );
    } else if stats.pending_unreadable {
        println!("  Pending:     unreadable marker, an earlier ingestion never finished");
    }
    println!(
        "  Status:      {}",
        if stats.in_sync() { "in sync" } else { "DIVERGED" }
    );
    println!();
    Ok(())
}

/// Format a byte count as a human-readable string.
fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.2} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}

/// Format a Unix timestamp as a relative time string (e.g. "3 hours ago").
fn format_ts_relative(ts: i64) -> String {
    let delta = chrono::Utc::now().timestamp() - ts;
    if delta < 0 {
        return format_ts_iso(ts);
    }
    if delta < 60 {
        "just now".to_string()
    } else if delta < 3600 {
        let mins = delta / 60;
        format!("{} min{} ago", mins, if mins == 1 { "" } else { "s" })
    } else if delta < 86400 {
        let hours = delta / 3600;
        format!("{} hour{} ago", hours, if hours == 1 { "" } else { "s" })
    } else {
        format_ts_iso(ts)
    }
}

fn format_ts_iso(ts: i64) -> String {
    chrono::DateTime::from_timestamp(ts, 0)
        .map(|dt| dt.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| ts.to_string())
}
