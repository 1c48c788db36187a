//! Similarity search over the persisted vector index.
//!
//! Used by `igris search`. The query is embedded with the configured
//! embedder, so the index must have been built by the same model.

use anyhow::{bail, Result};

use crate::config::Config;
use crate::embedding::create_embedder;
use crate::index::search_text;
use crate::models::SearchHit;

/// Top `k` chunks for `query`, best first.
pub fn search(config: &Config, query: &str, k: usize) -> Result<Vec<SearchHit>> {
    if query.trim().is_empty() {
        bail!("Search query is empty");
    }
    let index_dir = &config.paths.index_dir;
    if !index_dir.is_dir() {
        bail!(
            "No vector index at {}. Run `igris ingest <PATH>` first.",
            index_dir.display()
        );
    }
    let embedder = create_embedder(&config.embedding)?;
    search_text(index_dir, embedder.as_ref(), query, k)
}

/// Run a search and print the hits.
pub fn run_search(config: &Config, query: &str, limit: usize) -> Result<()> {
    let hits = search(config, query, limit)?;
    if hits.is_empty() {
        println!("No results.");
        return Ok(());
    }

    for (i, hit) in hits.iter().enumerate() {
        let meta = &hit.chunk.metadata;
        match meta.page {
            Some(page) => println!("{}. [{:.2}] {} (page {})", i + 1, hit.score, meta.source, page),
            None => println!("{}. [{:.2}] {}", i + 1, hit.score, meta.source),
        }
        println!("    chunk: {}", meta.chunk_index);
        println!("    excerpt: \"{}\"", excerpt(&hit.chunk.text, 240));
        println!("    id: {}", hit.chunk.id);
        println!();
    }
    Ok(())
}

/// Single-line prefix of `text`, at most `max_chars` characters.
fn excerpt(text: &str, max_chars: usize) -> String {
    let flat = text.replace('\n', " ");
    let flat = flat.trim();
    if flat.chars().count() <= max_chars {
        return flat.to_string();
    }
    let cut: String = flat.chars().take(max_chars).collect();
    format!("{}...", cut.trim_end())
}
