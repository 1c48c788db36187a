//! Incremental maintenance of the vector index + chunk store pair.
//!
//! # Workflow
//!
//! 1. Open the existing index and append the new chunks, or build a fresh
//!    index when none exists. An index that cannot be opened (corrupt, or
//!    built by a different embedder) is replaced by one holding only the new
//!    chunks.
//! 2. Persist the index.
//! 3. Load the chunk store (a corrupt store counts as empty), append the new
//!    chunks, persist it.
//!
//! Steps 2 and 3 are two independent writes. A crash between them leaves the
//! pair divergent. To make that detectable, a `<chunk_store>.pending` marker
//! is written before step 2 and removed after step 3; a marker that survives
//! into the next build is reported.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};

use crate::chunk_store;
use crate::embedding::Embedder;
use crate::index::VectorIndex;
use crate::models::Chunk;
use crate::persist;

/// What a build did, for logging and the pipeline outcome.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndexReport {
    pub added: usize,
    pub index_total: usize,
    pub store_total: usize,
    /// The existing index could not be opened and was replaced.
    pub index_rebuilt: bool,
    /// The existing chunk store could not be read and was replaced.
    pub store_reset: bool,
    /// A marker from an earlier build that never finished was found.
    pub interrupted_previous: bool,
}

/// Contents of the `.pending` marker.
#[derive(Debug, Serialize, Deserialize)]
pub struct PendingUpdate {
    pub index_dir: PathBuf,
    pub chunk_store: PathBuf,
    pub batch_size: usize,
    pub started_at: DateTime<Utc>,
}

/// Path of the in-progress marker for a chunk store.
pub fn pending_marker_path(chunk_store: &Path) -> PathBuf {
    let mut name = chunk_store.as_os_str().to_os_string();
    name.push(".pending");
    PathBuf::from(name)
}

/// Read the marker left by an unfinished build, if any.
pub fn read_pending_marker(chunk_store: &Path) -> Option<PendingUpdate> {
    let bytes = std::fs::read(pending_marker_path(chunk_store)).ok()?;
    serde_json::from_slice(&bytes).ok()
}

pub struct IndexBuilder<'a> {
    embedder: &'a dyn Embedder,
}

impl<'a> IndexBuilder<'a> {
    pub fn new(embedder: &'a dyn Embedder) -> Self {
        Self { embedder }
    }

    /// Merge `chunks` into the index at `index_dir` and the store at `chunk_store`.
    pub fn build(
        &self,
        chunks: &[Chunk],
        index_dir: &Path,
        chunk_store: &Path,
    ) -> Result<(VectorIndex, IndexReport)> {
        let mut report = IndexReport {
            added: chunks.len(),
            ..Default::default()
        };

        let marker = pending_marker_path(chunk_store);
        if marker.exists() {
            warn!(
                marker = %marker.display(),
                "previous ingestion did not finish; vector index and chunk store may disagree"
            );
            report.interrupted_previous = true;
        }

        let index = self.merge_index(chunks, index_dir, &mut report)?;

        persist::write_json_atomic(
            &marker,
            &PendingUpdate {
                index_dir: index_dir.to_path_buf(),
                chunk_store: chunk_store.to_path_buf(),
                batch_size: chunks.len(),
                started_at: Utc::now(),
            },
        )
        .with_context(|| format!("Failed to write marker {}", marker.display()))?;

        index
            .save(index_dir)
            .with_context(|| format!("Failed to save vector index to {}", index_dir.display()))?;

        let (mut stored, store_reset) = chunk_store::load_or_empty(chunk_store);
        report.store_reset = store_reset;
        stored.extend_from_slice(chunks);
        chunk_store::save(chunk_store, &stored)?;

        std::fs::remove_file(&marker)
            .with_context(|| format!("Failed to remove marker {}", marker.display()))?;

        report.index_total = index.len();
        report.store_total = stored.len();
        info!(
            added = report.added,
            index_total = report.index_total,
            store_total = report.store_total,
            "index and chunk store updated"
        );
        Ok((index, report))
    }

    fn merge_index(
        &self,
        chunks: &[Chunk],
        index_dir: &Path,
        report: &mut IndexReport,
    ) -> Result<VectorIndex> {
        if !index_dir.exists() {
            info!(index = %index_dir.display(), "creating new vector index");
            return VectorIndex::from_chunks(chunks, self.embedder);
        }

        match VectorIndex::open(index_dir, self.embedder) {
            Ok(mut index) => {
                index.add_chunks(chunks, self.embedder)?;
                Ok(index)
            }
            Err(e) => {
                error!(
                    index = %index_dir.display(),
                    "vector index unusable, rebuilding from the current batch only; previously indexed chunks are lost: {:#}",
                    e
                );
                report.index_rebuilt = true;
                VectorIndex::from_chunks(chunks, self.embedder)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::HashEmbedder;
    use crate::models::ChunkMetadata;

    fn chunks(n: usize, tag: &str) -> Vec<Chunk> {
        (0..n)
            .map(|i| Chunk {
                id: uuid::Uuid::new_v4().to_string(),
                text: format!("{} chunk number {}", tag, i),
                metadata: ChunkMetadata {
                    source: format!("/docs/{}.txt", tag),
                    page: None,
                    chunk_index: i as u32,
                },
                hash: String::new(),
            })
            .collect()
    }

    #[test]
    fn fresh_build_creates_both_artifacts() {
        let tmp = tempfile::tempdir().unwrap();
        let index_dir = tmp.path().join("idx");
        let store = tmp.path().join("docs.json");
        let embedder = HashEmbedder::new(32);

        let (_, report) = IndexBuilder::new(&embedder)
            .build(&chunks(3, "a"), &index_dir, &store)
            .unwrap();
        assert_eq!(report.index_total, 3);
        assert_eq!(report.store_total, 3);
        assert!(!report.index_rebuilt);
        assert!(!pending_marker_path(&store).exists());
    }

    #[test]
    fn second_build_appends() {
        let tmp = tempfile::tempdir().unwrap();
        let index_dir = tmp.path().join("idx");
        let store = tmp.path().join("docs.json");
        let embedder = HashEmbedder::new(32);
        let builder = IndexBuilder::new(&embedder);

        builder.build(&chunks(3, "a"), &index_dir, &store).unwrap();
        let (index, report) = builder.build(&chunks(2, "b"), &index_dir, &store).unwrap();
        assert_eq!(index.len(), 5);
        assert_eq!(report.store_total, 5);
        assert_eq!(chunk_store::load(&store).unwrap().len(), 5);
    }

    #[test]
    fn corrupt_index_rebuilds_from_batch_only() {
        let tmp = tempfile::tempdir().unwrap();
        let index_dir = tmp.path().join("idx");
        let store = tmp.path().join("docs.json");
        let embedder = HashEmbedder::new(32);
        let builder = IndexBuilder::new(&embedder);

        builder.build(&chunks(3, "a"), &index_dir, &store).unwrap();
        std::fs::write(index_dir.join("index.json"), b"{garbage").unwrap();

        let (index, report) = builder.build(&chunks(2, "b"), &index_dir, &store).unwrap();
        assert!(report.index_rebuilt);
        assert_eq!(index.len(), 2);
        // The store is untouched by the index fallback and keeps growing.
        assert_eq!(report.store_total, 5);
    }

    #[test]
    fn overflowing_index_metadata_rebuilds_instead_of_panicking() {
        let tmp = tempfile::tempdir().unwrap();
        let index_dir = tmp.path().join("idx");
        let store = tmp.path().join("docs.json");
        let embedder = HashEmbedder::new(32);
        let builder = IndexBuilder::new(&embedder);

        builder.build(&chunks(2, "a"), &index_dir, &store).unwrap();
        let meta = serde_json::json!({
            "format_version": 1,
            "model": "hash-32",
            "dims": 32,
            "count": usize::MAX / 4,
            "updated_at": "2024-01-01T00:00:00Z",
        });
        std::fs::write(index_dir.join("index.json"), meta.to_string()).unwrap();

        let (index, report) = builder.build(&chunks(1, "b"), &index_dir, &store).unwrap();
        assert!(report.index_rebuilt);
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn corrupt_store_is_reset() {
        let tmp = tempfile::tempdir().unwrap();
        let index_dir = tmp.path().join("idx");
        let store = tmp.path().join("docs.json");
        std::fs::write(&store, b"not json").unwrap();
        let embedder = HashEmbedder::new(32);

        let (_, report) = IndexBuilder::new(&embedder)
            .build(&chunks(2, "a"), &index_dir, &store)
            .unwrap();
        assert!(report.store_reset);
        assert_eq!(report.store_total, 2);
    }

    #[test]
    fn leftover_marker_is_reported_and_cleared() {
        let tmp = tempfile::tempdir().unwrap();
        let index_dir = tmp.path().join("idx");
        let store = tmp.path().join("docs.json");
        std::fs::write(pending_marker_path(&store), b"{}").unwrap();
        let embedder = HashEmbedder::new(32);

        let (_, report) = IndexBuilder::new(&embedder)
            .build(&chunks(1, "a"), &index_dir, &store)
            .unwrap();
        assert!(report.interrupted_previous);
        assert!(!pending_marker_path(&store).exists());
    }
}
