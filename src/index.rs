//! On-disk vector index.
//!
//! The index is a directory holding three files:
//!
//! | File | Contents |
//! |------|----------|
//! | `vectors.bin` | row-major little-endian `f32` embeddings |
//! | `docstore.json` | the indexed chunks, in vector order |
//! | `index.json` | format version, model name, dims, row count |
//!
//! Each file is replaced atomically and `index.json` is written last. A save
//! interrupted part way leaves row counts that disagree with `index.json`,
//! which [`VectorIndex::open`] reports as a corrupt index.
//!
//! Search is exact: the query is scored against every row with
//! [`cosine_similarity`]. The index is append-only.

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::Path;

use crate::embedding::{blob_to_vec, cosine_similarity, embed_query, vec_to_blob, Embedder};
use crate::models::{Chunk, SearchHit};
use crate::persist;

const FORMAT_VERSION: u32 = 1;
const META_FILE: &str = "index.json";
const VECTORS_FILE: &str = "vectors.bin";
const DOCSTORE_FILE: &str = "docstore.json";

#[derive(Debug, Serialize, Deserialize)]
struct IndexMeta {
    format_version: u32,
    model: String,
    dims: usize,
    count: usize,
    updated_at: DateTime<Utc>,
}

pub struct VectorIndex {
    model: String,
    dims: usize,
    /// `count * dims` floats, one row per chunk.
    vectors: Vec<f32>,
    chunks: Vec<Chunk>,
}

impl VectorIndex {
    /// An empty index bound to the embedder's model and dimensionality.
    pub fn new(embedder: &dyn Embedder) -> Self {
        Self {
            model: embedder.model_name().to_string(),
            dims: embedder.dims(),
            vectors: Vec::new(),
            chunks: Vec::new(),
        }
    }

    /// Build a fresh index containing exactly `chunks`.
    pub fn from_chunks(chunks: &[Chunk], embedder: &dyn Embedder) -> Result<Self> {
        let mut index = Self::new(embedder);
        index.add_chunks(chunks, embedder)?;
        Ok(index)
    }

    /// Load the index at `dir` without checking it against an embedder.
    pub fn load(dir: &Path) -> Result<Self> {
        let meta_path = dir.join(META_FILE);
        let meta_bytes = std::fs::read(&meta_path)
            .with_context(|| format!("Failed to read {}", meta_path.display()))?;
        let meta: IndexMeta = serde_json::from_slice(&meta_bytes)
            .with_context(|| format!("Invalid index metadata in {}", meta_path.display()))?;
        if meta.format_version != FORMAT_VERSION {
            bail!(
                "Unsupported index format version {} (expected {})",
                meta.format_version,
                FORMAT_VERSION
            );
        }

        let blob = std::fs::read(dir.join(VECTORS_FILE))
            .with_context(|| format!("Failed to read vectors in {}", dir.display()))?;
        let expected_bytes = meta
            .count
            .checked_mul(meta.dims)
            .and_then(|n| n.checked_mul(4))
            .ok_or_else(|| {
                anyhow::anyhow!(
                    "Index metadata is corrupt: {} rows of {} dims overflows",
                    meta.count,
                    meta.dims
                )
            })?;
        if blob.len() != expected_bytes {
            bail!(
                "Vector file holds {} bytes, expected {} rows of {} dims",
                blob.len(),
                meta.count,
                meta.dims
            );
        }

        let docstore = std::fs::read(dir.join(DOCSTORE_FILE))
            .with_context(|| format!("Failed to read docstore in {}", dir.display()))?;
        let chunks: Vec<Chunk> = serde_json::from_slice(&docstore)
            .with_context(|| format!("Invalid docstore in {}", dir.display()))?;
        if chunks.len() != meta.count {
            bail!(
                "Docstore holds {} chunks, index metadata says {}",
                chunks.len(),
                meta.count
            );
        }

        Ok(Self {
            model: meta.model,
            dims: meta.dims,
            vectors: blob_to_vec(&blob),
            chunks,
        })
    }

    /// Load the index at `dir` and check it was built by a compatible embedder.
    pub fn open(dir: &Path, embedder: &dyn Embedder) -> Result<Self> {
        let index = Self::load(dir)?;
        if index.model != embedder.model_name() || index.dims != embedder.dims() {
            bail!(
                "Index at {} was built with {} ({} dims), current embedder is {} ({} dims)",
                dir.display(),
                index.model,
                index.dims,
                embedder.model_name(),
                embedder.dims()
            );
        }
        Ok(index)
    }

    /// Embed `chunks` and append them.
    pub fn add_chunks(&mut self, chunks: &[Chunk], embedder: &dyn Embedder) -> Result<()> {
        if chunks.is_empty() {
            return Ok(());
        }
        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let embeddings = embedder.embed(&texts)?;
        if embeddings.len() != chunks.len() {
            bail!(
                "Embedder returned {} vectors for {} chunks",
                embeddings.len(),
                chunks.len()
            );
        }

        let mut rows = Vec::with_capacity(chunks.len() * self.dims);
        for embedding in &embeddings {
            if embedding.len() != self.dims {
                bail!(
                    "Embedder returned a {}-dimensional vector, index expects {}",
                    embedding.len(),
                    self.dims
                );
            }
            rows.extend_from_slice(embedding);
        }

        self.vectors.extend(rows);
        self.chunks.extend_from_slice(chunks);
        Ok(())
    }

    /// Persist to `dir`, overwriting any previous index there.
    pub fn save(&self, dir: &Path) -> Result<()> {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create index directory {}", dir.display()))?;

        persist::write_atomic(&dir.join(VECTORS_FILE), |w| {
            w.write_all(&vec_to_blob(&self.vectors))?;
            Ok(())
        })?;
        persist::write_json_atomic(&dir.join(DOCSTORE_FILE), &self.chunks)?;

        let meta = IndexMeta {
            format_version: FORMAT_VERSION,
            model: self.model.clone(),
            dims: self.dims,
            count: self.chunks.len(),
            updated_at: Utc::now(),
        };
        persist::write_json_atomic(&dir.join(META_FILE), &meta)?;
        Ok(())
    }

    /// Top `k` chunks by cosine similarity to `query`, best first.
    pub fn search(&self, query: &[f32], k: usize) -> Vec<SearchHit> {
        if self.dims == 0 {
            return Vec::new();
        }
        let mut scored: Vec<(usize, f32)> = self
            .vectors
            .chunks_exact(self.dims)
            .enumerate()
            .map(|(i, row)| (i, cosine_similarity(query, row)))
            .collect();
        scored.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
        scored
            .into_iter()
            .take(k)
            .map(|(i, score)| SearchHit {
                chunk: self.chunks[i].clone(),
                score,
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    pub fn chunks(&self) -> &[Chunk] {
        &self.chunks
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn dims(&self) -> usize {
        self.dims
    }
}

/// Open the index at `dir` and run a text query against it.
pub fn search_text(
    dir: &Path,
    embedder: &dyn Embedder,
    query: &str,
    k: usize,
) -> Result<Vec<SearchHit>> {
    let index = VectorIndex::open(dir, embedder)?;
    let query_vec = embed_query(embedder, query)?;
    Ok(index.search(&query_vec, k))
}
