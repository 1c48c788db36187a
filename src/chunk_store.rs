//! The chunk store: a JSON array of every chunk ever indexed.
//!
//! It mirrors the vector index's contents in a library-independent format so
//! the full corpus can be listed or re-embedded without the index.

use anyhow::{Context, Result};
use std::path::Path;
use tracing::error;

use crate::models::Chunk;
use crate::persist;

/// Read the store strictly. A missing file is an error.
pub fn load(path: &Path) -> Result<Vec<Chunk>> {
    let bytes = std::fs::read(path)
        .with_context(|| format!("Failed to read chunk store {}", path.display()))?;
    let chunks = serde_json::from_slice(&bytes)
        .with_context(|| format!("Chunk store {} is not a valid chunk list", path.display()))?;
    Ok(chunks)
}

/// Read the store, treating a missing or unreadable file as empty.
///
/// Returns the chunks plus whether a corrupt store was discarded. Discarding
/// loses every previously stored chunk, so it is logged at error level.
pub fn load_or_empty(path: &Path) -> (Vec<Chunk>, bool) {
    if !path.exists() {
        return (Vec::new(), false);
    }
    match load(path) {
        Ok(chunks) => (chunks, false),
        Err(e) => {
            error!(
                store = %path.display(),
                "chunk store unreadable, starting from an empty store; previously stored chunks are lost: {:#}",
                e
            );
            (Vec::new(), true)
        }
    }
}

/// Replace the store with `chunks`.
pub fn save(path: &Path, chunks: &[Chunk]) -> Result<()> {
    persist::write_json_atomic(path, chunks)
        .with_context(|| format!("Failed to write chunk store {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ChunkMetadata;

    fn chunk(text: &str) -> Chunk {
        Chunk {
            id: format!("id-{}", text),
            text: text.to_string(),
            metadata: ChunkMetadata {
                source: "/docs/a.txt".to_string(),
                page: None,
                chunk_index: 0,
            },
            hash: String::new(),
        }
    }

    #[test]
    fn save_then_load() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("docs.json");
        save(&path, &[chunk("a"), chunk("b")]).unwrap();
        let loaded = load(&path).unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded[1].text, "b");
    }

    #[test]
    fn missing_store_is_empty_without_recovery_flag() {
        let tmp = tempfile::tempdir().unwrap();
        let (chunks, recovered) = load_or_empty(&tmp.path().join("absent.json"));
        assert!(chunks.is_empty());
        assert!(!recovered);
    }

    #[test]
    fn corrupt_store_is_empty_with_recovery_flag() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("docs.json");
        std::fs::write(&path, b"[{\"id\": \"trunc").unwrap();
        let (chunks, recovered) = load_or_empty(&path);
        assert!(chunks.is_empty());
        assert!(recovered);
    }
}
