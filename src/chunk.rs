//! Fixed-window character chunker.
//!
//! Splits each [`ContentBlock`] into windows of `chunk_chars` characters,
//! where consecutive windows from the same block share `overlap_chars`
//! characters. The final window of a block may be shorter. Windows are
//! counted in Unicode scalar values, never bytes, so multi-byte text never
//! splits inside a character.
//!
//! Each chunk receives a fresh UUID plus a SHA-256 hash of its text.

use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::config::ChunkingConfig;
use crate::models::{Chunk, ChunkMetadata, ContentBlock};

/// Chunk every block in order. Whitespace-only blocks produce nothing.
pub fn chunk_blocks(blocks: &[ContentBlock], config: &ChunkingConfig) -> Vec<Chunk> {
    blocks
        .iter()
        .flat_map(|block| chunk_block(block, config.chunk_chars, config.overlap_chars))
        .collect()
}

/// Split one block into overlapping windows, left to right.
pub fn chunk_block(block: &ContentBlock, chunk_chars: usize, overlap_chars: usize) -> Vec<Chunk> {
    let source = block.source.to_string_lossy().to_string();
    split_windows(&block.text, chunk_chars, overlap_chars)
        .into_iter()
        .enumerate()
        .map(|(i, text)| {
            make_chunk(
                text,
                ChunkMetadata {
                    source: source.clone(),
                    page: block.page,
                    chunk_index: i as u32,
                },
            )
        })
        .collect()
}

/// Character windows of `size` with `overlap` shared between neighbours.
///
/// `overlap` must be smaller than `size`; config validation guarantees this.
pub fn split_windows(text: &str, size: usize, overlap: usize) -> Vec<&str> {
    if text.trim().is_empty() || size == 0 {
        return Vec::new();
    }

    // Byte offset of every char boundary, plus the end of the string.
    let boundaries: Vec<usize> = text
        .char_indices()
        .map(|(i, _)| i)
        .chain(std::iter::once(text.len()))
        .collect();
    let char_len = boundaries.len() - 1;
    let step = size.saturating_sub(overlap).max(1);

    let mut windows = Vec::new();
    let mut start = 0;
    loop {
        let end = (start + size).min(char_len);
        windows.push(&text[boundaries[start]..boundaries[end]]);
        if end == char_len {
            break;
        }
        start += step;
    }
    windows
}

fn make_chunk(text: &str, metadata: ChunkMetadata) -> Chunk {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    let hash = format!("{:x}", hasher.finalize());

    Chunk {
        id: Uuid::new_v4().to_string(),
        text: text.to_string(),
        metadata,
        hash,
    }
}
