//! Document loader: turns a file or directory into [`ContentBlock`]s.
//!
//! Dispatches on file extension. PDFs yield one block per page with text,
//! DOCX files yield one block of joined paragraphs, and everything else is
//! read as UTF-8 with undecodable bytes replaced.
//!
//! Directories are walked recursively. Only files with an extension from
//! [`SUPPORTED_EXTENSIONS`] are loaded; the rest are skipped silently. A
//! single file named explicitly is always loaded, falling back to plain text
//! when its extension is not recognized.

use globset::{Glob, GlobSet, GlobSetBuilder};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;
use walkdir::WalkDir;

use crate::extract;
use crate::models::ContentBlock;

/// Extensions indexed when walking a directory.
pub const SUPPORTED_EXTENSIONS: &[&str] = &[
    "txt", "md", "csv", "json", "log", "py", "html", "pdf", "docx",
];

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("Input path not found: {}", .0.display())]
    NotFound(PathBuf),
    #[error("No readable supported documents found in: {}", .0.display())]
    Empty(PathBuf),
    #[error("Failed reading {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: anyhow::Error,
    },
}

/// Load every supported document under `path` into content blocks.
///
/// Fails with [`LoadError::NotFound`] before touching the filesystem further
/// when `path` is missing, and with [`LoadError::Empty`] when nothing
/// readable was found. The first unreadable file aborts the whole load.
pub fn load_path(path: &Path) -> Result<Vec<ContentBlock>, LoadError> {
    if !path.exists() {
        return Err(LoadError::NotFound(path.to_path_buf()));
    }

    let files = collect_files(path)?;
    let mut blocks = Vec::new();
    for file in &files {
        let loaded = read_file(file).map_err(|source| LoadError::Read {
            path: file.clone(),
            source,
        })?;
        debug!(file = %file.display(), blocks = loaded.len(), "loaded document");
        blocks.extend(loaded);
    }

    if blocks.is_empty() {
        return Err(LoadError::Empty(path.to_path_buf()));
    }
    Ok(blocks)
}

/// Resolve `path` to the sorted list of files to load.
pub fn collect_files(path: &Path) -> Result<Vec<PathBuf>, LoadError> {
    if path.is_file() {
        return Ok(vec![path.to_path_buf()]);
    }

    let include_set = supported_globset().map_err(|source| LoadError::Read {
        path: path.to_path_buf(),
        source,
    })?;

    let mut files = Vec::new();
    for entry in WalkDir::new(path) {
        let entry = entry.map_err(|e| LoadError::Read {
            path: e
                .path()
                .map(Path::to_path_buf)
                .unwrap_or_else(|| path.to_path_buf()),
            source: e.into(),
        })?;
        if !entry.file_type().is_file() {
            continue;
        }
        let file_name = entry.file_name().to_string_lossy().to_lowercase();
        if include_set.is_match(&file_name) {
            files.push(entry.into_path());
        }
    }

    // Sort for deterministic ordering
    files.sort();
    Ok(files)
}

/// Read one file into zero or more content blocks.
pub fn read_file(path: &Path) -> anyhow::Result<Vec<ContentBlock>> {
    let source = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
    let bytes = std::fs::read(path)?;

    let blocks = match extension_of(path).as_deref() {
        Some("pdf") => extract::extract_pdf_pages(&bytes)?
            .into_iter()
            .enumerate()
            .filter(|(_, text)| !text.trim().is_empty())
            .map(|(i, text)| ContentBlock {
                text,
                source: source.clone(),
                page: Some(i as u32 + 1),
            })
            .collect(),
        Some("docx") => {
            let text = extract::extract_docx_paragraphs(&bytes)?.join("\n");
            single_block(text, source)
        }
        _ => single_block(String::from_utf8_lossy(&bytes).into_owned(), source),
    };
    Ok(blocks)
}

fn single_block(text: String, source: PathBuf) -> Vec<ContentBlock> {
    if text.trim().is_empty() {
        return Vec::new();
    }
    vec![ContentBlock {
        text,
        source,
        page: None,
    }]
}

fn extension_of(path: &Path) -> Option<String> {
    path.extension()
        .map(|ext| ext.to_string_lossy().to_lowercase())
}

fn supported_globset() -> anyhow::Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for ext in SUPPORTED_EXTENSIONS {
        builder.add(Glob::new(&format!("*.{}", ext))?);
    }
    Ok(builder.build()?)
}
