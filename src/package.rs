//! Package the vector index and chunk store into one portable zip archive.
//!
//! Both artifacts are copied into a fresh temporary directory and the
//! directory is zipped into `igris_artifacts.zip` inside it. The caller owns
//! the returned temporary directory and is responsible for removing it.

use anyhow::{bail, Context, Result};
use std::fs::File;
use std::path::{Path, PathBuf};
use tracing::info;
use walkdir::WalkDir;
use zip::write::SimpleFileOptions;

/// Fixed archive file name; also the object name used when publishing.
pub const ARCHIVE_NAME: &str = "igris_artifacts.zip";

const TEMP_PREFIX: &str = "igris_ingest_";

#[derive(Debug, Clone)]
pub struct Artifact {
    pub archive_path: PathBuf,
    pub temp_dir: PathBuf,
}

/// Snapshot `index_dir` and `chunk_store` into a zip archive.
///
/// If packaging fails the temporary directory is removed before returning.
pub fn prepare_artifact(index_dir: &Path, chunk_store: &Path) -> Result<Artifact> {
    if !index_dir.is_dir() {
        bail!("Vector index not found at {}", index_dir.display());
    }
    if !chunk_store.is_file() {
        bail!("Chunk store not found at {}", chunk_store.display());
    }

    let staging = tempfile::Builder::new()
        .prefix(TEMP_PREFIX)
        .tempdir()
        .context("Failed to create temporary artifact directory")?;

    let index_name = file_name_of(index_dir)?;
    copy_dir_recursive(index_dir, &staging.path().join(index_name))?;

    let store_name = file_name_of(chunk_store)?;
    std::fs::copy(chunk_store, staging.path().join(store_name))
        .with_context(|| format!("Failed to copy chunk store {}", chunk_store.display()))?;

    let archive_path = staging.path().join(ARCHIVE_NAME);
    write_zip(staging.path(), &archive_path)?;

    let temp_dir = staging.keep();
    info!(archive = %archive_path.display(), "artifact packaged");
    Ok(Artifact {
        archive_path,
        temp_dir,
    })
}

fn file_name_of(path: &Path) -> Result<&std::ffi::OsStr> {
    path.file_name()
        .ok_or_else(|| anyhow::anyhow!("Path has no file name: {}", path.display()))
}

fn copy_dir_recursive(from: &Path, to: &Path) -> Result<()> {
    for entry in WalkDir::new(from) {
        let entry = entry?;
        let relative = entry.path().strip_prefix(from)?;
        let target = to.join(relative);
        if entry.file_type().is_dir() {
            std::fs::create_dir_all(&target)?;
        } else if entry.file_type().is_file() {
            std::fs::copy(entry.path(), &target)
                .with_context(|| format!("Failed to copy {}", entry.path().display()))?;
        }
    }
    Ok(())
}

/// Zip every entry under `root` (except the archive itself) into `archive_path`.
fn write_zip(root: &Path, archive_path: &Path) -> Result<()> {
    let entries: Vec<walkdir::DirEntry> = WalkDir::new(root)
        .min_depth(1)
        .sort_by_file_name()
        .into_iter()
        .collect::<std::result::Result<_, _>>()?;

    let file = File::create(archive_path)
        .with_context(|| format!("Failed to create archive {}", archive_path.display()))?;
    let mut zip = zip::ZipWriter::new(file);

    for entry in entries {
        let relative = entry.path().strip_prefix(root)?;
        let name = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        if entry.file_type().is_dir() {
            zip.add_directory(name, entry_options())?;
        } else if entry.file_type().is_file() {
            zip.start_file(name, entry_options())?;
            let mut src = File::open(entry.path())?;
            std::io::copy(&mut src, &mut zip)?;
        }
    }

    zip.finish()?;
    Ok(())
}

fn entry_options() -> SimpleFileOptions {
    SimpleFileOptions::default().compression_method(zip::CompressionMethod::Deflated)
}
