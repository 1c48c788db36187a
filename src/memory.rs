//! Durable conversation memory.
//!
//! The snapshot lives in one JSON file plus a `.bak` sibling holding the
//! previous version:
//!
//! ```json
//! { "chat_history": [ { "role": "human", "content": "hi" } ] }
//! ```
//!
//! # Save
//!
//! 1. Copy the current file (if any) to `<path>.bak`. Best effort: a failed
//!    copy is logged and the save continues.
//! 2. Write the new snapshot atomically (temp file, fsync, rename).
//!
//! Write errors propagate to the caller.
//!
//! # Load
//!
//! Try the primary file, then the backup, then fall back to an empty
//! snapshot. Load never fails; [`LoadedSnapshot::origin`] says which source
//! was used so a restored backup is visible to the caller.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::persist;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Human,
    Ai,
    System,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Role::Human => "human",
            Role::Ai => "ai",
            Role::System => "system",
        })
    }
}

impl std::str::FromStr for Role {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "human" | "user" => Ok(Role::Human),
            "ai" | "assistant" => Ok(Role::Ai),
            "system" => Ok(Role::System),
            other => anyhow::bail!("Unknown role '{}'. Expected human, ai or system", other),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TurnMessage {
    pub role: Role,
    pub content: String,
}

impl TurnMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemorySnapshot {
    #[serde(default)]
    pub chat_history: Vec<TurnMessage>,
}

/// Which file a loaded snapshot came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotOrigin {
    Primary,
    /// The primary file was missing or unreadable.
    Backup,
    /// Neither file was usable.
    Empty,
}

#[derive(Debug, Clone)]
pub struct LoadedSnapshot {
    pub snapshot: MemorySnapshot,
    pub origin: SnapshotOrigin,
}

/// Path of the backup kept next to `path`.
pub fn backup_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(".bak");
    PathBuf::from(name)
}

/// Rotate the current file into `.bak`, then atomically replace it.
pub fn save_snapshot(snapshot: &MemorySnapshot, path: &Path) -> Result<()> {
    if path.exists() {
        let backup = backup_path(path);
        if let Err(e) = std::fs::copy(path, &backup) {
            warn!(
                backup = %backup.display(),
                "could not back up memory file, saving anyway: {}",
                e
            );
        }
    }

    persist::write_json_atomic(path, snapshot)
        .with_context(|| format!("Failed to save memory to {}", path.display()))?;
    debug!(
        path = %path.display(),
        messages = snapshot.chat_history.len(),
        "memory saved"
    );
    Ok(())
}

/// Load the snapshot at `path`, falling back to the backup and then to empty.
pub fn load_snapshot(path: &Path) -> LoadedSnapshot {
    let backup = backup_path(path);
    let candidates = [(path, SnapshotOrigin::Primary), (backup.as_path(), SnapshotOrigin::Backup)];

    for (candidate, origin) in candidates {
        if !candidate.exists() {
            continue;
        }
        match read_snapshot(candidate) {
            Ok(snapshot) => {
                if origin == SnapshotOrigin::Backup {
                    warn!(
                        path = %path.display(),
                        messages = snapshot.chat_history.len(),
                        "primary memory was unusable, restored from backup"
                    );
                } else {
                    info!(messages = snapshot.chat_history.len(), "memory restored");
                }
                return LoadedSnapshot { snapshot, origin };
            }
            Err(e) => {
                warn!(file = %candidate.display(), "could not load memory: {:#}", e);
            }
        }
    }

    info!(path = %path.display(), "starting with empty memory");
    LoadedSnapshot {
        snapshot: MemorySnapshot::default(),
        origin: SnapshotOrigin::Empty,
    }
}

fn read_snapshot(path: &Path) -> Result<MemorySnapshot> {
    let bytes =
        std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
    let snapshot = serde_json::from_slice(&bytes)
        .with_context(|| format!("Failed to parse {}", path.display()))?;
    Ok(snapshot)
}

/// A memory file bound to a path, saved after every turn.
#[derive(Debug, Clone)]
pub struct MemoryStore {
    path: PathBuf,
}

impl MemoryStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> LoadedSnapshot {
        load_snapshot(&self.path)
    }

    pub fn save(&self, snapshot: &MemorySnapshot) -> Result<()> {
        save_snapshot(snapshot, &self.path)
    }

    /// Append one message and persist immediately. Returns the new history length.
    pub fn append_turn(&self, message: TurnMessage) -> Result<usize> {
        let mut snapshot = self.load().snapshot;
        snapshot.chat_history.push(message);
        self.save(&snapshot)?;
        Ok(snapshot.chat_history.len())
    }

    /// Replace the history with an empty one. The previous file becomes the backup.
    pub fn clear(&self) -> Result<()> {
        self.save(&MemorySnapshot::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    fn snapshot(n: usize) -> MemorySnapshot {
        MemorySnapshot {
            chat_history: (0..n)
                .map(|i| {
                    let role = if i % 2 == 0 { Role::Human } else { Role::Ai };
                    TurnMessage::new(role, format!("message {}", i))
                })
                .collect(),
        }
    }

    #[test]
    fn save_then_load_primary() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("memory.json");
        save_snapshot(&snapshot(3), &path).unwrap();

        let loaded = load_snapshot(&path);
        assert_eq!(loaded.origin, SnapshotOrigin::Primary);
        assert_eq!(loaded.snapshot, snapshot(3));
        // First save has nothing to back up.
        assert!(!backup_path(&path).exists());
    }

    #[test]
    fn second_save_rotates_backup() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("memory.json");
        save_snapshot(&snapshot(1), &path).unwrap();
        save_snapshot(&snapshot(2), &path).unwrap();

        let backup: MemorySnapshot =
            serde_json::from_slice(&std::fs::read(backup_path(&path)).unwrap()).unwrap();
        assert_eq!(backup, snapshot(1));
        assert_eq!(load_snapshot(&path).snapshot, snapshot(2));
    }

    #[test]
    fn missing_files_load_empty() {
        let tmp = TempDir::new().unwrap();
        let loaded = load_snapshot(&tmp.path().join("absent.json"));
        assert_eq!(loaded.origin, SnapshotOrigin::Empty);
        assert!(loaded.snapshot.chat_history.is_empty());
    }

    #[test]
    fn corrupt_primary_falls_back_to_backup() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("memory.json");
        save_snapshot(&snapshot(2), &path).unwrap();
        save_snapshot(&snapshot(4), &path).unwrap();
        std::fs::write(&path, b"{\"chat_history\": [ {\"role\": \"hu").unwrap();

        let loaded = load_snapshot(&path);
        assert_eq!(loaded.origin, SnapshotOrigin::Backup);
        assert_eq!(loaded.snapshot, snapshot(2));
    }

    #[test]
    fn both_corrupt_loads_empty() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("memory.json");
        std::fs::write(&path, b"garbage").unwrap();
        std::fs::write(backup_path(&path), b"more garbage").unwrap();

        let loaded = load_snapshot(&path);
        assert_eq!(loaded.origin, SnapshotOrigin::Empty);
        assert!(loaded.snapshot.chat_history.is_empty());
    }

    #[test]
    fn interrupted_save_keeps_previous_snapshot() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("memory.json");
        save_snapshot(&snapshot(2), &path).unwrap();

        // The process dies halfway through serializing the next snapshot.
        let next = serde_json::to_vec(&snapshot(5)).unwrap();
        let err = persist::write_atomic(&path, |w| {
            w.write_all(&next[..next.len() / 2])?;
            anyhow::bail!("killed mid-write")
        })
        .unwrap_err();
        assert!(err.to_string().contains("killed mid-write"));

        let loaded = load_snapshot(&path);
        assert_eq!(loaded.origin, SnapshotOrigin::Primary);
        assert_eq!(loaded.snapshot, snapshot(2));
    }

    #[test]
    fn failed_backup_does_not_abort_save() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("memory.json");
        save_snapshot(&snapshot(1), &path).unwrap();

        // A non-empty directory where the backup file should go makes the copy fail.
        let backup = backup_path(&path);
        std::fs::create_dir_all(&backup).unwrap();
        std::fs::write(backup.join("occupied"), b"x").unwrap();

        save_snapshot(&snapshot(3), &path).unwrap();

        let loaded = load_snapshot(&path);
        assert_eq!(loaded.origin, SnapshotOrigin::Primary);
        assert_eq!(loaded.snapshot, snapshot(3));
        assert!(backup.is_dir());
    }

    #[test]
    fn append_and_clear() {
        let tmp = TempDir::new().unwrap();
        let store = MemoryStore::new(tmp.path().join("memory.json"));
        assert_eq!(store.append_turn(TurnMessage::new(Role::Human, "hi")).unwrap(), 1);
        assert_eq!(store.append_turn(TurnMessage::new(Role::Ai, "hello")).unwrap(), 2);

        store.clear().unwrap();
        let loaded = store.load();
        assert_eq!(loaded.origin, SnapshotOrigin::Primary);
        assert!(loaded.snapshot.chat_history.is_empty());

        // The cleared history is still recoverable from the backup.
        let backup: MemorySnapshot =
            serde_json::from_slice(&std::fs::read(backup_path(store.path())).unwrap()).unwrap();
        assert_eq!(backup.chat_history.len(), 2);
    }

    #[test]
    fn role_parsing() {
        assert_eq!("Human".parse::<Role>().unwrap(), Role::Human);
        assert_eq!("assistant".parse::<Role>().unwrap(), Role::Ai);
        assert!("robot".parse::<Role>().is_err());
        assert_eq!(
            serde_json::to_string(&TurnMessage::new(Role::Ai, "x")).unwrap(),
            r#"{"role":"ai","content":"x"}"#
        );
    }
}
