//! Directory snapshots for live-data change detection.
//!
//! Live reduction output lands on a network filesystem where inotify is
//! unreliable, so change detection is polling-based: take a snapshot of
//! filename -> mtime, diff it against the previous one, and report each
//! difference exactly once.

use std::collections::HashMap;
use std::path::Path;
use std::time::SystemTime;

use serde::Serialize;
use tracing::warn;

/// Filename -> modification time for every regular file directly in a
/// directory. Subdirectories are ignored; live-data directories are flat.
pub type FileSnapshot = HashMap<String, SystemTime>;

/// Snapshot a directory. Scan errors are logged and produce an empty
/// snapshot rather than tearing down the watch; files that vanish
/// between readdir and stat are skipped.
pub fn snapshot_dir(dir: &Path) -> FileSnapshot {
    let mut snapshot = FileSnapshot::new();
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(err) => {
            warn!("error scanning directory {}: {}", dir.display(), err);
            return snapshot;
        }
    };
    for entry in entries.flatten() {
        let Ok(metadata) = entry.metadata() else {
            continue;
        };
        if !metadata.is_file() {
            continue;
        }
        let Ok(name) = entry.file_name().into_string() else {
            continue;
        };
        let mtime = metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH);
        snapshot.insert(name, mtime);
    }
    snapshot
}

/// The kind of difference observed between two snapshots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeType {
    Added,
    Deleted,
    Modified,
}

/// One detected file change, serialized directly into SSE event data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileChange {
    pub file: String,
    pub change_type: ChangeType,
}

/// Diff two successive snapshots. Each changed file appears exactly
/// once; ordering within one diff is unspecified.
pub fn diff_snapshots(previous: &FileSnapshot, current: &FileSnapshot) -> Vec<FileChange> {
    let mut changes = Vec::new();
    for (name, mtime) in current {
        match previous.get(name) {
            None => changes.push(FileChange {
                file: name.clone(),
                change_type: ChangeType::Added,
            }),
            Some(old_mtime) if old_mtime != mtime => changes.push(FileChange {
                file: name.clone(),
                change_type: ChangeType::Modified,
            }),
            _ => {}
        }
    }
    for name in previous.keys() {
        if !current.contains_key(name) {
            changes.push(FileChange {
                file: name.clone(),
                change_type: ChangeType::Deleted,
            });
        }
    }
    changes
}

// =============================================================================
// Tests
// =============================================================================
