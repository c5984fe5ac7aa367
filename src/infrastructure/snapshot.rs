//! Persistent per-codebase status record.
//!
//! One snapshot file per host at `~/.context/mcp-codebase-snapshot.json`.
//! All writes go through [`SnapshotManager`], whose save is atomic (temp file
//! + rename). A corrupt or missing file yields an empty snapshot; parse
//! errors never escape the manager. Legacy V1 files are migrated to V2 on
//! load and written back.

use crate::domain::error::Result;
use crate::domain::types::{
    CodebaseInfo, IndexStats, Snapshot, SNAPSHOT_FORMAT_VERSION,
};
use chrono::Utc;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{debug, warn};

/// Filename of the snapshot (wire contract).
pub const SNAPSHOT_FILE: &str = "mcp-codebase-snapshot.json";

/// Owner of the snapshot file and its in-memory view.
#[derive(Debug)]
pub struct SnapshotManager {
    path: PathBuf,
    state: Mutex<Snapshot>,
}

impl SnapshotManager {
    /// Default snapshot location: `~/.context/mcp-codebase-snapshot.json`.
    pub fn default_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".context")
            .join(SNAPSHOT_FILE)
    }

    /// Open the snapshot at the default location.
    pub fn new() -> Self {
        Self::with_path(Self::default_path())
    }

    /// Open a snapshot at an explicit location (tests, alternate state dirs).
    pub fn with_path(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let state = Self::load_or_migrate(&path);
        Self {
            path,
            state: Mutex::new(state),
        }
    }

    fn load_or_migrate(path: &Path) -> Snapshot {
        let raw = match std::fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(_) => return Snapshot::default(),
        };
        let value: Value = match serde_json::from_str(&raw) {
            Ok(value) => value,
            Err(err) => {
                warn!(path = %path.display(), error = %err, "snapshot unreadable, starting empty");
                return Snapshot::default();
            }
        };

        let version = value
            .get("formatVersion")
            .and_then(Value::as_str)
            .unwrap_or("v1");
        if version == SNAPSHOT_FORMAT_VERSION {
            match serde_json::from_value::<Snapshot>(value) {
                Ok(snapshot) => snapshot,
                Err(err) => {
                    warn!(path = %path.display(), error = %err, "snapshot corrupt, starting empty");
                    Snapshot::default()
                }
            }
        } else {
            let migrated = Self::migrate_v1(&value);
            debug!(
                path = %path.display(),
                codebases = migrated.codebases.len(),
                "migrated v1 snapshot"
            );
            // Persist the upgrade so the next load reads V2 directly.
            if let Err(err) = Self::write_atomic(path, &migrated) {
                warn!(path = %path.display(), error = %err, "failed to persist migrated snapshot");
            }
            migrated
        }
    }

    /// Convert a V1 snapshot value. `indexedCodebases` is a path array;
    /// `indexingCodebases` is either a path array or a path→percentage map.
    /// Codebases whose directories no longer exist are dropped.
    fn migrate_v1(value: &Value) -> Snapshot {
        let now = Utc::now();
        let mut snapshot = Snapshot::default();

        if let Some(indexed) = value.get("indexedCodebases").and_then(Value::as_array) {
            for path in indexed.iter().filter_map(Value::as_str) {
                if !Path::new(path).is_dir() {
                    continue;
                }
                snapshot.codebases.insert(
                    path.to_string(),
                    CodebaseInfo::Indexed {
                        indexed_files: 0,
                        total_chunks: 0,
                        index_status: crate::domain::types::IndexStatus::Completed,
                        last_updated: now,
                    },
                );
            }
        }

        match value.get("indexingCodebases") {
            Some(Value::Array(paths)) => {
                for path in paths.iter().filter_map(Value::as_str) {
                    if !Path::new(path).is_dir() {
                        continue;
                    }
                    snapshot.codebases.insert(
                        path.to_string(),
                        CodebaseInfo::Indexing {
                            indexing_percentage: 0.0,
                            last_updated: now,
                        },
                    );
                }
            }
            Some(Value::Object(map)) => {
                for (path, pct) in map {
                    if !Path::new(path).is_dir() {
                        continue;
                    }
                    snapshot.codebases.insert(
                        path.clone(),
                        CodebaseInfo::Indexing {
                            indexing_percentage: pct.as_f64().unwrap_or(0.0) as f32,
                            last_updated: now,
                        },
                    );
                }
            }
            _ => {}
        }

        snapshot.last_updated = now;
        snapshot
    }

    fn write_atomic(path: &Path, snapshot: &Snapshot) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let tmp = path.with_extension("json.tmp");
        let body = serde_json::to_string_pretty(snapshot)?;
        std::fs::write(&tmp, body)?;
        std::fs::rename(&tmp, path)?;
        Ok(())
    }

    fn mutate<F: FnOnce(&mut Snapshot)>(&self, f: F) -> Result<()> {
        let mut state = self.state.lock().expect("snapshot mutex poisoned");
        f(&mut state);
        state.last_updated = Utc::now();
        Self::write_atomic(&self.path, &state)
    }

    /// Enter or update the `indexing` state with a progress percentage.
    pub fn set_indexing(&self, path: &str, percentage: f32) -> Result<()> {
        self.mutate(|s| {
            s.codebases.insert(
                path.to_string(),
                CodebaseInfo::Indexing {
                    indexing_percentage: percentage.clamp(0.0, 100.0),
                    last_updated: Utc::now(),
                },
            );
        })
    }

    /// Enter the `indexed` state with run statistics. Idempotent.
    pub fn set_indexed(&self, path: &str, stats: IndexStats) -> Result<()> {
        self.mutate(|s| {
            s.codebases.insert(
                path.to_string(),
                CodebaseInfo::Indexed {
                    indexed_files: stats.indexed_files,
                    total_chunks: stats.total_chunks,
                    index_status: stats.index_status,
                    last_updated: Utc::now(),
                },
            );
        })
    }

    /// Enter the `indexfailed` state, preserving progress for diagnostics.
    pub fn set_failed(
        &self,
        path: &str,
        error_message: &str,
        last_attempted_percentage: Option<f32>,
    ) -> Result<()> {
        self.mutate(|s| {
            s.codebases.insert(
                path.to_string(),
                CodebaseInfo::IndexFailed {
                    error_message: error_message.to_string(),
                    last_attempted_percentage,
                    last_updated: Utc::now(),
                },
            );
        })
    }

    /// Delete a codebase entry.
    pub fn remove(&self, path: &str) -> Result<()> {
        self.mutate(|s| {
            s.codebases.remove(path);
        })
    }

    /// Status tag for a codebase (`indexing`, `indexed`, `indexfailed`).
    pub fn get_status(&self, path: &str) -> Option<&'static str> {
        self.state
            .lock()
            .expect("snapshot mutex poisoned")
            .codebases
            .get(path)
            .map(CodebaseInfo::status)
    }

    /// Full state record for a codebase.
    pub fn get_info(&self, path: &str) -> Option<CodebaseInfo> {
        self.state
            .lock()
            .expect("snapshot mutex poisoned")
            .codebases
            .get(path)
            .cloned()
    }

    /// Paths currently in the `indexed` state, sorted.
    pub fn list_indexed(&self) -> Vec<String> {
        self.list_by_status("indexed")
    }

    /// Paths currently in the `indexing` state, sorted.
    pub fn list_indexing(&self) -> Vec<String> {
        self.list_by_status("indexing")
    }

    fn list_by_status(&self, status: &str) -> Vec<String> {
        self.state
            .lock()
            .expect("snapshot mutex poisoned")
            .codebases
            .iter()
            .filter(|(_, info)| info.status() == status)
            .map(|(path, _)| path.clone())
            .collect()
    }
}

impl Default for SnapshotManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::types::IndexStatus;
    use tempfile::TempDir;

    fn manager_in(dir: &TempDir) -> SnapshotManager {
        SnapshotManager::with_path(dir.path().join(SNAPSHOT_FILE))
    }

    #[test]
    fn missing_file_is_an_empty_snapshot() {
        let dir = TempDir::new().unwrap();
        let manager = manager_in(&dir);
        assert!(manager.list_indexed().is_empty());
        assert!(manager.list_indexing().is_empty());
    }

    #[test]
    fn corrupt_file_is_an_empty_snapshot() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(SNAPSHOT_FILE);
        std::fs::write(&path, "{not json").unwrap();
        let manager = SnapshotManager::with_path(&path);
        assert!(manager.list_indexed().is_empty());
    }

    #[test]
    fn state_machine_transitions_persist() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(SNAPSHOT_FILE);

        let manager = SnapshotManager::with_path(&path);
        manager.set_indexing("/a", 12.5).unwrap();
        assert_eq!(manager.get_status("/a"), Some("indexing"));

        manager
            .set_indexed(
                "/a",
                IndexStats {
                    indexed_files: 4,
                    total_chunks: 77,
                    index_status: IndexStatus::Completed,
                },
            )
            .unwrap();

        // Reload from disk.
        let reloaded = SnapshotManager::with_path(&path);
        match reloaded.get_info("/a") {
            Some(CodebaseInfo::Indexed {
                indexed_files,
                total_chunks,
                index_status,
                ..
            }) => {
                assert_eq!(indexed_files, 4);
                assert_eq!(total_chunks, 77);
                assert_eq!(index_status, IndexStatus::Completed);
            }
            other => panic!("unexpected state: {other:?}"),
        }

        reloaded.remove("/a").unwrap();
        assert_eq!(reloaded.get_status("/a"), None);
    }

    #[test]
    fn failed_state_preserves_progress() {
        let dir = TempDir::new().unwrap();
        let manager = manager_in(&dir);
        manager.set_failed("/a", "provider exploded", Some(41.3)).unwrap();
        match manager.get_info("/a") {
            Some(CodebaseInfo::IndexFailed {
                error_message,
                last_attempted_percentage,
                ..
            }) => {
                assert_eq!(error_message, "provider exploded");
                assert_eq!(last_attempted_percentage, Some(41.3));
            }
            other => panic!("unexpected state: {other:?}"),
        }
    }

    #[test]
    fn v1_snapshot_is_migrated_and_rewritten() {
        let dir = TempDir::new().unwrap();
        let existing = TempDir::new().unwrap();
        let existing_path = existing.path().to_string_lossy().to_string();

        let path = dir.path().join(SNAPSHOT_FILE);
        let v1 = serde_json::json!({
            "formatVersion": "v1",
            "indexedCodebases": [existing_path, "/definitely/not/a/real/dir"],
            "indexingCodebases": ["/also/not/real"],
        });
        std::fs::write(&path, serde_json::to_string(&v1).unwrap()).unwrap();

        let manager = SnapshotManager::with_path(&path);
        assert_eq!(manager.list_indexed(), vec![existing_path]);
        assert!(manager.list_indexing().is_empty());

        // The on-disk file is now V2.
        let raw: Value = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(raw["formatVersion"], "v2");
    }

    #[test]
    fn v1_indexing_map_form_carries_percentages() {
        let dir = TempDir::new().unwrap();
        let existing = TempDir::new().unwrap();
        let existing_path = existing.path().to_string_lossy().to_string();

        let path = dir.path().join(SNAPSHOT_FILE);
        let mut v1 = serde_json::json!({
            "indexedCodebases": [],
            "indexingCodebases": {},
        });
        v1["indexingCodebases"][existing_path.as_str()] = serde_json::json!(37.5);
        std::fs::write(&path, serde_json::to_string(&v1).unwrap()).unwrap();

        let manager = SnapshotManager::with_path(&path);
        match manager.get_info(&existing_path) {
            Some(CodebaseInfo::Indexing {
                indexing_percentage,
                ..
            }) => assert_eq!(indexing_percentage, 37.5),
            other => panic!("unexpected state: {other:?}"),
        }
    }
}
