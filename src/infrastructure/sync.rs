//! File-level change detection for incremental indexing.
//!
//! [`FileSynchronizer`] walks a codebase honoring merged ignore rules,
//! hashes file contents (BOM-normalized SHA-256), and diffs the result
//! against the hash map persisted from the previous run. `commit` writes the
//! new map atomically so a subsequent sync of an unchanged tree reports an
//! empty diff.

use crate::domain::error::{Error, Result};
use crate::domain::types::{content_hash, SyncChanges};
use crate::infrastructure::fingerprint;
use ignore::overrides::OverrideBuilder;
use ignore::WalkBuilder;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Directories never worth indexing, matched at any depth.
const DEFAULT_IGNORE_DIRS: &[&str] = &[
    "node_modules",
    ".git",
    ".svn",
    ".hg",
    "dist",
    "build",
    "out",
    "target",
    "coverage",
    "__pycache__",
    ".venv",
    "venv",
    ".idea",
    ".vscode",
    "vendor",
];

/// Extensions indexed by default (no leading dot).
const DEFAULT_EXTENSIONS: &[&str] = &[
    "rs", "py", "pyi", "js", "jsx", "mjs", "cjs", "ts", "tsx", "java", "go", "c", "h", "cpp",
    "cc", "cxx", "hpp", "hh", "cs", "php", "rb", "swift", "kt", "kts", "scala", "sh", "bash",
    "sql", "html", "css", "scss", "less", "json", "yaml", "yml", "toml", "md", "markdown",
];

/// Default ceiling on file size; larger files are skipped.
pub const DEFAULT_MAX_FILE_SIZE: u64 = 1024 * 1024;

/// Walk configuration for one codebase.
#[derive(Debug, Clone)]
pub struct SyncOptions {
    /// Extra extensions to index (with or without leading dot)
    pub custom_extensions: Vec<String>,
    /// Extra ignore globs merged after the built-in excludes
    pub ignore_patterns: Vec<String>,
    /// Skip files larger than this many bytes
    pub max_file_size: u64,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            custom_extensions: Vec::new(),
            ignore_patterns: Vec::new(),
            max_file_size: DEFAULT_MAX_FILE_SIZE,
        }
    }
}

/// Map of relative path → content hash.
pub type FileHashMap = BTreeMap<String, String>;

/// Change detector for one codebase.
#[derive(Debug)]
pub struct FileSynchronizer {
    root: PathBuf,
    state_dir: PathBuf,
    options: SyncOptions,
    extensions: Vec<String>,
    file_hashes: FileHashMap,
}

impl FileSynchronizer {
    /// Create a synchronizer, loading any previously committed hash map from
    /// `state_dir`.
    pub fn new(root: impl Into<PathBuf>, state_dir: impl Into<PathBuf>, options: SyncOptions) -> Self {
        let root = fingerprint::canonical_path(&root.into());
        let state_dir = state_dir.into();

        let mut extensions: Vec<String> =
            DEFAULT_EXTENSIONS.iter().map(|e| e.to_string()).collect();
        for ext in &options.custom_extensions {
            extensions.push(ext.trim_start_matches('.').to_lowercase());
        }

        let mut synchronizer = Self {
            root,
            state_dir,
            options,
            extensions,
            file_hashes: FileHashMap::new(),
        };
        synchronizer.load_state();
        synchronizer
    }

    fn state_path(&self) -> PathBuf {
        self.state_dir
            .join("file-hashes")
            .join(fingerprint::hash_map_filename(&self.root))
    }

    fn load_state(&mut self) {
        let path = self.state_path();
        match std::fs::read_to_string(&path) {
            Ok(raw) => match serde_json::from_str(&raw) {
                Ok(map) => self.file_hashes = map,
                Err(err) => {
                    warn!(path = %path.display(), error = %err, "hash map unreadable, treating as empty");
                    self.file_hashes = FileHashMap::new();
                }
            },
            Err(_) => self.file_hashes = FileHashMap::new(),
        }
    }

    /// Whether a committed hash map exists for this codebase.
    pub fn has_state(&self) -> bool {
        !self.file_hashes.is_empty()
    }

    /// The currently loaded hash map.
    pub fn file_hashes(&self) -> &FileHashMap {
        &self.file_hashes
    }

    /// Enumerate candidate files and hash their contents.
    pub fn walk(&self) -> Result<FileHashMap> {
        let mut override_builder = OverrideBuilder::new(&self.root);
        for dir in DEFAULT_IGNORE_DIRS {
            override_builder
                .add(&format!("!**/{dir}/**"))
                .map_err(|e| Error::config(format!("bad built-in ignore glob: {e}")))?;
        }
        for pattern in &self.options.ignore_patterns {
            override_builder
                .add(&format!("!{pattern}"))
                .map_err(|e| Error::config(format!("bad ignore pattern {pattern:?}: {e}")))?;
        }
        let overrides = override_builder
            .build()
            .map_err(|e| Error::config(format!("ignore rules: {e}")))?;

        let walker = WalkBuilder::new(&self.root)
            .follow_links(false)
            .hidden(true)
            .git_ignore(true)
            .require_git(false)
            .git_global(false)
            .git_exclude(false)
            .overrides(overrides)
            .build();

        let mut map = FileHashMap::new();
        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    debug!(error = %err, "walk entry skipped");
                    continue;
                }
            };
            if entry.path_is_symlink() {
                continue;
            }
            if !entry.file_type().map(|t| t.is_file()).unwrap_or(false) {
                continue;
            }
            let path = entry.path();

            let extension = path
                .extension()
                .and_then(|e| e.to_str())
                .map(|e| e.to_lowercase())
                .unwrap_or_default();
            if !self.extensions.iter().any(|e| *e == extension) {
                continue;
            }

            if let Ok(metadata) = entry.metadata() {
                if metadata.len() > self.options.max_file_size {
                    debug!(
                        reason = "size_exceeded",
                        path = %path.display(),
                        size = metadata.len(),
                        "file skipped"
                    );
                    continue;
                }
            }

            let bytes = match std::fs::read(path) {
                Ok(bytes) => bytes,
                Err(err) => {
                    debug!(path = %path.display(), error = %err, "file unreadable, skipped");
                    continue;
                }
            };
            let normalized = strip_bom(&bytes);

            let relative = match path.strip_prefix(&self.root) {
                Ok(rel) => rel.to_string_lossy().replace('\\', "/"),
                Err(_) => continue,
            };
            map.insert(relative, content_hash(normalized));
        }
        Ok(map)
    }

    /// Diff a freshly walked map against the committed state.
    pub fn diff(&self, new_map: &FileHashMap) -> SyncChanges {
        let mut changes = SyncChanges::default();
        for (path, hash) in new_map {
            match self.file_hashes.get(path) {
                None => changes.added.push(path.clone()),
                Some(old) if old != hash => changes.modified.push(path.clone()),
                Some(_) => {}
            }
        }
        for path in self.file_hashes.keys() {
            if !new_map.contains_key(path) {
                changes.removed.push(path.clone());
            }
        }
        // BTreeMap iteration is already ordered; removed needs no extra sort
        // either, but keep the contract explicit.
        changes.added.sort();
        changes.modified.sort();
        changes.removed.sort();
        changes
    }

    /// Persist the new map atomically and adopt it as the committed state.
    pub fn commit(&mut self, new_map: FileHashMap) -> Result<()> {
        let path = self.state_path();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, serde_json::to_string(&new_map)?)?;
        std::fs::rename(&tmp, &path)?;
        self.file_hashes = new_map;
        Ok(())
    }

    /// Remove the persisted hash map (used by `clear_index`).
    pub fn delete_state(&mut self) -> Result<()> {
        let path = self.state_path();
        if path.exists() {
            std::fs::remove_file(&path)?;
        }
        self.file_hashes.clear();
        Ok(())
    }
}

/// Drop a UTF-8 byte-order mark before hashing so editors that toggle the
/// BOM do not invalidate every file.
fn strip_bom(bytes: &[u8]) -> &[u8] {
    bytes.strip_prefix(&[0xEF, 0xBB, 0xBF]).unwrap_or(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write(root: &Path, rel: &str, body: &str) {
        let path = root.join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, body).unwrap();
    }

    fn synchronizer(root: &TempDir, state: &TempDir) -> FileSynchronizer {
        FileSynchronizer::new(root.path(), state.path(), SyncOptions::default())
    }

    #[test]
    fn first_walk_reports_everything_as_added() {
        let root = TempDir::new().unwrap();
        let state = TempDir::new().unwrap();
        write(root.path(), "x.ts", "export const x = 1;\n");
        write(root.path(), "src/y.ts", "export const y = 2;\n");

        let sync = synchronizer(&root, &state);
        let map = sync.walk().unwrap();
        let changes = sync.diff(&map);
        assert_eq!(changes.added, vec!["src/y.ts", "x.ts"]);
        assert!(changes.modified.is_empty());
        assert!(changes.removed.is_empty());
    }

    #[test]
    fn committed_state_makes_unchanged_trees_diff_empty() {
        let root = TempDir::new().unwrap();
        let state = TempDir::new().unwrap();
        write(root.path(), "x.ts", "one\n");

        let mut sync = synchronizer(&root, &state);
        let map = sync.walk().unwrap();
        sync.commit(map).unwrap();

        let again = sync.walk().unwrap();
        assert!(!sync.diff(&again).has_changes());
    }

    #[test]
    fn incremental_changes_are_classified() {
        let root = TempDir::new().unwrap();
        let state = TempDir::new().unwrap();
        write(root.path(), "x.ts", "one\n");
        write(root.path(), "y.ts", "two\n");

        let mut sync = synchronizer(&root, &state);
        let map = sync.walk().unwrap();
        sync.commit(map).unwrap();

        std::fs::remove_file(root.path().join("y.ts")).unwrap();
        write(root.path(), "x.ts", "one edited\n");
        write(root.path(), "z.ts", "three\n");

        let changes = sync.diff(&sync.walk().unwrap());
        assert_eq!(changes.added, vec!["z.ts"]);
        assert_eq!(changes.modified, vec!["x.ts"]);
        assert_eq!(changes.removed, vec!["y.ts"]);
    }

    #[test]
    fn state_survives_reconstruction() {
        let root = TempDir::new().unwrap();
        let state = TempDir::new().unwrap();
        write(root.path(), "x.ts", "one\n");

        let mut sync = synchronizer(&root, &state);
        let map = sync.walk().unwrap();
        sync.commit(map).unwrap();

        let rebuilt = synchronizer(&root, &state);
        assert!(rebuilt.has_state());
        assert!(!rebuilt.diff(&rebuilt.walk().unwrap()).has_changes());
    }

    #[test]
    fn default_excludes_and_custom_patterns_are_honored() {
        let root = TempDir::new().unwrap();
        let state = TempDir::new().unwrap();
        write(root.path(), "keep.ts", "kept\n");
        write(root.path(), "node_modules/pkg/index.js", "ignored\n");
        write(root.path(), "generated/out.ts", "ignored\n");

        let sync = FileSynchronizer::new(
            root.path(),
            state.path(),
            SyncOptions {
                ignore_patterns: vec!["generated/**".to_string()],
                ..Default::default()
            },
        );
        let map = sync.walk().unwrap();
        assert!(map.contains_key("keep.ts"));
        assert!(!map.keys().any(|k| k.contains("node_modules")));
        assert!(!map.keys().any(|k| k.starts_with("generated/")));
    }

    #[test]
    fn bom_does_not_change_the_hash() {
        let root = TempDir::new().unwrap();
        let state = TempDir::new().unwrap();
        write(root.path(), "a.ts", "const x = 1;\n");
        std::fs::write(root.path().join("b.ts"), b"\xEF\xBB\xBFconst x = 1;\n").unwrap();

        let sync = synchronizer(&root, &state);
        let map = sync.walk().unwrap();
        assert_eq!(map["a.ts"], map["b.ts"]);
    }

    #[test]
    fn oversize_files_are_skipped() {
        let root = TempDir::new().unwrap();
        let state = TempDir::new().unwrap();
        write(root.path(), "small.ts", "ok\n");
        write(root.path(), "big.ts", &"x".repeat(64));

        let sync = FileSynchronizer::new(
            root.path(),
            state.path(),
            SyncOptions {
                max_file_size: 16,
                ..Default::default()
            },
        );
        let map = sync.walk().unwrap();
        assert!(map.contains_key("small.ts"));
        assert!(!map.contains_key("big.ts"));
    }
}
