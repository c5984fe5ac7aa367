//! Path fingerprinting and the path↔fingerprint registry.
//!
//! `fingerprint` is the single source of truth for codebase identity: the
//! collection-name builder, the hash-map filename builder, and the registry
//! all call it. Keeping one implementation matters: two drifting copies of
//! this computation once meant search and indexing disagreed about which
//! collection a path owns.

use crate::domain::types::content_hash;
use dashmap::DashMap;
use std::path::{Component, Path, PathBuf};

/// Prefix shared by every collection name (wire contract).
pub const COLLECTION_PREFIX: &str = "hybrid_code_chunks_";

/// Lexically canonicalize a path: absolute, forward slashes, `.`/`..`
/// resolved. Symbolic links are deliberately not followed.
pub fn canonical_path(path: &Path) -> PathBuf {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .map(|cwd| cwd.join(path))
            .unwrap_or_else(|_| path.to_path_buf())
    };

    let mut normalized = PathBuf::new();
    for component in absolute.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                normalized.pop();
            }
            other => normalized.push(other.as_os_str()),
        }
    }
    normalized
}

/// String form of the canonical path with forward-slash separators.
fn canonical_string(path: &Path) -> String {
    canonical_path(path).to_string_lossy().replace('\\', "/")
}

/// Deterministic 8-character lowercase hex fingerprint of a path.
pub fn fingerprint(path: &Path) -> String {
    let canonical = canonical_string(path);
    content_hash(canonical.as_bytes())[..8].to_string()
}

/// Collection name for a codebase path (wire contract).
pub fn collection_name(path: &Path) -> String {
    format!("{COLLECTION_PREFIX}{}", fingerprint(path))
}

/// Filename of the persisted file-hash map for a codebase.
pub fn hash_map_filename(path: &Path) -> String {
    format!("{}.json", fingerprint(path))
}

/// Bidirectional lookup between codebase paths and fingerprints.
///
/// Search resolves a user-supplied path to its collection through
/// [`fingerprint`] directly; the registry exists for the reverse direction
/// (collection or fingerprint back to the path that produced it).
#[derive(Debug, Default)]
pub struct PathRegistry {
    by_fingerprint: DashMap<String, PathBuf>,
}

impl PathRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a path, returning its fingerprint.
    pub fn register(&self, path: &Path) -> String {
        let fp = fingerprint(path);
        self.by_fingerprint.insert(fp.clone(), canonical_path(path));
        fp
    }

    /// Path registered under a fingerprint.
    pub fn path_for(&self, fingerprint: &str) -> Option<PathBuf> {
        self.by_fingerprint.get(fingerprint).map(|e| e.clone())
    }

    /// Path registered under a collection name.
    pub fn path_for_collection(&self, collection: &str) -> Option<PathBuf> {
        collection
            .strip_prefix(COLLECTION_PREFIX)
            .and_then(|fp| self.path_for(fp))
    }

    /// Remove a path's entry.
    pub fn remove(&self, path: &Path) {
        self.by_fingerprint.remove(&fingerprint(path));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fingerprint_is_eight_lowercase_hex_chars() {
        let fp = fingerprint(Path::new("/tmp/foo"));
        assert_eq!(fp.len(), 8);
        assert!(fp.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn fingerprint_is_stable_and_canonicalizing() {
        let a = fingerprint(Path::new("/tmp/foo"));
        let b = fingerprint(Path::new("/tmp/foo"));
        let c = fingerprint(Path::new("/tmp/./bar/../foo"));
        assert_eq!(a, b);
        assert_eq!(a, c);
        assert_ne!(a, fingerprint(Path::new("/tmp/other")));
    }

    #[test]
    fn collection_name_carries_the_fingerprint() {
        let path = Path::new("/tmp/foo");
        let name = collection_name(path);
        assert_eq!(name, format!("hybrid_code_chunks_{}", fingerprint(path)));
        assert_eq!(name.len(), COLLECTION_PREFIX.len() + 8);
    }

    #[test]
    fn registry_round_trips_both_directions() {
        let registry = PathRegistry::new();
        let path = Path::new("/srv/projects/demo");
        let fp = registry.register(path);

        assert_eq!(registry.path_for(&fp), Some(PathBuf::from("/srv/projects/demo")));
        assert_eq!(
            registry.path_for_collection(&collection_name(path)),
            Some(PathBuf::from("/srv/projects/demo"))
        );

        registry.remove(path);
        assert_eq!(registry.path_for(&fp), None);
    }

    #[test]
    fn hash_map_filename_derives_from_the_same_fingerprint() {
        let path = Path::new("/tmp/foo");
        assert_eq!(hash_map_filename(path), format!("{}.json", fingerprint(path)));
    }
}
