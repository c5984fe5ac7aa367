//! Core domain types for the hybrid code search engine.
//!
//! The indexing side produces [`Chunk`]s, wraps them into [`HybridDocument`]s
//! (dense vector + keyword posting list + metadata), and records per-codebase
//! progress in a [`Snapshot`]. The query side consumes [`ScoredDocument`]s
//! from the store and shapes them into [`SearchResult`]s.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Full SHA-256 hex digest of `bytes`.
///
/// Single digest helper shared by the path fingerprint, file content hashes,
/// and chunk content hashes so every identity in the system derives from the
/// same function.
pub fn content_hash(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    digest.iter().map(|b| format!("{:02x}", b)).collect()
}

/// Supported source languages.
///
/// Tags are lowercase on the wire (`"typescript"`, `"python"`, `"unknown"`).
/// Languages with a tree-sitter grammar get AST-aware chunking; the rest fall
/// through to the recursive character splitter.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    Rust,
    Python,
    JavaScript,
    TypeScript,
    Java,
    Go,
    C,
    Cpp,
    CSharp,
    Php,
    Ruby,
    Swift,
    Kotlin,
    Scala,
    Shell,
    Sql,
    Html,
    Css,
    Json,
    Yaml,
    Toml,
    Markdown,
    Unknown,
}

impl Language {
    /// Detect the language from a file extension (without the leading dot).
    pub fn from_extension(ext: &str) -> Self {
        match ext.to_lowercase().as_str() {
            "rs" => Language::Rust,
            "py" | "pyi" => Language::Python,
            "js" | "jsx" | "mjs" | "cjs" => Language::JavaScript,
            "ts" | "tsx" | "mts" | "cts" => Language::TypeScript,
            "java" => Language::Java,
            "go" => Language::Go,
            "c" | "h" => Language::C,
            "cpp" | "cc" | "cxx" | "hpp" | "hh" => Language::Cpp,
            "cs" => Language::CSharp,
            "php" => Language::Php,
            "rb" => Language::Ruby,
            "swift" => Language::Swift,
            "kt" | "kts" => Language::Kotlin,
            "scala" => Language::Scala,
            "sh" | "bash" | "zsh" | "fish" => Language::Shell,
            "sql" => Language::Sql,
            "html" | "htm" => Language::Html,
            "css" | "scss" | "less" => Language::Css,
            "json" => Language::Json,
            "yaml" | "yml" => Language::Yaml,
            "toml" => Language::Toml,
            "md" | "markdown" => Language::Markdown,
            _ => Language::Unknown,
        }
    }

    /// Lowercase language tag used in document metadata.
    pub fn as_str(&self) -> &'static str {
        match self {
            Language::Rust => "rust",
            Language::Python => "python",
            Language::JavaScript => "javascript",
            Language::TypeScript => "typescript",
            Language::Java => "java",
            Language::Go => "go",
            Language::C => "c",
            Language::Cpp => "cpp",
            Language::CSharp => "csharp",
            Language::Php => "php",
            Language::Ruby => "ruby",
            Language::Swift => "swift",
            Language::Kotlin => "kotlin",
            Language::Scala => "scala",
            Language::Shell => "shell",
            Language::Sql => "sql",
            Language::Html => "html",
            Language::Css => "css",
            Language::Json => "json",
            Language::Yaml => "yaml",
            Language::Toml => "toml",
            Language::Markdown => "markdown",
            Language::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for Language {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Immutable code segment produced by a splitter.
///
/// Line numbers are 1-based and inclusive; `content` is never empty.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Chunk {
    /// The source slice
    pub content: String,
    /// Path relative to the codebase root, forward-slash normalized
    pub relative_path: String,
    /// First line of the slice (1-based)
    pub start_line: u32,
    /// Last line of the slice (inclusive)
    pub end_line: u32,
    /// Language the slice was parsed as
    pub language: Language,
    /// AST node type when produced by the AST splitter
    pub node_kind: Option<String>,
    /// SHA-256 of `content`, used for dedup and id derivation
    pub content_hash: String,
}

impl Chunk {
    /// Build a chunk, computing the content hash.
    pub fn new(
        content: String,
        relative_path: impl Into<String>,
        start_line: u32,
        end_line: u32,
        language: Language,
        node_kind: Option<String>,
    ) -> Self {
        let content_hash = content_hash(content.as_bytes());
        Self {
            content,
            relative_path: relative_path.into(),
            start_line,
            end_line,
            language,
            node_kind,
            content_hash,
        }
    }
}

/// Document metadata stored alongside each vector.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ChunkMetadata {
    /// Path relative to the codebase root
    pub relative_path: String,
    /// First line (1-based)
    pub start_line: u32,
    /// Last line (inclusive)
    pub end_line: u32,
    /// Lowercase language tag
    pub language: String,
    /// File extension with leading dot (e.g. `.ts`), empty when absent
    pub file_extension: String,
    /// AST node type when known
    #[serde(skip_serializing_if = "Option::is_none")]
    pub node_kind: Option<String>,
}

/// The unit stored in the vector store: dense vector + keyword posting list.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HybridDocument {
    /// Globally unique id:
    /// `{fingerprint}-{relative_path}-{start}-{end}-{content_hash[0:8]}`
    pub id: String,
    /// Dense embedding; length equals the provider dimension
    pub dense_vector: Vec<f32>,
    /// Tokenized content for BM25 scoring (duplicates preserved)
    pub keywords: Vec<String>,
    /// Original chunk content, returned verbatim in search results
    pub content: String,
    /// Structured metadata
    pub metadata: ChunkMetadata,
}

/// A document with a retrieval score attached by the store.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredDocument {
    /// The stored document
    pub document: HybridDocument,
    /// Cosine similarity (dense queries) or BM25 score (sparse queries)
    pub score: f32,
}

/// One hit in a search response.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SearchResult {
    /// Path relative to the codebase root
    pub relative_path: String,
    /// First line (1-based)
    pub start_line: u32,
    /// Last line (inclusive)
    pub end_line: u32,
    /// Lowercase language tag
    pub language: String,
    /// AST node type when known
    #[serde(skip_serializing_if = "Option::is_none")]
    pub node_kind: Option<String>,
    /// Matched content
    pub content: String,
    /// Dense cosine similarity when the hit appeared in the dense candidate
    /// list, otherwise the fused score of a sparse-only hit
    pub score: f32,
    /// Dense cosine similarity, absent for sparse-only hits
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dense_score: Option<f32>,
}

/// Search results plus a partiality indicator.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SearchResponse {
    /// Ranked hits, best first
    pub results: Vec<SearchResult>,
    /// True when the codebase was still `indexing` at query time; results
    /// reflect whatever the store currently contains
    pub partial: bool,
}

/// Terminal quality of a finished indexing run.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum IndexStatus {
    /// All discovered chunks were ingested
    Completed,
    /// The global chunk limit stopped ingestion early
    LimitReached,
}

/// Per-codebase state, tagged by `status` on the wire.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "status", rename_all = "lowercase", rename_all_fields = "camelCase")]
pub enum CodebaseInfo {
    /// A background indexing run is active
    Indexing {
        /// Progress in percent, 0..100 with one decimal
        indexing_percentage: f32,
        /// Last state transition
        last_updated: DateTime<Utc>,
    },
    /// The last run finished
    Indexed {
        /// Files ingested by the last run
        indexed_files: u32,
        /// Chunks stored for the codebase
        total_chunks: u32,
        /// Whether the run completed or hit the chunk limit
        index_status: IndexStatus,
        /// Last state transition
        last_updated: DateTime<Utc>,
    },
    /// The last run failed
    #[serde(rename = "indexfailed")]
    IndexFailed {
        /// Failure description
        error_message: String,
        /// Progress reported before the failure, when known
        #[serde(skip_serializing_if = "Option::is_none")]
        last_attempted_percentage: Option<f32>,
        /// Last state transition
        last_updated: DateTime<Utc>,
    },
}

impl CodebaseInfo {
    /// Lowercase status tag (`indexing`, `indexed`, `indexfailed`).
    pub fn status(&self) -> &'static str {
        match self {
            CodebaseInfo::Indexing { .. } => "indexing",
            CodebaseInfo::Indexed { .. } => "indexed",
            CodebaseInfo::IndexFailed { .. } => "indexfailed",
        }
    }
}

/// Current snapshot wire format version.
pub const SNAPSHOT_FORMAT_VERSION: &str = "v2";

/// On-disk record of every known codebase, V2 format.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    /// Always `"v2"` after load; V1 inputs are migrated
    pub format_version: String,
    /// One entry per absolute codebase path
    pub codebases: std::collections::BTreeMap<String, CodebaseInfo>,
    /// Last save time
    pub last_updated: DateTime<Utc>,
}

impl Default for Snapshot {
    fn default() -> Self {
        Self {
            format_version: SNAPSHOT_FORMAT_VERSION.to_string(),
            codebases: Default::default(),
            last_updated: Utc::now(),
        }
    }
}

/// Diff between the persisted file-hash map and the current tree.
///
/// All three sets are sorted by relative path for deterministic processing.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SyncChanges {
    /// Present on disk, absent from the old map
    pub added: Vec<String>,
    /// Present in both with different content hashes
    pub modified: Vec<String>,
    /// Present in the old map, gone from disk
    pub removed: Vec<String>,
}

impl SyncChanges {
    /// Whether any file changed.
    pub fn has_changes(&self) -> bool {
        !self.added.is_empty() || !self.modified.is_empty() || !self.removed.is_empty()
    }

    /// Total number of changed files.
    pub fn total(&self) -> usize {
        self.added.len() + self.modified.len() + self.removed.len()
    }
}

/// Summary of a finished indexing run.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct IndexStats {
    /// Files ingested
    pub indexed_files: u32,
    /// Chunks stored
    pub total_chunks: u32,
    /// Completion quality
    pub index_status: IndexStatus,
}

/// How dense and sparse candidate lists are combined.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RerankStrategy {
    /// Reciprocal Rank Fusion with k = 60 (default)
    #[default]
    Rrf,
    /// Min-max normalized weighted sum of both score lists
    WeightedSum,
    /// Dense candidates only
    DenseOnly,
    /// Sparse candidates only
    SparseOnly,
}

/// Which splitter implementation an index request uses.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SplitterKind {
    /// AST-aware splitter with character fallback (default)
    #[default]
    Ast,
    /// Recursive character splitter only
    Character,
}

impl SplitterKind {
    /// Parse a splitter name; `None` for unknown names.
    pub fn from_string(s: &str) -> Option<Self> {
        match s {
            "ast" => Some(Self::Ast),
            "langchain" | "character" => Some(Self::Character),
            _ => None,
        }
    }
}

/// Embedding provider selection.
///
/// Parsing is case-sensitive: configuration accepts lowercase names only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingProviderKind {
    /// OpenAI embeddings API
    OpenAI,
    /// Voyage AI embeddings API
    Voyage,
    /// Google Gemini embeddings API
    Gemini,
    /// Ollama local embeddings
    Ollama,
    /// Deterministic local bag-of-words embedding (offline default, tests)
    Hashing,
}

impl EmbeddingProviderKind {
    /// Parse a provider name. Lowercase only; no trimming, no case folding.
    pub fn from_string(s: &str) -> Option<Self> {
        match s {
            "openai" => Some(Self::OpenAI),
            "voyage" => Some(Self::Voyage),
            "gemini" => Some(Self::Gemini),
            "ollama" => Some(Self::Ollama),
            "hashing" => Some(Self::Hashing),
            _ => None,
        }
    }

    /// All accepted provider names.
    pub fn supported_providers() -> &'static [&'static str] {
        &["openai", "voyage", "gemini", "ollama", "hashing"]
    }
}

impl std::fmt::Display for EmbeddingProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::OpenAI => write!(f, "openai"),
            Self::Voyage => write!(f, "voyage"),
            Self::Gemini => write!(f, "gemini"),
            Self::Ollama => write!(f, "ollama"),
            Self::Hashing => write!(f, "hashing"),
        }
    }
}

/// Vector store backend selection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VectorStoreProviderKind {
    /// Local SQLite-backed store (default)
    #[default]
    #[serde(rename = "sqlite-vec")]
    SqliteVec,
    /// Milvus vector database (recognized, not bundled in this build)
    #[serde(rename = "milvus")]
    Milvus,
    /// In-memory store for tests and ephemeral sessions
    #[serde(rename = "memory")]
    Memory,
}

impl VectorStoreProviderKind {
    /// Parse a backend name. Lowercase only.
    pub fn from_string(s: &str) -> Option<Self> {
        match s {
            "sqlite-vec" => Some(Self::SqliteVec),
            "milvus" => Some(Self::Milvus),
            "memory" => Some(Self::Memory),
            _ => None,
        }
    }
}

impl std::fmt::Display for VectorStoreProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::SqliteVec => write!(f, "sqlite-vec"),
            Self::Milvus => write!(f, "milvus"),
            Self::Memory => write!(f, "memory"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn language_tags_are_lowercase() {
        assert_eq!(Language::TypeScript.as_str(), "typescript");
        assert_eq!(Language::from_extension("TSX"), Language::TypeScript);
        assert_eq!(Language::from_extension("weird"), Language::Unknown);
    }

    #[test]
    fn chunk_hash_is_deterministic() {
        let a = Chunk::new("fn a() {}".into(), "src/a.rs", 1, 1, Language::Rust, None);
        let b = Chunk::new("fn a() {}".into(), "src/b.rs", 9, 9, Language::Rust, None);
        assert_eq!(a.content_hash, b.content_hash);
        assert_eq!(a.content_hash.len(), 64);
    }

    #[test]
    fn codebase_info_wire_tags() {
        let info = CodebaseInfo::IndexFailed {
            error_message: "boom".into(),
            last_attempted_percentage: Some(41.5),
            last_updated: Utc::now(),
        };
        let json = serde_json::to_value(&info).unwrap();
        assert_eq!(json["status"], "indexfailed");
        assert_eq!(json["errorMessage"], "boom");
        assert_eq!(json["lastAttemptedPercentage"], 41.5);
    }

    #[test]
    fn snapshot_round_trip() {
        let mut snapshot = Snapshot::default();
        snapshot.codebases.insert(
            "/a".into(),
            CodebaseInfo::Indexed {
                indexed_files: 3,
                total_chunks: 40,
                index_status: IndexStatus::Completed,
                last_updated: Utc::now(),
            },
        );
        let json = serde_json::to_string(&snapshot).unwrap();
        let back: Snapshot = serde_json::from_str(&json).unwrap();
        assert_eq!(back, snapshot);
        assert!(json.contains("\"formatVersion\":\"v2\""));
    }

    #[test]
    fn provider_kinds_parse_lowercase_only() {
        assert_eq!(
            EmbeddingProviderKind::from_string("openai"),
            Some(EmbeddingProviderKind::OpenAI)
        );
        assert_eq!(EmbeddingProviderKind::from_string("OpenAI"), None);
        assert_eq!(
            VectorStoreProviderKind::from_string("sqlite-vec"),
            Some(VectorStoreProviderKind::SqliteVec)
        );
        assert_eq!(VectorStoreProviderKind::from_string("Milvus"), None);
    }
}
