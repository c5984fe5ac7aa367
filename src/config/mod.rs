//! Environment-driven configuration.
//!
//! The engine is configured entirely through environment variables; every
//! option has a code-level default so an empty environment yields a working
//! local setup (hashing embeddings + SQLite store under `~/.context`).
//!
//! | Variable | Effect |
//! |----------|--------|
//! | `EMBEDDING_PROVIDER` | `openai`, `voyage`, `gemini`, `ollama`, `hashing` (lowercase only) |
//! | `EMBEDDING_MODEL` | Model id; provider default applied if unset |
//! | `EMBEDDING_DIMENSION` | Manual dimension override (required for unknown models) |
//! | `EMBEDDING_BATCH_SIZE` | Embedding batch cap (default 100) |
//! | `CHUNK_LIMIT` | Global per-codebase chunk cap (default 450 000) |
//! | `CUSTOM_IGNORE_PATTERNS` | Comma-separated globs merged into ignore rules |
//! | `VECTOR_DB_PROVIDER` | `sqlite-vec` (default), `milvus`, `memory` |
//! | `VECTOR_DB_PATH` | Override for the local store location |

use crate::domain::error::{Error, Result};
use crate::domain::ports::splitter::{DEFAULT_CHUNK_OVERLAP, DEFAULT_CHUNK_SIZE};
use crate::domain::types::{EmbeddingProviderKind, VectorStoreProviderKind};
use crate::infrastructure::sync::DEFAULT_MAX_FILE_SIZE;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Default embedding batch cap.
pub const DEFAULT_EMBEDDING_BATCH_SIZE: usize = 100;
/// Default global per-codebase chunk cap.
pub const DEFAULT_CHUNK_LIMIT: usize = 450_000;

/// Embedding provider settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EmbeddingConfig {
    /// Which provider to construct
    pub provider: EmbeddingProviderKind,
    /// Model identifier; `None` selects the provider default
    pub model: Option<String>,
    /// Manual dimension override for models the crate does not know
    pub dimension: Option<usize>,
    /// API key for cloud providers
    pub api_key: Option<String>,
    /// Custom endpoint base URL
    pub base_url: Option<String>,
    /// Engine-enforced batch cap
    pub batch_size: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: EmbeddingProviderKind::Hashing,
            model: None,
            dimension: None,
            api_key: None,
            base_url: None,
            batch_size: DEFAULT_EMBEDDING_BATCH_SIZE,
        }
    }
}

/// Vector store settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct VectorStoreConfig {
    /// Which backend to construct
    pub provider: VectorStoreProviderKind,
    /// Local store location override
    pub path: Option<PathBuf>,
}

/// Indexing pipeline settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IndexingConfig {
    /// Global per-codebase chunk cap
    pub chunk_limit: usize,
    /// Upper bound on chunk length in characters
    pub chunk_size: usize,
    /// Overlap between adjacent character-split chunks
    pub chunk_overlap: usize,
    /// Extra ignore globs merged into the walker rules
    pub custom_ignore_patterns: Vec<String>,
    /// Skip files larger than this many bytes
    pub max_file_size: u64,
}

impl Default for IndexingConfig {
    fn default() -> Self {
        Self {
            chunk_limit: DEFAULT_CHUNK_LIMIT,
            chunk_size: DEFAULT_CHUNK_SIZE,
            chunk_overlap: DEFAULT_CHUNK_OVERLAP,
            custom_ignore_patterns: Vec::new(),
            max_file_size: DEFAULT_MAX_FILE_SIZE,
        }
    }
}

/// Complete engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ContextConfig {
    /// Embedding provider settings
    pub embedding: EmbeddingConfig,
    /// Vector store settings
    pub store: VectorStoreConfig,
    /// Indexing pipeline settings
    pub indexing: IndexingConfig,
    /// Directory for snapshot and hash-map state
    pub state_dir: PathBuf,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            embedding: EmbeddingConfig::default(),
            store: VectorStoreConfig::default(),
            indexing: IndexingConfig::default(),
            state_dir: default_state_dir(),
        }
    }
}

/// `~/.context`, the engine's state directory.
pub fn default_state_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".context")
}

impl ContextConfig {
    /// Build a configuration from the environment, applying defaults for
    /// anything unset. Recognized-but-invalid values are configuration
    /// errors, not silent fallbacks.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Some(raw) = env_var("EMBEDDING_PROVIDER") {
            config.embedding.provider = EmbeddingProviderKind::from_string(&raw).ok_or_else(|| {
                Error::config(format!(
                    "unknown EMBEDDING_PROVIDER {raw:?}; expected one of {:?} (lowercase only)",
                    EmbeddingProviderKind::supported_providers()
                ))
            })?;
        }
        config.embedding.model = env_var("EMBEDDING_MODEL");
        if let Some(raw) = env_var("EMBEDDING_DIMENSION") {
            config.embedding.dimension = Some(parse_env("EMBEDDING_DIMENSION", &raw)?);
        }
        if let Some(raw) = env_var("EMBEDDING_BATCH_SIZE") {
            config.embedding.batch_size = parse_env("EMBEDDING_BATCH_SIZE", &raw)?;
        }
        config.embedding.api_key = env_var("EMBEDDING_API_KEY");
        config.embedding.base_url = env_var("EMBEDDING_BASE_URL");

        if let Some(raw) = env_var("CHUNK_LIMIT") {
            config.indexing.chunk_limit = parse_env("CHUNK_LIMIT", &raw)?;
        }
        if let Some(raw) = env_var("CUSTOM_IGNORE_PATTERNS") {
            config.indexing.custom_ignore_patterns = raw
                .split(',')
                .map(str::trim)
                .filter(|p| !p.is_empty())
                .map(str::to_string)
                .collect();
        }

        if let Some(raw) = env_var("VECTOR_DB_PROVIDER") {
            config.store.provider = VectorStoreProviderKind::from_string(&raw).ok_or_else(|| {
                Error::config(format!(
                    "unknown VECTOR_DB_PROVIDER {raw:?}; expected sqlite-vec, milvus, or memory"
                ))
            })?;
        }
        config.store.path = env_var("VECTOR_DB_PATH").map(PathBuf::from);

        Ok(config)
    }
}

fn env_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

fn parse_env<T: std::str::FromStr>(name: &str, raw: &str) -> Result<T> {
    raw.parse()
        .map_err(|_| Error::config(format!("invalid {name}: {raw:?}")))
}
