//! The engine: orchestrates indexing, search, and clearing per codebase.
//!
//! `index_codebase` acknowledges immediately and runs the pipeline as a
//! background task; progress and terminal states land in the snapshot, so
//! `get_indexing_status` is the observation surface. A per-fingerprint run
//! registry enforces single-writer-per-codebase, and `clear_index` cancels an
//! active run cooperatively at its next batch boundary.

use crate::application::planner::{self, tokenize, PlannerOptions};
use crate::config::ContextConfig;
use crate::domain::chunking::create_splitter;
use crate::domain::error::{Error, Result};
use crate::domain::ports::splitter::{Splitter, SplitterOptions};
use crate::domain::ports::vector_store::DocumentFilter;
use crate::domain::ports::{EmbeddingProvider, VectorStore};
use crate::domain::types::{
    Chunk, ChunkMetadata, CodebaseInfo, HybridDocument, IndexStats, IndexStatus, Language,
    RerankStrategy, SearchResponse, SearchResult, SplitterKind,
};
use crate::infrastructure::fingerprint::{self, PathRegistry};
use crate::infrastructure::snapshot::{SnapshotManager, SNAPSHOT_FILE};
use crate::infrastructure::sync::{FileSynchronizer, SyncOptions};
use crate::providers::embedding::embed_batch_with_retry;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use regex::Regex;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Invoked at batch boundaries with the current percentage.
pub type ProgressCallback = Arc<dyn Fn(f32) + Send + Sync>;

/// How long `clear_index` waits for a cancelled run to exit.
const CLEAR_WAIT_TIMEOUT: Duration = Duration::from_secs(30);

/// Options for `index_codebase`.
#[derive(Clone, Default)]
pub struct IndexOptions {
    /// Clear any existing index first
    pub force: bool,
    /// Splitter override; `None` selects the AST splitter
    pub splitter: Option<SplitterKind>,
    /// Extra file extensions to index
    pub custom_extensions: Vec<String>,
    /// Extra ignore globs for this codebase
    pub ignore_patterns: Vec<String>,
    /// Progress observer
    pub progress: Option<ProgressCallback>,
}

/// Options for `search_code`.
#[derive(Debug, Clone)]
pub struct SearchOptions {
    /// Maximum hits to return
    pub limit: usize,
    /// Minimum dense similarity; sparse-only hits are exempt
    pub threshold: f32,
    /// Restrict hits to these extensions (entries like `.ts`)
    pub extension_filter: Vec<String>,
    /// Fusion strategy
    pub strategy: RerankStrategy,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            limit: 10,
            threshold: 0.3,
            extension_filter: Vec::new(),
            strategy: RerankStrategy::default(),
        }
    }
}

/// The code-context engine. Cheap to clone; clones share all state.
#[derive(Clone)]
pub struct Context {
    inner: Arc<ContextInner>,
}

struct ContextInner {
    embedding: Arc<dyn EmbeddingProvider>,
    store: Arc<dyn VectorStore>,
    snapshot: SnapshotManager,
    registry: PathRegistry,
    synchronizers: DashMap<String, Arc<Mutex<FileSynchronizer>>>,
    active_runs: DashMap<String, CancellationToken>,
    config: ContextConfig,
    extension_entry: Regex,
}

impl Context {
    /// Create an engine over explicit provider and store instances.
    pub fn new(
        embedding: Arc<dyn EmbeddingProvider>,
        store: Arc<dyn VectorStore>,
        config: ContextConfig,
    ) -> Self {
        let snapshot = SnapshotManager::with_path(config.state_dir.join(SNAPSHOT_FILE));
        Self {
            inner: Arc::new(ContextInner {
                embedding,
                store,
                snapshot,
                registry: PathRegistry::new(),
                synchronizers: DashMap::new(),
                active_runs: DashMap::new(),
                config,
                extension_entry: Regex::new(r"^\.[a-zA-Z0-9]+$").expect("static regex"),
            }),
        }
    }

    /// Create an engine from configuration, constructing providers through
    /// the factories.
    pub fn from_config(config: ContextConfig) -> Result<Self> {
        let embedding = crate::providers::embedding::create_embedding_provider(&config.embedding)?;
        let store = crate::providers::vector_store::create_vector_store(&config.store)?;
        Ok(Self::new(embedding, store, config))
    }

    /// Collection name for a codebase path (wire contract).
    pub fn get_collection_name(&self, path: &Path) -> String {
        fingerprint::collection_name(path)
    }

    /// Current snapshot record for a codebase, if any.
    pub fn get_indexing_status(&self, path: &Path) -> Option<CodebaseInfo> {
        let (_, path_str) = canonical(path);
        self.inner.snapshot.get_info(&path_str)
    }

    /// Whether the codebase has a live, completed index.
    pub async fn has_index(&self, path: &Path) -> bool {
        let (root, path_str) = canonical(path);
        let indexed = matches!(
            self.inner.snapshot.get_info(&path_str),
            Some(CodebaseInfo::Indexed { .. })
        );
        if !indexed {
            return false;
        }
        self.inner
            .store
            .has_collection(&fingerprint::collection_name(&root))
            .await
            .unwrap_or(false)
    }

    /// Start indexing a codebase in the background.
    ///
    /// Returns as soon as the run is registered; progress and the terminal
    /// state are visible through [`Context::get_indexing_status`].
    pub async fn index_codebase(&self, path: &Path, options: IndexOptions) -> Result<()> {
        let root = preflight_directory(path).await?;
        let (root, path_str) = canonical(&root);
        let fp = fingerprint::fingerprint(&root);
        let collection = fingerprint::collection_name(&root);

        match self.inner.snapshot.get_info(&path_str) {
            Some(CodebaseInfo::Indexing { .. }) => {
                return Err(Error::AlreadyIndexing { path: path_str });
            }
            Some(CodebaseInfo::Indexed { .. }) if !options.force => {
                return Err(Error::AlreadyIndexed { path: path_str });
            }
            _ => {}
        }

        if options.force {
            self.clear_index(&root).await?;
        }

        let token = CancellationToken::new();
        match self.inner.active_runs.entry(fp.clone()) {
            Entry::Occupied(_) => {
                return Err(Error::AlreadyIndexing { path: path_str });
            }
            Entry::Vacant(vacant) => {
                vacant.insert(token.clone());
            }
        }

        self.inner.registry.register(&root);
        if let Err(err) = self.inner.snapshot.set_indexing(&path_str, 0.0) {
            self.inner.active_runs.remove(&fp);
            return Err(err);
        }

        info!(path = %path_str, collection = %collection, "indexing started");

        let inner = Arc::clone(&self.inner);
        let progress = Arc::new(AtomicU32::new(0));
        tokio::spawn(async move {
            let outcome = inner
                .run_indexing(&root, &path_str, &collection, &options, &token, &progress)
                .await;
            match outcome {
                Ok(stats) => {
                    if let Err(err) = inner.snapshot.set_indexed(&path_str, stats) {
                        warn!(path = %path_str, error = %err, "failed to record indexed state");
                    }
                    info!(
                        path = %path_str,
                        indexed_files = stats.indexed_files,
                        total_chunks = stats.total_chunks,
                        "indexing finished"
                    );
                }
                Err(Error::Cancelled) => {
                    // clear_index owns the snapshot transition.
                    debug!(path = %path_str, "indexing cancelled");
                }
                Err(err) => {
                    let pct = progress.load(Ordering::SeqCst) as f32 / 10.0;
                    warn!(path = %path_str, error = %err, "indexing failed");
                    if let Err(save_err) =
                        inner
                            .snapshot
                            .set_failed(&path_str, &err.to_string(), Some(pct))
                    {
                        warn!(path = %path_str, error = %save_err, "failed to record failure");
                    }
                }
            }
            inner.active_runs.remove(&fp);
        });

        Ok(())
    }

    /// Hybrid search over an indexed (or currently indexing) codebase.
    pub async fn search_code(
        &self,
        path: &Path,
        query: &str,
        options: SearchOptions,
    ) -> Result<SearchResponse> {
        let root = preflight_directory(path).await?;
        let (root, path_str) = canonical(&root);

        for entry in &options.extension_filter {
            if !self.inner.extension_entry.is_match(entry) {
                return Err(Error::InvalidExtensionFilter {
                    entry: entry.clone(),
                });
            }
        }

        let partial = match self.inner.snapshot.get_info(&path_str) {
            Some(CodebaseInfo::Indexed { .. }) => false,
            Some(CodebaseInfo::Indexing { .. }) => true,
            Some(CodebaseInfo::IndexFailed { .. }) | None => {
                return Err(Error::not_indexed(path_str));
            }
        };

        let collection = fingerprint::collection_name(&root);
        if !self.inner.store.has_collection(&collection).await? {
            return Err(Error::not_indexed(path_str));
        }

        let query_vector = self.inner.embed_query(query).await?;
        let query_terms = tokenize(query);
        let filter = if options.extension_filter.is_empty() {
            None
        } else {
            Some(DocumentFilter {
                relative_path: None,
                file_extensions: Some(options.extension_filter.clone()),
            })
        };

        let planner_options = PlannerOptions {
            limit: options.limit,
            threshold: options.threshold,
            strategy: options.strategy,
            filter,
        };
        let hits = planner::execute(
            self.inner.store.as_ref(),
            &collection,
            query_vector,
            query_terms,
            &planner_options,
        )
        .await?;

        let results = hits
            .into_iter()
            .map(|hit| SearchResult {
                relative_path: hit.document.metadata.relative_path.clone(),
                start_line: hit.document.metadata.start_line,
                end_line: hit.document.metadata.end_line,
                language: hit.document.metadata.language.clone(),
                node_kind: hit.document.metadata.node_kind.clone(),
                content: hit.document.content,
                score: hit.dense_score.unwrap_or(hit.fused_score),
                dense_score: hit.dense_score,
            })
            .collect();

        Ok(SearchResponse { results, partial })
    }

    /// Drop everything the engine knows about a codebase: the collection,
    /// the hash map, the synchronizer, and the snapshot entry.
    ///
    /// A run in flight is cancelled cooperatively; the wait is bounded, and a
    /// run that refuses to stop yields [`Error::Busy`].
    pub async fn clear_index(&self, path: &Path) -> Result<()> {
        let (root, path_str) = canonical(path);
        let fp = fingerprint::fingerprint(&root);
        let collection = fingerprint::collection_name(&root);

        if let Some(entry) = self.inner.active_runs.get(&fp) {
            entry.value().cancel();
            drop(entry);

            let deadline = tokio::time::Instant::now() + CLEAR_WAIT_TIMEOUT;
            while self.inner.active_runs.contains_key(&fp) {
                if tokio::time::Instant::now() >= deadline {
                    return Err(Error::Busy { path: path_str });
                }
                tokio::time::sleep(Duration::from_millis(50)).await;
            }
        }

        // Hold the per-fingerprint lock for the duration of the clear so a
        // concurrent index_codebase observes AlreadyIndexing instead of
        // racing the teardown.
        match self.inner.active_runs.entry(fp.clone()) {
            Entry::Occupied(_) => return Err(Error::Busy { path: path_str }),
            Entry::Vacant(vacant) => {
                vacant.insert(CancellationToken::new());
            }
        }
        let result = self.inner.clear_state(&root, &path_str, &collection).await;
        self.inner.active_runs.remove(&fp);
        result
    }
}

impl ContextInner {
    /// The background pipeline for one run.
    async fn run_indexing(
        &self,
        root: &Path,
        path_str: &str,
        collection: &str,
        options: &IndexOptions,
        token: &CancellationToken,
        progress: &AtomicU32,
    ) -> Result<IndexStats> {
        // 1. Prepare the collection; a pinned dimension that differs from the
        // provider's is the signal that the embedding model changed.
        let dimension = self.embedding.dimension();
        if dimension == 0 {
            return Err(Error::internal("embedding provider declares dimension 0"));
        }
        if self.store.has_collection(collection).await? {
            if let Some(existing) = self.store.collection_dimension(collection).await? {
                if existing != dimension {
                    return Err(Error::DimensionMismatch {
                        expected: existing,
                        actual: dimension,
                    });
                }
            }
        } else if let Some(max) = self.store.collection_limit() {
            if self.store.list_collections().await?.len() >= max {
                return Err(Error::CollectionLimit { max });
            }
        }
        self.store.ensure_collection(collection, dimension).await?;

        // 2. Synchronize: hash the tree and diff against the committed map.
        // The committed map only ever covers files whose documents were
        // actually upserted, so a missing or cleared map makes every file
        // come back as `added` without any special-casing here.
        let synchronizer = self.synchronizer_for(root, collection, options);
        let new_map = {
            let synchronizer = Arc::clone(&synchronizer);
            tokio::task::spawn_blocking(move || synchronizer.blocking_lock().walk())
                .await
                .map_err(|e| Error::internal(format!("walk task panicked: {e}")))??
        };
        let changes = synchronizer.lock().await.diff(&new_map);
        info!(
            path = %path_str,
            added = changes.added.len(),
            modified = changes.modified.len(),
            removed = changes.removed.len(),
            "sync diff computed"
        );

        // 3. Deletes precede upserts for every file.
        for relative in changes.removed.iter().chain(changes.modified.iter()) {
            self.store
                .delete_by_predicate(collection, &DocumentFilter::for_path(relative.clone()))
                .await?;
        }

        // 4. Split, embed, and upsert the added and modified files.
        let splitter_kind = options.splitter.unwrap_or_default();
        let splitter = create_splitter(
            splitter_kind,
            SplitterOptions::new(
                self.config.indexing.chunk_size,
                self.config.indexing.chunk_overlap,
            ),
        );
        let fp = fingerprint::fingerprint(root);
        let batch_size = self.config.embedding.batch_size.max(1);
        let chunk_limit = self.config.indexing.chunk_limit;

        let work: Vec<&String> = changes.added.iter().chain(changes.modified.iter()).collect();
        let total_files = work.len();
        let mut processed_files = 0u32;
        let mut total_chunks = 0usize;
        let mut limit_reached = false;
        let mut processed_paths: Vec<String> = Vec::new();

        for relative in work {
            if token.is_cancelled() {
                return Err(Error::Cancelled);
            }

            let absolute = root.join(relative);
            let bytes = match tokio::fs::read(&absolute).await {
                Ok(bytes) => bytes,
                Err(err) => {
                    debug!(path = %absolute.display(), error = %err, "file vanished mid-run, skipped");
                    continue;
                }
            };
            let source = String::from_utf8_lossy(&bytes);
            if source.trim().is_empty() {
                processed_files += 1;
                processed_paths.push(relative.clone());
                continue;
            }

            let extension = Path::new(relative)
                .extension()
                .and_then(|e| e.to_str())
                .map(|e| format!(".{}", e.to_lowercase()))
                .unwrap_or_default();
            let language = Language::from_extension(extension.trim_start_matches('.'));

            let mut chunks = splitter.split(&source, language, relative);
            dedup_chunks(&mut chunks);

            let remaining = chunk_limit.saturating_sub(total_chunks);
            let truncated = chunks.len() > remaining;
            if truncated {
                chunks.truncate(remaining);
                limit_reached = true;
                warn!(
                    path = %path_str,
                    limit = chunk_limit,
                    "chunk limit reached, stopping ingestion"
                );
            }

            for batch in chunks.chunks(batch_size) {
                if token.is_cancelled() {
                    return Err(Error::Cancelled);
                }
                let texts: Vec<String> = batch.iter().map(|c| c.content.clone()).collect();
                let vectors = embed_batch_with_retry(self.embedding.as_ref(), &texts).await?;
                let documents: Vec<HybridDocument> = batch
                    .iter()
                    .zip(vectors)
                    .map(|(chunk, vector)| build_document(&fp, chunk, vector, &extension))
                    .collect();
                self.upsert_with_retry(collection, documents).await?;
                total_chunks += batch.len();
            }

            // A truncated file is deliberately left out of the committed
            // map so the next run re-offers it in full.
            if !truncated {
                processed_files += 1;
                processed_paths.push(relative.clone());
            }

            let pct = if total_files == 0 {
                100.0
            } else {
                round_one_decimal(processed_files as f32 / total_files as f32 * 100.0)
            };
            progress.store((pct * 10.0) as u32, Ordering::SeqCst);
            self.snapshot.set_indexing(path_str, pct)?;
            if let Some(ref callback) = options.progress {
                callback(pct);
            }

            if limit_reached {
                break;
            }
        }

        // 5. Commit the hash map covering exactly what this run absorbed, so
        // the next diff re-offers anything the chunk limit cut off.
        {
            let mut sync = synchronizer.lock().await;
            let mut committed = sync.file_hashes().clone();
            for removed in &changes.removed {
                committed.remove(removed);
            }
            for processed in &processed_paths {
                if let Some(hash) = new_map.get(processed) {
                    committed.insert(processed.clone(), hash.clone());
                }
            }
            sync.commit(committed)?;
        }

        Ok(IndexStats {
            indexed_files: processed_files,
            total_chunks: total_chunks as u32,
            index_status: if limit_reached {
                IndexStatus::LimitReached
            } else {
                IndexStatus::Completed
            },
        })
    }

    async fn clear_state(&self, root: &Path, path_str: &str, collection: &str) -> Result<()> {
        if self.store.has_collection(collection).await? {
            self.store.drop_collection(collection).await?;
        }

        if let Some((_, synchronizer)) = self.synchronizers.remove(collection) {
            synchronizer.lock().await.delete_state()?;
        } else {
            FileSynchronizer::new(root, &self.config.state_dir, SyncOptions::default())
                .delete_state()?;
        }

        self.snapshot.remove(path_str)?;
        self.registry.remove(root);
        info!(path = %path_str, "index cleared");
        Ok(())
    }

    fn synchronizer_for(
        &self,
        root: &Path,
        collection: &str,
        options: &IndexOptions,
    ) -> Arc<Mutex<FileSynchronizer>> {
        let mut ignore_patterns = self.config.indexing.custom_ignore_patterns.clone();
        ignore_patterns.extend(options.ignore_patterns.iter().cloned());
        let synchronizer = Arc::new(Mutex::new(FileSynchronizer::new(
            root,
            &self.config.state_dir,
            SyncOptions {
                custom_extensions: options.custom_extensions.clone(),
                ignore_patterns,
                max_file_size: self.config.indexing.max_file_size,
            },
        )));
        self.synchronizers
            .insert(collection.to_string(), Arc::clone(&synchronizer));
        synchronizer
    }

    async fn embed_query(&self, query: &str) -> Result<Vec<f32>> {
        let mut vectors =
            embed_batch_with_retry(self.embedding.as_ref(), &[query.to_string()]).await?;
        vectors
            .pop()
            .ok_or_else(|| Error::embedding_permanent("provider returned no embedding"))
    }

    async fn upsert_with_retry(
        &self,
        collection: &str,
        documents: Vec<HybridDocument>,
    ) -> Result<()> {
        match self.store.upsert(collection, documents.clone()).await {
            Err(err) if err.is_retryable() => {
                warn!(collection, error = %err, "upsert failed, retrying once");
                tokio::time::sleep(Duration::from_millis(200)).await;
                self.store.upsert(collection, documents).await
            }
            other => other,
        }
    }
}

/// Canonical root path and its string form used as the snapshot key.
fn canonical(path: &Path) -> (PathBuf, String) {
    let root = fingerprint::canonical_path(path);
    let path_str = root.to_string_lossy().replace('\\', "/");
    (root, path_str)
}

async fn preflight_directory(path: &Path) -> Result<PathBuf> {
    let metadata = tokio::fs::metadata(path)
        .await
        .map_err(|_| Error::path_not_found(path.to_string_lossy()))?;
    if !metadata.is_dir() {
        return Err(Error::NotADirectory {
            path: path.to_string_lossy().to_string(),
        });
    }
    Ok(path.to_path_buf())
}

/// Deterministic document id; identical chunks re-ingest under the same id.
fn document_id(fp: &str, chunk: &Chunk) -> String {
    format!(
        "{fp}-{}-{}-{}-{}",
        chunk.relative_path,
        chunk.start_line,
        chunk.end_line,
        &chunk.content_hash[..8]
    )
}

fn build_document(fp: &str, chunk: &Chunk, vector: Vec<f32>, extension: &str) -> HybridDocument {
    HybridDocument {
        id: document_id(fp, chunk),
        dense_vector: vector,
        keywords: tokenize(&chunk.content),
        content: chunk.content.clone(),
        metadata: ChunkMetadata {
            relative_path: chunk.relative_path.clone(),
            start_line: chunk.start_line,
            end_line: chunk.end_line,
            language: chunk.language.as_str().to_string(),
            file_extension: extension.to_string(),
            node_kind: chunk.node_kind.clone(),
        },
    }
}

/// Drop chunks that duplicate an earlier chunk's identity within one file.
fn dedup_chunks(chunks: &mut Vec<Chunk>) {
    let mut seen = HashSet::new();
    chunks.retain(|chunk| {
        seen.insert((
            chunk.start_line,
            chunk.end_line,
            chunk.content_hash.clone(),
        ))
    });
}

fn round_one_decimal(value: f32) -> f32 {
    (value * 10.0).round() / 10.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_ids_are_deterministic_and_distinct() {
        let chunk = Chunk::new(
            "fn add(a: i32, b: i32) -> i32 { a + b }".to_string(),
            "src/math.rs",
            10,
            12,
            Language::Rust,
            Some("function".to_string()),
        );
        let a = document_id("12ab34cd", &chunk);
        let b = document_id("12ab34cd", &chunk);
        assert_eq!(a, b);
        assert!(a.starts_with("12ab34cd-src/math.rs-10-12-"));

        let other = Chunk::new(
            "fn add(a: i32, b: i32) -> i32 { a - b }".to_string(),
            "src/math.rs",
            10,
            12,
            Language::Rust,
            None,
        );
        assert_ne!(a, document_id("12ab34cd", &other));
    }

    #[test]
    fn dedup_keeps_first_occurrence() {
        let chunk = |content: &str, line: u32| {
            Chunk::new(
                content.to_string(),
                "a.rs",
                line,
                line,
                Language::Rust,
                None,
            )
        };
        let mut chunks = vec![chunk("same", 1), chunk("same", 1), chunk("same", 2)];
        dedup_chunks(&mut chunks);
        assert_eq!(chunks.len(), 2);
    }

    #[test]
    fn percentages_round_to_one_decimal() {
        assert_eq!(round_one_decimal(33.3333), 33.3);
        assert_eq!(round_one_decimal(66.6666), 66.7);
        assert_eq!(round_one_decimal(100.0), 100.0);
    }
}
