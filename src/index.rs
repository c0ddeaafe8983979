//! In-memory vector index and its build-once lifecycle.
//!
//! [`VectorIndex`] is an immutable collection of embedded chunks with
//! brute-force cosine search — sufficient for a corpus of hundreds to low
//! thousands of chunks, and the `search` contract leaves room to swap in
//! an approximate structure later.
//!
//! [`IndexService`] owns the build-then-read lifecycle: the build runs at
//! most once per process ([`tokio::sync::OnceCell`]), assembles the whole
//! index locally, and publishes the finished snapshot with an atomic slot
//! swap. Requests arriving while the build is in flight observe "no
//! snapshot" and degrade to empty context instead of blocking or seeing a
//! half-built index.

use std::cmp::Ordering;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use tokio::sync::OnceCell;
use walkdir::WalkDir;

use crate::chunk::{char_len, split_with_offsets};
use crate::config::{ChunkingConfig, Config};
use crate::embedding::{cosine_similarity, Embedder};
use crate::flatten::flatten_value;

/// Separator between flattened documents in the combined corpus text, so
/// one document's tail and the next one's head never blend silently
/// inside a chunk.
pub const DOCUMENT_SEPARATOR: &str = "\n===\n";

/// An embedded chunk. Immutable after the index build.
#[derive(Debug, Clone)]
pub struct IndexedChunk {
    pub text: String,
    /// File stem of the lore document this chunk starts in.
    pub source_label: String,
    pub vector: Vec<f32>,
}

/// One search result: a chunk and its similarity to the query.
#[derive(Debug, Clone)]
pub struct SearchHit {
    pub score: f32,
    pub source_label: String,
    pub text: String,
}

/// Immutable similarity-searchable chunk collection.
#[derive(Debug)]
pub struct VectorIndex {
    dims: usize,
    chunks: Vec<IndexedChunk>,
    built_at: DateTime<Utc>,
}

impl VectorIndex {
    /// Assemble an index, validating that every vector shares one
    /// dimensionality.
    pub fn from_chunks(chunks: Vec<IndexedChunk>) -> Result<Self> {
        let dims = chunks.first().map(|c| c.vector.len()).unwrap_or(0);
        for (i, chunk) in chunks.iter().enumerate() {
            if chunk.vector.len() != dims {
                bail!(
                    "chunk {} has dimensionality {} (index dimensionality is {})",
                    i,
                    chunk.vector.len(),
                    dims
                );
            }
        }
        Ok(Self {
            dims,
            chunks,
            built_at: Utc::now(),
        })
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    pub fn dims(&self) -> usize {
        self.dims
    }

    pub fn built_at(&self) -> DateTime<Utc> {
        self.built_at
    }

    /// Return the `min(k, len)` chunks most similar to `query`, in
    /// non-increasing score order. Equal scores keep insertion order
    /// (the sort is stable). An empty index returns an empty result.
    pub fn search(&self, query: &[f32], k: usize) -> Vec<SearchHit> {
        if self.chunks.is_empty() || k == 0 {
            return Vec::new();
        }

        let mut hits: Vec<SearchHit> = self
            .chunks
            .iter()
            .map(|chunk| SearchHit {
                score: cosine_similarity(query, &chunk.vector),
                source_label: chunk.source_label.clone(),
                text: chunk.text.clone(),
            })
            .collect();

        hits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));
        hits.truncate(k);
        hits
    }
}

// ============ Corpus assembly ============

/// Flattened, chunked corpus before embedding.
pub struct Corpus {
    /// Documents that contributed text (malformed or empty ones excluded).
    pub documents: usize,
    pub chunks: Vec<CorpusChunk>,
}

pub struct CorpusChunk {
    pub text: String,
    pub source_label: String,
}

/// Flatten and chunk every readable lore document under `data_dir`.
///
/// Malformed files are skipped with a warning; they never abort the
/// build. Returns `Ok(None)` when no document yields extractable text.
/// An unreadable directory is an error — the caller reports it and
/// leaves the index inactive.
pub fn assemble_corpus(data_dir: &Path, chunking: &ChunkingConfig) -> Result<Option<Corpus>> {
    let files = collect_json_files(data_dir)?;
    if files.is_empty() {
        return Ok(None);
    }

    let mut combined = String::new();
    // (starting char offset, label) per document, for chunk attribution.
    let mut spans: Vec<(usize, String)> = Vec::new();

    for path in &files {
        let label = path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_default();

        let raw = match std::fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(e) => {
                eprintln!("Warning: skipping {}: {}", path.display(), e);
                continue;
            }
        };

        let value: serde_json::Value = match serde_json::from_str(&raw) {
            Ok(value) => value,
            Err(e) => {
                eprintln!("Warning: skipping {}: {}", path.display(), e);
                continue;
            }
        };

        let text = match flatten_value(&value, &label) {
            Ok(text) => text,
            Err(e) => {
                eprintln!("Warning: skipping {}: {}", path.display(), e);
                continue;
            }
        };

        if text.trim().is_empty() {
            continue;
        }

        if !combined.is_empty() {
            combined.push_str(DOCUMENT_SEPARATOR);
        }
        spans.push((char_len(&combined), label));
        combined.push_str(&text);
    }

    if combined.trim().is_empty() {
        return Ok(None);
    }

    let pieces = split_with_offsets(&combined, chunking.chunk_size, chunking.chunk_overlap);
    let chunks = pieces
        .into_iter()
        .map(|piece| CorpusChunk {
            source_label: label_for_offset(&spans, piece.start),
            text: piece.text,
        })
        .collect();

    Ok(Some(Corpus {
        documents: spans.len(),
        chunks,
    }))
}

fn collect_json_files(data_dir: &Path) -> Result<Vec<PathBuf>> {
    if !data_dir.exists() {
        bail!("data directory does not exist: {}", data_dir.display());
    }

    let mut files = Vec::new();
    for entry in WalkDir::new(data_dir) {
        let entry = entry?;
        if entry.file_type().is_file()
            && entry.path().extension().is_some_and(|ext| ext == "json")
        {
            files.push(entry.path().to_path_buf());
        }
    }

    // Sort for deterministic build order
    files.sort();
    Ok(files)
}

fn label_for_offset(spans: &[(usize, String)], offset: usize) -> String {
    spans
        .iter()
        .rev()
        .find(|(start, _)| *start <= offset)
        .map(|(_, label)| label.clone())
        .unwrap_or_default()
}

// ============ Build-once service ============

/// Observable index lifecycle state, for /health and the CLI.
#[derive(Debug, Clone)]
pub enum IndexStatus {
    Uninitialized,
    Building,
    Ready {
        chunks: usize,
        dims: usize,
        built_at: DateTime<Utc>,
    },
    /// The build finished without producing a usable index (no documents,
    /// no extractable text, or an aborted embedding run). Retrieval
    /// against an inactive index returns empty results by contract.
    Inactive,
}

enum IndexSlot {
    Uninitialized,
    Building,
    Ready(Arc<VectorIndex>),
    Inactive,
}

/// Owns the build-once lifecycle and the published snapshot.
pub struct IndexService {
    build_guard: OnceCell<()>,
    slot: RwLock<IndexSlot>,
}

impl IndexService {
    pub fn new() -> Self {
        Self {
            build_guard: OnceCell::new(),
            slot: RwLock::new(IndexSlot::Uninitialized),
        }
    }

    /// Build the index exactly once for the process lifetime.
    ///
    /// A second invocation is a no-op, not a rebuild; concurrent callers
    /// wait for the first build to finish. Failures never propagate:
    /// they leave the index inactive and the chat flow degrades to
    /// generation without retrieval.
    pub async fn build_once(&self, embedder: &dyn Embedder, config: &Config) {
        self.build_guard
            .get_or_init(|| async {
                self.set_slot(IndexSlot::Building);
                match build_index(config, embedder).await {
                    Ok(Some(index)) => {
                        println!(
                            "indexed {} chunks ({} dims) from {}",
                            index.len(),
                            index.dims(),
                            config.data.dir.display()
                        );
                        self.set_slot(IndexSlot::Ready(Arc::new(index)));
                    }
                    Ok(None) => {
                        eprintln!(
                            "Warning: no indexable text under {}; retrieval is inactive",
                            config.data.dir.display()
                        );
                        self.set_slot(IndexSlot::Inactive);
                    }
                    Err(e) => {
                        eprintln!("Warning: index build failed ({e:#}); retrieval is inactive");
                        self.set_slot(IndexSlot::Inactive);
                    }
                }
            })
            .await;
    }

    /// Current published snapshot, if the build completed successfully.
    pub fn snapshot(&self) -> Option<Arc<VectorIndex>> {
        match &*self.slot.read().unwrap() {
            IndexSlot::Ready(index) => Some(index.clone()),
            _ => None,
        }
    }

    pub fn status(&self) -> IndexStatus {
        match &*self.slot.read().unwrap() {
            IndexSlot::Uninitialized => IndexStatus::Uninitialized,
            IndexSlot::Building => IndexStatus::Building,
            IndexSlot::Inactive => IndexStatus::Inactive,
            IndexSlot::Ready(index) => IndexStatus::Ready {
                chunks: index.len(),
                dims: index.dims(),
                built_at: index.built_at(),
            },
        }
    }

    fn set_slot(&self, slot: IndexSlot) {
        *self.slot.write().unwrap() = slot;
    }
}

impl Default for IndexService {
    fn default() -> Self {
        Self::new()
    }
}

/// Assemble, embed, and wire up the corpus. Any embedding failure aborts
/// the whole build so a partial index is never observable.
async fn build_index(config: &Config, embedder: &dyn Embedder) -> Result<Option<VectorIndex>> {
    let corpus = match assemble_corpus(&config.data.dir, &config.chunking)? {
        Some(corpus) => corpus,
        None => return Ok(None),
    };

    let texts: Vec<String> = corpus.chunks.iter().map(|c| c.text.clone()).collect();
    let mut vectors: Vec<Vec<f32>> = Vec::with_capacity(texts.len());
    for batch in texts.chunks(config.embedding.batch_size) {
        let mut batch_vectors = embedder
            .embed_batch(batch)
            .await
            .context("embedding chunk batch")?;
        vectors.append(&mut batch_vectors);
    }

    if vectors.len() != corpus.chunks.len() {
        bail!(
            "embedding returned {} vectors for {} chunks",
            vectors.len(),
            corpus.chunks.len()
        );
    }

    let chunks = corpus
        .chunks
        .into_iter()
        .zip(vectors)
        .map(|(chunk, vector)| IndexedChunk {
            text: chunk.text,
            source_label: chunk.source_label,
            vector,
        })
        .collect();

    Ok(Some(VectorIndex::from_chunks(chunks)?))
}
