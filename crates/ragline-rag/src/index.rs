//! Persisted vector index over a document corpus.

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{debug, info};

use crate::embedding::{Embedder, EmbeddingError};

/// A string field must be longer than this to be picked as fallback text.
pub const MIN_TEXT_LEN: usize = 50;

/// Top-level fields copied into metadata when a document has no `metadata` object.
const METADATA_FIELDS: [&str; 6] = ["title", "url", "source", "author", "date", "id"];

/// One indexed document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexRecord {
    pub id: usize,
    pub content: String,
    pub metadata: BTreeMap<String, String>,
    pub embedding: Vec<f32>,
}

/// A record ranked against a query.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchResult {
    pub id: usize,
    pub content: String,
    pub metadata: BTreeMap<String, String>,
    pub score: f32,
}

/// Errors from the vector index.
#[derive(Debug, Error)]
pub enum IndexError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("index file {path} is corrupt: {reason}")]
    Corrupt { path: PathBuf, reason: String },
    #[error("no index at {0}; build one first")]
    NotLoaded(PathBuf),
    #[error("corpus contains no documents with usable text")]
    EmptyCorpus,
    #[error("query embedding has {query} dimensions but the index has {index}; rebuild the index with the current embedding model")]
    DimensionMismatch { index: usize, query: usize },
    #[error("embedding failed: {0}")]
    Embedding(#[from] EmbeddingError),
}

#[derive(Debug)]
struct IndexSnapshot {
    records: Vec<IndexRecord>,
    dimension: usize,
}

/// Vector index persisted as a JSON array of [`IndexRecord`].
///
/// Searches read an immutable snapshot; `build` and `load` publish a
/// complete replacement, so a reader never sees a half-built index.
pub struct VectorIndex {
    path: PathBuf,
    embedder: Arc<dyn Embedder>,
    state: RwLock<Option<Arc<IndexSnapshot>>>,
    build_lock: tokio::sync::Mutex<()>,
    /// Bumped by every build once its file is in place.
    generation: AtomicU64,
}

/// Pick the text to index from a raw document.
///
/// Order: `content`, then `text`, then the first string field longer than
/// [`MIN_TEXT_LEN`] characters. `None` means the document is skipped.
pub fn extract_text(doc: &Value) -> Option<&str> {
    let fields = doc.as_object()?;

    if let Some(content) = fields.get("content").and_then(Value::as_str) {
        return Some(content);
    }
    if let Some(text) = fields.get("text").and_then(Value::as_str) {
        return Some(text);
    }

    fields
        .values()
        .filter_map(Value::as_str)
        .find(|value| value.chars().count() > MIN_TEXT_LEN)
}

fn metadata_value(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

fn extract_metadata(doc: &Value, id: usize) -> BTreeMap<String, String> {
    let fields = doc.as_object();
    let mut metadata = BTreeMap::new();

    match fields.and_then(|f| f.get("metadata")).and_then(Value::as_object) {
        Some(nested) => copy_fields(nested, nested.keys().map(String::as_str), &mut metadata),
        None => {
            if let Some(fields) = fields {
                copy_fields(fields, METADATA_FIELDS.iter().copied(), &mut metadata);
            }
        }
    }

    metadata
        .entry("title".to_string())
        .or_insert_with(|| format!("Document {}", id + 1));
    metadata
        .entry("id".to_string())
        .or_insert_with(|| id.to_string());
    metadata
}

fn copy_fields<'a>(
    source: &Map<String, Value>,
    keys: impl Iterator<Item = &'a str>,
    metadata: &mut BTreeMap<String, String>,
) {
    for key in keys {
        if let Some(value) = source.get(key).and_then(metadata_value) {
            metadata.insert(key.to_string(), value);
        }
    }
}

/// Cosine similarity of two equal-length vectors; 0 when either is all zeros.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    debug_assert_eq!(a.len(), b.len());

    let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot_product / (norm_a * norm_b)
}

/// Read and validate an index file. `Ok(None)` when the file does not exist.
fn read_snapshot(path: &Path) -> Result<Option<IndexSnapshot>, IndexError> {
    if !path.exists() {
        debug!("No index at {}", path.display());
        return Ok(None);
    }

    let corrupt = |reason: String| IndexError::Corrupt {
        path: path.to_path_buf(),
        reason,
    };

    let reader = BufReader::new(File::open(path)?);
    let records: Vec<IndexRecord> =
        serde_json::from_reader(reader).map_err(|e| corrupt(e.to_string()))?;

    let dimension = records
        .first()
        .map(|r| r.embedding.len())
        .ok_or_else(|| corrupt("index contains no records".to_string()))?;

    for (position, record) in records.iter().enumerate() {
        if record.id != position {
            return Err(corrupt(format!(
                "record at position {} has id {}",
                position, record.id
            )));
        }
        if record.embedding.len() != dimension {
            return Err(corrupt(format!(
                "record {} has {} dimensions, expected {}",
                record.id,
                record.embedding.len(),
                dimension
            )));
        }
    }

    info!(
        "Loaded index with {} documents from {}",
        records.len(),
        path.display()
    );
    Ok(Some(IndexSnapshot { records, dimension }))
}

impl VectorIndex {
    pub fn new(path: impl Into<PathBuf>, embedder: Arc<dyn Embedder>) -> Self {
        Self {
            path: path.into(),
            embedder,
            state: RwLock::new(None),
            build_lock: tokio::sync::Mutex::new(()),
            generation: AtomicU64::new(0),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn snapshot(&self) -> Option<Arc<IndexSnapshot>> {
        self.state
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Swap in a freshly built snapshot; reads started before this point are stale.
    fn publish(&self, snapshot: IndexSnapshot) {
        let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
        self.generation.fetch_add(1, Ordering::SeqCst);
        *state = Some(Arc::new(snapshot));
    }

    /// Publish a snapshot read from disk unless a build finished since the read began.
    fn publish_if_current(&self, snapshot: IndexSnapshot, generation: u64) {
        let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
        if self.generation.load(Ordering::SeqCst) == generation {
            *state = Some(Arc::new(snapshot));
        } else {
            debug!("Discarding index read superseded by a rebuild");
        }
    }

    pub fn is_loaded(&self) -> bool {
        self.snapshot().is_some()
    }

    /// Number of records in memory (0 when not loaded).
    pub fn len(&self) -> usize {
        self.snapshot().map_or(0, |s| s.records.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Embedding dimension of the loaded index.
    pub fn dimension(&self) -> Option<usize> {
        self.snapshot().map(|s| s.dimension)
    }

    /// Copy of the in-memory records.
    pub fn records(&self) -> Vec<IndexRecord> {
        self.snapshot()
            .map(|s| s.records.clone())
            .unwrap_or_default()
    }

    /// Build the index from raw documents, replacing any previous one.
    pub async fn build(&self, corpus: &[Value]) -> Result<usize, IndexError> {
        self.build_with_progress(corpus, |_, _| {}).await
    }

    /// Like [`VectorIndex::build`], reporting `(embedded, total)` after each document.
    pub async fn build_with_progress<F>(
        &self,
        corpus: &[Value],
        mut on_progress: F,
    ) -> Result<usize, IndexError>
    where
        F: FnMut(usize, usize),
    {
        let _guard = self.build_lock.lock().await;

        let texts: Vec<(&Value, &str)> = corpus
            .iter()
            .filter_map(|doc| match extract_text(doc) {
                Some(text) => Some((doc, text)),
                None => {
                    debug!("Skipping document without usable text");
                    None
                }
            })
            .collect();

        if texts.is_empty() {
            return Err(IndexError::EmptyCorpus);
        }

        let total = texts.len();
        let mut records = Vec::with_capacity(total);
        for (id, (doc, text)) in texts.into_iter().enumerate() {
            let embedding = self.embedder.embed(text).await?;
            records.push(IndexRecord {
                id,
                content: text.to_string(),
                metadata: extract_metadata(doc, id),
                embedding,
            });
            on_progress(id + 1, total);
        }

        let dimension = records[0].embedding.len();
        if let Some(bad) = records.iter().find(|r| r.embedding.len() != dimension) {
            return Err(IndexError::Embedding(EmbeddingError::Dimension {
                expected: dimension,
                actual: bad.embedding.len(),
            }));
        }

        self.persist(&records)?;
        info!(
            "Built index with {} documents ({} skipped) at {}",
            records.len(),
            corpus.len() - records.len(),
            self.path.display()
        );

        let count = records.len();
        self.publish(IndexSnapshot { records, dimension });
        Ok(count)
    }

    /// Write `records` next to the target and rename over it.
    fn persist(&self, records: &[IndexRecord]) -> Result<(), IndexError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let mut tmp_name = self.path.as_os_str().to_owned();
        tmp_name.push(".tmp");
        let tmp_path = PathBuf::from(tmp_name);

        let file = File::create(&tmp_path)?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, records)?;
        writer.flush()?;
        writer.get_ref().sync_all()?;
        drop(writer);

        fs::rename(&tmp_path, &self.path)?;
        Ok(())
    }

    /// Load the persisted index. `Ok(false)` when no index file exists yet.
    ///
    /// Reads the whole file on the calling thread; async callers go through
    /// [`VectorIndex::search`], which loads on a blocking worker.
    pub fn load(&self) -> Result<bool, IndexError> {
        let generation = self.generation.load(Ordering::SeqCst);
        match read_snapshot(&self.path)? {
            Some(snapshot) => {
                self.publish_if_current(snapshot, generation);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Current snapshot, loading it from disk first if needed.
    async fn loaded_snapshot(&self) -> Result<Arc<IndexSnapshot>, IndexError> {
        if let Some(snapshot) = self.snapshot() {
            return Ok(snapshot);
        }

        let generation = self.generation.load(Ordering::SeqCst);
        let path = self.path.clone();
        let read = tokio::task::spawn_blocking(move || read_snapshot(&path))
            .await
            .map_err(|e| IndexError::Io(std::io::Error::new(std::io::ErrorKind::Other, e)))??;

        match read {
            Some(snapshot) => {
                self.publish_if_current(snapshot, generation);
                self.snapshot()
                    .ok_or_else(|| IndexError::NotLoaded(self.path.clone()))
            }
            None => Err(IndexError::NotLoaded(self.path.clone())),
        }
    }

    /// The `k` records most similar to `query`, best first, ties by lower id.
    pub async fn search(&self, query: &str, k: usize) -> Result<Vec<SearchResult>, IndexError> {
        let snapshot = self.loaded_snapshot().await?;

        if k == 0 {
            return Ok(Vec::new());
        }

        let query_embedding = self.embedder.embed(query).await?;
        if query_embedding.len() != snapshot.dimension {
            return Err(IndexError::DimensionMismatch {
                index: snapshot.dimension,
                query: query_embedding.len(),
            });
        }

        let mut scored: Vec<(f32, &IndexRecord)> = snapshot
            .records
            .iter()
            .map(|record| (cosine_similarity(&query_embedding, &record.embedding), record))
            .collect();

        scored.sort_by(|a, b| b.0.total_cmp(&a.0).then_with(|| a.1.id.cmp(&b.1.id)));
        scored.truncate(k);

        Ok(scored
            .into_iter()
            .map(|(score, record)| SearchResult {
                id: record.id,
                content: record.content.clone(),
                metadata: record.metadata.clone(),
                score,
            })
            .collect())
    }
}

impl std::fmt::Debug for VectorIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VectorIndex")
            .field("path", &self.path)
            .field("records", &self.len())
            .finish()
    }
}
