//! Per-course vector stores persisted as flat JSON files, with brute-force similarity search.
//!
//! Each course has one file, `course_{id}.json`, holding a JSON array of [`DocumentChunk`]s.
//! Every append rewrites the whole file: it is written to a temp file in the same
//! directory and renamed over the old one, so readers see either the old or the new
//! collection, never a partial one. Within a process, all handles for one course
//! share an `RwLock` (shared for search, exclusive for append), so concurrent
//! appends cannot lose each other's chunks.

use std::collections::{BTreeSet, HashMap};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, RwLock};

use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tracing::{debug, info};

use crate::documents::Metadata;

/// A chunk with its embedding, as stored on disk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentChunk {
    /// Unique within the course's store. Assigned on append.
    pub id: u64,
    /// The original chunk text (never the summary used for embedding).
    pub text: String,
    pub embedding: Vec<f32>,
    pub metadata: Metadata,
}

/// A stored chunk paired with its similarity to the query.
#[derive(Debug, Clone, PartialEq)]
pub struct RankedChunk {
    pub chunk: DocumentChunk,
    pub score: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SearchResult {
    /// Nothing has been indexed for this course yet.
    Empty,
    /// Best matches first. Order among equal scores is unspecified.
    Ranked(Vec<RankedChunk>),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoreStats {
    pub chunks: usize,
    /// Embedding length shared by every chunk; `None` when empty.
    pub dimension: Option<usize>,
    /// Distinct `metadata.source` values.
    pub sources: BTreeSet<String>,
}

/// Cosine similarity between two vectors of equal length.
/// Returns `0.0` when either vector has zero magnitude.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a.sqrt() * norm_b.sqrt())
}

/// Directory of course stores. Hands out [`VectorStore`] handles that share one lock per course.
#[derive(Debug)]
pub struct StoreDir {
    root: PathBuf,
    locks: Mutex<HashMap<u64, Arc<RwLock<()>>>>,
}

impl StoreDir {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The store for `course_id`. The file is created lazily on first append.
    pub fn course(&self, course_id: u64) -> Result<VectorStore, StoreError> {
        let lock = {
            let mut locks = self.locks.lock().map_err(|_| StoreError::LockPoisoned)?;
            Arc::clone(locks.entry(course_id).or_default())
        };
        Ok(VectorStore {
            course_id,
            root: self.root.clone(),
            path: self.root.join(store_filename(course_id)),
            lock,
        })
    }
}

/// `course_{id}.json`
pub fn store_filename(course_id: u64) -> String {
    format!("course_{course_id}.json")
}

/// Handle to one course's store.
#[derive(Debug, Clone)]
pub struct VectorStore {
    course_id: u64,
    root: PathBuf,
    path: PathBuf,
    lock: Arc<RwLock<()>>,
}

impl VectorStore {
    pub fn course_id(&self) -> u64 {
        self.course_id
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Appends `chunks`, renumbering their ids to continue after the existing ones.
    /// Returns the total number of chunks in the store afterwards.
    pub fn append(&self, mut chunks: Vec<DocumentChunk>) -> Result<usize, StoreError> {
        let _guard = self.lock.write().map_err(|_| StoreError::LockPoisoned)?;
        let mut existing = self.load()?.unwrap_or_default();

        let expected = existing
            .first()
            .or(chunks.first())
            .map(|c| c.embedding.len());
        if let Some(expected) = expected {
            if let Some(bad) = chunks.iter().find(|c| c.embedding.len() != expected) {
                return Err(StoreError::DimensionMismatch {
                    expected,
                    found: bad.embedding.len(),
                });
            }
        }

        let start = existing.len() as u64;
        for (i, chunk) in chunks.iter_mut().enumerate() {
            chunk.id = start + i as u64;
        }
        let added = chunks.len();
        existing.append(&mut chunks);
        self.save(&existing)?;
        info!(
            course_id = self.course_id,
            added,
            total = existing.len(),
            "appended chunks"
        );
        Ok(existing.len())
    }

    /// Scores every stored chunk against `query` and returns the best `top_k`.
    pub fn search(&self, query: &[f32], top_k: usize) -> Result<SearchResult, StoreError> {
        let chunks = {
            let _guard = self.lock.read().map_err(|_| StoreError::LockPoisoned)?;
            self.load()?
        };
        let Some(chunks) = chunks.filter(|c| !c.is_empty()) else {
            return Ok(SearchResult::Empty);
        };
        let dimension = chunks[0].embedding.len();
        if query.len() != dimension {
            return Err(StoreError::DimensionMismatch {
                expected: dimension,
                found: query.len(),
            });
        }

        let mut ranked = Vec::with_capacity(chunks.len());
        for chunk in chunks {
            if chunk.embedding.len() != dimension {
                return Err(StoreError::DimensionMismatch {
                    expected: dimension,
                    found: chunk.embedding.len(),
                });
            }
            let score = cosine_similarity(query, &chunk.embedding);
            ranked.push(RankedChunk { chunk, score });
        }
        ranked.sort_by(|a, b| b.score.total_cmp(&a.score));
        ranked.truncate(top_k);
        debug!(
            course_id = self.course_id,
            hits = ranked.len(),
            "searched store"
        );
        Ok(SearchResult::Ranked(ranked))
    }

    /// Every stored chunk in id order; empty if nothing has been indexed.
    pub fn chunks(&self) -> Result<Vec<DocumentChunk>, StoreError> {
        let _guard = self.lock.read().map_err(|_| StoreError::LockPoisoned)?;
        Ok(self.load()?.unwrap_or_default())
    }

    pub fn stats(&self) -> Result<StoreStats, StoreError> {
        let chunks = self.chunks()?;
        Ok(StoreStats {
            chunks: chunks.len(),
            dimension: chunks.first().map(|c| c.embedding.len()),
            sources: chunks.into_iter().map(|c| c.metadata.source).collect(),
        })
    }

    /// `None` if the store file does not exist yet.
    fn load(&self) -> Result<Option<Vec<DocumentChunk>>, StoreError> {
        let bytes = match std::fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(StoreError::Read(self.path.clone(), e)),
        };
        serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|e| StoreError::Decode(self.path.clone(), e))
    }

    fn save(&self, chunks: &[DocumentChunk]) -> Result<(), StoreError> {
        std::fs::create_dir_all(&self.root).map_err(|e| StoreError::Write(self.root.clone(), e))?;
        let json = serde_json::to_vec(chunks).map_err(StoreError::Encode)?;
        let mut tmp =
            NamedTempFile::new_in(&self.root).map_err(|e| StoreError::Write(self.root.clone(), e))?;
        tmp.write_all(&json)
            .and_then(|_| tmp.as_file().sync_all())
            .map_err(|e| StoreError::Write(tmp.path().to_path_buf(), e))?;
        tmp.persist(&self.path)
            .map_err(|e| StoreError::Write(self.path.clone(), e.error))?;
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("failed to read store {0}: {1}")]
    Read(PathBuf, std::io::Error),
    #[error("failed to write store {0}: {1}")]
    Write(PathBuf, std::io::Error),
    #[error("corrupt store {0}: {1}")]
    Decode(PathBuf, serde_json::Error),
    #[error("failed to serialize store: {0}")]
    Encode(serde_json::Error),
    #[error("embedding dimension mismatch: store has {expected}, got {found}")]
    DimensionMismatch { expected: usize, found: usize },
    #[error("store lock poisoned")]
    LockPoisoned,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(text: &str, embedding: Vec<f32>) -> DocumentChunk {
        DocumentChunk {
            id: 0,
            text: text.to_string(),
            embedding,
            metadata: Metadata {
                source: "uploads/lecture1.pdf".into(),
                page: Some(1),
            },
        }
    }

    fn scores(result: &SearchResult) -> Vec<f32> {
        match result {
            SearchResult::Ranked(hits) => hits.iter().map(|h| h.score).collect(),
            SearchResult::Empty => panic!("expected ranked results"),
        }
    }

    #[test]
    fn cosine_of_self_is_one() {
        let v = [0.3, -1.2, 4.0, 0.5];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn cosine_orthogonal_and_opposite() {
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-6);
        assert!((cosine_similarity(&[1.0, 0.0], &[-2.0, 0.0]) + 1.0).abs() < 1e-6);
    }

    #[test]
    fn cosine_with_zero_vector_is_zero() {
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 2.0]), 0.0);
        assert_eq!(cosine_similarity(&[1.0, 2.0], &[0.0, 0.0]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[0.0, 0.0]), 0.0);
    }

    #[test]
    fn missing_store_searches_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = StoreDir::new(dir.path()).course(7).unwrap();
        assert_eq!(store.search(&[1.0, 0.0], 5).unwrap(), SearchResult::Empty);
        assert_eq!(store.stats().unwrap(), StoreStats::default());
        assert!(!store.path().exists());
    }

    #[test]
    fn empty_collection_searches_empty() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("course_3.json"), "[]").unwrap();
        let store = StoreDir::new(dir.path()).course(3).unwrap();
        assert_eq!(store.search(&[1.0], 5).unwrap(), SearchResult::Empty);
    }

    #[test]
    fn append_twice_assigns_sequential_ids() {
        let dir = tempfile::tempdir().unwrap();
        let store = StoreDir::new(dir.path()).course(1).unwrap();
        let first = vec![chunk("a", vec![1.0, 0.0]), chunk("b", vec![0.0, 1.0])];
        let second = vec![
            chunk("c", vec![1.0, 1.0]),
            chunk("d", vec![0.5, 0.0]),
            chunk("e", vec![0.0, 0.5]),
        ];
        assert_eq!(store.append(first).unwrap(), 2);
        assert_eq!(store.append(second).unwrap(), 5);
        let ids: Vec<u64> = store.chunks().unwrap().iter().map(|c| c.id).collect();
        assert_eq!(ids, vec![0, 1, 2, 3, 4]);
        assert!(dir.path().join("course_1.json").is_file());
    }

    #[test]
    fn search_is_sorted_and_limited() {
        let dir = tempfile::tempdir().unwrap();
        let store = StoreDir::new(dir.path()).course(1).unwrap();
        store
            .append(vec![
                chunk("far", vec![0.0, 1.0]),
                chunk("exact", vec![2.0, 0.0]),
                chunk("near", vec![1.0, 0.25]),
                chunk("opposite", vec![-1.0, 0.0]),
            ])
            .unwrap();
        let result = store.search(&[1.0, 0.0], 3).unwrap();
        let s = scores(&result);
        assert_eq!(s.len(), 3);
        assert!(s.windows(2).all(|w| w[0] >= w[1]));
        assert!((s[0] - 1.0).abs() < 1e-6);
        let SearchResult::Ranked(hits) = result else {
            unreachable!()
        };
        assert_eq!(hits[0].chunk.text, "exact");
        assert_eq!(hits[1].chunk.text, "near");
        assert_eq!(hits[2].chunk.text, "far");
    }

    #[test]
    fn zero_vectors_score_zero() {
        let dir = tempfile::tempdir().unwrap();
        let store = StoreDir::new(dir.path()).course(1).unwrap();
        store.append(vec![chunk("blank", vec![0.0, 0.0])]).unwrap();
        let s = scores(&store.search(&[1.0, 1.0], 5).unwrap());
        assert_eq!(s, vec![0.0]);
        let s = scores(&store.search(&[0.0, 0.0], 5).unwrap());
        assert_eq!(s, vec![0.0]);
    }

    #[test]
    fn query_dimension_must_match() {
        let dir = tempfile::tempdir().unwrap();
        let store = StoreDir::new(dir.path()).course(1).unwrap();
        store.append(vec![chunk("a", vec![1.0, 0.0, 0.0])]).unwrap();
        let err = store.search(&[1.0, 0.0], 5).unwrap_err();
        assert!(matches!(
            err,
            StoreError::DimensionMismatch {
                expected: 3,
                found: 2
            }
        ));
    }

    #[test]
    fn append_dimension_must_match() {
        let dir = tempfile::tempdir().unwrap();
        let store = StoreDir::new(dir.path()).course(1).unwrap();
        store.append(vec![chunk("a", vec![1.0, 0.0])]).unwrap();
        let err = store.append(vec![chunk("b", vec![1.0])]).unwrap_err();
        assert!(matches!(err, StoreError::DimensionMismatch { .. }));
        let err = store
            .append(vec![chunk("c", vec![1.0, 0.0]), chunk("d", vec![1.0, 0.0, 2.0])])
            .unwrap_err();
        assert!(matches!(err, StoreError::DimensionMismatch { .. }));
        assert_eq!(store.chunks().unwrap().len(), 1);
    }

    #[test]
    fn reload_gives_identical_results() {
        let dir = tempfile::tempdir().unwrap();
        let chunks = vec![
            chunk("alpha", vec![0.5, 0.25, -0.75]),
            DocumentChunk {
                metadata: Metadata {
                    source: "notes.txt".into(),
                    page: None,
                },
                ..chunk("beta", vec![0.125, 1.0, 0.0])
            },
        ];
        let query = [0.25, 0.5, -0.5];
        let before = {
            let store = StoreDir::new(dir.path()).course(9).unwrap();
            store.append(chunks).unwrap();
            store.search(&query, 5).unwrap()
        };
        let reopened = StoreDir::new(dir.path()).course(9).unwrap();
        assert_eq!(reopened.search(&query, 5).unwrap(), before);
        let stored = reopened.chunks().unwrap();
        assert_eq!(stored[1].metadata.page, None);
        assert_eq!(stored[0].embedding, vec![0.5, 0.25, -0.75]);
    }

    #[test]
    fn corrupt_file_is_an_error_not_empty() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("course_2.json"), "{ not json").unwrap();
        let store = StoreDir::new(dir.path()).course(2).unwrap();
        assert!(matches!(
            store.search(&[1.0], 5),
            Err(StoreError::Decode(..))
        ));
        assert!(matches!(
            store.append(vec![chunk("x", vec![1.0])]),
            Err(StoreError::Decode(..))
        ));
    }

    #[test]
    fn stores_are_per_course() {
        let dir = tempfile::tempdir().unwrap();
        let stores = StoreDir::new(dir.path());
        stores
            .course(1)
            .unwrap()
            .append(vec![chunk("a", vec![1.0])])
            .unwrap();
        assert_eq!(
            stores.course(2).unwrap().search(&[1.0], 5).unwrap(),
            SearchResult::Empty
        );
    }

    #[test]
    fn concurrent_appends_lose_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let stores = Arc::new(StoreDir::new(dir.path()));
        let handles: Vec<_> = (0..8)
            .map(|t| {
                let stores = Arc::clone(&stores);
                std::thread::spawn(move || {
                    let store = stores.course(4).unwrap();
                    for i in 0..5 {
                        store
                            .append(vec![chunk(&format!("t{t}-{i}"), vec![1.0, t as f32])])
                            .unwrap();
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        let chunks = stores.course(4).unwrap().chunks().unwrap();
        assert_eq!(chunks.len(), 40);
        let ids: BTreeSet<u64> = chunks.iter().map(|c| c.id).collect();
        assert_eq!(ids, (0..40).collect());
    }
}
