//! Ingestion (load → chunk → summarize → embed → append) and query (embed → search → context).

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::chunks::{chunk_documents, ChunkConfig};
use crate::config::Config;
use crate::documents::{scan_materials, DocumentLoader, FileLoader, LoadError};
use crate::embed::{EmbedError, Embedder, SummarizeIfLonger, Summarizer};
use crate::store::{DocumentChunk, SearchResult, StoreDir, StoreError, StoreStats};

/// Number of chunks retrieved per question.
pub const DEFAULT_TOP_K: usize = 5;

/// Returned as the content when a course has nothing indexed.
pub const NO_MATERIALS: &str = "No course materials have been indexed yet.";

#[derive(Debug, Clone, PartialEq)]
pub struct RetrievalOptions {
    pub chunking: ChunkConfig,
    pub summarize: SummarizeIfLonger,
    pub top_k: usize,
}

impl Default for RetrievalOptions {
    fn default() -> Self {
        Self {
            chunking: ChunkConfig::default(),
            summarize: SummarizeIfLonger::default(),
            top_k: DEFAULT_TOP_K,
        }
    }
}

impl From<&Config> for RetrievalOptions {
    fn from(config: &Config) -> Self {
        Self {
            chunking: ChunkConfig::from(config),
            summarize: SummarizeIfLonger::new(config.summarize_threshold),
            top_k: config.top_k,
        }
    }
}

/// Context for answering a question: retrieved chunk texts plus the files they came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QueryAnswer {
    /// Retrieved chunk texts, best match first, separated by blank lines.
    pub content: String,
    /// Distinct file names (not full paths) of the retrieved chunks.
    pub sources: BTreeSet<String>,
}

impl QueryAnswer {
    pub fn no_materials() -> Self {
        Self {
            content: NO_MATERIALS.to_string(),
            sources: BTreeSet::new(),
        }
    }
}

/// Outcome of ingesting a directory. Each file succeeds or fails on its own.
#[derive(Debug, Default)]
pub struct IngestReport {
    /// Files ingested, with the number of chunks each added.
    pub ingested: Vec<(PathBuf, usize)>,
    /// Files that failed, with the reason.
    pub failed: Vec<(PathBuf, String)>,
}

/// Orchestrates ingestion and retrieval over the per-course stores.
pub struct RetrievalService {
    loader: Box<dyn DocumentLoader>,
    embedder: Arc<dyn Embedder>,
    summarizer: Option<Arc<dyn Summarizer>>,
    stores: StoreDir,
    options: RetrievalOptions,
}

impl RetrievalService {
    pub fn new(stores: StoreDir, embedder: impl Embedder + 'static) -> Self {
        Self {
            loader: Box::new(FileLoader::new()),
            embedder: Arc::new(embedder),
            summarizer: None,
            stores,
            options: RetrievalOptions::default(),
        }
    }

    pub fn with_loader(mut self, loader: impl DocumentLoader + 'static) -> Self {
        self.loader = Box::new(loader);
        self
    }

    pub fn with_summarizer(mut self, summarizer: impl Summarizer + 'static) -> Self {
        self.summarizer = Some(Arc::new(summarizer));
        self
    }

    pub fn with_options(mut self, options: RetrievalOptions) -> Self {
        self.options = options;
        self
    }

    pub fn options(&self) -> &RetrievalOptions {
        &self.options
    }

    pub fn stores(&self) -> &StoreDir {
        &self.stores
    }

    /// Ingests one file into the course's store. All or nothing: on any error the
    /// store is left untouched. Returns the number of chunks added.
    pub async fn ingest(&self, path: &Path, course_id: u64) -> Result<usize, RetrievalError> {
        self.ingest_with_cancel(path, course_id, &CancellationToken::new())
            .await
    }

    /// Like [`ingest`](Self::ingest), checking `cancel` before embedding each chunk.
    pub async fn ingest_with_cancel(
        &self,
        path: &Path,
        course_id: u64,
        cancel: &CancellationToken,
    ) -> Result<usize, RetrievalError> {
        let documents = self.loader.load(path)?;
        let chunks = chunk_documents(&documents, &self.options.chunking);
        debug!(
            source = %path.display(),
            records = documents.len(),
            chunks = chunks.len(),
            "chunked document"
        );

        let summarizer = self.summarizer.as_deref();
        let mut embedded = Vec::with_capacity(chunks.len());
        for (i, chunk) in chunks.into_iter().enumerate() {
            if cancel.is_cancelled() {
                return Err(RetrievalError::Cancelled);
            }
            let embedding = {
                let input = self.options.summarize.prepare(summarizer, &chunk.text).await;
                self.embedder.embed(&input).await?
            };
            embedded.push(DocumentChunk {
                id: i as u64,
                text: chunk.text,
                embedding,
                metadata: chunk.metadata,
            });
        }

        if embedded.is_empty() {
            info!(course_id, source = %path.display(), "no content to index");
            return Ok(0);
        }
        let added = embedded.len();
        self.stores.course(course_id)?.append(embedded)?;
        info!(course_id, source = %path.display(), chunks = added, "ingested file");
        Ok(added)
    }

    /// Ingests every supported file under `root`. A failing file is logged and
    /// reported; it does not stop the others.
    pub async fn ingest_dir(
        &self,
        root: &Path,
        course_id: u64,
        cancel: &CancellationToken,
    ) -> Result<IngestReport, RetrievalError> {
        let mut report = IngestReport::default();
        for path in scan_materials(root)? {
            match self.ingest_with_cancel(&path, course_id, cancel).await {
                Ok(n) => report.ingested.push((path, n)),
                Err(RetrievalError::Cancelled) => return Err(RetrievalError::Cancelled),
                Err(e) => {
                    warn!(course_id, source = %path.display(), error = %e, "failed to ingest file");
                    report.failed.push((path, e.to_string()));
                }
            }
        }
        Ok(report)
    }

    /// Retrieves the context for `question` from the course's store.
    pub async fn query(&self, question: &str, course_id: u64) -> Result<QueryAnswer, RetrievalError> {
        let query_vector = self.embedder.embed(question).await?;
        let store = self.stores.course(course_id)?;
        let hits = match store.search(&query_vector, self.options.top_k)? {
            SearchResult::Empty => return Ok(QueryAnswer::no_materials()),
            SearchResult::Ranked(hits) => hits,
        };
        let content = hits
            .iter()
            .map(|h| h.chunk.text.as_str())
            .collect::<Vec<_>>()
            .join("\n\n");
        let sources = hits
            .iter()
            .map(|h| source_name(&h.chunk.metadata.source))
            .collect();
        debug!(course_id, hits = hits.len(), "answered query");
        Ok(QueryAnswer { content, sources })
    }

    pub fn stats(&self, course_id: u64) -> Result<StoreStats, RetrievalError> {
        Ok(self.stores.course(course_id)?.stats()?)
    }
}

/// File name of a stored source path, or the whole string if it has none.
fn source_name(source: &str) -> String {
    Path::new(source)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| source.to_string())
}

#[derive(Debug, thiserror::Error)]
pub enum RetrievalError {
    #[error(transparent)]
    Load(#[from] LoadError),
    #[error(transparent)]
    Embedding(#[from] EmbedError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("ingestion cancelled")]
    Cancelled,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn source_name_is_basename() {
        assert_eq!(source_name("/srv/uploads/12/lecture-3.pdf"), "lecture-3.pdf");
        assert_eq!(source_name("notes.txt"), "notes.txt");
        assert_eq!(source_name(""), "");
    }

    #[test]
    fn options_follow_config() {
        let config = Config {
            chunk_size: 500,
            chunk_overlap: 50,
            summarize_threshold: 1200,
            top_k: 3,
            ..Config::default()
        };
        let options = RetrievalOptions::from(&config);
        assert_eq!(options.chunking, ChunkConfig::new(500, 50));
        assert_eq!(options.summarize.threshold_chars, 1200);
        assert_eq!(options.top_k, 3);
    }

    #[test]
    fn no_materials_sentinel() {
        let answer = QueryAnswer::no_materials();
        assert_eq!(answer.content, "No course materials have been indexed yet.");
        assert!(answer.sources.is_empty());
    }
}
