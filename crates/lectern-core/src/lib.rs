//! Document indexing and retrieval for course materials, independent of how it is run
//! (CLI or a web backend).
//!
//! Uploaded files are loaded, chunked, embedded and appended to a per-course vector
//! store; questions are answered by retrieving the most similar chunks. Lectern keeps
//! its config and default store directory in its own app data directory (see [app_data]).

pub mod app_data;
pub mod chunks;
pub mod config;
pub mod documents;
pub mod embed;
pub mod ollama;
pub mod retrieval;
pub mod store;

pub use app_data::{app_data_dir, default_store_dir};
pub use chunks::{chunk_documents, split_text, Chunk, ChunkConfig};
pub use config::{load_config, save_config, set_store_dir, Config, ConfigError};
pub use documents::{
    scan_materials, Document, DocumentFormat, DocumentLoader, FileLoader, LoadError, Metadata,
    PdfDecoder,
};
pub use embed::{EmbedError, Embedder, SummarizeError, SummarizeIfLonger, Summarizer};
pub use ollama::{OllamaClient, OllamaError, OllamaSummarizer};
pub use retrieval::{
    IngestReport, QueryAnswer, RetrievalError, RetrievalOptions, RetrievalService, NO_MATERIALS,
};
pub use store::{
    cosine_similarity, DocumentChunk, RankedChunk, SearchResult, StoreDir, StoreError, StoreStats,
    VectorStore,
};

/// Returns a short status string. Used to verify the backend is wired up.
pub fn status() -> &'static str {
    "lectern-core ready"
}
