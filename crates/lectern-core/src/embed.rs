//! Embedding and summarization collaborators, and the policy deciding when to summarize.

use std::borrow::Cow;

use async_trait::async_trait;
use tracing::{debug, warn};

/// Chunks longer than this many characters are summarized before embedding.
pub const DEFAULT_SUMMARIZE_THRESHOLD: usize = 4000;

/// Turns text into a fixed-length vector. The length is fixed per model.
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedError>;
}

/// Compresses long text so it fits within the embedding model's input limits.
#[async_trait]
pub trait Summarizer: Send + Sync {
    async fn summarize(&self, text: &str) -> Result<String, SummarizeError>;
}

/// Summarize only text longer than `threshold_chars`; short text is embedded as-is.
///
/// Summarization is best-effort: on failure (or an empty summary) the original text is used.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SummarizeIfLonger {
    pub threshold_chars: usize,
}

impl Default for SummarizeIfLonger {
    fn default() -> Self {
        Self {
            threshold_chars: DEFAULT_SUMMARIZE_THRESHOLD,
        }
    }
}

impl SummarizeIfLonger {
    pub fn new(threshold_chars: usize) -> Self {
        Self { threshold_chars }
    }

    pub fn applies_to(&self, text: &str) -> bool {
        text.chars().count() > self.threshold_chars
    }

    /// Returns the text to embed for `text`.
    pub async fn prepare<'a>(
        &self,
        summarizer: Option<&dyn Summarizer>,
        text: &'a str,
    ) -> Cow<'a, str> {
        let Some(summarizer) = summarizer.filter(|_| self.applies_to(text)) else {
            return Cow::Borrowed(text);
        };
        match summarizer.summarize(text).await {
            Ok(summary) if !summary.trim().is_empty() => {
                debug!(
                    from = text.len(),
                    to = summary.len(),
                    "summarized chunk before embedding"
                );
                Cow::Owned(summary)
            }
            Ok(_) => {
                warn!("summarizer returned nothing; embedding original text");
                Cow::Borrowed(text)
            }
            Err(e) => {
                warn!(error = %e, "summarization failed; embedding original text");
                Cow::Borrowed(text)
            }
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum EmbedError {
    #[error("embedding request failed: {0}")]
    Provider(#[source] Box<dyn std::error::Error + Send + Sync>),
    #[error("embedding provider returned no vector")]
    Empty,
}

#[derive(Debug, thiserror::Error)]
pub enum SummarizeError {
    #[error("summarization request failed: {0}")]
    Provider(#[source] Box<dyn std::error::Error + Send + Sync>),
}
