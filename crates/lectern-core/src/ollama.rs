//! Ollama client for embeddings and summaries. Wraps ollama-rs with a simple API.

use async_trait::async_trait;
use ollama_rs::generation::completion::request::GenerationRequest;
use ollama_rs::generation::embeddings::request::{EmbeddingsInput, GenerateEmbeddingsRequest};
use ollama_rs::Ollama;
use thiserror::Error;

use crate::config::Config;
use crate::embed::{EmbedError, Embedder, SummarizeError, Summarizer};

pub const DEFAULT_EMBED_MODEL: &str = "nomic-embed-text";
pub const DEFAULT_BASE_URL: &str = "http://localhost:11434";

const SUMMARY_PROMPT: &str = "Summarize the following course material in a short paragraph. \
Keep key terms, definitions and formulas. Reply with the summary only.\n\n";

/// Thin wrapper around Ollama for embedding.
#[derive(Debug, Clone)]
pub struct OllamaClient {
    inner: Ollama,
    embed_model: String,
}

impl OllamaClient {
    /// Create from URL string. Default: http://localhost:11434.
    pub fn from_url(url: &str) -> Result<Self, OllamaError> {
        let inner = Ollama::try_new(url).map_err(OllamaError::ParseUrl)?;
        Ok(Self {
            inner,
            embed_model: DEFAULT_EMBED_MODEL.to_string(),
        })
    }

    /// Create from the `ollama_url` and `embed_model` config fields.
    pub fn from_config(config: &Config) -> Result<Self, OllamaError> {
        Ok(Self::from_url(&config.ollama_url)?.with_embed_model(config.embed_model.as_str()))
    }

    /// Set the embedding model (e.g. `nomic-embed-text`, `all-minilm`).
    pub fn with_embed_model(mut self, model: impl Into<String>) -> Self {
        self.embed_model = model.into();
        self
    }

    pub fn embed_model(&self) -> &str {
        &self.embed_model
    }

    /// A summarizer sharing this client's connection, using a generation model (e.g. `llama3.2`).
    pub fn summarizer(&self, model: impl Into<String>) -> OllamaSummarizer {
        OllamaSummarizer {
            inner: self.inner.clone(),
            model: model.into(),
        }
    }

    /// Embed a single string. Returns the embedding vector.
    pub async fn embed_text(&self, text: &str) -> Result<Vec<f32>, OllamaError> {
        let req = GenerateEmbeddingsRequest::new(
            self.embed_model.clone(),
            EmbeddingsInput::Single(text.to_string()),
        );
        let res = self
            .inner
            .generate_embeddings(req)
            .await
            .map_err(OllamaError::Request)?;
        res.embeddings
            .into_iter()
            .next()
            .filter(|v| !v.is_empty())
            .ok_or(OllamaError::EmptyEmbedding)
    }
}

#[async_trait]
impl Embedder for OllamaClient {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedError> {
        self.embed_text(text).await.map_err(|e| match e {
            OllamaError::EmptyEmbedding => EmbedError::Empty,
            other => EmbedError::Provider(Box::new(other)),
        })
    }
}

/// Summarizes long chunks with an Ollama generation model.
#[derive(Debug, Clone)]
pub struct OllamaSummarizer {
    inner: Ollama,
    model: String,
}

#[async_trait]
impl Summarizer for OllamaSummarizer {
    async fn summarize(&self, text: &str) -> Result<String, SummarizeError> {
        let prompt = format!("{SUMMARY_PROMPT}{text}");
        let req = GenerationRequest::new(self.model.clone(), prompt);
        let res = self
            .inner
            .generate(req)
            .await
            .map_err(|e| SummarizeError::Provider(Box::new(OllamaError::Request(e))))?;
        Ok(res.response.trim().to_string())
    }
}

#[derive(Debug, Error)]
pub enum OllamaError {
    #[error("invalid Ollama URL: {0}")]
    ParseUrl(#[from] url::ParseError),
    #[error("Ollama request failed: {0}")]
    Request(#[from] ollama_rs::error::OllamaError),
    #[error("Ollama returned an empty embedding")]
    EmptyEmbedding,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bad_url_is_rejected() {
        assert!(matches!(
            OllamaClient::from_url("not a url"),
            Err(OllamaError::ParseUrl(_))
        ));
    }

    #[test]
    fn config_selects_model() {
        let config = Config {
            embed_model: "all-minilm".into(),
            ..Config::default()
        };
        let client = OllamaClient::from_config(&config).unwrap();
        assert_eq!(client.embed_model(), "all-minilm");
    }
}
