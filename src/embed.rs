use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

pub const DEFAULT_EMBED_MODEL: &str = "nomic-embed-text";
pub const EMBED_MODEL_ENV_VAR: &str = "INVOBERT_EMBED_MODEL";

/// Embedding dimensionality of the default model.
pub const DEFAULT_EMBED_DIMENSION: usize = 768;

const REQUEST_TIMEOUT_SECS: u64 = 120;

/// What the text is embedded as. Retrieval-tuned models encode documents
/// and queries differently.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmbeddingMode {
    /// Indexed document text.
    Passage,
    /// A search query.
    Query,
}

/// The external embedding provider. Returns a vector of fixed
/// dimensionality; an empty result is an error, never a partial fallback.
#[async_trait]
pub trait Embedder: Send + Sync {
    fn dimension(&self) -> usize;

    async fn embed(&self, text: &str, mode: EmbeddingMode)
    -> Result<Vec<f32>>;
}

#[derive(Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    prompt: String,
}

#[derive(Deserialize)]
struct EmbedResponse {
    embedding: Vec<f32>,
}

/// [`Embedder`] backed by an Ollama-compatible HTTP endpoint.
///
/// The passage/query distinction is expressed through the
/// `search_document:` / `search_query:` instruction prefixes understood
/// by nomic-style retrieval models.
pub struct HttpEmbedder {
    base_url: String,
    model: String,
    dimension: usize,
    client: reqwest::Client,
}

impl HttpEmbedder {
    pub fn new(base_url: &str, model: &str, dimension: usize) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .expect("failed to create HTTP client");

        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            dimension,
            client,
        }
    }

    /// Resolve endpoint and model from `INVOBERT_LLM_URL` /
    /// `INVOBERT_EMBED_MODEL`, falling back to a local Ollama instance.
    pub fn from_env() -> Self {
        let base_url = std::env::var(crate::extract::LLM_URL_ENV_VAR)
            .unwrap_or_else(|_| crate::extract::DEFAULT_LLM_URL.to_string());
        let model = std::env::var(EMBED_MODEL_ENV_VAR)
            .unwrap_or_else(|_| DEFAULT_EMBED_MODEL.to_string());
        Self::new(&base_url, &model, DEFAULT_EMBED_DIMENSION)
    }
}

#[async_trait]
impl Embedder for HttpEmbedder {
    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn embed(
        &self,
        text: &str,
        mode: EmbeddingMode,
    ) -> Result<Vec<f32>> {
        let prefix = match mode {
            EmbeddingMode::Passage => "search_document",
            EmbeddingMode::Query => "search_query",
        };

        let url = format!("{}/api/embeddings", self.base_url);
        let body = EmbedRequest {
            model: &self.model,
            prompt: format!("{prefix}: {text}"),
        };

        let response =
            self.client.post(&url).json(&body).send().await.map_err(|e| {
                if e.is_connect() {
                    Error::Embedding(format!(
                        "cannot reach embedding endpoint at {}",
                        self.base_url
                    ))
                } else {
                    Error::Embedding(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Embedding(format!(
                "embedding endpoint returned {status}: {body}"
            )));
        }

        let parsed: EmbedResponse = response
            .json()
            .await
            .map_err(|e| Error::Embedding(e.to_string()))?;

        if parsed.embedding.is_empty() {
            return Err(Error::Embedding("no embedding returned".into()));
        }

        Ok(parsed.embedding)
    }
}

impl std::fmt::Debug for HttpEmbedder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpEmbedder")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("dimension", &self.dimension)
            .finish()
    }
}
