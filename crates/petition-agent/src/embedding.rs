use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use petition_core::embed::Embedder;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::transport;

/// Query embeddings from an Ollama embedding model (`/api/embeddings`).
///
/// Must be the model the index was built with; the width is only known
/// after the first call, and a mismatch surfaces as a retrieval error.
pub struct OllamaEmbedder {
    pub base_url: String,
    pub model: String,
    pub timeout_secs: u64,
}

impl OllamaEmbedder {
    pub fn new(base_url: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            model: model.into(),
            timeout_secs: 10,
        }
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    prompt: &'a str,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    #[serde(default)]
    embedding: Vec<f32>,
}

#[async_trait]
impl Embedder for OllamaEmbedder {
    fn name(&self) -> &str {
        &self.model
    }

    fn dimensions(&self) -> Option<usize> {
        None
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let url = format!("{}/api/embeddings", self.base_url.trim_end_matches('/'));
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(self.timeout_secs))
            .build()?;

        let response = client
            .post(&url)
            .json(&EmbeddingRequest {
                model: &self.model,
                prompt: text,
            })
            .send()
            .await
            .with_context(|| format!("ollama embeddings request to {url}"))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            bail!("ollama embeddings returned {status}: {}", transport::snippet(&body));
        }

        let parsed: EmbeddingResponse = response
            .json()
            .await
            .context("parsing ollama embeddings response")?;
        if parsed.embedding.is_empty() {
            bail!("ollama model '{}' returned an empty embedding", self.model);
        }
        debug!(model = %self.model, dims = parsed.embedding.len(), "query embedded");
        Ok(parsed.embedding)
    }
}
