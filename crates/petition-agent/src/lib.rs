pub mod embedding;
pub mod gemini;
pub mod instruction;
pub mod ollama;
pub mod transport;

use std::sync::Arc;

use anyhow::Result;
use petition_core::{
    config::Config,
    embed::{Embedder, HashingEmbedder},
    generator::{BackendKind, GenerationBackend},
};

pub use embedding::OllamaEmbedder;
pub use gemini::GeminiBackend;
pub use ollama::OllamaBackend;

/// Generation backend selected by `GENERATION_BACKEND`.
pub fn build_backend(config: &Config) -> Result<Arc<dyn GenerationBackend>> {
    let backend: Arc<dyn GenerationBackend> = match config.backend {
        BackendKind::Ollama => Arc::new(
            OllamaBackend::new(&config.ollama_url, &config.model)
                .with_timeout(config.generation_timeout_s),
        ),
        BackendKind::Gemini => Arc::new(
            GeminiBackend::new(&config.gemini_api_key, &config.gemini_model)?
                .with_timeout(config.generation_timeout_s),
        ),
    };
    Ok(backend)
}

/// Query embedders for the (structure, content) indices, selected by `EMBEDDER`.
pub fn build_embedders(config: &Config) -> (Arc<dyn Embedder>, Arc<dyn Embedder>) {
    if config.embedder == "ollama" {
        let structure: Arc<dyn Embedder> = Arc::new(
            OllamaEmbedder::new(&config.ollama_url, &config.structure_embed_model)
                .with_timeout(config.retrieval_timeout_s),
        );
        let content: Arc<dyn Embedder> = Arc::new(
            OllamaEmbedder::new(&config.ollama_url, &config.content_embed_model)
                .with_timeout(config.retrieval_timeout_s),
        );
        return (structure, content);
    }
    let hashing: Arc<dyn Embedder> = Arc::new(HashingEmbedder::new(config.embed_dimensions));
    (Arc::clone(&hashing), hashing)
}
