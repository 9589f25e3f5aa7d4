use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use crate::error::PetitionError;

/// Which language-model service drafts the petition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Local Ollama server.
    Ollama,
    /// Hosted Gemini API.
    Gemini,
}

impl BackendKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ollama => "ollama",
            Self::Gemini => "gemini",
        }
    }
}

impl FromStr for BackendKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ollama" | "local" => Ok(Self::Ollama),
            "gemini" | "hosted" => Ok(Self::Gemini),
            other => Err(format!(
                "unknown generation backend '{other}' (expected ollama or gemini)"
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GenerationOptions {
    pub temperature: f32,
    pub top_p: f32,
    pub max_tokens: u32,
}

impl Default for GenerationOptions {
    fn default() -> Self {
        Self {
            temperature: 0.7,
            top_p: 0.9,
            max_tokens: 4000,
        }
    }
}

#[derive(Debug, Clone, Error)]
pub enum BackendError {
    /// Connection reset/refused, request timeout, 429/5xx. Worth one retry.
    #[error("transient: {0}")]
    Transient(String),
    #[error("{0}")]
    Fatal(String),
}

impl BackendError {
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}

/// A language-model service. Implementations live in `petition-agent`.
#[async_trait]
pub trait GenerationBackend: Send + Sync {
    fn name(&self) -> &str;

    async fn generate(
        &self,
        prompt: &str,
        options: &GenerationOptions,
    ) -> Result<String, BackendError>;
}

/// Text from one successful invocation.
#[derive(Debug, Clone)]
pub struct Generation {
    pub text: String,
    /// The transient failure that was retried, if any.
    pub retried_after: Option<String>,
}

/// Wraps a backend with a per-call timeout and a single retry on transient
/// failure. Anything past that is a `GenerationService` error.
pub struct GenerationInvoker {
    backend: Arc<dyn GenerationBackend>,
    options: GenerationOptions,
    timeout: Duration,
}

impl GenerationInvoker {
    pub fn new(
        backend: Arc<dyn GenerationBackend>,
        options: GenerationOptions,
        timeout: Duration,
    ) -> Self {
        Self {
            backend,
            options,
            timeout,
        }
    }

    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }

    async fn call_once(&self, prompt: &str) -> Result<String, BackendError> {
        let call = self.backend.generate(prompt, &self.options);
        match tokio::time::timeout(self.timeout, call).await {
            Ok(r) => r,
            Err(_) => Err(BackendError::Transient(format!(
                "no response within {:?}",
                self.timeout
            ))),
        }
    }

    /// Generate once, retrying a single time if the first failure is transient.
    pub async fn invoke(&self, session_id: &str, prompt: &str) -> Result<Generation, PetitionError> {
        info!(
            session_id,
            backend = self.backend.name(),
            prompt_chars = prompt.len(),
            "invoking generation backend"
        );
        match self.call_once(prompt).await {
            Ok(text) => Ok(Generation {
                text,
                retried_after: None,
            }),
            Err(e) if e.is_transient() => {
                warn!(
                    session_id,
                    backend = self.backend.name(),
                    "transient generation failure, retrying once: {e}"
                );
                match self.call_once(prompt).await {
                    Ok(text) => Ok(Generation {
                        text,
                        retried_after: Some(e.to_string()),
                    }),
                    Err(e2) => Err(PetitionError::GenerationService(format!(
                        "{} failed after retry: {e2}",
                        self.backend.name()
                    ))),
                }
            }
            Err(e) => Err(PetitionError::GenerationService(format!(
                "{}: {e}",
                self.backend.name()
            ))),
        }
    }
}
