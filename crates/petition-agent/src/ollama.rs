use async_trait::async_trait;
use petition_core::generator::{BackendError, GenerationBackend, GenerationOptions};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::instruction::{build_instruction, SYSTEM_PROMPT};
use crate::transport;

/// Calls a locally-hosted Ollama model via its generate API.
///
/// The default backend: petition facts stay on the local machine.
pub struct OllamaBackend {
    pub base_url: String,
    pub model: String,
    pub timeout_secs: u64,
}

impl OllamaBackend {
    pub fn new(base_url: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            model: model.into(),
            timeout_secs: 30,
        }
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }

    fn url(&self) -> String {
        format!("{}/api/generate", self.base_url.trim_end_matches('/'))
    }
}

#[derive(Serialize)]
struct OllamaOptions {
    temperature: f32,
    top_p: f32,
    num_predict: u32,
}

#[derive(Serialize)]
struct OllamaGenerateRequest<'a> {
    model: &'a str,
    prompt: String,
    system: &'a str,
    stream: bool,
    options: OllamaOptions,
}

#[derive(Deserialize)]
struct OllamaGenerateResponse {
    #[serde(default)]
    response: String,
}

#[async_trait]
impl GenerationBackend for OllamaBackend {
    fn name(&self) -> &str {
        "ollama"
    }

    async fn generate(
        &self,
        prompt: &str,
        options: &GenerationOptions,
    ) -> Result<String, BackendError> {
        let body = OllamaGenerateRequest {
            model: &self.model,
            prompt: build_instruction(prompt),
            system: SYSTEM_PROMPT,
            stream: false,
            options: OllamaOptions {
                temperature: options.temperature,
                top_p: options.top_p,
                num_predict: options.max_tokens,
            },
        };

        info!(
            model = %self.model,
            base_url = %self.base_url,
            "calling ollama generate API"
        );

        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(self.timeout_secs))
            .build()
            .map_err(|e| BackendError::Fatal(format!("building http client: {e}")))?;

        let response = match client.post(self.url()).json(&body).send().await {
            Ok(r) => r,
            Err(e) => {
                warn!(
                    model = %self.model,
                    timeout_secs = self.timeout_secs,
                    "ollama request failed: {e}"
                );
                return Err(transport::from_reqwest("ollama", e));
            }
        };

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            warn!(
                model = %self.model,
                status = %status,
                "ollama returned non-200: {}",
                transport::snippet(&text)
            );
            return Err(transport::from_status("ollama", status, &text));
        }

        let parsed: OllamaGenerateResponse = transport::read_json("ollama", response).await?;

        if parsed.response.trim().is_empty() {
            return Err(BackendError::Fatal("ollama returned an empty response".into()));
        }
        info!(model = %self.model, chars = parsed.response.len(), "ollama generation complete");
        Ok(parsed.response)
    }
}
