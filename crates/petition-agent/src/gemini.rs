use anyhow::{bail, Result};
use async_trait::async_trait;
use petition_core::generator::{BackendError, GenerationBackend, GenerationOptions};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::instruction::{build_instruction, SYSTEM_PROMPT};
use crate::transport;

const DEFAULT_ENDPOINT: &str = "https://generativelanguage.googleapis.com/v1beta";

const SAFETY_CATEGORIES: &[&str] = &[
    "HARM_CATEGORY_HARASSMENT",
    "HARM_CATEGORY_HATE_SPEECH",
    "HARM_CATEGORY_SEXUALLY_EXPLICIT",
    "HARM_CATEGORY_DANGEROUS_CONTENT",
];

/// Calls the hosted Gemini `generateContent` REST endpoint.
pub struct GeminiBackend {
    api_key: String,
    pub model: String,
    pub endpoint: String,
    pub timeout_secs: u64,
}

impl GeminiBackend {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Result<Self> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            bail!("gemini backend requires an API key");
        }
        Ok(Self {
            api_key,
            model: model.into(),
            endpoint: DEFAULT_ENDPOINT.to_string(),
            timeout_secs: 30,
        })
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    fn url(&self) -> String {
        format!(
            "{}/models/{}:generateContent",
            self.endpoint.trim_end_matches('/'),
            self.model
        )
    }
}

#[derive(Serialize, Deserialize)]
struct Part {
    #[serde(default)]
    text: String,
}

#[derive(Serialize)]
struct Content {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<&'static str>,
    parts: Vec<Part>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    top_p: f32,
    max_output_tokens: u32,
}

#[derive(Serialize)]
struct SafetySetting {
    category: &'static str,
    threshold: &'static str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest {
    system_instruction: Content,
    contents: Vec<Content>,
    generation_config: GenerationConfig,
    safety_settings: Vec<SafetySetting>,
}

#[derive(Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<CandidateContent>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<Part>,
}

fn request_body(prompt: &str, options: &GenerationOptions) -> GenerateContentRequest {
    GenerateContentRequest {
        system_instruction: Content {
            role: None,
            parts: vec![Part {
                text: SYSTEM_PROMPT.to_string(),
            }],
        },
        contents: vec![Content {
            role: Some("user"),
            parts: vec![Part {
                text: build_instruction(prompt),
            }],
        }],
        generation_config: GenerationConfig {
            temperature: options.temperature,
            top_p: options.top_p,
            max_output_tokens: options.max_tokens,
        },
        safety_settings: SAFETY_CATEGORIES
            .iter()
            .map(|&category| SafetySetting {
                category,
                threshold: "BLOCK_MEDIUM_AND_ABOVE",
            })
            .collect(),
    }
}

/// Concatenated text of the first candidate.
fn candidate_text(resp: GenerateContentResponse) -> Result<String, BackendError> {
    let Some(candidate) = resp.candidates.into_iter().next() else {
        return Err(BackendError::Fatal("gemini returned no candidates".into()));
    };
    let text: String = candidate
        .content
        .map(|c| c.parts.into_iter().map(|p| p.text).collect())
        .unwrap_or_default();
    if text.trim().is_empty() {
        let reason = candidate.finish_reason.unwrap_or_else(|| "unknown".into());
        return Err(BackendError::Fatal(format!(
            "gemini returned no text (finish reason: {reason})"
        )));
    }
    Ok(text)
}

#[async_trait]
impl GenerationBackend for GeminiBackend {
    fn name(&self) -> &str {
        "gemini"
    }

    async fn generate(
        &self,
        prompt: &str,
        options: &GenerationOptions,
    ) -> Result<String, BackendError> {
        info!(model = %self.model, "calling gemini generateContent API");

        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(self.timeout_secs))
            .build()
            .map_err(|e| BackendError::Fatal(format!("building http client: {e}")))?;

        let response = match client
            .post(self.url())
            .header("x-goog-api-key", &self.api_key)
            .json(&request_body(prompt, options))
            .send()
            .await
        {
            Ok(r) => r,
            Err(e) => {
                warn!(model = %self.model, "gemini request failed: {e}");
                return Err(transport::from_reqwest("gemini", e));
            }
        };

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            warn!(model = %self.model, status = %status, "gemini returned non-200");
            return Err(transport::from_status("gemini", status, &text));
        }

        let parsed: GenerateContentResponse = transport::read_json("gemini", response).await?;
        let text = candidate_text(parsed)?;
        info!(model = %self.model, chars = text.len(), "gemini generation complete");
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_uses_camel_case_wire_names() {
        let body = serde_json::to_value(request_body("p", &GenerationOptions::default())).unwrap();
        assert_eq!(body["generationConfig"]["maxOutputTokens"], 4000);
        assert_eq!(body["contents"][0]["role"], "user");
        assert!(body["systemInstruction"].get("role").is_none());
        assert_eq!(body["safetySettings"].as_array().unwrap().len(), 4);
    }

    #[test]
    fn candidate_parts_are_joined() {
        let raw = r#"{"candidates":[{"content":{"parts":[{"text":"FACTS\n"},{"text":"GROUNDS"}]},"finishReason":"STOP"}]}"#;
        let resp: GenerateContentResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(candidate_text(resp).unwrap(), "FACTS\nGROUNDS");
    }

    #[test]
    fn blocked_candidate_is_fatal() {
        let raw = r#"{"candidates":[{"finishReason":"SAFETY"}]}"#;
        let resp: GenerateContentResponse = serde_json::from_str(raw).unwrap();
        let err = candidate_text(resp).unwrap_err();
        assert!(!err.is_transient());
        assert!(err.to_string().contains("SAFETY"));
    }

    #[test]
    fn empty_key_is_rejected() {
        assert!(GeminiBackend::new("  ", "gemini-2.5-flash").is_err());
    }
}
