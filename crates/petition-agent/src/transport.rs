//! Mapping HTTP-level failures onto retryable vs. fatal backend errors.

use petition_core::generator::BackendError;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;

/// Longest slice of a response body kept in an error message.
const BODY_SNIPPET: usize = 300;

pub fn snippet(body: &str) -> &str {
    match body.char_indices().nth(BODY_SNIPPET) {
        Some((i, _)) => &body[..i],
        None => body,
    }
}

/// Timeouts, refused/reset connections and dropped bodies are worth one retry.
pub fn from_reqwest(service: &str, e: reqwest::Error) -> BackendError {
    if e.is_timeout() || e.is_connect() || e.is_request() || e.is_body() {
        BackendError::Transient(format!("{service} request failed: {e}"))
    } else {
        BackendError::Fatal(format!("{service} request failed: {e}"))
    }
}

/// 408, 429 and 5xx are transient; other non-success codes are not.
pub fn from_status(service: &str, status: StatusCode, body: &str) -> BackendError {
    let msg = format!("{service} returned {status}: {}", snippet(body));
    if status == StatusCode::REQUEST_TIMEOUT
        || status == StatusCode::TOO_MANY_REQUESTS
        || status.is_server_error()
    {
        BackendError::Transient(msg)
    } else {
        BackendError::Fatal(msg)
    }
}

/// Read a success body and decode it. A body cut off mid-read is transient;
/// one that arrives whole but does not parse is fatal.
pub async fn read_json<T: DeserializeOwned>(service: &str, response: reqwest::Response) -> Result<T, BackendError> {
    let body = response
        .bytes()
        .await
        .map_err(|e| BackendError::Transient(format!("{service} response body interrupted: {e}")))?;
    serde_json::from_slice(&body).map_err(|e| {
        BackendError::Fatal(format!(
            "failed to parse {service} response: {e}: {}",
            snippet(&String::from_utf8_lossy(&body))
        ))
    })
}
