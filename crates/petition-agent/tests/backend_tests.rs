use std::collections::HashMap;

use petition_agent::{build_backend, build_embedders, GeminiBackend, OllamaBackend, OllamaEmbedder};
use petition_core::config::Config;
use petition_core::embed::Embedder;
use petition_core::generator::{GenerationBackend, GenerationOptions};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tracing_test::traced_test;

// ── helpers ──────────────────────────────────────────────────────────────────

/// Serve exactly one HTTP request with a canned response. Resolves to the
/// raw request (head and body) once it has been answered.
async fn one_shot_server(status: &'static str, body: String) -> (String, tokio::task::JoinHandle<String>) {
    let reply = format!(
        "HTTP/1.1 {status}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
        body.len()
    );
    raw_server(reply).await
}

/// Like [`one_shot_server`], but writes `reply` verbatim.
async fn raw_server(reply: String) -> (String, tokio::task::JoinHandle<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let handle = tokio::spawn(async move {
        let (mut sock, _) = listener.accept().await.unwrap();
        let mut buf = Vec::new();
        let mut chunk = [0u8; 4096];
        loop {
            let n = sock.read(&mut chunk).await.unwrap();
            if n == 0 {
                break;
            }
            buf.extend_from_slice(&chunk[..n]);
            let text = String::from_utf8_lossy(&buf);
            if let Some(head_end) = text.find("\r\n\r\n") {
                let len = text[..head_end]
                    .lines()
                    .find_map(|l| {
                        let (k, v) = l.split_once(':')?;
                        k.eq_ignore_ascii_case("content-length").then(|| v.trim().parse::<usize>().ok())?
                    })
                    .unwrap_or(0);
                if buf.len() >= head_end + 4 + len {
                    break;
                }
            }
        }
        sock.write_all(reply.as_bytes()).await.unwrap();
        sock.shutdown().await.ok();
        String::from_utf8_lossy(&buf).into_owned()
    });
    (format!("http://{addr}"), handle)
}

fn options() -> GenerationOptions {
    GenerationOptions {
        temperature: 0.2,
        top_p: 0.8,
        max_tokens: 1234,
    }
}

// ── ollama ───────────────────────────────────────────────────────────────────

#[tokio::test]
#[traced_test]
async fn ollama_returns_response_text_and_forwards_options() {
    let (url, server) = one_shot_server("200 OK", r#"{"response":"FACTS\nGROUNDS\nRELIEF","done":true}"#.into()).await;
    let backend = OllamaBackend::new(url, "lawgorithm:latest");

    let text = backend.generate("<petition_request/>", &options()).await.unwrap();

    assert_eq!(text, "FACTS\nGROUNDS\nRELIEF");
    let request = server.await.unwrap();
    assert!(request.starts_with("POST /api/generate"));
    assert!(request.contains(r#""num_predict":1234"#));
    assert!(request.contains(r#""stream":false"#));
    assert!(request.contains(r#""model":"lawgorithm:latest""#));
    assert!(logs_contain("calling ollama generate API"));
}

#[tokio::test]
#[traced_test]
async fn ollama_refused_connection_is_transient() {
    let backend = OllamaBackend::new("http://127.0.0.1:1", "lawgorithm:latest").with_timeout(2);

    let err = backend.generate("p", &options()).await.unwrap_err();

    assert!(err.is_transient(), "{err}");
    assert!(logs_contain("ollama request failed"));
}

#[tokio::test]
async fn ollama_server_error_is_transient_and_bad_request_is_not() {
    let (url, _server) = one_shot_server("503 Service Unavailable", r#"{"error":"loading model"}"#.into()).await;
    let err = OllamaBackend::new(url, "m").generate("p", &options()).await.unwrap_err();
    assert!(err.is_transient());

    let (url, _server) = one_shot_server("404 Not Found", r#"{"error":"model not found"}"#.into()).await;
    let err = OllamaBackend::new(url, "m").generate("p", &options()).await.unwrap_err();
    assert!(!err.is_transient());
    assert!(err.to_string().contains("model not found"));
}

#[tokio::test]
async fn ollama_empty_response_is_fatal() {
    let (url, _server) = one_shot_server("200 OK", r#"{"response":"   ","done":true}"#.into()).await;
    let err = OllamaBackend::new(url, "m").generate("p", &options()).await.unwrap_err();
    assert!(!err.is_transient());
}

#[tokio::test]
async fn ollama_body_cut_off_mid_read_is_transient() {
    let partial = r#"{"response":"STATEMENT OF FA"#;
    let reply = format!(
        "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: 400\r\n\r\n{partial}"
    );
    let (url, _server) = raw_server(reply).await;

    let err = OllamaBackend::new(url, "m").generate("p", &options()).await.unwrap_err();

    assert!(err.is_transient(), "{err}");
}

#[tokio::test]
async fn ollama_malformed_body_is_fatal() {
    let (url, _server) = one_shot_server("200 OK", "<html>proxy error</html>".into()).await;
    let err = OllamaBackend::new(url, "m").generate("p", &options()).await.unwrap_err();
    assert!(!err.is_transient());
    assert!(err.to_string().contains("proxy error"), "{err}");
}

// ── gemini ───────────────────────────────────────────────────────────────────

#[tokio::test]
async fn gemini_posts_generate_content_with_key_header() {
    let body = r#"{"candidates":[{"content":{"parts":[{"text":"PRAYER"}]},"finishReason":"STOP"}]}"#;
    let (url, server) = one_shot_server("200 OK", body.into()).await;
    let backend = GeminiBackend::new("test-key", "gemini-2.5-flash").unwrap().with_endpoint(url);

    let text = backend.generate("p", &options()).await.unwrap();

    assert_eq!(text, "PRAYER");
    let request = server.await.unwrap();
    assert!(request.starts_with("POST /models/gemini-2.5-flash:generateContent"));
    assert!(request.to_ascii_lowercase().contains("x-goog-api-key: test-key"));
    assert!(request.contains(r#""maxOutputTokens":1234"#));
}

#[tokio::test]
async fn gemini_rate_limit_is_transient() {
    let (url, _server) = one_shot_server("429 Too Many Requests", r#"{"error":{"message":"quota"}}"#.into()).await;
    let backend = GeminiBackend::new("k", "gemini-2.5-flash").unwrap().with_endpoint(url);
    assert!(backend.generate("p", &options()).await.unwrap_err().is_transient());
}

// ── embeddings ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn ollama_embedder_returns_vector() {
    let (url, server) = one_shot_server("200 OK", r#"{"embedding":[0.1,0.2,0.3]}"#.into()).await;
    let embedder = OllamaEmbedder::new(url, "nomic-embed-text");

    let v = embedder.embed("writ petition").await.unwrap();

    assert_eq!(v.len(), 3);
    let request = server.await.unwrap();
    assert!(request.starts_with("POST /api/embeddings"));
    assert!(request.contains(r#""prompt":"writ petition""#));
}

#[tokio::test]
async fn ollama_embedder_rejects_empty_vector() {
    let (url, _server) = one_shot_server("200 OK", r#"{"embedding":[]}"#.into()).await;
    assert!(OllamaEmbedder::new(url, "m").embed("x").await.is_err());
}

// ── factory ──────────────────────────────────────────────────────────────────

fn config(pairs: &[(&str, &str)]) -> Config {
    let vars: HashMap<String, String> = pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
    Config::from_vars(&vars).unwrap()
}

#[test]
fn factory_selects_backend_by_config() {
    assert_eq!(build_backend(&config(&[])).unwrap().name(), "ollama");
    let gemini = config(&[("GENERATION_BACKEND", "gemini"), ("GEMINI_API_KEY", "k")]);
    assert_eq!(build_backend(&gemini).unwrap().name(), "gemini");
}

#[test]
fn factory_selects_embedders_by_config() {
    let (s, c) = build_embedders(&config(&[("EMBED_DIMENSIONS", "128")]));
    assert_eq!(s.dimensions(), Some(128));
    assert_eq!(c.name(), "hashing");

    let (s, c) = build_embedders(&config(&[("EMBEDDER", "ollama")]));
    assert_eq!(s.name(), "all-minilm");
    assert_eq!(c.name(), "nomic-embed-text");
    assert_eq!(s.dimensions(), None);
}
