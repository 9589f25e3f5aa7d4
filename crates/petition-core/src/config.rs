use std::collections::HashMap;
use std::time::Duration;

use anyhow::{bail, Result};

use crate::generator::{BackendKind, GenerationOptions};

/// Full application configuration.
/// Secrets (API keys) come from env/.env only and are never logged.
#[derive(Debug, Clone)]
pub struct Config {
    // Index store
    pub index_dir: String,
    /// Below this many filtered candidates a search scans exhaustively.
    pub exact_scan_threshold: usize,
    pub lsh_tables: usize,
    pub lsh_bits: usize,
    pub lsh_seed: u64,

    // Embedding
    /// "hashing" (default) or "ollama".
    pub embedder: String,
    pub embed_dimensions: usize,
    pub structure_embed_model: String,
    pub content_embed_model: String,

    // Generation
    pub backend: BackendKind,
    pub ollama_url: String,
    pub model: String,
    pub gemini_api_key: String,
    pub gemini_model: String,
    pub temperature: f32,
    pub top_p: f32,
    pub max_tokens: u32,

    // Workflow
    pub generation_timeout_s: u64,
    pub retrieval_timeout_s: u64,
    pub max_retries: u32,
    pub top_k: usize,
    pub min_output_chars: usize,

    // Web
    pub web_bind: String,
    pub web_port: u16,
}

fn parse_dotenv() -> HashMap<String, String> {
    let mut map = HashMap::new();
    let Ok(contents) = std::fs::read_to_string(".env") else {
        return map;
    };
    parse_dotenv_str(&contents, &mut map);
    map
}

fn parse_dotenv_str(contents: &str, map: &mut HashMap<String, String>) {
    for line in contents.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if let Some((k, v)) = line.split_once('=') {
            let v = v.trim().trim_matches('"');
            map.insert(k.trim().to_string(), v.to_string());
        }
    }
}

fn get_str(key: &str, vars: &HashMap<String, String>, default: &str) -> String {
    vars.get(key).cloned().unwrap_or_else(|| default.to_string())
}

fn get_parsed<T: std::str::FromStr>(key: &str, vars: &HashMap<String, String>, default: T) -> T {
    vars.get(key)
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

impl Config {
    /// Load from the process environment, falling back to `.env` in the working directory.
    pub fn from_env() -> Result<Self> {
        let mut vars = parse_dotenv();
        vars.extend(std::env::vars());
        Self::from_vars(&vars)
    }

    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self> {
        let backend_raw = get_str("GENERATION_BACKEND", vars, "ollama");
        let backend: BackendKind = backend_raw
            .parse()
            .map_err(|e: String| anyhow::anyhow!(e))?;

        let embedder = get_str("EMBEDDER", vars, "hashing").to_ascii_lowercase();
        if !matches!(embedder.as_str(), "hashing" | "ollama") {
            bail!("EMBEDDER must be 'hashing' or 'ollama', got '{embedder}'");
        }

        let gemini_api_key = get_str("GEMINI_API_KEY", vars, "");
        if backend == BackendKind::Gemini && gemini_api_key.is_empty() {
            bail!("GENERATION_BACKEND=gemini requires GEMINI_API_KEY");
        }

        let top_k = get_parsed("TOP_K", vars, 5usize);
        if top_k == 0 {
            bail!("TOP_K must be at least 1");
        }

        Ok(Config {
            index_dir: get_str("INDEX_DIR", vars, "indexes"),
            exact_scan_threshold: get_parsed("EXACT_SCAN_THRESHOLD", vars, 10_000),
            lsh_tables: get_parsed("LSH_TABLES", vars, 8),
            lsh_bits: get_parsed::<usize>("LSH_BITS", vars, 12).clamp(1, 63),
            lsh_seed: get_parsed("LSH_SEED", vars, 1337),
            embedder,
            embed_dimensions: get_parsed("EMBED_DIMENSIONS", vars, 384),
            structure_embed_model: get_str("STRUCTURE_EMBED_MODEL", vars, "all-minilm"),
            content_embed_model: get_str("CONTENT_EMBED_MODEL", vars, "nomic-embed-text"),
            backend,
            ollama_url: get_str("OLLAMA_URL", vars, "http://localhost:11434"),
            model: get_str("MODEL", vars, "lawgorithm:latest"),
            gemini_api_key,
            gemini_model: get_str("GEMINI_MODEL", vars, "gemini-2.5-flash"),
            temperature: get_parsed("TEMPERATURE", vars, 0.7),
            top_p: get_parsed("TOP_P", vars, 0.9),
            max_tokens: get_parsed("MAX_TOKENS", vars, 4000),
            generation_timeout_s: get_parsed("GENERATION_TIMEOUT_S", vars, 30),
            retrieval_timeout_s: get_parsed("RETRIEVAL_TIMEOUT_S", vars, 10),
            max_retries: get_parsed("MAX_RETRIES", vars, 3),
            top_k,
            min_output_chars: get_parsed("MIN_OUTPUT_CHARS", vars, 500),
            web_bind: get_str("WEB_BIND", vars, "127.0.0.1"),
            web_port: get_parsed("WEB_PORT", vars, 3141),
        })
    }

    pub fn generation_options(&self) -> GenerationOptions {
        GenerationOptions {
            temperature: self.temperature,
            top_p: self.top_p,
            max_tokens: self.max_tokens,
        }
    }

    pub fn generation_timeout(&self) -> Duration {
        Duration::from_secs(self.generation_timeout_s)
    }

    pub fn retrieval_timeout(&self) -> Duration {
        Duration::from_secs(self.retrieval_timeout_s)
    }
}
