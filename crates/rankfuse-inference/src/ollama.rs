//! Ollama embedding backend (`POST /api/embed`).

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::{debug, info, instrument, warn};

use rankfuse_core::{defaults, EmbeddingBackend, Error, Result, Vector};

/// Connection settings for an Ollama server.
#[derive(Debug, Clone)]
pub struct OllamaConfig {
    /// Base URL without a trailing slash, e.g. `http://localhost:11434`.
    pub base_url: String,
    /// Per-request timeout for embedding calls.
    pub timeout: Duration,
    /// Calls slower than this are logged with `slow = true`.
    pub slow_threshold: Duration,
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            base_url: defaults::OLLAMA_URL.to_string(),
            timeout: Duration::from_secs(defaults::EMBED_TIMEOUT_SECS),
            slow_threshold: Duration::from_millis(defaults::EMBED_SLOW_MS),
        }
    }
}

impl OllamaConfig {
    /// Create a configuration for `base_url` with default timeouts.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            ..Self::default()
        }
    }

    /// Read `OLLAMA_URL` and `RANKFUSE_EMBED_TIMEOUT_SECS`, falling back to
    /// defaults for anything unset or unparsable.
    pub fn from_env() -> Self {
        let base_url = std::env::var(defaults::ENV_OLLAMA_URL)
            .unwrap_or_else(|_| defaults::OLLAMA_URL.to_string());
        let timeout_secs = std::env::var(defaults::ENV_EMBED_TIMEOUT_SECS)
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(defaults::EMBED_TIMEOUT_SECS);
        Self::new(base_url).timeout(Duration::from_secs(timeout_secs))
    }

    /// Set the request timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the slow-call warning threshold.
    pub fn slow_threshold(mut self, threshold: Duration) -> Self {
        self.slow_threshold = threshold;
        self
    }
}

/// Ollama embedding backend.
///
/// Holds one HTTP client; construct it once per sweep and share it by
/// reference.
pub struct OllamaBackend {
    client: Client,
    config: OllamaConfig,
}

impl OllamaBackend {
    /// Create a backend from explicit configuration.
    pub fn new(config: OllamaConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| Error::Config(format!("Failed to create HTTP client: {}", e)))?;

        info!(
            subsystem = "inference",
            component = "ollama",
            base_url = %config.base_url,
            timeout_secs = config.timeout.as_secs(),
            "Initializing Ollama embedding backend"
        );

        Ok(Self { client, config })
    }

    /// Create from environment variables.
    pub fn from_env() -> Result<Self> {
        Self::new(OllamaConfig::from_env())
    }

    /// Base URL requests are sent to.
    pub fn base_url(&self) -> &str {
        &self.config.base_url
    }
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    embeddings: Vec<Vec<f32>>,
}

#[async_trait]
impl EmbeddingBackend for OllamaBackend {
    #[instrument(skip(self, texts), fields(subsystem = "inference", component = "ollama", op = "embed_texts", model = %model, input_count = texts.len()))]
    async fn embed_texts(&self, texts: &[String], model: &str) -> Result<Vec<Vector>> {
        if texts.is_empty() {
            return Ok(vec![]);
        }

        let start = Instant::now();
        let unavailable = |reason: String| Error::ModelUnavailable {
            model: model.to_string(),
            reason,
        };

        let request = EmbeddingRequest {
            model,
            input: texts,
        };

        let response = self
            .client
            .post(format!("{}/api/embed", self.config.base_url))
            .json(&request)
            .send()
            .await
            .map_err(|e| unavailable(format!("Request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(unavailable(format!("Ollama returned {}: {}", status, body)));
        }

        let result: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| unavailable(format!("Failed to parse response: {}", e)))?;

        let vectors: Vec<Vector> = result.embeddings.into_iter().map(Vector::from).collect();
        let elapsed = start.elapsed();

        debug!(
            result_count = vectors.len(),
            duration_ms = elapsed.as_millis() as u64,
            "Embedding complete"
        );
        if elapsed > self.config.slow_threshold {
            warn!(
                duration_ms = elapsed.as_millis() as u64,
                input_count = texts.len(),
                slow = true,
                "Slow embedding operation"
            );
        }
        Ok(vectors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = OllamaConfig::default();
        assert_eq!(config.base_url, "http://localhost:11434");
        assert_eq!(config.timeout, Duration::from_secs(180));
    }

    #[test]
    fn test_new_trims_trailing_slash() {
        let config = OllamaConfig::new("http://ollama:11434/");
        assert_eq!(config.base_url, "http://ollama:11434");
    }

    #[test]
    fn test_config_builder() {
        let config = OllamaConfig::new("http://x")
            .timeout(Duration::from_secs(5))
            .slow_threshold(Duration::from_millis(10));
        assert_eq!(config.timeout, Duration::from_secs(5));
        assert_eq!(config.slow_threshold, Duration::from_millis(10));
    }

    #[test]
    fn test_embedding_request_serialization() {
        let input = vec!["猫".to_string(), "犬".to_string()];
        let request = EmbeddingRequest {
            model: "nomic-embed-text:v1.5",
            input: &input,
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["model"], "nomic-embed-text:v1.5");
        assert_eq!(json["input"][1], "犬");
    }

    #[test]
    fn test_embedding_response_deserialization() {
        let json = r#"{"model":"m","embeddings":[[0.1,0.2],[0.3,0.4]],"total_duration":1}"#;
        let response: EmbeddingResponse = serde_json::from_str(json).unwrap();
        assert_eq!(response.embeddings.len(), 2);
        assert_eq!(response.embeddings[1], vec![0.3, 0.4]);
    }

    #[tokio::test]
    async fn test_empty_input_skips_request() {
        // Port 9 is discard; nothing should be sent at all.
        let backend = OllamaBackend::new(OllamaConfig::new("http://127.0.0.1:9")).unwrap();
        let vectors = backend.embed_texts(&[], "m").await.unwrap();
        assert!(vectors.is_empty());
    }
}
