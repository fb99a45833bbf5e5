//! Mock embedding backend for deterministic testing.
//!
//! Generates embeddings from the text itself, so the same text always maps
//! to the same vector and sweeps over the mock are reproducible.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use rankfuse_core::{EmbeddingBackend, EmbeddingModel};
//! use rankfuse_inference::mock::MockEmbeddingBackend;
//!
//! let backend = MockEmbeddingBackend::new()
//!     .with_model_dimension("nomic-embed-text:v1.5", 768)
//!     .with_unavailable_model("qwen3-embedding:4b");
//!
//! let model = EmbeddingModel::new("nomic-embed-text:v1.5", 768);
//! let embedding = backend.embed("猫の飼い方", &model).await.unwrap();
//! assert_eq!(embedding.as_slice().len(), 768);
//! ```

use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use rankfuse_core::{EmbeddingBackend, Error, Result, Vector};

/// One recorded call to the mock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockCall {
    pub model: String,
    pub inputs: Vec<String>,
}

#[derive(Debug, Clone)]
struct MockConfig {
    default_dimension: usize,
    dimensions: HashMap<String, usize>,
    unavailable: BTreeSet<String>,
    latency: Duration,
}

impl Default for MockConfig {
    fn default() -> Self {
        Self {
            default_dimension: 384,
            dimensions: HashMap::new(),
            unavailable: BTreeSet::new(),
            latency: Duration::ZERO,
        }
    }
}

/// Mock embedding backend for testing.
#[derive(Clone, Default)]
pub struct MockEmbeddingBackend {
    config: Arc<MockConfig>,
    call_log: Arc<Mutex<Vec<MockCall>>>,
}

impl MockEmbeddingBackend {
    /// Create a new mock backend with default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Dimension used for models without an explicit dimension.
    pub fn with_dimension(mut self, dimension: usize) -> Self {
        Arc::make_mut(&mut self.config).default_dimension = dimension;
        self
    }

    /// Dimension returned for one model.
    pub fn with_model_dimension(mut self, model: impl Into<String>, dimension: usize) -> Self {
        Arc::make_mut(&mut self.config)
            .dimensions
            .insert(model.into(), dimension);
        self
    }

    /// Make every call for `model` fail with `ModelUnavailable`.
    pub fn with_unavailable_model(mut self, model: impl Into<String>) -> Self {
        Arc::make_mut(&mut self.config)
            .unavailable
            .insert(model.into());
        self
    }

    /// Sleep this long inside every call.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        Arc::make_mut(&mut self.config).latency = latency;
        self
    }

    /// All recorded calls, in order.
    pub fn calls(&self) -> Vec<MockCall> {
        self.log().clone()
    }

    /// Number of calls made for `model`.
    pub fn call_count(&self, model: &str) -> usize {
        self.log().iter().filter(|c| c.model == model).count()
    }

    fn log(&self) -> std::sync::MutexGuard<'_, Vec<MockCall>> {
        self.call_log.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn dimension_for(&self, model: &str) -> usize {
        self.config
            .dimensions
            .get(model)
            .copied()
            .unwrap_or(self.config.default_dimension)
    }
}

#[async_trait]
impl EmbeddingBackend for MockEmbeddingBackend {
    async fn embed_texts(&self, texts: &[String], model: &str) -> Result<Vec<Vector>> {
        self.log().push(MockCall {
            model: model.to_string(),
            inputs: texts.to_vec(),
        });

        if !self.config.latency.is_zero() {
            tokio::time::sleep(self.config.latency).await;
        }

        if self.config.unavailable.contains(model) {
            return Err(Error::ModelUnavailable {
                model: model.to_string(),
                reason: "mock model unavailable".to_string(),
            });
        }

        let dimension = self.dimension_for(model);
        Ok(texts
            .iter()
            .map(|text| Vector::from(MockEmbeddingGenerator::generate(text, dimension)))
            .collect())
    }
}

/// Mock embedding generator with deterministic output.
pub struct MockEmbeddingGenerator;

impl MockEmbeddingGenerator {
    /// Generate a deterministic embedding from text.
    ///
    /// Uses character-based hashing for reproducibility. The same text
    /// will always produce the same embedding.
    pub fn generate(text: &str, dimension: usize) -> Vec<f32> {
        let mut vec = vec![0.0; dimension];
        if dimension == 0 {
            return vec;
        }

        for (i, c) in text.chars().enumerate() {
            let idx = (c as usize + i) % dimension;
            vec[idx] += 0.1;
        }

        Self::normalize(&mut vec);
        vec
    }

    fn normalize(vec: &mut [f32]) {
        let norm: f32 = vec.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for x in vec.iter_mut() {
                *x /= norm;
            }
        }
    }
}
