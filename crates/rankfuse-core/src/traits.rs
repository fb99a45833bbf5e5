//! Collaborator traits for retrieval and embedding.
//!
//! The evaluation runner talks only to these traits, so a sweep can run
//! against PostgreSQL and Ollama in production or in-process doubles in tests.

use std::collections::BTreeMap;

use async_trait::async_trait;

use crate::error::{Error, Result};
use crate::models::{CandidateList, EmbeddingModel, Vector};

// =============================================================================
// SEARCH TRAITS
// =============================================================================

/// Lexical full-text search scoped to one docset.
#[async_trait]
pub trait TextSearch: Send + Sync {
    /// Return up to `limit` candidates ordered by the engine's relevance score.
    ///
    /// When `literal` is set the query is matched as a quoted phrase instead
    /// of being parsed as query syntax.
    async fn search_text(
        &self,
        query: &str,
        docset: &str,
        limit: usize,
        literal: bool,
    ) -> Result<CandidateList>;
}

/// Dense vector similarity search scoped to one docset.
#[async_trait]
pub trait VectorSearch: Send + Sync {
    /// Return up to `limit` candidates ordered by descending similarity.
    ///
    /// Fails with [`Error::UnregisteredModel`] when `model` has no registered
    /// dimensionality.
    async fn search_vector(
        &self,
        query_vector: &Vector,
        model: &str,
        docset: &str,
        limit: usize,
    ) -> Result<CandidateList>;
}

/// Registry of embedding models and their dimensionality.
#[async_trait]
pub trait ModelRegistry: Send + Sync {
    /// All registered models, name to dims.
    async fn model_dimensions(&self) -> Result<BTreeMap<String, usize>>;

    /// Look up one model.
    async fn embedding_model(&self, name: &str) -> Result<EmbeddingModel> {
        let dims = self
            .model_dimensions()
            .await?
            .get(name)
            .copied()
            .ok_or_else(|| Error::UnregisteredModel(name.to_string()))?;
        Ok(EmbeddingModel::new(name, dims))
    }
}

// =============================================================================
// INFERENCE TRAITS
// =============================================================================

/// Backend for generating text embeddings.
#[async_trait]
pub trait EmbeddingBackend: Send + Sync {
    /// Generate embeddings for the given texts with `model`.
    ///
    /// Returns one vector per input text, in input order.
    async fn embed_texts(&self, texts: &[String], model: &str) -> Result<Vec<Vector>>;

    /// Embed a batch and check it against the model's registered
    /// dimensionality: one vector per input, each of length `model.dims`.
    async fn embed_batch(&self, texts: &[String], model: &EmbeddingModel) -> Result<Vec<Vector>> {
        let vectors = self.embed_texts(texts, &model.name).await?;
        if vectors.len() != texts.len() {
            return Err(Error::ModelUnavailable {
                model: model.name.clone(),
                reason: format!(
                    "returned {} embeddings for {} inputs",
                    vectors.len(),
                    texts.len()
                ),
            });
        }
        for vector in &vectors {
            check_dimensions(model, vector)?;
        }
        Ok(vectors)
    }

    /// Embed a single text and check its dimensionality.
    async fn embed(&self, text: &str, model: &EmbeddingModel) -> Result<Vector> {
        let mut vectors = self.embed_batch(&[text.to_string()], model).await?;
        vectors.pop().ok_or_else(|| Error::ModelUnavailable {
            model: model.name.clone(),
            reason: "returned no embedding".to_string(),
        })
    }
}

/// Fail with [`Error::DimensionMismatch`] when `vector` does not have the
/// model's registered length.
pub fn check_dimensions(model: &EmbeddingModel, vector: &Vector) -> Result<()> {
    let actual = vector.as_slice().len();
    if actual != model.dims {
        return Err(Error::DimensionMismatch {
            model: model.name.clone(),
            expected: model.dims,
            actual,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FixedBackend {
        dims: usize,
        count: usize,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl EmbeddingBackend for FixedBackend {
        async fn embed_texts(&self, _texts: &[String], _model: &str) -> Result<Vec<Vector>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok((0..self.count)
                .map(|_| Vector::from(vec![0.5; self.dims]))
                .collect())
        }
    }

    struct StaticRegistry;

    #[async_trait]
    impl ModelRegistry for StaticRegistry {
        async fn model_dimensions(&self) -> Result<BTreeMap<String, usize>> {
            Ok(BTreeMap::from([("nomic-embed-text:v1.5".to_string(), 768)]))
        }
    }

    #[tokio::test]
    async fn test_embed_checks_dimensions() {
        let backend = FixedBackend {
            dims: 384,
            count: 1,
            calls: AtomicUsize::new(0),
        };
        let err = backend
            .embed("q", &EmbeddingModel::new("m", 768))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            Error::DimensionMismatch {
                expected: 768,
                actual: 384,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_embed_returns_single_vector() {
        let backend = FixedBackend {
            dims: 3,
            count: 1,
            calls: AtomicUsize::new(0),
        };
        let v = backend
            .embed("q", &EmbeddingModel::new("m", 3))
            .await
            .unwrap();
        assert_eq!(v.as_slice().len(), 3);
        assert_eq!(backend.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_embed_rejects_wrong_count() {
        let backend = FixedBackend {
            dims: 3,
            count: 0,
            calls: AtomicUsize::new(0),
        };
        let err = backend
            .embed("q", &EmbeddingModel::new("m", 3))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ModelUnavailable { .. }));
    }

    #[tokio::test]
    async fn test_embed_batch_checks_every_vector() {
        let backend = FixedBackend {
            dims: 4,
            count: 2,
            calls: AtomicUsize::new(0),
        };
        let texts = vec!["a".to_string(), "b".to_string()];
        let ok = backend
            .embed_batch(&texts, &EmbeddingModel::new("m", 4))
            .await
            .unwrap();
        assert_eq!(ok.len(), 2);

        let err = backend
            .embed_batch(&texts, &EmbeddingModel::new("m", 8))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::DimensionMismatch { .. }));
    }

    #[tokio::test]
    async fn test_registry_lookup() {
        let model = StaticRegistry
            .embedding_model("nomic-embed-text:v1.5")
            .await
            .unwrap();
        assert_eq!(model.dims, 768);

        let err = StaticRegistry.embedding_model("bge-m3").await.unwrap_err();
        assert!(matches!(err, Error::UnregisteredModel(name) if name == "bge-m3"));
    }
}
