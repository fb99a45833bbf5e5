//! # rankfuse-inference
//!
//! Embedding backends for rankfuse.
//!
//! This crate provides:
//! - Ollama implementation of [`EmbeddingBackend`] (`POST /api/embed`)
//! - A deterministic mock backend for tests (feature `mock`)
//!
//! Dimension checks against the model registry live on the trait itself
//! ([`EmbeddingBackend::embed`], [`EmbeddingBackend::embed_batch`]), so every
//! backend reports `DimensionMismatch` the same way.
//!
//! # Feature Flags
//!
//! - `ollama` (default): Enable Ollama backend
//! - `mock`: Enable the mock backend outside this crate's own tests
//!
//! # Example
//!
//! ```rust,no_run
//! use rankfuse_inference::{OllamaBackend, OllamaConfig};
//! use rankfuse_core::{EmbeddingBackend, EmbeddingModel};
//!
//! #[tokio::main]
//! async fn main() -> rankfuse_core::Result<()> {
//!     let backend = OllamaBackend::new(OllamaConfig::from_env())?;
//!     let model = EmbeddingModel::new("nomic-embed-text:v1.5", 768);
//!     let embedding = backend.embed("Hello", &model).await?;
//!     println!("{} dims", embedding.as_slice().len());
//!     Ok(())
//! }
//! ```

#[cfg(feature = "ollama")]
pub mod ollama;

// Mock embedding backend for testing
#[cfg(any(test, feature = "mock"))]
pub mod mock;

// Re-export core types
pub use rankfuse_core::*;

#[cfg(feature = "ollama")]
pub use ollama::{OllamaBackend, OllamaConfig};
