//! Error types for rankfuse.

use thiserror::Error;

/// Result type alias using rankfuse's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for rankfuse operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Fusion weights are unusable (all non-positive, negative, or not finite)
    #[error("Invalid fusion weights: {0}")]
    InvalidWeight(String),

    /// A candidate list violates rank contiguity or id uniqueness
    #[error("Invalid candidate list: {0}")]
    InvalidCandidateList(String),

    /// Embedding model is not registered with a known dimensionality
    #[error("Model '{0}' is not registered in embedding_models")]
    UnregisteredModel(String),

    /// Embedding service could not be reached or returned an unusable response
    #[error("Model '{model}' unavailable: {reason}")]
    ModelUnavailable { model: String, reason: String },

    /// Embedding length disagrees with the model's registered dimensionality
    #[error("Model '{model}' expected {expected} dims but got {actual}")]
    DimensionMismatch {
        model: String,
        expected: usize,
        actual: usize,
    },

    /// Ranking record references a query with no relevance judgment
    #[error("Unknown query '{slug}' for docset '{docset}'")]
    UnknownQuery { slug: String, docset: String },

    /// Relevance judgment file is inconsistent
    #[error("Malformed judgment: {0}")]
    MalformedJudgment(String),

    /// Database operation failed (wraps sqlx::Error)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// HTTP/network request failed
    #[error("Request error: {0}")]
    Request(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),

    /// File I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Whether this failure only invalidates a single evaluation combination.
    ///
    /// Retrieval and embedding failures are recoverable at the granularity of
    /// one (query, model, mode) combination; everything else aborts the caller.
    pub fn is_combination_local(&self) -> bool {
        matches!(
            self,
            Error::UnregisteredModel(_)
                | Error::ModelUnavailable { .. }
                | Error::DimensionMismatch { .. }
                | Error::Database(_)
                | Error::Request(_)
                | Error::InvalidCandidateList(_)
        )
    }

    /// Short machine-friendly label used in manifests and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::InvalidWeight(_) => "invalid_weight",
            Error::InvalidCandidateList(_) => "invalid_candidate_list",
            Error::UnregisteredModel(_) => "unregistered_model",
            Error::ModelUnavailable { .. } => "model_unavailable",
            Error::DimensionMismatch { .. } => "dimension_mismatch",
            Error::UnknownQuery { .. } => "unknown_query",
            Error::MalformedJudgment(_) => "malformed_judgment",
            Error::Database(_) => "database",
            Error::Serialization(_) => "serialization",
            Error::Config(_) => "config",
            Error::InvalidInput(_) => "invalid_input",
            Error::Request(_) => "request",
            Error::Internal(_) => "internal",
            Error::Io(_) => "io",
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        Error::Request(e.to_string())
    }
}
