//! Core data models for rankfuse.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

pub use pgvector::Vector;

/// Document identifier (`documents.id`).
pub type DocumentId = i64;

// =============================================================================
// SIGNALS AND MODES
// =============================================================================

/// A retrieval signal that produces a candidate list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Signal {
    /// Lexical full-text search.
    Text,
    /// Dense vector similarity search.
    Vector,
}

impl Signal {
    /// All signals in fusion order.
    pub const ALL: [Signal; 2] = [Signal::Text, Signal::Vector];
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text => write!(f, "text"),
            Self::Vector => write!(f, "vector"),
        }
    }
}

/// Retrieval mode evaluated for a query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RetrievalMode {
    /// Text candidates only.
    Text,
    /// Vector candidates only.
    Vector,
    /// Text and vector candidates fused with RRF.
    Hybrid,
}

impl RetrievalMode {
    /// Whether this mode consumes text candidates.
    pub fn needs_text(self) -> bool {
        match self {
            Self::Text | Self::Hybrid => true,
            Self::Vector => false,
        }
    }

    /// Whether this mode consumes vector candidates (and therefore a model).
    pub fn needs_vector(self) -> bool {
        match self {
            Self::Vector | Self::Hybrid => true,
            Self::Text => false,
        }
    }

    /// Parse a comma separated mode list such as `"text,vector,hybrid"`.
    pub fn parse_list(input: &str) -> Result<BTreeSet<Self>> {
        let modes = input
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(Self::from_str)
            .collect::<Result<BTreeSet<_>>>()?;
        if modes.is_empty() {
            return Err(Error::Config(
                "At least one mode must be specified".to_string(),
            ));
        }
        Ok(modes)
    }
}

impl fmt::Display for RetrievalMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text => write!(f, "text"),
            Self::Vector => write!(f, "vector"),
            Self::Hybrid => write!(f, "hybrid"),
        }
    }
}

impl FromStr for RetrievalMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "text" => Ok(Self::Text),
            "vector" => Ok(Self::Vector),
            "hybrid" => Ok(Self::Hybrid),
            other => Err(Error::Config(format!(
                "Unsupported mode '{}'. Choose from text, vector, hybrid",
                other
            ))),
        }
    }
}

// =============================================================================
// CANDIDATE LISTS
// =============================================================================

/// One ranked candidate returned by a retrieval signal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub document_id: DocumentId,
    /// 1-based rank within the list.
    pub rank: u32,
    /// Signal-native score (PGroonga score or cosine similarity).
    pub score: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

/// Ordered candidates from one signal for one query.
///
/// Ranks are contiguous from 1 and document ids are unique; both are checked
/// on construction and on deserialization.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<Candidate>", into = "Vec<Candidate>")]
pub struct CandidateList {
    candidates: Vec<Candidate>,
}

impl CandidateList {
    /// Build a list from already-ranked candidates, validating the invariants.
    pub fn new(candidates: Vec<Candidate>) -> Result<Self> {
        validate_ranking(candidates.iter().map(|c| (c.rank, c.document_id)))
            .map_err(Error::InvalidCandidateList)?;
        Ok(Self { candidates })
    }

    /// Build a list from rows in result order, assigning ranks 1, 2, 3, ...
    pub fn from_ordered<I>(rows: I) -> Result<Self>
    where
        I: IntoIterator<Item = (DocumentId, f64, Option<String>)>,
    {
        let candidates = rows
            .into_iter()
            .enumerate()
            .map(|(idx, (document_id, score, title))| Candidate {
                document_id,
                rank: idx as u32 + 1,
                score,
                title,
            })
            .collect();
        Self::new(candidates)
    }

    /// Re-check the list invariants.
    pub fn validate(&self) -> Result<()> {
        validate_ranking(self.candidates.iter().map(|c| (c.rank, c.document_id)))
            .map_err(Error::InvalidCandidateList)
    }

    /// An empty list (a signal that found nothing).
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Candidate> {
        self.candidates.iter()
    }

    pub fn as_slice(&self) -> &[Candidate] {
        &self.candidates
    }

    /// Document ids in rank order.
    pub fn document_ids(&self) -> Vec<DocumentId> {
        self.candidates.iter().map(|c| c.document_id).collect()
    }

    /// The first `limit` candidates. Truncation keeps ranks contiguous.
    pub fn truncated(&self, limit: usize) -> Self {
        Self {
            candidates: self.candidates.iter().take(limit).cloned().collect(),
        }
    }

    pub fn into_inner(self) -> Vec<Candidate> {
        self.candidates
    }
}

impl TryFrom<Vec<Candidate>> for CandidateList {
    type Error = Error;

    fn try_from(candidates: Vec<Candidate>) -> Result<Self> {
        Self::new(candidates)
    }
}

impl From<CandidateList> for Vec<Candidate> {
    fn from(list: CandidateList) -> Self {
        list.candidates
    }
}

impl<'a> IntoIterator for &'a CandidateList {
    type Item = &'a Candidate;
    type IntoIter = std::slice::Iter<'a, Candidate>;

    fn into_iter(self) -> Self::IntoIter {
        self.candidates.iter()
    }
}

/// Check that `(rank, document_id)` pairs have ranks 1..=n in order and
/// unique ids. Returns a human readable reason on failure.
pub(crate) fn validate_ranking<I>(entries: I) -> std::result::Result<(), String>
where
    I: IntoIterator<Item = (u32, DocumentId)>,
{
    let mut seen = BTreeSet::new();
    for (position, (rank, document_id)) in entries.into_iter().enumerate() {
        let expected = position as u32 + 1;
        if rank != expected {
            return Err(format!(
                "rank {} at position {} (expected {})",
                rank, position, expected
            ));
        }
        if !seen.insert(document_id) {
            return Err(format!("duplicate document id {}", document_id));
        }
    }
    Ok(())
}

// =============================================================================
// FUSION WEIGHTS
// =============================================================================

/// Per-signal weights for weighted RRF.
///
/// Serialized as `{"text": 1.0, "vector": 1.0}`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct FusionWeights {
    pub text: f64,
    pub vector: f64,
}

impl FusionWeights {
    pub fn new(text: f64, vector: f64) -> Self {
        Self { text, vector }
    }

    /// Weight for a signal.
    pub fn weight(&self, signal: Signal) -> f64 {
        match signal {
            Signal::Text => self.text,
            Signal::Vector => self.vector,
        }
    }

    /// Reject negative or non-finite weights and all-zero weight sets.
    pub fn validate(&self) -> Result<()> {
        for signal in Signal::ALL {
            let w = self.weight(signal);
            if !w.is_finite() || w < 0.0 {
                return Err(Error::InvalidWeight(format!(
                    "{} weight must be a finite non-negative number, got {}",
                    signal, w
                )));
            }
        }
        if Signal::ALL.iter().all(|s| self.weight(*s) <= 0.0) {
            return Err(Error::InvalidWeight(
                "at least one signal weight must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Parse a `text:vector` pair such as `"2:1"` or `"1.5:0.5"`.
    pub fn parse(token: &str) -> Result<Self> {
        let (left, right) = token.trim().split_once(':').ok_or_else(|| {
            Error::Config(format!(
                "Invalid weight format '{}'. Use like 1:1 or 2.0:1.0",
                token
            ))
        })?;
        let parse_one = |s: &str| {
            s.trim().parse::<f64>().map_err(|_| {
                Error::Config(format!("Weights must be numeric values: '{}'", token))
            })
        };
        let weights = Self::new(parse_one(left)?, parse_one(right)?);
        weights.validate()?;
        Ok(weights)
    }

    /// Parse weight arguments, each of which may hold comma separated pairs.
    ///
    /// An empty input yields the single default `1:1` weight set.
    pub fn parse_list<S: AsRef<str>>(args: &[S]) -> Result<Vec<Self>> {
        let weights = args
            .iter()
            .flat_map(|arg| arg.as_ref().split(','))
            .map(str::trim)
            .filter(|token| !token.is_empty())
            .map(Self::parse)
            .collect::<Result<Vec<_>>>()?;
        if weights.is_empty() {
            return Ok(vec![Self::default()]);
        }
        Ok(weights)
    }
}

impl Default for FusionWeights {
    fn default() -> Self {
        Self::new(
            crate::defaults::TEXT_WEIGHT,
            crate::defaults::VECTOR_WEIGHT,
        )
    }
}

impl PartialEq for FusionWeights {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == std::cmp::Ordering::Equal
    }
}

impl Eq for FusionWeights {}

impl PartialOrd for FusionWeights {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for FusionWeights {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.text
            .total_cmp(&other.text)
            .then(self.vector.total_cmp(&other.vector))
    }
}

impl fmt::Display for FusionWeights {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "text={}:vector={}", self.text, self.vector)
    }
}

// =============================================================================
// QUERIES AND MODELS
// =============================================================================

/// A query to evaluate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuerySpec {
    pub slug: String,
    pub query: String,
}

/// An embedding model registered with a fixed dimensionality.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmbeddingModel {
    pub name: String,
    pub dims: usize,
}

impl EmbeddingModel {
    pub fn new(name: impl Into<String>, dims: usize) -> Self {
        Self {
            name: name.into(),
            dims,
        }
    }
}
