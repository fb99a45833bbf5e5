//! Persisted ranking records.
//!
//! A sweep writes one [`RankingRecord`] per evaluated combination as a single
//! JSON line. The metrics engine reads them back; every record is validated
//! on read so a hand-edited or truncated stream fails loudly.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::models::{validate_ranking, DocumentId, FusionWeights, RetrievalMode};

/// RRF parameters recorded with a hybrid ranking.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RrfParams {
    pub k: u32,
    pub weights: FusionWeights,
}

/// Retrieval depths used to produce a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RankingParams {
    /// Number of results kept in the record.
    pub limit: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text_limit: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vector_limit: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rrf_k: Option<u32>,
    /// Registered dimensionality of the embedding model.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dims: Option<usize>,
}

/// One ranked result in a persisted record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedResult {
    pub rank: u32,
    pub document_id: DocumentId,
    pub score: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Rank in the text candidate list (hybrid only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text_rank: Option<u32>,
    /// Rank in the vector candidate list (hybrid only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vector_rank: Option<u32>,
}

/// The ranking produced by one (query, mode, model, weights) combination.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankingRecord {
    pub timestamp: DateTime<Utc>,
    pub query_slug: String,
    pub query: String,
    pub mode: RetrievalMode,
    pub model: Option<String>,
    pub docset: String,
    pub rrf: Option<RrfParams>,
    pub params: RankingParams,
    /// Query as sent to the text engine, when text candidates were used.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text_query: Option<String>,
    pub results: Vec<RankedResult>,
}

impl RankingRecord {
    /// Check rank contiguity, id uniqueness, and mode/model/rrf consistency.
    pub fn validate(&self) -> Result<()> {
        validate_ranking(self.results.iter().map(|r| (r.rank, r.document_id))).map_err(
            |reason| {
                Error::InvalidCandidateList(format!(
                    "record for '{}' ({}): {}",
                    self.query_slug, self.mode, reason
                ))
            },
        )?;

        let consistent = match self.mode {
            RetrievalMode::Text => self.model.is_none() && self.rrf.is_none(),
            RetrievalMode::Vector => self.model.is_some() && self.rrf.is_none(),
            RetrievalMode::Hybrid => self.model.is_some() && self.rrf.is_some(),
        };
        if !consistent {
            return Err(Error::Serialization(format!(
                "record for '{}' has inconsistent fields for mode {} (model: {}, rrf: {})",
                self.query_slug,
                self.mode,
                self.model.is_some(),
                self.rrf.is_some()
            )));
        }
        if let Some(rrf) = &self.rrf {
            rrf.weights.validate()?;
        }
        Ok(())
    }

    /// Parse and validate one JSON line.
    pub fn from_json_line(line: &str) -> Result<Self> {
        let record: Self = serde_json::from_str(line)?;
        record.validate()?;
        Ok(record)
    }

    /// Serialize to one JSON line (no trailing newline).
    pub fn to_json_line(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Result document ids in rank order.
    pub fn document_ids(&self) -> Vec<DocumentId> {
        self.results.iter().map(|r| r.document_id).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(rank: u32, document_id: DocumentId) -> RankedResult {
        RankedResult {
            rank,
            document_id,
            score: 1.0 / rank as f64,
            title: None,
            text_rank: None,
            vector_rank: None,
        }
    }

    fn record(mode: RetrievalMode) -> RankingRecord {
        RankingRecord {
            timestamp: Utc::now(),
            query_slug: "cat-care".to_string(),
            query: "猫の飼い方".to_string(),
            mode,
            model: None,
            docset: "seed2".to_string(),
            rrf: None,
            params: RankingParams {
                limit: 20,
                text_limit: Some(50),
                vector_limit: None,
                rrf_k: None,
                dims: None,
            },
            text_query: None,
            results: vec![result(1, 5), result(2, 1), result(3, 9)],
        }
    }

    #[test]
    fn test_text_record_is_valid() {
        assert!(record(RetrievalMode::Text).validate().is_ok());
    }

    #[test]
    fn test_vector_record_requires_model() {
        let mut r = record(RetrievalMode::Vector);
        assert!(r.validate().is_err());
        r.model = Some("nomic-embed-text:v1.5".to_string());
        assert!(r.validate().is_ok());
    }

    #[test]
    fn test_hybrid_record_requires_rrf() {
        let mut r = record(RetrievalMode::Hybrid);
        r.model = Some("nomic-embed-text:v1.5".to_string());
        assert!(r.validate().is_err());
        r.rrf = Some(RrfParams {
            k: 60,
            weights: FusionWeights::new(1.0, 1.0),
        });
        assert!(r.validate().is_ok());
    }

    #[test]
    fn test_text_record_rejects_rrf() {
        let mut r = record(RetrievalMode::Text);
        r.rrf = Some(RrfParams {
            k: 60,
            weights: FusionWeights::default(),
        });
        assert!(r.validate().is_err());
    }

    #[test]
    fn test_record_rejects_duplicate_ids() {
        let mut r = record(RetrievalMode::Text);
        r.results = vec![result(1, 5), result(2, 5)];
        assert!(matches!(
            r.validate(),
            Err(Error::InvalidCandidateList(_))
        ));
    }

    #[test]
    fn test_json_line_preserves_order() {
        let r = record(RetrievalMode::Text);
        let line = r.to_json_line().unwrap();
        assert!(!line.contains('\n'));
        let back = RankingRecord::from_json_line(&line).unwrap();
        assert_eq!(back.document_ids(), vec![5, 1, 9]);
        assert_eq!(back, r);
    }

    #[test]
    fn test_from_json_line_rejects_rank_gap() {
        let mut r = record(RetrievalMode::Text);
        r.results[2].rank = 7;
        let line = serde_json::to_string(&r).unwrap();
        assert!(RankingRecord::from_json_line(&line).is_err());
    }

    #[test]
    fn test_null_model_and_rrf_are_serialized() {
        let value = serde_json::to_value(record(RetrievalMode::Text)).unwrap();
        assert!(value["model"].is_null());
        assert!(value["rrf"].is_null());
        assert_eq!(value["mode"], "text");
    }
}
