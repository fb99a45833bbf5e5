//! Weighted Reciprocal Rank Fusion (RRF) for combining candidate lists.
//!
//! Each document at 1-based rank `r` in the list of signal `s` contributes
//! `w_s / (k + r)`; a document's fused score is the sum over the lists it
//! appears in. Output is ordered by descending score with ties broken by
//! ascending document id, so fusion is deterministic for any input.
//!
//! Reference: Cormack, Clarke & Buettcher (2009).

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use rankfuse_core::{CandidateList, DocumentId, Error, FusionWeights, Result, Signal};

/// One document in a fused ranking.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FusedHit {
    pub document_id: DocumentId,
    pub fused_score: f64,
    /// 1-based rank in the fused list.
    pub rank: u32,
    /// Rank in each input list the document appeared in.
    pub contributing_ranks: BTreeMap<Signal, u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

impl FusedHit {
    /// Rank in the given signal's list, if present.
    pub fn signal_rank(&self, signal: Signal) -> Option<u32> {
        self.contributing_ranks.get(&signal).copied()
    }
}

/// The ordered output of [`fuse`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FusedResult {
    pub hits: Vec<FusedHit>,
}

impl FusedResult {
    pub fn len(&self) -> usize {
        self.hits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hits.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, FusedHit> {
        self.hits.iter()
    }

    /// Document ids in fused order.
    pub fn document_ids(&self) -> Vec<DocumentId> {
        self.hits.iter().map(|h| h.document_id).collect()
    }

    /// Keep only the first `limit` hits.
    pub fn truncate(&mut self, limit: usize) {
        self.hits.truncate(limit);
    }
}

/// Scratch accumulator for one document.
struct Accumulated {
    score: f64,
    ranks: BTreeMap<Signal, u32>,
    title: Option<String>,
}

/// Fuse per-signal candidate lists with weighted RRF.
///
/// Signals whose weight is exactly zero are left out entirely, so their
/// candidates are not admitted into the output. Returns every admitted
/// document; truncation is the caller's concern.
///
/// # Errors
///
/// - [`Error::InvalidWeight`] if any weight is negative or non-finite, or no
///   weight is positive.
/// - [`Error::InvalidCandidateList`] if an input list has non-contiguous
///   ranks or duplicate ids.
/// - [`Error::InvalidInput`] if `k` is zero.
#[instrument(
    skip(lists),
    fields(
        subsystem = "search",
        component = "rrf_fusion",
        op = "fuse",
        rrf_k = k,
        text_weight = weights.text,
        vector_weight = weights.vector,
    )
)]
pub fn fuse(
    lists: &BTreeMap<Signal, CandidateList>,
    weights: &FusionWeights,
    k: u32,
) -> Result<FusedResult> {
    weights.validate()?;
    if k == 0 {
        return Err(Error::InvalidInput(
            "RRF k must be a positive integer".to_string(),
        ));
    }
    for list in lists.values() {
        list.validate()?;
    }

    let k = f64::from(k);
    let mut scores: BTreeMap<DocumentId, Accumulated> = BTreeMap::new();

    for (signal, list) in lists {
        let weight = weights.weight(*signal);
        if weight == 0.0 {
            continue;
        }
        for candidate in list {
            let contribution = weight / (k + f64::from(candidate.rank));
            let entry = scores
                .entry(candidate.document_id)
                .or_insert_with(|| Accumulated {
                    score: 0.0,
                    ranks: BTreeMap::new(),
                    title: None,
                });
            entry.score += contribution;
            entry.ranks.insert(*signal, candidate.rank);
            // Keep the first title we see
            if entry.title.is_none() {
                entry.title = candidate.title.clone();
            }
        }
    }

    let mut ordered: Vec<(DocumentId, Accumulated)> = scores.into_iter().collect();
    ordered.sort_by(|(a_id, a), (b_id, b)| b.score.total_cmp(&a.score).then(a_id.cmp(b_id)));

    let hits: Vec<FusedHit> = ordered
        .into_iter()
        .enumerate()
        .map(|(idx, (document_id, acc))| FusedHit {
            document_id,
            fused_score: acc.score,
            rank: idx as u32 + 1,
            contributing_ranks: acc.ranks,
            title: acc.title,
        })
        .collect();

    debug!(
        text_hits = lists.get(&Signal::Text).map_or(0, CandidateList::len),
        vector_hits = lists.get(&Signal::Vector).map_or(0, CandidateList::len),
        result_count = hits.len(),
        "RRF fusion complete"
    );

    Ok(FusedResult { hits })
}

/// Convenience wrapper for the two-signal case.
pub fn fuse_text_vector(
    text: &CandidateList,
    vector: &CandidateList,
    weights: &FusionWeights,
    k: u32,
) -> Result<FusedResult> {
    let lists = BTreeMap::from([
        (Signal::Text, text.clone()),
        (Signal::Vector, vector.clone()),
    ]);
    fuse(&lists, weights, k)
}
