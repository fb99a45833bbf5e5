//! Retrieval quality metrics over persisted rankings.
//!
//! Binary relevance throughout:
//!
//! - recall@k = |relevant ∩ top-k| / |relevant|
//! - reciprocal rank = 1 / rank of the first relevant result in the full
//!   list, 0 when none is relevant
//! - nDCG@k = DCG@k / IDCG@k with `DCG@k = Σ rel_i / log2(i + 1)` and the
//!   ideal ordering placing min(|relevant|, k) relevant documents first
//!
//! A query whose relevant set is empty has no defined value for any metric.
//! It is reported per query as `null` and left out of every mean, so it can
//! neither reward nor penalize a condition.
//!
//! References: Järvelin & Kekäläinen (2002); Voorhees (1999).

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::Serialize;
use tracing::{info, instrument};

use rankfuse_core::{DocumentId, Error, FusionWeights, RankingRecord, Result, RetrievalMode};

use crate::judgments::JudgmentSet;

// =============================================================================
// PER-LIST METRICS
// =============================================================================

/// Fraction of relevant documents found in the first `k` results.
pub fn recall_at_k(
    results: &[DocumentId],
    relevant: &BTreeSet<DocumentId>,
    k: usize,
) -> Option<f64> {
    if relevant.is_empty() {
        return None;
    }
    let hits = results
        .iter()
        .take(k)
        .filter(|id| relevant.contains(id))
        .count();
    Some(hits as f64 / relevant.len() as f64)
}

/// Reciprocal of the 1-based rank of the first relevant result.
pub fn reciprocal_rank(results: &[DocumentId], relevant: &BTreeSet<DocumentId>) -> Option<f64> {
    if relevant.is_empty() {
        return None;
    }
    Some(
        results
            .iter()
            .position(|id| relevant.contains(id))
            .map_or(0.0, |idx| 1.0 / (idx + 1) as f64),
    )
}

/// Discounted cumulative gain over the first `k` results.
pub fn dcg_at_k(results: &[DocumentId], relevant: &BTreeSet<DocumentId>, k: usize) -> f64 {
    results
        .iter()
        .take(k)
        .enumerate()
        .filter(|(_, id)| relevant.contains(id))
        .map(|(idx, _)| 1.0 / ((idx + 2) as f64).log2())
        .sum()
}

/// DCG@k normalized by the ideal DCG@k.
pub fn ndcg_at_k(
    results: &[DocumentId],
    relevant: &BTreeSet<DocumentId>,
    k: usize,
) -> Option<f64> {
    if relevant.is_empty() {
        return None;
    }
    let ideal: f64 = (0..relevant.len().min(k))
        .map(|idx| 1.0 / ((idx + 2) as f64).log2())
        .sum();
    if ideal == 0.0 {
        return None;
    }
    Some(dcg_at_k(results, relevant, k) / ideal)
}

/// Deduplicate and sort cutoffs, rejecting an empty list or a zero cutoff.
pub fn normalize_ks(ks: &[usize]) -> Result<Vec<usize>> {
    if ks.is_empty() {
        return Err(Error::InvalidInput(
            "at least one cutoff k is required".to_string(),
        ));
    }
    if ks.contains(&0) {
        return Err(Error::InvalidInput(
            "cutoffs must be positive integers".to_string(),
        ));
    }
    Ok(ks
        .iter()
        .copied()
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect())
}

// =============================================================================
// CONDITIONS
// =============================================================================

/// Aggregation key: everything that distinguishes one retrieval setup.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct Condition {
    pub docset: String,
    pub mode: RetrievalMode,
    pub model: Option<String>,
    pub rrf_weights: Option<FusionWeights>,
}

impl Condition {
    pub fn of(record: &RankingRecord) -> Self {
        Self {
            docset: record.docset.clone(),
            mode: record.mode,
            model: record.model.clone(),
            rrf_weights: record.rrf.map(|rrf| rrf.weights),
        }
    }
}

/// `docset|mode[|model][|text=..:vector=..]`
impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}|{}", self.docset, self.mode)?;
        if let Some(model) = &self.model {
            write!(f, "|{}", model)?;
        }
        if let Some(weights) = &self.rrf_weights {
            write!(f, "|{}", weights)?;
        }
        Ok(())
    }
}

// =============================================================================
// RECORDS
// =============================================================================

/// Metrics for one ranking record.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryMetrics {
    pub condition: String,
    pub query_slug: String,
    pub docset: String,
    pub mode: RetrievalMode,
    pub model: Option<String>,
    pub rrf_weights: Option<FusionWeights>,
    pub relevant_count: usize,
    pub reciprocal_rank: Option<f64>,
    pub recall_at_k: BTreeMap<usize, Option<f64>>,
    pub ndcg_at_k: BTreeMap<usize, Option<f64>>,
}

impl QueryMetrics {
    /// Score one record against its relevant set.
    pub fn compute(record: &RankingRecord, relevant: &BTreeSet<DocumentId>, ks: &[usize]) -> Self {
        let condition = Condition::of(record);
        let results = record.document_ids();
        Self {
            condition: condition.to_string(),
            query_slug: record.query_slug.clone(),
            docset: condition.docset,
            mode: condition.mode,
            model: condition.model,
            rrf_weights: condition.rrf_weights,
            relevant_count: relevant.len(),
            reciprocal_rank: reciprocal_rank(&results, relevant),
            recall_at_k: ks
                .iter()
                .map(|&k| (k, recall_at_k(&results, relevant, k)))
                .collect(),
            ndcg_at_k: ks
                .iter()
                .map(|&k| (k, ndcg_at_k(&results, relevant, k)))
                .collect(),
        }
    }

    /// Whether the query had a non-empty relevant set.
    pub fn is_scored(&self) -> bool {
        self.relevant_count > 0
    }
}

/// Means over the scored queries of one condition.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConditionSummary {
    pub condition: String,
    pub docset: String,
    pub mode: RetrievalMode,
    pub model: Option<String>,
    pub rrf_weights: Option<FusionWeights>,
    /// Records evaluated under this condition.
    pub query_count: usize,
    /// Records with a defined (non-empty) relevant set.
    pub scored_count: usize,
    pub mrr: Option<f64>,
    pub recall_at_k: BTreeMap<usize, Option<f64>>,
    pub ndcg_at_k: BTreeMap<usize, Option<f64>>,
}

/// Output of [`compute`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricsReport {
    pub data_version: String,
    pub ks: Vec<usize>,
    /// One entry per condition, ordered by condition.
    pub summary: Vec<ConditionSummary>,
    /// One entry per record, in input order.
    pub per_query: Vec<QueryMetrics>,
}

/// Mean of the defined values, or `None` when there are none.
fn mean_defined(values: impl Iterator<Item = Option<f64>>) -> Option<f64> {
    let (sum, count) = values
        .flatten()
        .fold((0.0, 0usize), |(sum, count), v| (sum + v, count + 1));
    (count > 0).then(|| sum / count as f64)
}

fn mean_per_k<F>(rows: &[&QueryMetrics], ks: &[usize], pick: F) -> BTreeMap<usize, Option<f64>>
where
    F: Fn(&QueryMetrics) -> &BTreeMap<usize, Option<f64>>,
{
    ks.iter()
        .map(|k| {
            let values = rows.iter().map(|row| pick(*row).get(k).copied().flatten());
            (*k, mean_defined(values))
        })
        .collect()
}

fn summarize(condition: &Condition, rows: &[&QueryMetrics], ks: &[usize]) -> ConditionSummary {
    ConditionSummary {
        condition: condition.to_string(),
        docset: condition.docset.clone(),
        mode: condition.mode,
        model: condition.model.clone(),
        rrf_weights: condition.rrf_weights,
        query_count: rows.len(),
        scored_count: rows.iter().filter(|row| row.is_scored()).count(),
        mrr: mean_defined(rows.iter().map(|row| row.reciprocal_rank)),
        recall_at_k: mean_per_k(rows, ks, |row| &row.recall_at_k),
        ndcg_at_k: mean_per_k(rows, ks, |row| &row.ndcg_at_k),
    }
}

/// Score every record and aggregate per condition.
///
/// # Errors
///
/// - [`Error::InvalidInput`] for an empty record stream or bad cutoffs.
/// - [`Error::UnknownQuery`] when a record has no judgment for its
///   (slug, docset).
/// - [`Error::MalformedJudgment`] when a vector or hybrid record's model is
///   missing from a per-model judgment.
///
/// Either way the whole computation fails; nothing is partially reported.
#[instrument(
    skip(records, judgments),
    fields(subsystem = "metrics", component = "engine", op = "compute", record_count = records.len())
)]
pub fn compute(
    records: &[RankingRecord],
    judgments: &JudgmentSet,
    ks: &[usize],
) -> Result<MetricsReport> {
    let ks = normalize_ks(ks)?;
    if records.is_empty() {
        return Err(Error::InvalidInput("rankings stream is empty".to_string()));
    }

    let mut per_query = Vec::with_capacity(records.len());
    let mut groups: BTreeMap<Condition, Vec<usize>> = BTreeMap::new();

    for record in records {
        let relevant = judgments.relevant(
            &record.query_slug,
            &record.docset,
            record.model.as_deref(),
        )?;
        groups
            .entry(Condition::of(record))
            .or_default()
            .push(per_query.len());
        per_query.push(QueryMetrics::compute(record, &relevant, &ks));
    }

    let summary: Vec<ConditionSummary> = groups
        .iter()
        .map(|(condition, indices)| {
            let rows: Vec<&QueryMetrics> = indices.iter().map(|&i| &per_query[i]).collect();
            summarize(condition, &rows, &ks)
        })
        .collect();

    info!(
        condition_count = summary.len(),
        scored_count = per_query.iter().filter(|q| q.is_scored()).count(),
        "Metrics computed"
    );

    Ok(MetricsReport {
        data_version: judgments.version().to_string(),
        ks,
        summary,
        per_query,
    })
}
