//! Evaluation sweeps.
//!
//! A sweep evaluates the cross product of queries, retrieval modes, embedding
//! models and (for hybrid) fusion weight sets, persisting one
//! [`RankingRecord`] per combination to a fresh run directory.
//!
//! Text candidates are fetched once per query and shared by every model;
//! query embeddings are cached per (model, query text). Every collaborator
//! call holds a semaphore permit, so at most `concurrency` requests are in
//! flight. A failed call skips the combinations that depend on it and the
//! sweep carries on; only misconfiguration found before the first request
//! aborts it.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tokio::sync::{OnceCell, Semaphore};
use tracing::{debug, error, info, warn};

use rankfuse_core::{
    defaults, CandidateList, EmbeddingBackend, EmbeddingModel, Error, FusionWeights,
    ModelRegistry, QuerySpec, RankedResult, RankingParams, RankingRecord, Result, RetrievalMode,
    RrfParams, Signal, TextSearch, Vector, VectorSearch,
};
use rankfuse_db::literal_query;
use rankfuse_search::{fuse_text_vector, FusedResult};

use crate::writer::{create_run_dir, write_json_pretty, RankingWriter};

// =============================================================================
// CONFIGURATION
// =============================================================================

/// Everything that defines one sweep.
#[derive(Debug, Clone)]
pub struct SweepConfig {
    pub queries: Vec<QuerySpec>,
    /// Embedding models, in evaluation order, without duplicates.
    pub models: Vec<String>,
    pub modes: BTreeSet<RetrievalMode>,
    pub weight_sets: Vec<FusionWeights>,
    pub docset: String,
    pub rrf_k: u32,
    /// Results kept per record.
    pub limit: usize,
    /// Candidate depth requested from the text engine.
    pub text_limit: usize,
    /// Candidate depth requested from the vector engine.
    pub vector_limit: usize,
    /// Quote queries so the text engine does not apply query syntax.
    pub literal_text: bool,
    /// Maximum in-flight collaborator requests.
    pub concurrency: usize,
    /// Metric cutoffs, recorded in the manifest for the metrics step.
    pub ks: Vec<usize>,
    pub data_version: String,
    /// Directory under which the run directory is created.
    pub output_root: PathBuf,
}

impl SweepConfig {
    /// Defaults for everything except the queries.
    pub fn new(queries: Vec<QuerySpec>) -> Self {
        Self {
            queries,
            models: defaults::EVAL_MODELS.iter().map(|m| m.to_string()).collect(),
            modes: BTreeSet::from([
                RetrievalMode::Text,
                RetrievalMode::Vector,
                RetrievalMode::Hybrid,
            ]),
            weight_sets: vec![FusionWeights::default()],
            docset: defaults::DOCSET.to_string(),
            rrf_k: defaults::RRF_K,
            limit: defaults::RESULT_LIMIT,
            text_limit: defaults::TEXT_LIMIT,
            vector_limit: defaults::VECTOR_LIMIT,
            literal_text: false,
            concurrency: defaults::SWEEP_CONCURRENCY,
            ks: defaults::METRIC_KS.to_vec(),
            data_version: "unknown".to_string(),
            output_root: PathBuf::from(defaults::OUTPUT_ROOT),
        }
    }

    /// Set the models, dropping blanks and repeats.
    pub fn models<I, S>(mut self, models: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut seen = BTreeSet::new();
        self.models = models
            .into_iter()
            .map(|m| m.into().trim().to_string())
            .filter(|m| !m.is_empty() && seen.insert(m.clone()))
            .collect();
        self
    }

    pub fn modes(mut self, modes: impl IntoIterator<Item = RetrievalMode>) -> Self {
        self.modes = modes.into_iter().collect();
        self
    }

    pub fn weight_sets(mut self, weight_sets: Vec<FusionWeights>) -> Self {
        self.weight_sets = weight_sets;
        self
    }

    pub fn docset(mut self, docset: impl Into<String>) -> Self {
        self.docset = docset.into();
        self
    }

    pub fn rrf_k(mut self, k: u32) -> Self {
        self.rrf_k = k;
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    pub fn text_limit(mut self, limit: usize) -> Self {
        self.text_limit = limit;
        self
    }

    pub fn vector_limit(mut self, limit: usize) -> Self {
        self.vector_limit = limit;
        self
    }

    pub fn literal_text(mut self, literal: bool) -> Self {
        self.literal_text = literal;
        self
    }

    pub fn concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    pub fn ks(mut self, ks: Vec<usize>) -> Self {
        self.ks = ks;
        self
    }

    pub fn data_version(mut self, version: impl Into<String>) -> Self {
        self.data_version = version.into();
        self
    }

    pub fn output_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.output_root = root.into();
        self
    }

    fn needs_text(&self) -> bool {
        self.modes.iter().any(|m| m.needs_text())
    }

    fn needs_vector(&self) -> bool {
        self.modes.iter().any(|m| m.needs_vector())
    }

    /// Reject configurations that cannot produce a meaningful sweep.
    pub fn validate(&self) -> Result<()> {
        let config_err = |msg: &str| Err(Error::Config(msg.to_string()));

        if self.queries.is_empty() {
            return config_err("no queries selected");
        }
        if let Some(q) = self.queries.iter().find(|q| q.query.trim().is_empty()) {
            return Err(Error::Config(format!("query '{}' has no text", q.slug)));
        }
        if self.modes.is_empty() {
            return config_err("no retrieval modes selected");
        }
        if self.needs_vector() && self.models.is_empty() {
            return config_err("vector and hybrid modes need at least one embedding model");
        }
        if self.modes.contains(&RetrievalMode::Hybrid) {
            if self.weight_sets.is_empty() {
                return config_err("hybrid mode needs at least one weight set");
            }
            for weights in &self.weight_sets {
                weights.validate()?;
            }
        }
        if self.docset.trim().is_empty() {
            return config_err("docset must not be empty");
        }
        if self.rrf_k == 0 {
            return config_err("rrf_k must be a positive integer");
        }
        if self.limit == 0 || self.text_limit == 0 || self.vector_limit == 0 {
            return config_err("limit, text_limit and vector_limit must be positive");
        }
        if self.concurrency == 0 {
            return config_err("concurrency must be at least 1");
        }
        if self.ks.is_empty() || self.ks.contains(&0) {
            return config_err("ks must be a non-empty list of positive integers");
        }
        Ok(())
    }
}

// =============================================================================
// OUTCOMES
// =============================================================================

/// Why a combination produced no record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkipReason {
    /// [`Error::kind`] of the underlying failure.
    pub kind: String,
    pub message: String,
}

impl SkipReason {
    /// The same failure, seen from a combination that needed `signal`.
    fn upstream(&self, signal: Signal) -> Self {
        Self {
            kind: self.kind.clone(),
            message: format!("{} candidates unavailable: {}", signal, self.message),
        }
    }
}

impl From<&Error> for SkipReason {
    fn from(e: &Error) -> Self {
        Self {
            kind: e.kind().to_string(),
            message: e.to_string(),
        }
    }
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

/// A combination that was skipped, with its reason.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkippedCombination {
    pub query_slug: String,
    pub mode: RetrievalMode,
    pub model: Option<String>,
    pub rrf_weights: Option<FusionWeights>,
    pub reason: SkipReason,
}

/// Output paths recorded in the manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestOutput {
    pub run_dir: PathBuf,
    pub rankings: PathBuf,
    pub manifest: PathBuf,
}

/// `run_config.json`: how a sweep was configured and how it went.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunManifest {
    pub created_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub data_version: String,
    pub docset: String,
    pub models: Vec<String>,
    /// Registered dimensionality of each evaluated model.
    pub model_dims: BTreeMap<String, usize>,
    pub modes: Vec<RetrievalMode>,
    pub weight_sets: Vec<FusionWeights>,
    pub rrf_k: u32,
    pub limit: usize,
    pub text_limit: usize,
    pub vector_limit: usize,
    pub literal_text: bool,
    pub concurrency: usize,
    pub ks: Vec<usize>,
    pub queries: Vec<String>,
    pub output: ManifestOutput,
    pub succeeded: usize,
    pub skipped_count: usize,
    pub skipped: Vec<SkippedCombination>,
}

impl RunManifest {
    /// Read a manifest back from disk.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }
}

/// What [`Runner::run`] produced.
#[derive(Debug, Clone)]
pub struct SweepOutcome {
    pub run_dir: PathBuf,
    pub rankings_path: PathBuf,
    pub manifest_path: PathBuf,
    /// Every persisted record, grouped by query in query order.
    pub records: Vec<RankingRecord>,
    pub skipped: Vec<SkippedCombination>,
}

impl SweepOutcome {
    pub fn succeeded(&self) -> usize {
        self.records.len()
    }
}

#[derive(Default)]
struct QueryOutcome {
    records: Vec<RankingRecord>,
    skipped: Vec<SkippedCombination>,
}

impl QueryOutcome {
    fn extend(&mut self, other: QueryOutcome) {
        self.records.extend(other.records);
        self.skipped.extend(other.skipped);
    }
}

// =============================================================================
// RUNNER
// =============================================================================

type Fetched<T> = std::result::Result<T, SkipReason>;

#[derive(Default)]
struct EmbeddingCache {
    cells: Mutex<HashMap<(String, String), Arc<OnceCell<Fetched<Vector>>>>>,
}

impl EmbeddingCache {
    fn cell(&self, model: &str, text: &str) -> Arc<OnceCell<Fetched<Vector>>> {
        let mut cells = self.cells.lock().unwrap_or_else(|e| e.into_inner());
        cells
            .entry((model.to_string(), text.to_string()))
            .or_default()
            .clone()
    }
}

struct SweepContext<'c> {
    config: &'c SweepConfig,
    models: &'c [EmbeddingModel],
    permits: Semaphore,
    embeddings: EmbeddingCache,
    writer: &'c RankingWriter,
}

impl SweepContext<'_> {
    async fn with_permit<F, O>(&self, call: F) -> Result<O>
    where
        F: Future<Output = Result<O>>,
    {
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| Error::Internal("collaborator semaphore closed".to_string()))?;
        call.await
    }

    async fn emit(&self, record: RankingRecord, outcome: &mut QueryOutcome) -> Result<()> {
        debug!(
            query_slug = %record.query_slug,
            mode = %record.mode,
            model = record.model.as_deref().unwrap_or("-"),
            result_count = record.results.len(),
            "Combination complete"
        );
        self.writer.send(record.clone()).await?;
        outcome.records.push(record);
        Ok(())
    }

    fn skip(
        &self,
        outcome: &mut QueryOutcome,
        query: &QuerySpec,
        mode: RetrievalMode,
        model: Option<&EmbeddingModel>,
        rrf_weights: Option<FusionWeights>,
        reason: SkipReason,
    ) {
        warn!(
            query_slug = %query.slug,
            mode = %mode,
            model = model.map_or("-", |m| m.name.as_str()),
            error_kind = %reason.kind,
            error = %reason.message,
            "Combination skipped"
        );
        outcome.skipped.push(SkippedCombination {
            query_slug: query.slug.clone(),
            mode,
            model: model.map(|m| m.name.clone()),
            rrf_weights,
            reason,
        });
    }

    fn params(&self, mode: RetrievalMode, model: Option<&EmbeddingModel>) -> RankingParams {
        RankingParams {
            limit: self.config.limit,
            text_limit: mode.needs_text().then_some(self.config.text_limit),
            vector_limit: mode.needs_vector().then_some(self.config.vector_limit),
            rrf_k: (mode == RetrievalMode::Hybrid).then_some(self.config.rrf_k),
            dims: model.map(|m| m.dims),
        }
    }

    fn text_query(&self, query: &QuerySpec) -> String {
        if self.config.literal_text {
            literal_query(&query.query)
        } else {
            query.query.clone()
        }
    }

    fn candidate_record(
        &self,
        query: &QuerySpec,
        mode: RetrievalMode,
        model: Option<&EmbeddingModel>,
        list: &CandidateList,
    ) -> RankingRecord {
        RankingRecord {
            timestamp: Utc::now(),
            query_slug: query.slug.clone(),
            query: query.query.clone(),
            mode,
            model: model.map(|m| m.name.clone()),
            docset: self.config.docset.clone(),
            rrf: None,
            params: self.params(mode, model),
            text_query: mode.needs_text().then(|| self.text_query(query)),
            results: list
                .truncated(self.config.limit)
                .iter()
                .map(|c| RankedResult {
                    rank: c.rank,
                    document_id: c.document_id,
                    score: c.score,
                    title: c.title.clone(),
                    text_rank: None,
                    vector_rank: None,
                })
                .collect(),
        }
    }

    fn fused_record(
        &self,
        query: &QuerySpec,
        model: &EmbeddingModel,
        weights: FusionWeights,
        mut fused: FusedResult,
    ) -> RankingRecord {
        fused.truncate(self.config.limit);
        RankingRecord {
            timestamp: Utc::now(),
            query_slug: query.slug.clone(),
            query: query.query.clone(),
            mode: RetrievalMode::Hybrid,
            model: Some(model.name.clone()),
            docset: self.config.docset.clone(),
            rrf: Some(RrfParams {
                k: self.config.rrf_k,
                weights,
            }),
            params: self.params(RetrievalMode::Hybrid, Some(model)),
            text_query: Some(self.text_query(query)),
            results: fused
                .hits
                .into_iter()
                .map(|hit| RankedResult {
                    rank: hit.rank,
                    document_id: hit.document_id,
                    score: hit.fused_score,
                    text_rank: hit.signal_rank(Signal::Text),
                    vector_rank: hit.signal_rank(Signal::Vector),
                    title: hit.title,
                })
                .collect(),
        }
    }
}

fn log_failure(query: &QuerySpec, signal: Signal, model: Option<&str>, e: &Error) {
    if e.is_combination_local() {
        warn!(
            query_slug = %query.slug,
            signal = %signal,
            model = model.unwrap_or("-"),
            error_kind = e.kind(),
            error = %e,
            "Retrieval failed"
        );
    } else {
        error!(
            query_slug = %query.slug,
            signal = %signal,
            model = model.unwrap_or("-"),
            error_kind = e.kind(),
            error = %e,
            "Retrieval failed with unexpected error"
        );
    }
}

/// Drives a sweep against the four collaborators.
pub struct Runner<'a, T: ?Sized, V: ?Sized, R: ?Sized, E: ?Sized> {
    text: &'a T,
    vector: &'a V,
    registry: &'a R,
    embedder: &'a E,
}

impl<'a, T, V, R, E> Runner<'a, T, V, R, E>
where
    T: TextSearch + ?Sized,
    V: VectorSearch + ?Sized,
    R: ModelRegistry + ?Sized,
    E: EmbeddingBackend + ?Sized,
{
    pub fn new(text: &'a T, vector: &'a V, registry: &'a R, embedder: &'a E) -> Self {
        Self {
            text,
            vector,
            registry,
            embedder,
        }
    }

    /// Run a full sweep and write `rankings.jsonl` and `run_config.json`
    /// into a new run directory under `config.output_root`.
    ///
    /// # Errors
    ///
    /// Fails before any retrieval request on invalid configuration
    /// ([`Error::Config`], [`Error::InvalidWeight`]) or when a requested
    /// model is not registered ([`Error::UnregisteredModel`]). Collaborator
    /// failures after that only skip combinations. Output I/O failures abort.
    pub async fn run(&self, config: &SweepConfig) -> Result<SweepOutcome> {
        config.validate()?;
        let models = self.preflight(config).await?;

        let created_at = Utc::now();
        let started = Instant::now();
        let run_dir = create_run_dir(&config.output_root, created_at).await?;
        let rankings_path = run_dir.join(defaults::RANKINGS_FILE);
        let manifest_path = run_dir.join(defaults::MANIFEST_FILE);
        let writer = RankingWriter::create(&rankings_path).await?;

        info!(
            subsystem = "eval",
            component = "runner",
            op = "run",
            query_count = config.queries.len(),
            model_count = models.len(),
            modes = ?config.modes,
            weight_set_count = config.weight_sets.len(),
            docset = %config.docset,
            concurrency = config.concurrency,
            run_dir = %run_dir.display(),
            "Sweep started"
        );

        let results = {
            let ctx = SweepContext {
                config,
                models: &models,
                permits: Semaphore::new(config.concurrency),
                embeddings: EmbeddingCache::default(),
                writer: &writer,
            };
            join_all(config.queries.iter().map(|q| self.run_query(&ctx, q))).await
        };

        let written = writer.finish().await?;
        let mut outcome = QueryOutcome::default();
        for result in results {
            outcome.extend(result?);
        }
        debug_assert_eq!(written, outcome.records.len());

        let manifest = RunManifest {
            created_at,
            finished_at: Utc::now(),
            data_version: config.data_version.clone(),
            docset: config.docset.clone(),
            models: config.models.clone(),
            model_dims: models.iter().map(|m| (m.name.clone(), m.dims)).collect(),
            modes: config.modes.iter().copied().collect(),
            weight_sets: config.weight_sets.clone(),
            rrf_k: config.rrf_k,
            limit: config.limit,
            text_limit: config.text_limit,
            vector_limit: config.vector_limit,
            literal_text: config.literal_text,
            concurrency: config.concurrency,
            ks: config.ks.clone(),
            queries: config.queries.iter().map(|q| q.slug.clone()).collect(),
            output: ManifestOutput {
                run_dir: run_dir.clone(),
                rankings: rankings_path.clone(),
                manifest: manifest_path.clone(),
            },
            succeeded: outcome.records.len(),
            skipped_count: outcome.skipped.len(),
            skipped: outcome.skipped.clone(),
        };
        write_json_pretty(&manifest_path, &manifest).await?;

        info!(
            subsystem = "eval",
            component = "runner",
            succeeded = manifest.succeeded,
            skipped = manifest.skipped_count,
            duration_ms = started.elapsed().as_millis() as u64,
            rankings = %rankings_path.display(),
            "Sweep complete"
        );

        Ok(SweepOutcome {
            run_dir,
            rankings_path,
            manifest_path,
            records: outcome.records,
            skipped: outcome.skipped,
        })
    }

    /// Resolve every requested model against the registry.
    async fn preflight(&self, config: &SweepConfig) -> Result<Vec<EmbeddingModel>> {
        if !config.needs_vector() {
            return Ok(Vec::new());
        }
        let registered = self.registry.model_dimensions().await?;
        config
            .models
            .iter()
            .map(|name| {
                registered
                    .get(name)
                    .map(|&dims| EmbeddingModel::new(name.as_str(), dims))
                    .ok_or_else(|| Error::UnregisteredModel(name.clone()))
            })
            .collect()
    }

    async fn run_query(&self, ctx: &SweepContext<'_>, query: &QuerySpec) -> Result<QueryOutcome> {
        let started = Instant::now();
        let mut outcome = QueryOutcome::default();

        let text = if ctx.config.needs_text() {
            Some(self.fetch_text(ctx, query).await)
        } else {
            None
        };

        if ctx.config.modes.contains(&RetrievalMode::Text) {
            match &text {
                Some(Ok(list)) => {
                    let record = ctx.candidate_record(query, RetrievalMode::Text, None, list);
                    ctx.emit(record, &mut outcome).await?;
                }
                Some(Err(reason)) => {
                    ctx.skip(&mut outcome, query, RetrievalMode::Text, None, None, reason.clone())
                }
                None => {}
            }
        }

        if ctx.config.needs_vector() {
            let per_model = join_all(
                ctx.models
                    .iter()
                    .map(|model| self.run_model(ctx, query, model, text.as_ref())),
            )
            .await;
            for result in per_model {
                outcome.extend(result?);
            }
        }

        debug!(
            query_slug = %query.slug,
            record_count = outcome.records.len(),
            skipped = outcome.skipped.len(),
            duration_ms = started.elapsed().as_millis() as u64,
            "Query complete"
        );
        Ok(outcome)
    }

    async fn run_model(
        &self,
        ctx: &SweepContext<'_>,
        query: &QuerySpec,
        model: &EmbeddingModel,
        text: Option<&Fetched<CandidateList>>,
    ) -> Result<QueryOutcome> {
        let mut outcome = QueryOutcome::default();
        let vector = self.fetch_vector(ctx, query, model).await;

        if ctx.config.modes.contains(&RetrievalMode::Vector) {
            match &vector {
                Ok(list) => {
                    let record =
                        ctx.candidate_record(query, RetrievalMode::Vector, Some(model), list);
                    ctx.emit(record, &mut outcome).await?;
                }
                Err(reason) => ctx.skip(
                    &mut outcome,
                    query,
                    RetrievalMode::Vector,
                    Some(model),
                    None,
                    reason.clone(),
                ),
            }
        }

        if ctx.config.modes.contains(&RetrievalMode::Hybrid) {
            for weights in &ctx.config.weight_sets {
                let fused = match (text, &vector) {
                    (Some(Ok(text_list)), Ok(vector_list)) => {
                        fuse_text_vector(text_list, vector_list, weights, ctx.config.rrf_k)
                            .map_err(|e| SkipReason::from(&e))
                    }
                    (Some(Err(reason)), _) => Err(reason.upstream(Signal::Text)),
                    (_, Err(reason)) => Err(reason.upstream(Signal::Vector)),
                    (None, Ok(_)) => Err(SkipReason::from(&Error::Internal(
                        "text candidates were not fetched".to_string(),
                    ))),
                };
                match fused {
                    Ok(fused) => {
                        let record = ctx.fused_record(query, model, *weights, fused);
                        ctx.emit(record, &mut outcome).await?;
                    }
                    Err(reason) => ctx.skip(
                        &mut outcome,
                        query,
                        RetrievalMode::Hybrid,
                        Some(model),
                        Some(*weights),
                        reason,
                    ),
                }
            }
        }

        Ok(outcome)
    }

    async fn fetch_text(&self, ctx: &SweepContext<'_>, query: &QuerySpec) -> Fetched<CandidateList> {
        let started = Instant::now();
        let result = ctx
            .with_permit(self.text.search_text(
                &query.query,
                &ctx.config.docset,
                ctx.config.text_limit,
                ctx.config.literal_text,
            ))
            .await;
        match result {
            Ok(list) => {
                debug!(
                    query_slug = %query.slug,
                    result_count = list.len(),
                    duration_ms = started.elapsed().as_millis() as u64,
                    "Text candidates fetched"
                );
                Ok(list)
            }
            Err(e) => {
                log_failure(query, Signal::Text, None, &e);
                Err(SkipReason::from(&e))
            }
        }
    }

    async fn fetch_vector(
        &self,
        ctx: &SweepContext<'_>,
        query: &QuerySpec,
        model: &EmbeddingModel,
    ) -> Fetched<CandidateList> {
        let cell = ctx.embeddings.cell(&model.name, &query.query);
        let embedding = cell
            .get_or_init(|| async {
                ctx.with_permit(self.embedder.embed(&query.query, model))
                    .await
                    .map_err(|e| {
                        log_failure(query, Signal::Vector, Some(&model.name), &e);
                        SkipReason::from(&e)
                    })
            })
            .await
            .clone()?;

        let started = Instant::now();
        let list = ctx
            .with_permit(self.vector.search_vector(
                &embedding,
                &model.name,
                &ctx.config.docset,
                ctx.config.vector_limit,
            ))
            .await
            .map_err(|e| {
                log_failure(query, Signal::Vector, Some(&model.name), &e);
                SkipReason::from(&e)
            })?;

        debug!(
            query_slug = %query.slug,
            model = %model.name,
            result_count = list.len(),
            duration_ms = started.elapsed().as_millis() as u64,
            "Vector candidates fetched"
        );
        Ok(list)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn queries() -> Vec<QuerySpec> {
        vec![QuerySpec {
            slug: "cat-care".to_string(),
            query: "猫の飼い方".to_string(),
        }]
    }

    #[test]
    fn test_defaults() {
        let config = SweepConfig::new(queries());
        assert_eq!(config.models.len(), defaults::EVAL_MODELS.len());
        assert_eq!(config.modes.len(), 3);
        assert_eq!(config.weight_sets, vec![FusionWeights::new(1.0, 1.0)]);
        assert_eq!(config.rrf_k, 60);
        assert_eq!(config.concurrency, 4);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_models_are_deduplicated_in_order() {
        let config = SweepConfig::new(queries()).models(["b", "a", " b ", ""]);
        assert_eq!(config.models, vec!["b", "a"]);
    }

    #[test]
    fn test_empty_selections_are_config_errors() {
        let cases = [
            SweepConfig::new(vec![]),
            SweepConfig::new(queries()).modes([]),
            SweepConfig::new(queries()).models(Vec::<String>::new()),
            SweepConfig::new(queries()).weight_sets(vec![]),
            SweepConfig::new(queries()).concurrency(0),
            SweepConfig::new(queries()).ks(vec![]),
            SweepConfig::new(queries()).rrf_k(0),
        ];
        for config in cases {
            assert!(
                matches!(config.validate(), Err(Error::Config(_))),
                "expected config error for {:?}",
                config
            );
        }
    }

    #[test]
    fn test_text_only_needs_no_models_or_weights() {
        let config = SweepConfig::new(queries())
            .modes([RetrievalMode::Text])
            .models(Vec::<String>::new())
            .weight_sets(vec![]);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_bad_weights_fail_validation() {
        let config =
            SweepConfig::new(queries()).weight_sets(vec![FusionWeights::new(0.0, 0.0)]);
        assert!(matches!(config.validate(), Err(Error::InvalidWeight(_))));
    }

    #[test]
    fn test_blank_query_text_is_rejected() {
        let config = SweepConfig::new(vec![QuerySpec {
            slug: "blank".to_string(),
            query: "  ".to_string(),
        }]);
        assert!(matches!(config.validate(), Err(Error::Config(msg)) if msg.contains("blank")));
    }

    #[test]
    fn test_upstream_reason_keeps_kind() {
        let reason = SkipReason::from(&Error::ModelUnavailable {
            model: "m".to_string(),
            reason: "down".to_string(),
        });
        let upstream = reason.upstream(Signal::Vector);
        assert_eq!(upstream.kind, "model_unavailable");
        assert!(upstream.message.starts_with("vector candidates unavailable"));
    }
}
