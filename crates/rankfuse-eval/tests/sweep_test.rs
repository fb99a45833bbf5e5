//! Evaluation sweeps against in-process collaborators.
//!
//! Covers:
//! - Record counts over the query x mode x model x weights product
//! - Run directory, rankings stream and manifest on disk
//! - Text fetched once per query, embeddings cached per (model, text)
//! - Failed collaborators skipping only the dependent combinations
//! - Unregistered models aborting before any request
//! - Truncation, per-signal ranks and recorded parameters
//! - The concurrency bound on collaborator calls

mod helpers;

use std::sync::Arc;
use std::time::Duration;

use rankfuse_eval::{
    read_rankings, Error, FusionWeights, QuerySpec, RankingRecord, RetrievalMode, RunManifest,
    Runner, SweepConfig,
};
use rankfuse_inference::mock::MockEmbeddingBackend;

use helpers::{query, FakeRegistry, FakeText, FakeVector, InFlight};

const CAT: &str = "猫の飼い方";
const DOG: &str = "犬の散歩";

fn text() -> FakeText {
    FakeText::new()
        .with_results(CAT, &[1, 2, 3, 4, 5])
        .with_results(DOG, &[6, 7, 8])
}

fn vector() -> FakeVector {
    FakeVector::new()
        .with_results("small", &[3, 9, 1])
        .with_results("big", &[10, 2])
        .with_results("down", &[1])
}

fn registry() -> FakeRegistry {
    FakeRegistry::new(&[("small", 8), ("big", 16), ("down", 4)])
}

fn embedder() -> MockEmbeddingBackend {
    MockEmbeddingBackend::new()
        .with_model_dimension("small", 8)
        .with_model_dimension("big", 16)
        .with_model_dimension("down", 4)
        .with_unavailable_model("down")
}

fn queries() -> Vec<QuerySpec> {
    vec![query("cat-care", CAT), query("dog-walk", DOG)]
}

fn config(root: &std::path::Path) -> SweepConfig {
    SweepConfig::new(queries())
        .models(["small", "big"])
        .weight_sets(vec![FusionWeights::new(1.0, 1.0), FusionWeights::new(1.0, 0.0)])
        .docset("seed2")
        .output_root(root)
}

fn find<'r>(
    records: &'r [RankingRecord],
    slug: &str,
    mode: RetrievalMode,
    model: Option<&str>,
    weights: Option<FusionWeights>,
) -> &'r RankingRecord {
    records
        .iter()
        .find(|r| {
            r.query_slug == slug
                && r.mode == mode
                && r.model.as_deref() == model
                && r.rrf.map(|p| p.weights) == weights
        })
        .unwrap_or_else(|| panic!("no record for {} {} {:?} {:?}", slug, mode, model, weights))
}

// =============================================================================
// FULL SWEEP
// =============================================================================

#[tokio::test]
async fn test_full_sweep_produces_every_combination() {
    let dir = tempfile::tempdir().unwrap();
    let (text, vector, registry, embedder) = (text(), vector(), registry(), embedder());
    let runner = Runner::new(&text, &vector, &registry, &embedder);

    let outcome = runner.run(&config(dir.path())).await.unwrap();

    // Per query: 1 text + 2 models x (1 vector + 2 hybrid).
    assert_eq!(outcome.succeeded(), 14);
    assert!(outcome.skipped.is_empty());

    let text_records = outcome
        .records
        .iter()
        .filter(|r| r.mode == RetrievalMode::Text)
        .count();
    assert_eq!(text_records, 2, "text records are model independent");
}

#[tokio::test]
async fn test_sweep_writes_rankings_and_manifest() {
    let dir = tempfile::tempdir().unwrap();
    let (text, vector, registry, embedder) = (text(), vector(), registry(), embedder());
    let runner = Runner::new(&text, &vector, &registry, &embedder);

    let outcome = runner
        .run(&config(dir.path()).data_version("2025-01-10"))
        .await
        .unwrap();

    assert!(outcome.run_dir.starts_with(dir.path()));
    let persisted = read_rankings(&outcome.rankings_path).await.unwrap();
    assert_eq!(persisted.len(), 14);

    let manifest = RunManifest::load(&outcome.manifest_path).unwrap();
    assert_eq!(manifest.data_version, "2025-01-10");
    assert_eq!(manifest.succeeded, 14);
    assert_eq!(manifest.skipped_count, 0);
    assert_eq!(manifest.queries, vec!["cat-care", "dog-walk"]);
    assert_eq!(manifest.model_dims["small"], 8);
    assert_eq!(manifest.model_dims["big"], 16);
    assert_eq!(manifest.output.rankings, outcome.rankings_path);
    assert!(manifest.finished_at >= manifest.created_at);
}

#[tokio::test]
async fn test_each_sweep_gets_its_own_run_dir() {
    let dir = tempfile::tempdir().unwrap();
    let (text, vector, registry, embedder) = (text(), vector(), registry(), embedder());
    let runner = Runner::new(&text, &vector, &registry, &embedder);
    let config = config(dir.path()).modes([RetrievalMode::Text]);

    let first = runner.run(&config).await.unwrap();
    let second = runner.run(&config).await.unwrap();

    assert_ne!(first.run_dir, second.run_dir);
    assert!(first.rankings_path.exists());
    assert!(second.rankings_path.exists());
}

// =============================================================================
// CALL SHARING
// =============================================================================

#[tokio::test]
async fn test_text_fetched_once_per_query() {
    let dir = tempfile::tempdir().unwrap();
    let (text, vector, registry, embedder) = (text(), vector(), registry(), embedder());
    let runner = Runner::new(&text, &vector, &registry, &embedder);

    runner.run(&config(dir.path())).await.unwrap();

    assert_eq!(text.call_count(CAT), 1);
    assert_eq!(text.call_count(DOG), 1);
    assert_eq!(vector.call_count(), 4);
    assert_eq!(embedder.call_count("small"), 2);
    assert_eq!(embedder.call_count("big"), 2);
}

#[tokio::test]
async fn test_embeddings_shared_across_identical_query_text() {
    let dir = tempfile::tempdir().unwrap();
    let (text, vector, registry, embedder) = (text(), vector(), registry(), embedder());
    let runner = Runner::new(&text, &vector, &registry, &embedder);

    let config = SweepConfig::new(vec![query("cat-a", CAT), query("cat-b", CAT)])
        .models(["small"])
        .output_root(dir.path());
    let outcome = runner.run(&config).await.unwrap();

    assert_eq!(outcome.succeeded(), 6);
    assert_eq!(embedder.call_count("small"), 1);
}

#[tokio::test]
async fn test_text_only_sweep_never_embeds() {
    let dir = tempfile::tempdir().unwrap();
    let (text, vector, embedder) = (text(), vector(), embedder());
    let empty_registry = FakeRegistry::new(&[]);
    let runner = Runner::new(&text, &vector, &empty_registry, &embedder);

    let config = config(dir.path())
        .modes([RetrievalMode::Text])
        .models(Vec::<String>::new());
    let outcome = runner.run(&config).await.unwrap();

    assert_eq!(outcome.succeeded(), 2);
    assert!(embedder.calls().is_empty());
    assert_eq!(vector.call_count(), 0);
}

// =============================================================================
// FAILURES
// =============================================================================

#[tokio::test]
async fn test_unavailable_model_skips_vector_and_hybrid() {
    let dir = tempfile::tempdir().unwrap();
    let (text, vector, registry, embedder) = (text(), vector(), registry(), embedder());
    let runner = Runner::new(&text, &vector, &registry, &embedder);

    let config = SweepConfig::new(vec![query("cat-care", CAT)])
        .models(["small", "down"])
        .output_root(dir.path());
    let outcome = runner.run(&config).await.unwrap();

    assert_eq!(outcome.succeeded(), 3);
    assert_eq!(outcome.skipped.len(), 2);
    for skipped in &outcome.skipped {
        assert_eq!(skipped.model.as_deref(), Some("down"));
        assert_eq!(skipped.reason.kind, "model_unavailable");
    }

    let hybrid = outcome
        .skipped
        .iter()
        .find(|s| s.mode == RetrievalMode::Hybrid)
        .unwrap();
    assert_eq!(hybrid.rrf_weights, Some(FusionWeights::new(1.0, 1.0)));
    assert!(hybrid
        .reason
        .message
        .starts_with("vector candidates unavailable"));

    let manifest = RunManifest::load(&outcome.manifest_path).unwrap();
    assert_eq!(manifest.skipped_count, 2);
    assert_eq!(manifest.skipped, outcome.skipped);
}

#[tokio::test]
async fn test_text_failure_keeps_vector_results() {
    let dir = tempfile::tempdir().unwrap();
    let text = text().failing_for(DOG);
    let (vector, registry, embedder) = (vector(), registry(), embedder());
    let runner = Runner::new(&text, &vector, &registry, &embedder);

    let config = SweepConfig::new(queries())
        .models(["small"])
        .output_root(dir.path());
    let outcome = runner.run(&config).await.unwrap();

    assert_eq!(outcome.succeeded(), 4);
    find(&outcome.records, "dog-walk", RetrievalMode::Vector, Some("small"), None);

    let mut skipped_modes: Vec<RetrievalMode> = outcome
        .skipped
        .iter()
        .inspect(|s| assert_eq!(s.query_slug, "dog-walk"))
        .map(|s| s.mode)
        .collect();
    skipped_modes.sort();
    assert_eq!(skipped_modes, vec![RetrievalMode::Text, RetrievalMode::Hybrid]);

    let hybrid = outcome
        .skipped
        .iter()
        .find(|s| s.mode == RetrievalMode::Hybrid)
        .unwrap();
    assert_eq!(hybrid.reason.kind, "request");
    assert!(hybrid.reason.message.starts_with("text candidates unavailable"));
}

#[tokio::test]
async fn test_unregistered_model_aborts_before_any_request() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().join("out");
    let (text, vector, registry, embedder) = (text(), vector(), registry(), embedder());
    let runner = Runner::new(&text, &vector, &registry, &embedder);

    let config = config(&root).models(["small", "ghost"]);
    let err = runner.run(&config).await.unwrap_err();

    assert!(matches!(err, Error::UnregisteredModel(ref m) if m == "ghost"));
    assert!(text.calls().is_empty());
    assert_eq!(vector.call_count(), 0);
    assert!(embedder.calls().is_empty());
    assert!(!root.exists(), "no run directory for an aborted sweep");
}

#[tokio::test]
async fn test_invalid_config_aborts_before_any_request() {
    let dir = tempfile::tempdir().unwrap();
    let (text, vector, registry, embedder) = (text(), vector(), registry(), embedder());
    let runner = Runner::new(&text, &vector, &registry, &embedder);

    let config = config(dir.path()).weight_sets(vec![FusionWeights::new(0.0, 0.0)]);
    let err = runner.run(&config).await.unwrap_err();

    assert!(matches!(err, Error::InvalidWeight(_)));
    assert!(text.calls().is_empty());
}

// =============================================================================
// RECORD CONTENTS
// =============================================================================

#[tokio::test]
async fn test_records_truncated_with_signal_ranks() {
    let dir = tempfile::tempdir().unwrap();
    let (text, vector, registry, embedder) = (text(), vector(), registry(), embedder());
    let runner = Runner::new(&text, &vector, &registry, &embedder);

    let config = config(dir.path()).limit(2);
    let outcome = runner.run(&config).await.unwrap();

    assert!(outcome.records.iter().all(|r| r.results.len() <= 2));

    // 1 and 3 appear in both lists at ranks 1/3 and 3/1; the tie goes to
    // the lower id.
    let hybrid = find(
        &outcome.records,
        "cat-care",
        RetrievalMode::Hybrid,
        Some("small"),
        Some(FusionWeights::new(1.0, 1.0)),
    );
    assert_eq!(hybrid.document_ids(), vec![1, 3]);
    assert_eq!(hybrid.results[0].text_rank, Some(1));
    assert_eq!(hybrid.results[0].vector_rank, Some(3));
    assert_eq!(hybrid.results[1].text_rank, Some(3));
    assert_eq!(hybrid.results[1].vector_rank, Some(1));
    assert_eq!(hybrid.rrf.unwrap().k, 60);
    assert_eq!(hybrid.params.rrf_k, Some(60));
    assert_eq!(hybrid.params.dims, Some(8));
    assert_eq!(hybrid.params.text_limit, Some(config.text_limit));
    assert_eq!(hybrid.params.vector_limit, Some(config.vector_limit));

    let vector_record = find(&outcome.records, "cat-care", RetrievalMode::Vector, Some("big"), None);
    assert_eq!(vector_record.document_ids(), vec![10, 2]);
    assert!(vector_record.results[0].text_rank.is_none());
    assert_eq!(vector_record.params.text_limit, None);
    assert_eq!(vector_record.params.rrf_k, None);
    assert_eq!(vector_record.params.dims, Some(16));
    assert!(vector_record.text_query.is_none());

    let text_record = find(&outcome.records, "cat-care", RetrievalMode::Text, None, None);
    assert_eq!(text_record.document_ids(), vec![1, 2]);
    assert_eq!(text_record.params.dims, None);
    assert_eq!(text_record.text_query.as_deref(), Some(CAT));
    assert_eq!(text_record.docset, "seed2");
}

#[tokio::test]
async fn test_text_only_weights_reproduce_text_ranking() {
    let dir = tempfile::tempdir().unwrap();
    let (text, vector, registry, embedder) = (text(), vector(), registry(), embedder());
    let runner = Runner::new(&text, &vector, &registry, &embedder);

    let outcome = runner.run(&config(dir.path())).await.unwrap();

    for slug in ["cat-care", "dog-walk"] {
        let text_record = find(&outcome.records, slug, RetrievalMode::Text, None, None);
        for model in ["small", "big"] {
            let hybrid = find(
                &outcome.records,
                slug,
                RetrievalMode::Hybrid,
                Some(model),
                Some(FusionWeights::new(1.0, 0.0)),
            );
            assert_eq!(hybrid.document_ids(), text_record.document_ids());
            assert!(hybrid.results.iter().all(|r| r.vector_rank.is_none()));
        }
    }
}

#[tokio::test]
async fn test_literal_text_is_passed_and_recorded() {
    let dir = tempfile::tempdir().unwrap();
    let (text, vector, registry, embedder) = (text(), vector(), registry(), embedder());
    let runner = Runner::new(&text, &vector, &registry, &embedder);

    let config = config(dir.path()).literal_text(true);
    let outcome = runner.run(&config).await.unwrap();

    assert!(text.calls().iter().all(|(_, literal)| *literal));
    let record = find(&outcome.records, "cat-care", RetrievalMode::Text, None, None);
    assert_eq!(record.text_query.as_deref(), Some("\"猫の飼い方\""));
    assert_eq!(record.query, CAT);

    let manifest = RunManifest::load(&outcome.manifest_path).unwrap();
    assert!(manifest.literal_text);
}

// =============================================================================
// CONCURRENCY
// =============================================================================

#[tokio::test]
async fn test_concurrency_bounds_in_flight_requests() {
    let dir = tempfile::tempdir().unwrap();
    let in_flight = Arc::new(InFlight::default());
    let delay = Duration::from_millis(20);

    let mut text = FakeText::new().with_delay(delay, in_flight.clone());
    let queries: Vec<QuerySpec> = (0..6)
        .map(|i| query(&format!("q{}", i), &format!("query {}", i)))
        .collect();
    for q in &queries {
        text = text.with_results(&q.query, &[1, 2, 3]);
    }
    let vector = FakeVector::new()
        .with_results("small", &[2, 3, 4])
        .with_delay(delay, in_flight.clone());
    let (registry, embedder) = (registry(), embedder());
    let runner = Runner::new(&text, &vector, &registry, &embedder);

    let config = SweepConfig::new(queries)
        .models(["small"])
        .concurrency(2)
        .output_root(dir.path());
    let outcome = runner.run(&config).await.unwrap();

    assert_eq!(outcome.succeeded(), 18);
    assert!(in_flight.max() <= 2, "saw {} requests in flight", in_flight.max());
    assert_eq!(in_flight.max(), 2);
}
