//! # rankfuse-eval
//!
//! Offline retrieval evaluation for rankfuse.
//!
//! This crate provides:
//! - The relevance judgment store ([`JudgmentSet`])
//! - Evaluation sweeps over queries, modes, models and fusion weights
//!   ([`Runner`], [`SweepConfig`])
//! - The ranking stream writer and reader
//! - Recall@k, MRR and nDCG@k with per-condition aggregation ([`compute`])
//! - `metrics.json` / `metrics.md` report rendering
//!
//! The `rankfuse` binary wraps all of it, plus ad-hoc search and document
//! embedding, behind one CLI.
//!
//! ## Example
//!
//! ```rust,ignore
//! use rankfuse_eval::{compute, read_rankings, write_report, JudgmentSet};
//!
//! let judgments = JudgmentSet::load("evaluations/data.json")?;
//! let records = read_rankings("evaluations/out/2025-01-10T09-30-00/rankings.jsonl").await?;
//! let report = compute(&records, &judgments, &[3, 5, 10])?;
//! write_report(&report, "evaluations/out/2025-01-10T09-30-00".as_ref(), true).await?;
//! ```

pub mod judgments;
pub mod metrics;
pub mod report;
pub mod runner;
pub mod writer;

pub use rankfuse_core::*;

pub use judgments::{JudgmentSet, RelevantIds};
pub use metrics::{
    compute, dcg_at_k, ndcg_at_k, normalize_ks, recall_at_k, reciprocal_rank, Condition,
    ConditionSummary, MetricsReport, QueryMetrics,
};
pub use report::{render_markdown, write_report, ReportPaths};
pub use runner::{
    ManifestOutput, RunManifest, Runner, SkipReason, SkippedCombination, SweepConfig,
    SweepOutcome,
};
pub use writer::{create_run_dir, read_rankings, write_json_pretty, RankingWriter};
