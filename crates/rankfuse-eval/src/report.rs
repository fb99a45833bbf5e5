//! Metrics report artifacts: `metrics.json` and a Markdown summary table.

use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::info;

use rankfuse_core::{defaults, Result};

use crate::metrics::{ConditionSummary, MetricsReport, QueryMetrics};
use crate::writer::write_json_pretty;

/// Where [`write_report`] put its files.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportPaths {
    pub json: PathBuf,
    pub markdown: PathBuf,
}

#[derive(Serialize)]
struct MetricsJson<'a> {
    data_version: &'a str,
    ks: &'a [usize],
    summary: &'a [ConditionSummary],
    per_query: &'a [QueryMetrics],
}

fn cell(value: Option<f64>) -> String {
    value.map_or_else(|| "n/a".to_string(), |v| format!("{:.3}", v))
}

/// Render the summary as a Markdown table, one row per condition.
///
/// Undefined means (no scored queries) are shown as `n/a`.
pub fn render_markdown(report: &MetricsReport) -> String {
    let mut headers = vec!["Condition".to_string(), "MRR".to_string()];
    headers.extend(report.ks.iter().map(|k| format!("recall@{}", k)));
    headers.extend(report.ks.iter().map(|k| format!("nDCG@{}", k)));

    let mut lines = vec![
        format!("| {} |", headers.join(" | ")),
        format!("|{}", "---|".repeat(headers.len())),
    ];

    for summary in &report.summary {
        // Condition labels use `|` as a separator; escape it inside cells.
        let mut row = vec![summary.condition.replace('|', "\\|"), cell(summary.mrr)];
        row.extend(
            report
                .ks
                .iter()
                .map(|k| cell(summary.recall_at_k.get(k).copied().flatten())),
        );
        row.extend(
            report
                .ks
                .iter()
                .map(|k| cell(summary.ndcg_at_k.get(k).copied().flatten())),
        );
        lines.push(format!("| {} |", row.join(" | ")));
    }

    let mut out = lines.join("\n");
    out.push('\n');
    out
}

/// Write `metrics.json` and `metrics.md` into `outdir`, creating it if
/// needed. Per-query detail is included in the JSON only when requested.
pub async fn write_report(
    report: &MetricsReport,
    outdir: &Path,
    include_per_query: bool,
) -> Result<ReportPaths> {
    tokio::fs::create_dir_all(outdir).await?;

    let paths = ReportPaths {
        json: outdir.join(defaults::METRICS_JSON_FILE),
        markdown: outdir.join(defaults::METRICS_MD_FILE),
    };

    let body = MetricsJson {
        data_version: &report.data_version,
        ks: &report.ks,
        summary: &report.summary,
        per_query: if include_per_query {
            &report.per_query[..]
        } else {
            &[]
        },
    };
    write_json_pretty(&paths.json, &body).await?;
    tokio::fs::write(&paths.markdown, render_markdown(report)).await?;

    info!(
        subsystem = "metrics",
        component = "report",
        json = %paths.json.display(),
        markdown = %paths.markdown.display(),
        condition_count = report.summary.len(),
        "Metrics report written"
    );
    Ok(paths)
}
