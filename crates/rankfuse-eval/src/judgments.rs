//! Relevance judgment store.
//!
//! One JSON file holds both the query set for a sweep and the hand-labeled
//! relevant document ids per docset:
//!
//! ```json
//! {
//!   "version": "2025-01-10",
//!   "docsets": { "seed2": 120 },
//!   "queries": [
//!     { "slug": "cat-care", "query": "猫の飼い方",
//!       "relevant_doc_ids": { "seed2": [12, 40, 41] } }
//!   ]
//! }
//! ```
//!
//! A docset entry may instead be an object keyed by embedding model when
//! each model indexes its own copy of the collection.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::info;

use rankfuse_core::{DocumentId, Error, QuerySpec, Result};

/// Relevant ids for one (query, docset).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RelevantIds {
    /// One set shared by every model.
    Shared(Vec<DocumentId>),
    /// A separate set per embedding model.
    PerModel(BTreeMap<String, Vec<DocumentId>>),
}

impl RelevantIds {
    /// Relevant set for `model`, or `None` when the entry is per-model and
    /// does not list `model`.
    ///
    /// A record without a model (text mode) is judged against the union of
    /// all per-model sets.
    pub fn for_model(&self, model: Option<&str>) -> Option<BTreeSet<DocumentId>> {
        match (self, model) {
            (RelevantIds::Shared(ids), _) => Some(ids.iter().copied().collect()),
            (RelevantIds::PerModel(by_model), Some(m)) => {
                by_model.get(m).map(|ids| ids.iter().copied().collect())
            }
            (RelevantIds::PerModel(by_model), None) => {
                Some(by_model.values().flatten().copied().collect())
            }
        }
    }

    /// Size of the largest distinct id set this entry can yield.
    fn max_distinct(&self) -> usize {
        match self {
            RelevantIds::Shared(ids) => ids.iter().collect::<BTreeSet<_>>().len(),
            RelevantIds::PerModel(by_model) => {
                by_model.values().flatten().collect::<BTreeSet<_>>().len()
            }
        }
    }
}

#[derive(Deserialize)]
struct JudgmentFile {
    #[serde(default)]
    version: Option<serde_json::Value>,
    #[serde(default)]
    docsets: Option<BTreeMap<String, u64>>,
    #[serde(default)]
    queries: Vec<JudgmentEntry>,
}

#[derive(Deserialize)]
struct JudgmentEntry {
    slug: String,
    #[serde(default)]
    query: String,
    #[serde(default)]
    relevant_doc_ids: BTreeMap<String, RelevantIds>,
}

/// Validated, read-only judgments plus the query list they cover.
#[derive(Debug, Clone)]
pub struct JudgmentSet {
    version: String,
    docsets: Option<BTreeMap<String, u64>>,
    queries: Vec<QuerySpec>,
    judgments: BTreeMap<String, BTreeMap<String, RelevantIds>>,
}

impl JudgmentSet {
    /// Read and validate a judgment file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("Failed to read judgments {}: {}", path.display(), e))
        })?;
        let set = Self::from_json_str(&raw)?;
        info!(
            subsystem = "eval",
            component = "judgments",
            path = %path.display(),
            version = %set.version,
            query_count = set.queries.len(),
            "Loaded relevance judgments"
        );
        Ok(set)
    }

    /// Parse and validate judgments from a JSON document.
    pub fn from_json_str(raw: &str) -> Result<Self> {
        let file: JudgmentFile = serde_json::from_str(raw)
            .map_err(|e| Error::MalformedJudgment(format!("invalid judgment JSON: {}", e)))?;

        if file.queries.is_empty() {
            return Err(Error::MalformedJudgment(
                "queries list is empty".to_string(),
            ));
        }

        let version = match file.version {
            None | Some(serde_json::Value::Null) => "unknown".to_string(),
            Some(serde_json::Value::String(s)) => s,
            Some(other) => other.to_string(),
        };

        let mut queries = Vec::with_capacity(file.queries.len());
        let mut judgments = BTreeMap::new();

        for entry in file.queries {
            if entry.slug.trim().is_empty() {
                return Err(Error::MalformedJudgment(
                    "query entry is missing a slug".to_string(),
                ));
            }
            if judgments.contains_key(&entry.slug) {
                return Err(Error::MalformedJudgment(format!(
                    "slug '{}' appears more than once",
                    entry.slug
                )));
            }
            if let Some(declared) = &file.docsets {
                check_against_docsets(&entry.slug, &entry.relevant_doc_ids, declared)?;
            }
            queries.push(QuerySpec {
                slug: entry.slug.clone(),
                query: entry.query,
            });
            judgments.insert(entry.slug, entry.relevant_doc_ids);
        }

        Ok(Self {
            version,
            docsets: file.docsets,
            queries,
            judgments,
        })
    }

    /// Data version string (`"unknown"` when the file has none).
    pub fn version(&self) -> &str {
        &self.version
    }

    /// Declared document count for a docset, if the file declares docsets.
    pub fn docset_size(&self, docset: &str) -> Option<u64> {
        self.docsets.as_ref()?.get(docset).copied()
    }

    /// All queries in file order.
    pub fn queries(&self) -> &[QuerySpec] {
        &self.queries
    }

    pub fn len(&self) -> usize {
        self.queries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queries.is_empty()
    }

    /// Queries whose slug is in `only`, in file order. An empty filter
    /// selects every query; a slug the file does not know is an error.
    pub fn select<S: AsRef<str>>(&self, only: &[S]) -> Result<Vec<QuerySpec>> {
        if only.is_empty() {
            return Ok(self.queries.clone());
        }
        let wanted: BTreeSet<&str> = only.iter().map(AsRef::as_ref).collect();
        let unknown: Vec<&str> = wanted
            .iter()
            .copied()
            .filter(|slug| !self.judgments.contains_key(*slug))
            .collect();
        if !unknown.is_empty() {
            return Err(Error::Config(format!(
                "Unknown query slug(s): {}",
                unknown.join(", ")
            )));
        }
        Ok(self
            .queries
            .iter()
            .filter(|q| wanted.contains(q.slug.as_str()))
            .cloned()
            .collect())
    }

    /// Relevant ids for a record's (slug, docset, model).
    ///
    /// Fails with [`Error::UnknownQuery`] when the slug is not in the file or
    /// has no judgment for `docset`, and with [`Error::MalformedJudgment`]
    /// when the docset is judged per model but not for `model`. An explicitly
    /// empty list is a valid, empty relevant set.
    pub fn relevant(
        &self,
        slug: &str,
        docset: &str,
        model: Option<&str>,
    ) -> Result<BTreeSet<DocumentId>> {
        let ids = self
            .judgments
            .get(slug)
            .and_then(|by_docset| by_docset.get(docset))
            .ok_or_else(|| Error::UnknownQuery {
                slug: slug.to_string(),
                docset: docset.to_string(),
            })?;
        ids.for_model(model).ok_or_else(|| {
            Error::MalformedJudgment(format!(
                "'{}' is judged per model in docset '{}' but has no judgment for model '{}'",
                slug,
                docset,
                model.unwrap_or_default()
            ))
        })
    }
}

fn check_against_docsets(
    slug: &str,
    relevant: &BTreeMap<String, RelevantIds>,
    declared: &BTreeMap<String, u64>,
) -> Result<()> {
    for (docset, ids) in relevant {
        match declared.get(docset) {
            None => {
                return Err(Error::MalformedJudgment(format!(
                    "'{}' references docset '{}' which is not declared in docsets",
                    slug, docset
                )))
            }
            Some(0) => {
                return Err(Error::MalformedJudgment(format!(
                    "'{}' references docset '{}' declared with zero documents",
                    slug, docset
                )))
            }
            Some(&count) => {
                let distinct = ids.max_distinct();
                if distinct as u64 > count {
                    return Err(Error::MalformedJudgment(format!(
                        "'{}' lists {} relevant ids but docset '{}' has {} documents",
                        slug, distinct, docset, count
                    )));
                }
            }
        }
    }
    Ok(())
}
