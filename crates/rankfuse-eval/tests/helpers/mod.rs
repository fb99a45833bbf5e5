//! In-process collaborators for sweep tests.
//!
//! The fakes return fixed candidate lists and record how they were called,
//! so tests can assert on call counts and request concurrency without a
//! database or an embedding server.

#![allow(dead_code)]

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use rankfuse_eval::{
    CandidateList, DocumentId, Error, ModelRegistry, QuerySpec, Result, TextSearch, Vector,
    VectorSearch,
};

/// Tracks how many collaborator calls are running at once.
#[derive(Default)]
pub struct InFlight {
    current: AtomicUsize,
    max: AtomicUsize,
}

impl InFlight {
    pub fn max(&self) -> usize {
        self.max.load(Ordering::SeqCst)
    }

    async fn hold(&self, delay: Duration) {
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.max.fetch_max(now, Ordering::SeqCst);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        self.current.fetch_sub(1, Ordering::SeqCst);
    }
}

pub fn candidates(ids: &[DocumentId], limit: usize) -> Result<CandidateList> {
    CandidateList::from_ordered(
        ids.iter()
            .take(limit)
            .enumerate()
            .map(|(i, id)| (*id, 10.0 - i as f64, Some(format!("doc {}", id)))),
    )
}

pub fn query(slug: &str, text: &str) -> QuerySpec {
    QuerySpec {
        slug: slug.to_string(),
        query: text.to_string(),
    }
}

// =============================================================================
// TEXT
// =============================================================================

/// Text search keyed by query text.
#[derive(Default)]
pub struct FakeText {
    results: HashMap<String, Vec<DocumentId>>,
    failing: BTreeSet<String>,
    calls: Mutex<Vec<(String, bool)>>,
    delay: Duration,
    in_flight: Arc<InFlight>,
}

impl FakeText {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_results(mut self, query: &str, ids: &[DocumentId]) -> Self {
        self.results.insert(query.to_string(), ids.to_vec());
        self
    }

    /// Fail every search for `query` with a request error.
    pub fn failing_for(mut self, query: &str) -> Self {
        self.failing.insert(query.to_string());
        self
    }

    pub fn with_delay(mut self, delay: Duration, in_flight: Arc<InFlight>) -> Self {
        self.delay = delay;
        self.in_flight = in_flight;
        self
    }

    /// Every (query, literal) pair searched, in call order.
    pub fn calls(&self) -> Vec<(String, bool)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self, query: &str) -> usize {
        self.calls().iter().filter(|(q, _)| q == query).count()
    }
}

#[async_trait]
impl TextSearch for FakeText {
    async fn search_text(
        &self,
        query: &str,
        _docset: &str,
        limit: usize,
        literal: bool,
    ) -> Result<CandidateList> {
        self.calls
            .lock()
            .unwrap()
            .push((query.to_string(), literal));
        self.in_flight.hold(self.delay).await;

        if self.failing.contains(query) {
            return Err(Error::Request("text engine unreachable".to_string()));
        }
        match self.results.get(query) {
            Some(ids) => candidates(ids, limit),
            None => Ok(CandidateList::empty()),
        }
    }
}

// =============================================================================
// VECTOR
// =============================================================================

/// Vector search keyed by model; the query vector is ignored.
#[derive(Default)]
pub struct FakeVector {
    results: HashMap<String, Vec<DocumentId>>,
    calls: AtomicUsize,
    delay: Duration,
    in_flight: Arc<InFlight>,
}

impl FakeVector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_results(mut self, model: &str, ids: &[DocumentId]) -> Self {
        self.results.insert(model.to_string(), ids.to_vec());
        self
    }

    pub fn with_delay(mut self, delay: Duration, in_flight: Arc<InFlight>) -> Self {
        self.delay = delay;
        self.in_flight = in_flight;
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl VectorSearch for FakeVector {
    async fn search_vector(
        &self,
        _query_vector: &Vector,
        model: &str,
        _docset: &str,
        limit: usize,
    ) -> Result<CandidateList> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.in_flight.hold(self.delay).await;

        match self.results.get(model) {
            Some(ids) => candidates(ids, limit),
            None => Err(Error::UnregisteredModel(model.to_string())),
        }
    }
}

// =============================================================================
// REGISTRY
// =============================================================================

pub struct FakeRegistry {
    models: BTreeMap<String, usize>,
}

impl FakeRegistry {
    pub fn new(models: &[(&str, usize)]) -> Self {
        Self {
            models: models
                .iter()
                .map(|(name, dims)| (name.to_string(), *dims))
                .collect(),
        }
    }
}

#[async_trait]
impl ModelRegistry for FakeRegistry {
    async fn model_dimensions(&self) -> Result<BTreeMap<String, usize>> {
        Ok(self.models.clone())
    }
}
