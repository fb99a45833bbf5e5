//! # rankfuse-search
//!
//! Fusion engine for hybrid retrieval.
//!
//! This crate merges the candidate lists produced by independent retrieval
//! signals (full-text and vector similarity) into one ranking with weighted
//! Reciprocal Rank Fusion. It performs no I/O and is safe to call from any
//! number of tasks at once.
//!
//! ## Example
//!
//! ```
//! use rankfuse_search::{fuse_text_vector, CandidateList, FusionWeights};
//!
//! let text = CandidateList::from_ordered(vec![(7, 3.1, None), (2, 1.4, None)]).unwrap();
//! let vector = CandidateList::from_ordered(vec![(7, 0.92, None)]).unwrap();
//!
//! let fused = fuse_text_vector(&text, &vector, &FusionWeights::new(1.0, 1.0), 60).unwrap();
//! assert_eq!(fused.document_ids(), vec![7, 2]);
//! ```

pub mod rrf;

// Re-export core types
pub use rankfuse_core::*;

pub use rrf::{fuse, fuse_text_vector, FusedHit, FusedResult};
