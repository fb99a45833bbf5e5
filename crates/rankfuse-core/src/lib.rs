//! # rankfuse-core
//!
//! Core types, traits, and abstractions for rankfuse.
//!
//! This crate provides the candidate list and ranking record types, the
//! collaborator traits the evaluation runner is written against, and the
//! shared error type and defaults.
//!
//! ## Log Level Contract
//!
//! Every crate logs through `tracing` with `subsystem`, `component` and `op`
//! fields plus the entity fields of the event (`query_slug`, `model`,
//! `mode`, `duration_ms`, `result_count`, `error_kind`).
//!
//! | Level | Usage |
//! |-------|-------|
//! | ERROR | Sweep or metrics computation aborted |
//! | WARN  | Combination skipped, slow collaborator call (`slow = true`) |
//! | INFO  | Lifecycle events (sweep start/end, files written) |
//! | DEBUG | Per-combination completions, config choices |

pub mod defaults;
pub mod error;
pub mod models;
pub mod records;
pub mod traits;

// Re-export commonly used types at crate root
pub use error::{Error, Result};
pub use models::*;
pub use records::*;
pub use traits::*;
