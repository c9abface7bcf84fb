//! The import/reconciliation pipeline.
//!
//! `engine` sequences the stages per object type in import order:
//! snapshot load, metadata-driven sanitization, default fallback
//! substitution, reference validation, batched insert with id-map capture,
//! and the separate reconciliation pass that rewrites lookups from the
//! accumulated maps.

pub mod batch;
pub mod defaults;
pub mod engine;
pub mod export;
pub mod metadata;
pub mod resolve;
pub mod sanitize;
pub mod validate;
