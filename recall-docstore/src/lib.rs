//! Query helpers over a document store: school/topic lookups, nginx log statistics and student
//! rankings. The helpers talk to any [DocumentStore](store::DocumentStore): MongoDB in
//! production, an in-memory collection in tests.

pub(crate) mod error;
pub use error::{Error, Result};

/// Documents, filters, updates and aggregation stages.
pub mod document;

/// Execution of aggregation pipelines over in-memory documents.
pub mod pipeline;

/// The [DocumentStore](store::DocumentStore) trait and its MongoDB and in-memory backends.
pub mod store;

pub mod schools;

/// Request counts over a collection of nginx access logs.
pub mod log_stats;

pub mod students;
