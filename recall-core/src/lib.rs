//! An instrumented facade over a key-value store.
//!
//! [Cache] writes opaque values under random keys and reads them back, while every call to
//! [Cache::store] is counted and recorded through the wrappers in [instrument]. The recorded
//! calls can be read back in order with [replay::replay].
//!
//! The backing store is anything implementing [store::KVStore]; Redis
//! ([store::redis_store::RedisStore]) is used in production and
//! [store::in_memory_store::InMemoryStore] for tests and local runs.

pub(crate) mod error;
pub use error::{Error, Result};

/// Runtime settings loaded from the environment.
pub mod config;

/// The [KVStore](store::KVStore) trait and its backends.
pub mod store;

/// Call counting and call history wrappers around an [Operation](instrument::Operation).
pub mod instrument;

/// Ordered read-out of a recorded call history.
pub mod replay;

mod cache;
pub use cache::{Cache, STORE_OPERATION, StoreEntry, StoreValue, Value};

/// Fetch-and-cache helper for web pages.
pub mod web;
