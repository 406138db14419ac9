use std::time::Duration;

use bytes::Bytes;

pub mod in_memory_store;
pub mod redis_store;

/// KVStore is the minimal interface the [Cache](crate::Cache), the instrumentation wrappers and
/// the [PageCache](crate::web::PageCache) need from the external key-value store. Every method is
/// a single round trip and nothing is retried.
#[trait_variant::make(Send)]
pub trait KVStore: Clone + Sync + 'static {
    /// Unconditionally write `value` under `key`, replacing whatever was there (and its expiry).
    async fn set(&self, key: &str, value: Bytes) -> crate::Result<()>;

    /// Read the value under `key`. `Ok(None)` if the key does not exist.
    async fn get(&self, key: &str) -> crate::Result<Option<Bytes>>;

    /// Atomically increment the integer under `key`, treating a missing key as 0, and return the
    /// new value.
    async fn incr(&self, key: &str) -> crate::Result<i64>;

    /// Append `value` at the tail of the list under `key`, creating the list if needed.
    async fn append_to_list(&self, key: &str, value: Bytes) -> crate::Result<()>;

    /// Read the whole list under `key` in insertion order. A missing key is an empty list.
    async fn read_list(&self, key: &str) -> crate::Result<Vec<Bytes>>;

    /// Set a time-to-live on `key`. Returns false if the key does not exist.
    async fn expire(&self, key: &str, ttl: Duration) -> crate::Result<bool>;

    /// Remove every key from the current database.
    async fn flush(&self) -> crate::Result<()>;
}
