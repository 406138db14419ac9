use std::fmt::Display;

use bytes::Bytes;
use serde::{Serialize, Serializer};
use tracing::info;
use uuid::Uuid;

use crate::Error;
use crate::config::CacheConfig;
use crate::instrument::{CallHistory, CountCalls, Operation, call_history, count_calls};
use crate::replay::{History, replay};
use crate::store::KVStore;

/// Name under which [Cache::store] is counted and recorded.
pub const STORE_OPERATION: &str = "Cache.store";

/// Bytes accepted by [Cache::store]. Text and numbers are stored as their decimal text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreValue(Bytes);

impl StoreValue {
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn into_bytes(self) -> Bytes {
        self.0
    }
}

impl From<Bytes> for StoreValue {
    fn from(value: Bytes) -> Self {
        Self(value)
    }
}

impl From<Vec<u8>> for StoreValue {
    fn from(value: Vec<u8>) -> Self {
        Self(Bytes::from(value))
    }
}

impl From<&[u8]> for StoreValue {
    fn from(value: &[u8]) -> Self {
        Self(Bytes::copy_from_slice(value))
    }
}

impl<const N: usize> From<&[u8; N]> for StoreValue {
    fn from(value: &[u8; N]) -> Self {
        Self(Bytes::copy_from_slice(value))
    }
}

impl From<String> for StoreValue {
    fn from(value: String) -> Self {
        Self(Bytes::from(value))
    }
}

impl From<&str> for StoreValue {
    fn from(value: &str) -> Self {
        Self(Bytes::copy_from_slice(value.as_bytes()))
    }
}

impl From<i64> for StoreValue {
    fn from(value: i64) -> Self {
        Self(Bytes::from(value.to_string()))
    }
}

impl From<i32> for StoreValue {
    fn from(value: i32) -> Self {
        Self(Bytes::from(value.to_string()))
    }
}

impl From<u64> for StoreValue {
    fn from(value: u64) -> Self {
        Self(Bytes::from(value.to_string()))
    }
}

/// Always written with a decimal point (`2.0`, not `2`) so a float never reads back as an integer.
impl From<f64> for StoreValue {
    fn from(value: f64) -> Self {
        Self(Bytes::from(format!("{value:?}")))
    }
}

/// Recorded as a JSON string when the bytes are UTF-8, as an array of bytes otherwise.
impl Serialize for StoreValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match std::str::from_utf8(&self.0) {
            Ok(text) => serializer.serialize_str(text),
            Err(_) => serializer.collect_seq(self.0.iter()),
        }
    }
}

/// Result of [Cache::get] when no converter is given.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    /// The stored bytes are the decimal text of an `i64`.
    Integer(i64),
    /// Anything else, returned untouched.
    Bytes(Bytes),
}

impl Value {
    /// Integer if `raw` parses as one, raw bytes otherwise. Nothing else is inferred.
    fn infer(raw: Bytes) -> Self {
        match parse_integer(&raw) {
            Ok(n) => Value::Integer(n),
            Err(_) => Value::Bytes(raw),
        }
    }
}

fn parse_integer(raw: &[u8]) -> Result<i64, String> {
    let text = std::str::from_utf8(raw).map_err(|e| format!("not UTF-8: {e}"))?;
    text.parse::<i64>()
        .map_err(|e| format!("{text:?} is not an integer: {e}"))
}

/// The uninstrumented write behind [Cache::store]: a fresh random key, one `set`.
#[derive(Clone)]
pub struct StoreEntry<S> {
    store: S,
}

impl<S: KVStore> StoreEntry<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }
}

impl<S: KVStore> Operation for StoreEntry<S> {
    type Input = StoreValue;
    type Output = String;

    fn name(&self) -> &str {
        STORE_OPERATION
    }

    async fn call(&self, data: StoreValue) -> crate::Result<String> {
        let key = Uuid::new_v4().to_string();
        self.store.set(&key, data.into_bytes()).await?;
        Ok(key)
    }
}

type InstrumentedStore<S> = CountCalls<CallHistory<StoreEntry<S>, S>, S>;

/// Cache stores opaque values under random keys in a [KVStore]. Every [Cache::store] call is
/// counted and recorded under [STORE_OPERATION].
#[derive(Clone)]
pub struct Cache<S> {
    store: S,
    store_op: InstrumentedStore<S>,
}

impl<S: KVStore> Cache<S> {
    pub fn new(store: S) -> Self {
        let store_op = count_calls(
            call_history(StoreEntry::new(store.clone()), store.clone()),
            store.clone(),
        );
        Self { store, store_op }
    }

    /// Create a [Cache], emptying the backing database first when configured to.
    pub async fn open(store: S, config: &CacheConfig) -> crate::Result<Self> {
        if config.flush_on_start {
            store.flush().await?;
            info!("Flushed backing store before opening cache");
        }
        Ok(Self::new(store))
    }

    /// Write `data` under a new random key and return the key.
    pub async fn store(&self, data: impl Into<StoreValue>) -> crate::Result<String> {
        self.store_op.call(data.into()).await
    }

    /// Best-effort typed read: an integer if the stored bytes parse as one, otherwise the raw
    /// bytes. `Ok(None)` if the key does not exist.
    pub async fn get(&self, key: &str) -> crate::Result<Option<Value>> {
        Ok(self.store.get(key).await?.map(Value::infer))
    }

    /// Read `key` and run `convert` on the raw bytes. A converter failure is returned as
    /// [Error::Conversion]; there is no fallback once a converter is given.
    pub async fn get_with<T, E, F>(&self, key: &str, convert: F) -> crate::Result<Option<T>>
    where
        F: FnOnce(&[u8]) -> Result<T, E>,
        E: Display,
    {
        let Some(raw) = self.store.get(key).await? else {
            return Ok(None);
        };
        convert(&raw)
            .map(Some)
            .map_err(|e| Error::Conversion(format!("key={key}: {e}")))
    }

    pub async fn get_as_text(&self, key: &str) -> crate::Result<Option<String>> {
        self.get_with(key, |raw| std::str::from_utf8(raw).map(str::to_owned))
            .await
    }

    pub async fn get_as_integer(&self, key: &str) -> crate::Result<Option<i64>> {
        self.get_with(key, parse_integer).await
    }

    /// How many times [Cache::store] has been called.
    pub async fn calls(&self) -> crate::Result<u64> {
        let calls = self.get_with(STORE_OPERATION, |raw| {
            std::str::from_utf8(raw)
                .map_err(|e| e.to_string())
                .and_then(|s| s.parse::<u64>().map_err(|e| e.to_string()))
        });
        Ok(calls.await?.unwrap_or(0))
    }

    /// The recorded [Cache::store] calls in call order.
    pub async fn replay(&self) -> crate::Result<History> {
        replay(&self.store, STORE_OPERATION).await
    }

    /// The backing store handle.
    pub fn backend(&self) -> &S {
        &self.store
    }
}
