//! In-memory implementation of the [KVStore] trait for tests and local runs.
//! It mirrors the Redis semantics the crate relies on: type errors when a string command hits a
//! list (and vice versa), `INCR` failing on non-integer values, and lazy expiry.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use parking_lot::RwLock;
use tokio::time::Instant;
use tracing::debug;

use crate::Error;
use crate::store::KVStore;

const WRONG_TYPE: &str = "WRONGTYPE Operation against a key holding the wrong kind of value";

#[derive(Debug, Clone)]
enum Entry {
    Bytes(Bytes),
    List(Vec<Bytes>),
}

#[derive(Debug, Clone)]
struct Slot {
    entry: Entry,
    expires_at: Option<Instant>,
}

impl Slot {
    fn new(entry: Entry) -> Self {
        Self {
            entry,
            expires_at: None,
        }
    }

    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.is_none_or(|deadline| deadline > now)
    }
}

/// InMemoryStore keeps every key in a process-local map shared between clones.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    inner: Arc<RwLock<HashMap<String, Slot>>>,
}

impl std::fmt::Debug for InMemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryStore")
            .field("keys", &self.len())
            .finish()
    }
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of keys that have not expired.
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.inner
            .read()
            .values()
            .filter(|slot| slot.is_live(now))
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remaining time-to-live of `key`, `None` if the key is missing or has no expiry.
    pub fn ttl(&self, key: &str) -> Option<Duration> {
        let now = Instant::now();
        let inner = self.inner.read();
        let slot = inner.get(key).filter(|slot| slot.is_live(now))?;
        slot.expires_at.map(|deadline| deadline - now)
    }
}

impl KVStore for InMemoryStore {
    async fn set(&self, key: &str, value: Bytes) -> crate::Result<()> {
        self.inner
            .write()
            .insert(key.to_string(), Slot::new(Entry::Bytes(value)));
        Ok(())
    }

    async fn get(&self, key: &str) -> crate::Result<Option<Bytes>> {
        let now = Instant::now();
        let inner = self.inner.read();
        match inner.get(key).filter(|slot| slot.is_live(now)) {
            None => Ok(None),
            Some(Slot {
                entry: Entry::Bytes(value),
                ..
            }) => Ok(Some(value.clone())),
            Some(_) => Err(Error::Store(WRONG_TYPE.to_string())),
        }
    }

    async fn incr(&self, key: &str) -> crate::Result<i64> {
        let now = Instant::now();
        let mut inner = self.inner.write();
        if inner.get(key).is_some_and(|slot| !slot.is_live(now)) {
            inner.remove(key);
        }

        let slot = inner
            .entry(key.to_string())
            .or_insert_with(|| Slot::new(Entry::Bytes(Bytes::from_static(b"0"))));
        let Entry::Bytes(current) = &slot.entry else {
            return Err(Error::Store(WRONG_TYPE.to_string()));
        };
        let next = std::str::from_utf8(current)
            .ok()
            .and_then(|s| s.parse::<i64>().ok())
            .ok_or_else(|| Error::Store("value is not an integer or out of range".to_string()))?
            .checked_add(1)
            .ok_or_else(|| Error::Store("increment or decrement would overflow".to_string()))?;
        slot.entry = Entry::Bytes(Bytes::from(next.to_string()));
        Ok(next)
    }

    async fn append_to_list(&self, key: &str, value: Bytes) -> crate::Result<()> {
        let now = Instant::now();
        let mut inner = self.inner.write();
        let slot = inner
            .entry(key.to_string())
            .and_modify(|slot| {
                if !slot.is_live(now) {
                    *slot = Slot::new(Entry::List(Vec::new()));
                }
            })
            .or_insert_with(|| Slot::new(Entry::List(Vec::new())));

        match &mut slot.entry {
            Entry::List(list) => {
                list.push(value);
                Ok(())
            }
            Entry::Bytes(_) => Err(Error::Store(WRONG_TYPE.to_string())),
        }
    }

    async fn read_list(&self, key: &str) -> crate::Result<Vec<Bytes>> {
        let now = Instant::now();
        let inner = self.inner.read();
        match inner.get(key).filter(|slot| slot.is_live(now)) {
            None => Ok(Vec::new()),
            Some(Slot {
                entry: Entry::List(list),
                ..
            }) => Ok(list.clone()),
            Some(_) => Err(Error::Store(WRONG_TYPE.to_string())),
        }
    }

    async fn expire(&self, key: &str, ttl: Duration) -> crate::Result<bool> {
        let now = Instant::now();
        let mut inner = self.inner.write();
        if !inner.get(key).is_some_and(|slot| slot.is_live(now)) {
            inner.remove(key);
            return Ok(false);
        }

        // a zero ttl deletes the key right away, like Redis does
        if ttl.is_zero() {
            inner.remove(key);
        } else if let Some(slot) = inner.get_mut(key) {
            slot.expires_at = Some(now + ttl);
        }
        Ok(true)
    }

    async fn flush(&self) -> crate::Result<()> {
        let mut inner = self.inner.write();
        debug!(keys = inner.len(), "Flushing in-memory store");
        inner.clear();
        Ok(())
    }
}
