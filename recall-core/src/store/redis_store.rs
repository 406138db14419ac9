use std::time::Duration;

use bytes::Bytes;
use redis::AsyncCommands;
use redis::aio::ConnectionManager;
use tracing::info;

use crate::Error;
use crate::config::RedisConfig;
use crate::store::KVStore;

const FLUSHDB: &str = "FLUSHDB";

/// RedisStore is the production [KVStore]. The connection is opened once in [RedisStore::new]
/// and the [ConnectionManager] handle is cloned per command.
#[derive(Clone)]
pub struct RedisStore {
    client: ConnectionManager,
}

impl RedisStore {
    pub async fn new(config: &RedisConfig) -> crate::Result<Self> {
        let client = redis::Client::open(config.addr.as_str())
            .map_err(|e| Error::Connection(format!("Creating Redis client: {e:?}")))?;
        let client = client
            .get_connection_manager()
            .await
            .map_err(|e| Error::Connection(format!("Connecting to Redis server: {e:?}")))?;

        info!(addr = %config.addr, "Connected to Redis");
        Ok(Self { client })
    }
}

/// `PEXPIRE` argument for `ttl`. Only a zero ttl maps to 0, which deletes the key; anything
/// shorter than a millisecond is rounded up so the key outlives the call.
fn expiry_millis(ttl: Duration) -> i64 {
    if ttl.is_zero() {
        return 0;
    }
    i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX).max(1)
}

impl KVStore for RedisStore {
    async fn set(&self, key: &str, value: Bytes) -> crate::Result<()> {
        let mut conn = self.client.clone();
        let _: () = conn
            .set(key, value.as_ref())
            .await
            .map_err(|e| Error::Redis(e.to_string()))?;
        Ok(())
    }

    async fn get(&self, key: &str) -> crate::Result<Option<Bytes>> {
        let mut conn = self.client.clone();
        let value: Option<Vec<u8>> = conn
            .get(key)
            .await
            .map_err(|e| Error::Redis(e.to_string()))?;
        Ok(value.map(Bytes::from))
    }

    async fn incr(&self, key: &str) -> crate::Result<i64> {
        let mut conn = self.client.clone();
        conn.incr(key, 1)
            .await
            .map_err(|e| Error::Redis(e.to_string()))
    }

    async fn append_to_list(&self, key: &str, value: Bytes) -> crate::Result<()> {
        let mut conn = self.client.clone();
        let _: i64 = conn
            .rpush(key, value.as_ref())
            .await
            .map_err(|e| Error::Redis(e.to_string()))?;
        Ok(())
    }

    async fn read_list(&self, key: &str) -> crate::Result<Vec<Bytes>> {
        let mut conn = self.client.clone();
        let values: Vec<Vec<u8>> = conn
            .lrange(key, 0, -1)
            .await
            .map_err(|e| Error::Redis(e.to_string()))?;
        Ok(values.into_iter().map(Bytes::from).collect())
    }

    async fn expire(&self, key: &str, ttl: Duration) -> crate::Result<bool> {
        let mut conn = self.client.clone();
        conn.pexpire(key, expiry_millis(ttl))
            .await
            .map_err(|e| Error::Redis(e.to_string()))
    }

    async fn flush(&self) -> crate::Result<()> {
        let mut conn = self.client.clone();
        redis::cmd(FLUSHDB)
            .exec_async(&mut conn)
            .await
            .map_err(|e| Error::Redis(e.to_string()))?;
        info!("Flushed Redis database");
        Ok(())
    }
}
