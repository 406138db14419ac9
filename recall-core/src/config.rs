use std::collections::HashMap;
use std::time::Duration;

use crate::Error;

const ENV_RECALL_REDIS_URL: &str = "RECALL_REDIS_URL";
const ENV_RECALL_FLUSH_ON_START: &str = "RECALL_FLUSH_ON_START";
const ENV_RECALL_PAGE_TTL_SECS: &str = "RECALL_PAGE_TTL_SECS";
const ENV_RECALL_HTTP_TIMEOUT_MILLIS: &str = "RECALL_HTTP_TIMEOUT_MILLIS";
const ENV_RECALL_MONGO_URL: &str = "RECALL_MONGO_URL";
const ENV_RECALL_MONGO_DATABASE: &str = "RECALL_MONGO_DATABASE";
const ENV_RECALL_MONGO_COLLECTION: &str = "RECALL_MONGO_COLLECTION";

#[derive(Debug, Clone, PartialEq)]
pub struct RedisConfig {
    pub addr: String,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            addr: "redis://127.0.0.1:6379".to_owned(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CacheConfig {
    /// Empty the backing database when the [Cache](crate::Cache) is opened.
    pub flush_on_start: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WebConfig {
    /// Expiry applied to the cached page and its access counter.
    pub ttl_secs: u64,
    pub timeout_millis: u64,
}

impl WebConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_millis)
    }
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            ttl_secs: 10,
            timeout_millis: 10_000,
        }
    }
}

/// Location of the nginx access log collection read by `log-stats`.
#[derive(Debug, Clone, PartialEq)]
pub struct MongoConfig {
    pub url: String,
    pub database: String,
    pub collection: String,
}

impl Default for MongoConfig {
    fn default() -> Self {
        Self {
            url: "mongodb://127.0.0.1:27017".to_owned(),
            database: "logs".to_owned(),
            collection: "nginx".to_owned(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Settings {
    pub redis: RedisConfig,
    pub cache: CacheConfig,
    pub web: WebConfig,
    pub mongo: MongoConfig,
}

/// This implementation is to load settings from env variables
impl TryFrom<HashMap<String, String>> for Settings {
    type Error = Error;
    fn try_from(env_vars: HashMap<String, String>) -> std::result::Result<Self, Self::Error> {
        let mut settings = Settings::default();

        if let Some(addr) = env_vars.get(ENV_RECALL_REDIS_URL) {
            settings.redis.addr = addr.to_owned();
        }

        if let Some(flush) = env_vars.get(ENV_RECALL_FLUSH_ON_START) {
            settings.cache.flush_on_start = flush.to_lowercase().parse().map_err(|e| {
                Error::ParseConfig(format!(
                    "Parsing {ENV_RECALL_FLUSH_ON_START}(set to '{flush}'): {e:?}"
                ))
            })?;
        }

        if let Some(ttl_secs) = env_vars.get(ENV_RECALL_PAGE_TTL_SECS) {
            settings.web.ttl_secs = ttl_secs.parse().map_err(|e| {
                Error::ParseConfig(format!("parsing {ENV_RECALL_PAGE_TTL_SECS}: {e:?}"))
            })?;
        }

        if let Some(timeout) = env_vars.get(ENV_RECALL_HTTP_TIMEOUT_MILLIS) {
            settings.web.timeout_millis = timeout.parse().map_err(|e| {
                Error::ParseConfig(format!("parsing {ENV_RECALL_HTTP_TIMEOUT_MILLIS}: {e:?}"))
            })?;
        }

        if let Some(url) = env_vars.get(ENV_RECALL_MONGO_URL) {
            settings.mongo.url = url.to_owned();
        }

        if let Some(database) = env_vars.get(ENV_RECALL_MONGO_DATABASE) {
            settings.mongo.database = database.to_owned();
        }

        if let Some(collection) = env_vars.get(ENV_RECALL_MONGO_COLLECTION) {
            settings.mongo.collection = collection.to_owned();
        }

        Ok(settings)
    }
}
