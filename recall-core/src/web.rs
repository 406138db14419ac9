use std::time::Duration;

use bytes::Bytes;
use tracing::{debug, info, warn};

use crate::Error;
use crate::config::WebConfig;
use crate::store::KVStore;

/// Fetcher retrieves the text of a page. Any failure, including a non-2xx status, is an error.
#[trait_variant::make(Send)]
pub trait Fetcher: Sync {
    async fn fetch(&self, url: &str) -> crate::Result<String>;
}

/// [Fetcher] backed by a [reqwest::Client].
#[derive(Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new(config: &WebConfig) -> crate::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| Error::Fetch(format!("Creating HTTP client: {e:?}")))?;
        Ok(Self { client })
    }
}

impl Fetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> crate::Result<String> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .and_then(|response| response.error_for_status())
            .map_err(|e| Error::Fetch(format!("Requesting {url}: {e}")))?;

        response
            .text()
            .await
            .map_err(|e| Error::Fetch(format!("Reading body of {url}: {e}")))
    }
}

/// Key of the access counter of `url`.
pub fn count_key(url: &str) -> String {
    format!("count:{url}")
}

/// Key of the cached text of `url`.
pub fn cached_key(url: &str) -> String {
    format!("cached:{url}")
}

/// PageCache serves page text from the [KVStore] while it is fresh and fetches it otherwise.
#[derive(Clone)]
pub struct PageCache<S, F> {
    store: S,
    fetcher: F,
    ttl: Duration,
}

impl<S: KVStore, F: Fetcher> PageCache<S, F> {
    pub fn new(store: S, fetcher: F, config: &WebConfig) -> Self {
        Self {
            store,
            fetcher,
            ttl: config.ttl(),
        }
    }

    /// Returns the text of `url`, from the store if a fresh copy exists.
    ///
    /// A successful fetch stores the text, bumps the access counter, and sets the expiry on both.
    /// A failed fetch is logged and yields `Ok(None)`; store failures are returned as errors.
    pub async fn get_page(&self, url: &str) -> crate::Result<Option<String>> {
        let cached_key = cached_key(url);
        if let Some(cached) = self.store.get(&cached_key).await? {
            match String::from_utf8(cached.to_vec()) {
                Ok(text) => {
                    debug!(url, "Serving page from cache");
                    return Ok(Some(text));
                }
                Err(e) => warn!(url, error = %e, "Cached page is not UTF-8, fetching again"),
            }
        }

        let text = match self.fetcher.fetch(url).await {
            Ok(text) => text,
            Err(e) => {
                warn!(url, error = %e, "Fetching page failed");
                return Ok(None);
            }
        };

        let count_key = count_key(url);
        self.store
            .set(&cached_key, Bytes::from(text.clone()))
            .await?;
        self.store.expire(&cached_key, self.ttl).await?;
        let count = self.store.incr(&count_key).await?;
        self.store.expire(&count_key, self.ttl).await?;

        info!(url, count, bytes = text.len(), "Fetched page");
        Ok(Some(text))
    }

    /// Number of successful fetches of `url` within the current expiry window.
    pub async fn access_count(&self, url: &str) -> crate::Result<u64> {
        let Some(raw) = self.store.get(&count_key(url)).await? else {
            return Ok(0);
        };
        std::str::from_utf8(&raw)
            .ok()
            .and_then(|s| s.parse().ok())
            .ok_or_else(|| Error::Store(format!("Access counter of {url} is not an integer")))
    }
}
