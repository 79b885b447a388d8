//! Raw document fetching
//!
//! `Fetcher` is the single network primitive the cache sits on: one GET per
//! call, no retries. Non-2xx answers and transport failures are both errors.

use crate::error::{CatalogError, CatalogResult};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError, RwLock};
use std::time::Duration;
use ureq::Agent;

/// Upper bound for a single document body
const MAX_DOCUMENT_BYTES: u64 = 64 * 1024 * 1024;

/// Fetches the raw bytes behind a URL
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Perform one GET; any non-success answer is an error
    async fn fetch(&self, url: &str) -> CatalogResult<Vec<u8>>;
}

/// HTTP(S) fetcher backed by a blocking `ureq` agent
#[derive(Clone)]
pub struct HttpFetcher {
    agent: Agent,
}

impl HttpFetcher {
    /// Create a fetcher with an optional proxy and overall request timeout.
    ///
    /// Without an explicit proxy, the standard proxy environment variables apply.
    pub fn new(proxy: Option<&str>, timeout: Option<Duration>) -> CatalogResult<Self> {
        let mut builder = Agent::config_builder().timeout_global(timeout);

        if let Some(proxy) = proxy {
            let parsed = ureq::Proxy::new(proxy).map_err(|e| CatalogError::ProxyInvalid {
                proxy: proxy.to_string(),
                reason: e.to_string(),
            })?;
            builder = builder.proxy(Some(parsed));
        }

        Ok(Self {
            agent: Agent::new_with_config(builder.build()),
        })
    }

    fn get_blocking(agent: &Agent, url: &str) -> CatalogResult<Vec<u8>> {
        let mut response = agent.get(url).call().map_err(|e| match e {
            ureq::Error::StatusCode(status) => CatalogError::HttpStatus {
                url: url.to_string(),
                status,
            },
            other => CatalogError::Transport {
                url: url.to_string(),
                reason: other.to_string(),
            },
        })?;

        response
            .body_mut()
            .with_config()
            .limit(MAX_DOCUMENT_BYTES)
            .read_to_vec()
            .map_err(|e| CatalogError::Transport {
                url: url.to_string(),
                reason: format!("reading body: {}", e),
            })
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> CatalogResult<Vec<u8>> {
        let agent = self.agent.clone();
        let owned = url.to_string();
        tokio::task::spawn_blocking(move || Self::get_blocking(&agent, &owned))
            .await
            .map_err(|e| CatalogError::Task(format!("fetch {}: {}", url, e)))?
    }
}

/// In-memory fetcher serving a fixed set of documents.
///
/// Unknown URLs answer 404. Keeps per-URL request counts and the highest
/// number of requests observed in flight at once.
#[derive(Debug, Default)]
pub struct StaticFetcher {
    documents: RwLock<HashMap<String, Vec<u8>>>,
    requests: Mutex<HashMap<String, usize>>,
    latency: Duration,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
}

impl StaticFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every response by `latency`
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Serve `body` for `url`, replacing any previous document
    pub fn insert(&self, url: impl Into<String>, body: impl Into<Vec<u8>>) {
        self.documents
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(url.into(), body.into());
    }

    /// Stop serving `url`
    pub fn remove(&self, url: &str) {
        self.documents
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(url);
    }

    /// Number of fetches issued for `url`
    pub fn request_count(&self, url: &str) -> usize {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(url)
            .copied()
            .unwrap_or(0)
    }

    /// Number of fetches issued for any URL
    pub fn total_requests(&self) -> usize {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .sum()
    }

    /// Highest number of fetches that were in progress simultaneously
    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Fetcher for StaticFetcher {
    async fn fetch(&self, url: &str) -> CatalogResult<Vec<u8>> {
        *self
            .requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(url.to_string())
            .or_default() += 1;

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(now, Ordering::SeqCst);

        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        let body = self
            .documents
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(url)
            .cloned();

        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        body.ok_or_else(|| CatalogError::HttpStatus {
            url: url.to_string(),
            status: 404,
        })
    }
}
