//! Bounded-concurrency fetching through the cache
//!
//! Every request runs as its own task. A semaphore admits at most
//! `max_concurrent` cache reads at once; the result is recorded under a mutex
//! and the request's callback (if any) is handed to the blocking pool.
//! `fetch_all` returns after every fetch and then every callback has finished.

use crate::cache::CacheStore;
use crate::config::schema::FetchConfig;
use crate::error::{CatalogError, CatalogResult};
use crate::logging::Logger;
use futures_util::future::join_all;
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::{JoinHandle, JoinSet};

/// Bytes or the error that prevented getting them
pub type FetchResult = Result<Arc<[u8]>, Arc<CatalogError>>;

/// Invoked once with the outcome of its request
pub type FetchCallback = Box<dyn FnOnce(FetchOutcome) + Send + 'static>;

/// What a callback receives
#[derive(Debug, Clone)]
pub struct FetchOutcome {
    pub url: String,
    /// Caller-chosen tag copied from the request
    pub index: usize,
    pub result: FetchResult,
}

/// One URL to fetch
pub struct FetchRequest {
    pub url: String,
    pub index: usize,
    callback: Option<FetchCallback>,
}

impl FetchRequest {
    pub fn new(url: impl Into<String>, index: usize) -> Self {
        Self {
            url: url.into(),
            index,
            callback: None,
        }
    }

    /// Run `callback` with the outcome once this request completes
    pub fn on_complete(mut self, callback: impl FnOnce(FetchOutcome) + Send + 'static) -> Self {
        self.callback = Some(Box::new(callback));
        self
    }

    pub fn has_callback(&self) -> bool {
        self.callback.is_some()
    }
}

impl std::fmt::Debug for FetchRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FetchRequest")
            .field("url", &self.url)
            .field("index", &self.index)
            .field("callback", &self.callback.is_some())
            .finish()
    }
}

/// Results of a batch, keyed by URL
#[derive(Debug, Default)]
pub struct FetchResults {
    entries: HashMap<String, FetchResult>,
}

impl FetchResults {
    pub fn get(&self, url: &str) -> Option<&FetchResult> {
        self.entries.get(url)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn succeeded(&self) -> impl Iterator<Item = (&str, &[u8])> {
        self.entries.iter().filter_map(|(url, result)| match result {
            Ok(bytes) => Some((url.as_str(), &bytes[..])),
            Err(_) => None,
        })
    }

    pub fn failed(&self) -> impl Iterator<Item = (&str, &CatalogError)> {
        self.entries.iter().filter_map(|(url, result)| match result {
            Ok(_) => None,
            Err(e) => Some((url.as_str(), e.as_ref())),
        })
    }

    pub fn into_inner(self) -> HashMap<String, FetchResult> {
        self.entries
    }
}

/// Default concurrency ceiling for this machine
pub fn default_max_concurrent() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get() * 2)
        .unwrap_or(8)
}

/// Runs batches of cache-backed fetches under a concurrency ceiling
pub struct FetchOrchestrator {
    cache: Arc<CacheStore>,
    limiter: Arc<Semaphore>,
    max_concurrent: usize,
    timeout: Option<Duration>,
    logger: Arc<dyn Logger>,
}

impl FetchOrchestrator {
    pub fn new(cache: Arc<CacheStore>, logger: Arc<dyn Logger>) -> Self {
        let max_concurrent = default_max_concurrent();
        Self {
            cache,
            limiter: Arc::new(Semaphore::new(max_concurrent)),
            max_concurrent,
            timeout: None,
            logger,
        }
    }

    /// Apply `[fetch]` settings; zero values keep the defaults
    pub fn from_config(cache: Arc<CacheStore>, logger: Arc<dyn Logger>, config: &FetchConfig) -> Self {
        let mut orchestrator = Self::new(cache, logger);
        if config.max_concurrent > 0 {
            orchestrator = orchestrator.with_max_concurrent(config.max_concurrent);
        }
        if config.timeout_secs > 0 {
            orchestrator = orchestrator.with_timeout(Some(Duration::from_secs(config.timeout_secs)));
        }
        orchestrator
    }

    pub fn with_max_concurrent(mut self, max_concurrent: usize) -> Self {
        self.max_concurrent = max_concurrent.max(1);
        self.limiter = Arc::new(Semaphore::new(self.max_concurrent));
        self
    }

    /// Deadline for a single cache read, measured after admission
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent
    }

    pub fn cache(&self) -> &Arc<CacheStore> {
        &self.cache
    }

    /// Fetch a single URL under the same gate as batches
    pub async fn fetch_one(&self, url: &str) -> CatalogResult<Vec<u8>> {
        gated_get(&self.cache, &self.limiter, self.timeout, url).await
    }

    /// Re-download `urls` past the cache, under the same gate as batches.
    ///
    /// Results are returned in input order.
    pub async fn refresh_urls(&self, urls: &[String]) -> Vec<CatalogResult<Vec<u8>>> {
        join_all(urls.iter().map(|url| {
            gated(&self.limiter, self.timeout, url, self.cache.refresh(url))
        }))
        .await
    }

    /// Fetch every request; see the module docs for ordering guarantees
    pub async fn fetch_all(&self, requests: Vec<FetchRequest>) -> FetchResults {
        let results: Arc<Mutex<HashMap<String, FetchResult>>> =
            Arc::new(Mutex::new(HashMap::with_capacity(requests.len())));
        let mut fetches: JoinSet<Option<JoinHandle<()>>> = JoinSet::new();

        for request in requests {
            let cache = Arc::clone(&self.cache);
            let limiter = Arc::clone(&self.limiter);
            let results = Arc::clone(&results);
            let timeout = self.timeout;

            fetches.spawn(async move {
                let FetchRequest {
                    url,
                    index,
                    callback,
                } = request;

                let result: FetchResult = gated_get(&cache, &limiter, timeout, &url)
                    .await
                    .map(Arc::from)
                    .map_err(Arc::new);

                results
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .insert(url.clone(), result.clone());

                callback.map(|callback| {
                    tokio::task::spawn_blocking(move || {
                        callback(FetchOutcome { url, index, result })
                    })
                })
            });
        }

        let mut callbacks = Vec::new();
        while let Some(joined) = fetches.join_next().await {
            match joined {
                Ok(Some(callback)) => callbacks.push(callback),
                Ok(None) => {}
                Err(e) => self
                    .logger
                    .error(format_args!("Fetch task failed: {}", e)),
            }
        }

        for finished in join_all(callbacks).await {
            if let Err(e) = finished {
                self.logger
                    .error(format_args!("Fetch callback failed: {}", e));
            }
        }

        let entries = std::mem::take(&mut *results.lock().unwrap_or_else(PoisonError::into_inner));
        FetchResults { entries }
    }

    /// Fetch plain URLs without callbacks
    pub async fn fetch_urls<I, S>(&self, urls: I) -> FetchResults
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let requests = urls
            .into_iter()
            .enumerate()
            .map(|(index, url)| FetchRequest::new(url, index))
            .collect();
        self.fetch_all(requests).await
    }
}

async fn gated_get(
    cache: &CacheStore,
    limiter: &Semaphore,
    timeout: Option<Duration>,
    url: &str,
) -> CatalogResult<Vec<u8>> {
    gated(limiter, timeout, url, cache.get(url)).await
}

/// Run `work` once a permit is held, bounded by `timeout`
async fn gated<F>(
    limiter: &Semaphore,
    timeout: Option<Duration>,
    url: &str,
    work: F,
) -> CatalogResult<Vec<u8>>
where
    F: Future<Output = CatalogResult<Vec<u8>>>,
{
    let _permit = limiter
        .acquire()
        .await
        .map_err(|_| CatalogError::Internal("fetch limiter closed".to_string()))?;

    match timeout {
        Some(limit) => tokio::time::timeout(limit, work)
            .await
            .map_err(|_| CatalogError::FetchTimeout {
                url: url.to_string(),
                secs: limit.as_secs(),
            })?,
        None => work.await,
    }
}
