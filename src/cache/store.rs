//! Disk-backed document store with stale-while-revalidate reads
//!
//! One file per URL. A readable entry is always served, however old; entries
//! whose modification time is at least `ttl` ago are additionally queued for
//! a background refresh. Unreadable entries (bad magic, unknown version,
//! checksum or URL mismatch, broken gzip) are treated as absent.

use crate::cache::entry::{self, EntryError, COMPRESSION_THRESHOLD, HEADER_LEN};
use crate::config::{Config, ConfigManager};
use crate::error::{CatalogError, CatalogResult};
use crate::logging::Logger;
use crate::net::Fetcher;
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, SystemTime};
use tokio::fs;
use tokio::io::AsyncReadExt;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

const TEMP_SUFFIX: &str = ".tmp";
const DEFAULT_TTL: Duration = Duration::from_secs(15 * 24 * 60 * 60);

/// Settings for a [`CacheStore`]
#[derive(Debug, Clone)]
pub struct CacheOptions {
    pub dir: PathBuf,
    pub ttl: Duration,
    pub refresh_queue_capacity: usize,
    pub refresh_delay: Duration,
    pub compression_threshold: usize,
}

impl CacheOptions {
    /// Defaults rooted at `dir`
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            ttl: DEFAULT_TTL,
            refresh_queue_capacity: 100,
            refresh_delay: Duration::from_millis(100),
            compression_threshold: COMPRESSION_THRESHOLD,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self {
            dir: ConfigManager::cache_dir(config),
            ttl: match config.cache.ttl_days {
                0 => DEFAULT_TTL,
                days => Duration::from_secs(u64::from(days) * 24 * 60 * 60),
            },
            refresh_queue_capacity: config.cache.refresh_queue.max(1),
            refresh_delay: Duration::from_millis(config.cache.refresh_delay_ms),
            compression_threshold: config.cache.compression_threshold,
        }
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn with_refresh_delay(mut self, delay: Duration) -> Self {
        self.refresh_delay = delay;
        self
    }

    pub fn with_refresh_queue_capacity(mut self, capacity: usize) -> Self {
        self.refresh_queue_capacity = capacity.max(1);
        self
    }
}

impl Default for CacheOptions {
    fn default() -> Self {
        Self::new(ConfigManager::default_cache_dir())
    }
}

/// One file in the cache directory
#[derive(Debug, Clone)]
pub struct CacheEntryInfo {
    /// URL recorded in the entry header; `None` if the header is unreadable
    pub url: Option<String>,
    pub path: PathBuf,
    pub size: u64,
    pub modified: DateTime<Utc>,
    pub stale: bool,
}

/// Map a URL to its file name inside the cache directory.
///
/// Scheme and fragment are dropped; path and query separators become `_`.
pub fn file_name_for(url: &str) -> String {
    let without_scheme = url.split_once("://").map_or(url, |(_, rest)| rest);
    let without_fragment = without_scheme
        .split_once('#')
        .map_or(without_scheme, |(head, _)| head);

    without_fragment
        .chars()
        .map(|c| match c {
            '/' | ':' | '?' | '&' | '=' | '\\' | '*' | '"' | '<' | '>' | '|' => '_',
            c => c,
        })
        .collect()
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

struct CacheInner {
    dir: PathBuf,
    ttl: Duration,
    compression_threshold: usize,
    fetcher: Arc<dyn Fetcher>,
    logger: Arc<dyn Logger>,
    /// URLs queued for or undergoing a background refresh
    refreshing: Mutex<HashSet<String>>,
    temp_seq: AtomicU64,
}

impl CacheInner {
    fn entry_path(&self, url: &str) -> PathBuf {
        self.dir.join(file_name_for(url))
    }

    fn is_stale(&self, modified: SystemTime) -> bool {
        let age = SystemTime::now()
            .duration_since(modified)
            .unwrap_or(Duration::ZERO);
        age >= self.ttl
    }

    /// Payload and staleness of the local entry, if it is usable
    async fn read_entry(&self, url: &str) -> Option<(Vec<u8>, bool)> {
        let path = self.entry_path(url);
        let raw = match fs::read(&path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => return None,
            Err(e) => {
                self.logger.debug(format_args!(
                    "Cannot read cache entry {}: {}",
                    path.display(),
                    e
                ));
                return None;
            }
        };

        let payload = match entry::decode(url, &raw) {
            Ok(payload) => payload,
            Err(e) => {
                self.logger.debug(format_args!(
                    "Ignoring cache entry {} for {}: {}",
                    path.display(),
                    url,
                    e
                ));
                return None;
            }
        };

        let stale = match fs::metadata(&path).await.and_then(|m| m.modified()) {
            Ok(modified) => self.is_stale(modified),
            Err(_) => true,
        };
        Some((payload, stale))
    }

    /// Persist via a unique sibling temp file and rename
    async fn write_entry(&self, url: &str, payload: &[u8]) -> CatalogResult<()> {
        let encoded = entry::encode(url, payload, self.compression_threshold).map_err(|e| match e {
            EntryError::UrlTooLong(len) => CatalogError::CacheUrlTooLong {
                len,
                max: u16::MAX as usize,
            },
            other => CatalogError::Internal(format!("encoding cache entry for {}: {}", url, other)),
        })?;

        fs::create_dir_all(&self.dir).await.map_err(|e| {
            CatalogError::io(format!("creating cache directory {}", self.dir.display()), e)
        })?;

        let path = self.entry_path(url);
        let seq = self.temp_seq.fetch_add(1, Ordering::Relaxed);
        let temp = self.dir.join(format!(
            "{}.{}.{}{}",
            file_name_for(url),
            std::process::id(),
            seq,
            TEMP_SUFFIX
        ));

        fs::write(&temp, &encoded)
            .await
            .map_err(|e| CatalogError::io(format!("writing {}", temp.display()), e))?;

        if let Err(e) = fs::rename(&temp, &path).await {
            let _ = fs::remove_file(&temp).await;
            return Err(CatalogError::io(
                format!("renaming {} to {}", temp.display(), path.display()),
                e,
            ));
        }
        Ok(())
    }

    async fn refresh(&self, url: &str) -> CatalogResult<Vec<u8>> {
        let body = self.fetcher.fetch(url).await?;
        self.write_entry(url, &body).await?;
        Ok(body)
    }

    fn forget(&self, url: &str) {
        lock(&self.refreshing).remove(url);
    }

    /// Every non-temp file in the directory with its header URL
    async fn scan(&self) -> CatalogResult<Vec<CacheEntryInfo>> {
        let mut entries = Vec::new();
        for (path, metadata) in self.list_files().await? {
            if path.to_string_lossy().ends_with(TEMP_SUFFIX) {
                continue;
            }
            let modified = metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH);

            entries.push(CacheEntryInfo {
                url: Self::read_stored_url(&path).await,
                size: metadata.len(),
                modified: DateTime::<Utc>::from(modified),
                stale: self.is_stale(modified),
                path,
            });
        }

        entries.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(entries)
    }

    /// Temp files left by interrupted writes, at least `ttl` old
    async fn orphaned_temps(&self) -> CatalogResult<Vec<PathBuf>> {
        Ok(self
            .list_files()
            .await?
            .into_iter()
            .filter(|(path, metadata)| {
                path.to_string_lossy().ends_with(TEMP_SUFFIX)
                    && self.is_stale(metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH))
            })
            .map(|(path, _)| path)
            .collect())
    }

    async fn list_files(&self) -> CatalogResult<Vec<(PathBuf, std::fs::Metadata)>> {
        let mut dir = match fs::read_dir(&self.dir).await {
            Ok(dir) => dir,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(vec![]),
            Err(e) => {
                return Err(CatalogError::io(
                    format!("listing {}", self.dir.display()),
                    e,
                ))
            }
        };

        let mut files = Vec::new();
        while let Some(item) = dir
            .next_entry()
            .await
            .map_err(|e| CatalogError::io(format!("listing {}", self.dir.display()), e))?
        {
            let Ok(metadata) = item.metadata().await else {
                continue;
            };
            if metadata.is_file() {
                files.push((item.path(), metadata));
            }
        }
        Ok(files)
    }

    async fn read_stored_url(path: &Path) -> Option<String> {
        let file = fs::File::open(path).await.ok()?;
        let mut prefix = Vec::new();
        file.take((HEADER_LEN + u16::MAX as usize) as u64)
            .read_to_end(&mut prefix)
            .await
            .ok()?;
        entry::stored_url(&prefix)
            .ok()
            .map(|(_, url)| url.to_string())
    }
}

/// URL-keyed document store backed by a directory and a [`Fetcher`]
pub struct CacheStore {
    inner: Arc<CacheInner>,
    refresh_tx: Mutex<Option<mpsc::Sender<String>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
    shutdown: watch::Sender<bool>,
}

impl CacheStore {
    /// Create the store and start its background refresh worker.
    ///
    /// # Panics
    ///
    /// Must be called from within a Tokio runtime.
    pub fn new(options: CacheOptions, fetcher: Arc<dyn Fetcher>, logger: Arc<dyn Logger>) -> Self {
        let inner = Arc::new(CacheInner {
            dir: options.dir,
            ttl: options.ttl,
            compression_threshold: options.compression_threshold,
            fetcher,
            logger,
            refreshing: Mutex::new(HashSet::new()),
            temp_seq: AtomicU64::new(0),
        });

        let (tx, rx) = mpsc::channel(options.refresh_queue_capacity.max(1));
        let (shutdown, shutdown_rx) = watch::channel(false);
        let worker = tokio::spawn(run_refresh_worker(
            Arc::clone(&inner),
            rx,
            shutdown_rx,
            options.refresh_delay,
        ));

        Self {
            inner,
            refresh_tx: Mutex::new(Some(tx)),
            worker: Mutex::new(Some(worker)),
            shutdown,
        }
    }

    /// Bytes for `url`.
    ///
    /// A usable local entry is returned at once; if it is stale a background
    /// refresh is queued as well. Otherwise the document is fetched, stored
    /// and returned, and a fetch failure is returned to the caller.
    pub async fn get(&self, url: &str) -> CatalogResult<Vec<u8>> {
        if let Some((payload, stale)) = self.inner.read_entry(url).await {
            if stale {
                self.queue_refresh(url);
            }
            return Ok(payload);
        }

        let body = self.inner.fetcher.fetch(url).await?;
        if let Err(e) = self.inner.write_entry(url, &body).await {
            self.inner
                .logger
                .warn(format_args!("Could not cache {}: {}", url, e));
        }
        Ok(body)
    }

    /// Fetch `url` now and overwrite its entry
    pub async fn refresh(&self, url: &str) -> CatalogResult<Vec<u8>> {
        self.inner.refresh(url).await
    }

    /// Queue a background refresh unless one is already pending.
    ///
    /// Never blocks; a full queue drops the request.
    fn queue_refresh(&self, url: &str) -> bool {
        if !lock(&self.inner.refreshing).insert(url.to_string()) {
            return false;
        }

        let sent = match lock(&self.refresh_tx).as_ref() {
            Some(tx) => tx.try_send(url.to_string()).is_ok(),
            None => false,
        };

        if sent {
            self.inner
                .logger
                .debug(format_args!("Queued background refresh of {}", url));
        } else {
            self.inner.forget(url);
            self.inner
                .logger
                .debug(format_args!("Refresh queue unavailable, dropped {}", url));
        }
        sent
    }

    /// Whether a background refresh of `url` is queued or running
    pub fn is_refreshing(&self, url: &str) -> bool {
        lock(&self.inner.refreshing).contains(url)
    }

    /// URLs of all stale entries with a readable header
    pub async fn stale_urls(&self) -> CatalogResult<Vec<String>> {
        Ok(self
            .inner
            .scan()
            .await?
            .into_iter()
            .filter(|e| e.stale)
            .filter_map(|e| e.url)
            .collect())
    }

    /// Queue a refresh for every stale entry; returns how many were queued
    pub async fn refresh_all_stale(&self) -> CatalogResult<usize> {
        let urls = self.stale_urls().await?;
        Ok(urls.iter().filter(|url| self.queue_refresh(url)).count())
    }

    /// All entries in the cache directory
    pub async fn entries(&self) -> CatalogResult<Vec<CacheEntryInfo>> {
        self.inner.scan().await
    }

    /// Delete the whole cache directory
    pub async fn clear(&self) -> CatalogResult<()> {
        match fs::remove_dir_all(&self.inner.dir).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(CatalogError::io(
                format!("removing {}", self.inner.dir.display()),
                e,
            )),
        }
    }

    /// Delete entries at least `ttl` old; returns how many were removed.
    ///
    /// Orphaned temp files of the same age are deleted too but not counted.
    pub async fn clear_stale(&self) -> CatalogResult<usize> {
        let stale: Vec<PathBuf> = self
            .inner
            .scan()
            .await?
            .into_iter()
            .filter(|e| e.stale)
            .map(|e| e.path)
            .collect();

        let mut removed = 0;
        for path in &stale {
            if remove_if_present(path).await? {
                removed += 1;
            }
        }

        for temp in self.inner.orphaned_temps().await? {
            if remove_if_present(&temp).await? {
                self.inner
                    .logger
                    .debug(format_args!("Removed orphaned temp file {}", temp.display()));
            }
        }
        Ok(removed)
    }

    pub fn dir(&self) -> &Path {
        &self.inner.dir
    }

    pub fn ttl(&self) -> Duration {
        self.inner.ttl
    }

    /// Stop the background worker and wait for it to exit.
    ///
    /// A refresh already in progress completes; queued ones are discarded.
    /// Safe to call more than once.
    pub async fn close(&self) {
        self.shutdown.send_replace(true);
        lock(&self.refresh_tx).take();

        let worker = lock(&self.worker).take();
        if let Some(worker) = worker {
            if let Err(e) = worker.await {
                self.inner
                    .logger
                    .warn(format_args!("Refresh worker ended abnormally: {}", e));
            }
        }
    }
}

impl Drop for CacheStore {
    fn drop(&mut self) {
        self.shutdown.send_replace(true);
    }
}

async fn remove_if_present(path: &Path) -> CatalogResult<bool> {
    match fs::remove_file(path).await {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
        Err(e) => Err(CatalogError::io(format!("removing {}", path.display()), e)),
    }
}

async fn run_refresh_worker(
    inner: Arc<CacheInner>,
    mut rx: mpsc::Receiver<String>,
    mut shutdown: watch::Receiver<bool>,
    delay: Duration,
) {
    loop {
        let url = tokio::select! {
            biased;
            _ = shutdown.changed() => break,
            next = rx.recv() => match next {
                Some(url) => url,
                None => break,
            },
        };

        match inner.refresh(&url).await {
            Ok(_) => inner
                .logger
                .debug(format_args!("Refreshed cached copy of {}", url)),
            Err(e) => inner.logger.warn(format_args!(
                "Background refresh of {} failed, keeping cached copy: {}",
                url, e
            )),
        }
        inner.forget(&url);

        if !delay.is_zero() {
            tokio::select! {
                biased;
                _ = shutdown.changed() => break,
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }

    rx.close();
    while let Ok(url) = rx.try_recv() {
        inner.forget(&url);
    }
}
