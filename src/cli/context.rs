//! Shared wiring for commands that read the catalog

use crate::cache::{CacheOptions, CacheStore};
use crate::config::Config;
use crate::error::CatalogResult;
use crate::fetch::FetchOrchestrator;
use crate::logging::{Logger, TracingLogger};
use crate::manifest::{ManifestTree, TreeLoader};
use crate::net::{Fetcher, HttpFetcher};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Cache, orchestrator and loader built from one configuration
pub struct CatalogContext {
    roots: Vec<String>,
    cache: Arc<CacheStore>,
    orchestrator: Arc<FetchOrchestrator>,
    loader: TreeLoader,
}

impl CatalogContext {
    /// Wire up HTTP fetching for `config`. Must run inside a tokio runtime.
    pub fn open(config: &Config) -> CatalogResult<Self> {
        let timeout = (config.fetch.timeout_secs > 0)
            .then(|| Duration::from_secs(config.fetch.timeout_secs));
        let fetcher = HttpFetcher::new(config.fetch.proxy.as_deref(), timeout)?;
        Ok(Self::with_fetcher(config, Arc::new(fetcher), Arc::new(TracingLogger)))
    }

    pub fn with_fetcher(config: &Config, fetcher: Arc<dyn Fetcher>, logger: Arc<dyn Logger>) -> Self {
        let options = CacheOptions::from_config(config);
        debug!("Using cache directory {}", options.dir.display());

        let cache = Arc::new(CacheStore::new(options, fetcher, Arc::clone(&logger)));
        let orchestrator = Arc::new(FetchOrchestrator::from_config(
            Arc::clone(&cache),
            Arc::clone(&logger),
            &config.fetch,
        ));

        Self {
            roots: Self::roots(config),
            cache,
            loader: TreeLoader::new(Arc::clone(&orchestrator), logger),
            orchestrator,
        }
    }

    /// Configured root followed by any extra roots
    pub fn roots(config: &Config) -> Vec<String> {
        std::iter::once(config.catalog.root_url.clone())
            .chain(config.catalog.extra_roots.iter().cloned())
            .filter(|url| !url.trim().is_empty())
            .collect()
    }

    pub fn cache(&self) -> &Arc<CacheStore> {
        &self.cache
    }

    pub fn orchestrator(&self) -> &Arc<FetchOrchestrator> {
        &self.orchestrator
    }

    pub async fn load_tree(&self) -> CatalogResult<ManifestTree> {
        self.loader.load_all(&self.roots).await
    }

    /// Stop the background refresh worker
    pub async fn close(self) {
        self.cache.close().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roots_skip_blank_entries() {
        let mut config = Config::default();
        config.catalog.root_url = "https://a.example/root.xml".into();
        config.catalog.extra_roots = vec![" ".into(), "https://b.example/root.xml".into()];
        assert_eq!(
            CatalogContext::roots(&config),
            vec!["https://a.example/root.xml", "https://b.example/root.xml"]
        );
    }
}
