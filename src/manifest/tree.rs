//! Catalog tree assembly
//!
//! [`TreeLoader`] fetches the root document, then every child document and
//! every auxiliary (dependency or capability) document in one batch. Child
//! documents are parsed in fetch callbacks and spliced into the shared tree;
//! a second pass then resolves each board's and middleware item's dependency
//! and capability data through its origin reference.
//!
//! A failing root is an error. A failing child or auxiliary document is
//! logged and leaves its slot empty.

use crate::error::{CatalogError, CatalogResult};
use crate::fetch::{FetchOrchestrator, FetchOutcome, FetchRequest};
use crate::logging::{Logger, TracingLogger};
use crate::manifest::deps::{Depender, DependencyDocument};
use crate::manifest::schema::{
    App, AppDocument, AppManifestRef, Board, BoardDocument, BoardManifestRef,
    CapabilitiesDocument, MiddlewareDocument, MiddlewareItem, MiddlewareManifestRef, RootManifest,
};
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::{Arc, Mutex, OnceLock, PoisonError};

/// Read access to an assembled catalog
pub trait Catalog {
    /// Board ids in document order
    fn board_ids(&self) -> Vec<&str>;
    fn board(&self, id: &str) -> Option<&Board>;
    fn boards(&self) -> Vec<&Board>;

    fn app_ids(&self) -> Vec<&str>;
    fn app(&self, id: &str) -> Option<&App>;
    fn apps(&self) -> Vec<&App>;

    fn middleware_ids(&self) -> Vec<&str>;
    fn middleware_item(&self, id: &str) -> Option<&MiddlewareItem>;
    fn middleware(&self) -> Vec<&MiddlewareItem>;

    /// Dependency document fetched from `url`
    fn dependencies(&self, url: &str) -> Option<&DependencyDocument>;

    /// Capability dictionary fetched from `url`
    fn capabilities(&self, url: &str) -> Option<&CapabilitiesDocument>;

    /// Depender `id` in the dependency document at `url`
    fn depender(&self, url: &str, id: &str) -> Option<&Depender> {
        self.dependencies(url)?.depender(id)
    }

    fn board_origin(&self, board: &Board) -> Option<&BoardManifestRef>;
    fn app_origin(&self, app: &App) -> Option<&AppManifestRef>;
    fn middleware_origin(&self, item: &MiddlewareItem) -> Option<&MiddlewareManifestRef>;
}

/// Assembly progress
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TreeState {
    Empty,
    RootFetched,
    ChildrenFetching,
    Assembled,
}

impl fmt::Display for TreeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => write!(f, "empty"),
            Self::RootFetched => write!(f, "root-fetched"),
            Self::ChildrenFetching => write!(f, "children-fetching"),
            Self::Assembled => write!(f, "assembled"),
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct ItemLoc {
    reference: usize,
    item: usize,
}

#[derive(Debug, Default)]
struct Lookups {
    boards: HashMap<String, ItemLoc>,
    apps: HashMap<String, ItemLoc>,
    middleware: HashMap<String, ItemLoc>,
}

impl Lookups {
    fn index<'a, T: 'a>(
        refs: impl Iterator<Item = &'a [T]>,
        id: impl Fn(&T) -> &str,
    ) -> HashMap<String, ItemLoc> {
        let mut map = HashMap::new();
        for (reference, items) in refs.enumerate() {
            for (item, entry) in items.iter().enumerate() {
                map.insert(id(entry).to_string(), ItemLoc { reference, item });
            }
        }
        map
    }
}

/// Root aggregate: reference lists, auxiliary documents and lazy id lookups
pub struct ManifestTree {
    version: String,
    state: TreeState,
    source_urls: Vec<String>,
    boards: Vec<BoardManifestRef>,
    apps: Vec<AppManifestRef>,
    middleware: Vec<MiddlewareManifestRef>,
    dependencies: HashMap<String, Arc<DependencyDocument>>,
    capabilities: HashMap<String, Arc<CapabilitiesDocument>>,
    lookups: OnceLock<Lookups>,
    logger: Arc<dyn Logger>,
}

impl ManifestTree {
    pub fn new(logger: Arc<dyn Logger>) -> Self {
        Self {
            version: String::new(),
            state: TreeState::Empty,
            source_urls: Vec::new(),
            boards: Vec::new(),
            apps: Vec::new(),
            middleware: Vec::new(),
            dependencies: HashMap::new(),
            capabilities: HashMap::new(),
            lookups: OnceLock::new(),
            logger,
        }
    }

    /// Tree holding the references of a parsed root document
    pub fn from_root(root: RootManifest, source_url: impl Into<String>, logger: Arc<dyn Logger>) -> Self {
        let mut tree = Self::new(logger);
        tree.version = root.version;
        tree.source_urls.push(source_url.into());
        tree.boards = root.board_list.manifests;
        tree.apps = root.app_list.manifests;
        tree.middleware = root.middleware_list.manifests;
        tree.state = TreeState::RootFetched;
        tree
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn state(&self) -> TreeState {
        self.state
    }

    pub fn source_urls(&self) -> &[String] {
        &self.source_urls
    }

    pub fn board_refs(&self) -> &[BoardManifestRef] {
        &self.boards
    }

    pub fn app_refs(&self) -> &[AppManifestRef] {
        &self.apps
    }

    pub fn middleware_refs(&self) -> &[MiddlewareManifestRef] {
        &self.middleware
    }

    /// URLs of all fetched dependency documents, sorted
    pub fn dependency_urls(&self) -> Vec<&str> {
        let mut urls: Vec<&str> = self.dependencies.keys().map(String::as_str).collect();
        urls.sort_unstable();
        urls
    }

    /// URLs of all fetched capability dictionaries, sorted
    pub fn capability_urls(&self) -> Vec<&str> {
        let mut urls: Vec<&str> = self.capabilities.keys().map(String::as_str).collect();
        urls.sort_unstable();
        urls
    }

    fn lookups(&self) -> &Lookups {
        self.lookups.get_or_init(|| Lookups {
            boards: Lookups::index(self.boards.iter().map(BoardManifestRef::boards), |b| b.id.as_str()),
            apps: Lookups::index(self.apps.iter().map(AppManifestRef::apps), |a| a.id.as_str()),
            middleware: Lookups::index(
                self.middleware.iter().map(MiddlewareManifestRef::items),
                |m| m.id.as_str(),
            ),
        })
    }

    fn invalidate_lookups(&mut self) {
        self.lookups.take();
    }

    fn set_board_document(&mut self, index: usize, mut doc: BoardDocument) {
        let Some(reference) = self.boards.get_mut(index) else {
            return;
        };
        for board in &mut doc.boards {
            board.origin = Some(index);
        }
        reference.document = Some(doc);
        self.invalidate_lookups();
    }

    fn set_app_document(&mut self, index: usize, mut doc: AppDocument) {
        let Some(reference) = self.apps.get_mut(index) else {
            return;
        };
        for app in &mut doc.apps {
            app.origin = Some(index);
        }
        reference.document = Some(doc);
        self.invalidate_lookups();
    }

    fn set_middleware_document(&mut self, index: usize, mut doc: MiddlewareDocument) {
        let Some(reference) = self.middleware.get_mut(index) else {
            return;
        };
        for item in &mut doc.items {
            item.origin = Some(index);
        }
        reference.document = Some(doc);
        self.invalidate_lookups();
    }

    /// Build auxiliary indexes and attach resolved data to every item
    fn attach_aux_data(&mut self) {
        for doc in self.dependencies.values() {
            doc.index();
        }

        for (index, reference) in self.boards.iter_mut().enumerate() {
            let deps = reference
                .dependency_source()
                .and_then(|url| self.dependencies.get(url))
                .cloned();
            let caps = reference
                .capability_source()
                .and_then(|url| self.capabilities.get(url))
                .cloned();

            let Some(doc) = reference.document.as_mut() else {
                continue;
            };
            for board in &mut doc.boards {
                if board.origin != Some(index) {
                    self.logger.warn(format_args!(
                        "Board {} origin mismatch for document {}",
                        board.id, reference.uri
                    ));
                }
                board.dependencies = deps.as_ref().and_then(|d| d.depender(&board.id)).cloned();
                board.capabilities = caps.clone();
            }
        }

        for (index, reference) in self.middleware.iter_mut().enumerate() {
            let deps = reference
                .dependency_source()
                .and_then(|url| self.dependencies.get(url))
                .cloned();

            let Some(doc) = reference.document.as_mut() else {
                continue;
            };
            for item in &mut doc.items {
                if item.origin != Some(index) {
                    self.logger.warn(format_args!(
                        "Middleware {} origin mismatch for document {}",
                        item.id, reference.uri
                    ));
                }
                item.dependencies = deps.as_ref().and_then(|d| d.depender(&item.id)).cloned();
            }
        }
    }

    /// Append another tree's references and auxiliary documents.
    ///
    /// Auxiliary documents from `other` replace ones at the same URL; a
    /// replacement with different content is logged.
    pub fn merge(&mut self, other: ManifestTree) {
        if !other.version.is_empty() && other.version != self.version {
            self.logger.warn(format_args!(
                "Merging catalogs with different versions: {} vs {}",
                self.version, other.version
            ));
        }

        let ManifestTree {
            source_urls,
            boards,
            apps,
            middleware,
            dependencies,
            capabilities,
            ..
        } = other;

        let offset = self.boards.len();
        self.boards.extend(boards.into_iter().enumerate().map(|(i, mut r)| {
            if let Some(doc) = r.document.as_mut() {
                for board in &mut doc.boards {
                    board.origin = Some(offset + i);
                }
            }
            r
        }));

        let offset = self.apps.len();
        self.apps.extend(apps.into_iter().enumerate().map(|(i, mut r)| {
            if let Some(doc) = r.document.as_mut() {
                for app in &mut doc.apps {
                    app.origin = Some(offset + i);
                }
            }
            r
        }));

        let offset = self.middleware.len();
        self.middleware
            .extend(middleware.into_iter().enumerate().map(|(i, mut r)| {
                if let Some(doc) = r.document.as_mut() {
                    for item in &mut doc.items {
                        item.origin = Some(offset + i);
                    }
                }
                r
            }));

        for (url, doc) in dependencies {
            if let Some(existing) = self.dependencies.get(&url) {
                if **existing != *doc {
                    self.logger.warn(format_args!(
                        "Dependency document {} differs between merged catalogs",
                        url
                    ));
                }
            }
            self.dependencies.insert(url, doc);
        }
        for (url, doc) in capabilities {
            if let Some(existing) = self.capabilities.get(&url) {
                if **existing != *doc {
                    self.logger.warn(format_args!(
                        "Capability document {} differs between merged catalogs",
                        url
                    ));
                }
            }
            self.capabilities.insert(url, doc);
        }

        self.source_urls.extend(source_urls);
        self.invalidate_lookups();
    }
}

impl Catalog for ManifestTree {
    fn board_ids(&self) -> Vec<&str> {
        self.boards
            .iter()
            .flat_map(|r| r.boards())
            .map(|b| b.id.as_str())
            .collect()
    }

    fn board(&self, id: &str) -> Option<&Board> {
        let loc = self.lookups().boards.get(id)?;
        self.boards.get(loc.reference)?.boards().get(loc.item)
    }

    fn boards(&self) -> Vec<&Board> {
        self.boards.iter().flat_map(|r| r.boards()).collect()
    }

    fn app_ids(&self) -> Vec<&str> {
        self.apps
            .iter()
            .flat_map(|r| r.apps())
            .map(|a| a.id.as_str())
            .collect()
    }

    fn app(&self, id: &str) -> Option<&App> {
        let loc = self.lookups().apps.get(id)?;
        self.apps.get(loc.reference)?.apps().get(loc.item)
    }

    fn apps(&self) -> Vec<&App> {
        self.apps.iter().flat_map(|r| r.apps()).collect()
    }

    fn middleware_ids(&self) -> Vec<&str> {
        self.middleware
            .iter()
            .flat_map(|r| r.items())
            .map(|m| m.id.as_str())
            .collect()
    }

    fn middleware_item(&self, id: &str) -> Option<&MiddlewareItem> {
        let loc = self.lookups().middleware.get(id)?;
        self.middleware.get(loc.reference)?.items().get(loc.item)
    }

    fn middleware(&self) -> Vec<&MiddlewareItem> {
        self.middleware.iter().flat_map(|r| r.items()).collect()
    }

    fn dependencies(&self, url: &str) -> Option<&DependencyDocument> {
        self.dependencies.get(url).map(Arc::as_ref)
    }

    fn capabilities(&self, url: &str) -> Option<&CapabilitiesDocument> {
        self.capabilities.get(url).map(Arc::as_ref)
    }

    fn board_origin(&self, board: &Board) -> Option<&BoardManifestRef> {
        self.boards.get(board.origin?)
    }

    fn app_origin(&self, app: &App) -> Option<&AppManifestRef> {
        self.apps.get(app.origin?)
    }

    fn middleware_origin(&self, item: &MiddlewareItem) -> Option<&MiddlewareManifestRef> {
        self.middleware.get(item.origin?)
    }
}

impl Default for ManifestTree {
    fn default() -> Self {
        Self::new(Arc::new(TracingLogger))
    }
}

impl fmt::Debug for ManifestTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ManifestTree")
            .field("version", &self.version)
            .field("state", &self.state)
            .field("source_urls", &self.source_urls)
            .field("boards", &self.boards.len())
            .field("apps", &self.apps.len())
            .field("middleware", &self.middleware.len())
            .field("dependencies", &self.dependencies.len())
            .field("capabilities", &self.capabilities.len())
            .finish()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Take the tree back from the callbacks' shared handle.
///
/// A handle still held elsewhere is left with an empty tree.
fn unwrap_shared(shared: Arc<Mutex<ManifestTree>>, logger: &Arc<dyn Logger>) -> ManifestTree {
    match Arc::try_unwrap(shared) {
        Ok(mutex) => mutex.into_inner().unwrap_or_else(PoisonError::into_inner),
        Err(shared) => {
            logger.warn(format_args!(
                "Manifest tree still shared after assembly, detaching it"
            ));
            std::mem::replace(&mut *lock(&shared), ManifestTree::new(Arc::clone(logger)))
        }
    }
}

/// Parse a fetched document, keeping fetch and parse failures alike
fn parse_outcome<T>(
    outcome: &FetchOutcome,
    parse: fn(&[u8]) -> CatalogResult<T>,
) -> Result<T, Arc<CatalogError>> {
    let bytes = outcome.result.as_ref().map_err(Arc::clone)?;
    parse(bytes).map_err(Arc::new)
}

/// Builds [`ManifestTree`]s through a [`FetchOrchestrator`]
pub struct TreeLoader {
    orchestrator: Arc<FetchOrchestrator>,
    logger: Arc<dyn Logger>,
}

impl TreeLoader {
    pub fn new(orchestrator: Arc<FetchOrchestrator>, logger: Arc<dyn Logger>) -> Self {
        Self {
            orchestrator,
            logger,
        }
    }

    pub fn orchestrator(&self) -> &Arc<FetchOrchestrator> {
        &self.orchestrator
    }

    /// Fetch and assemble the tree under `root_url`
    pub async fn load(&self, root_url: &str) -> CatalogResult<ManifestTree> {
        let wrap = |source: CatalogError| CatalogError::RootManifest {
            url: root_url.to_string(),
            source: Box::new(source),
        };

        let bytes = self.orchestrator.fetch_one(root_url).await.map_err(wrap)?;
        let root = RootManifest::parse(&bytes).map_err(wrap)?;

        let mut tree = ManifestTree::from_root(root, root_url, Arc::clone(&self.logger));
        tree.state = TreeState::ChildrenFetching;
        let requests = self.requests_for(&tree);
        self.logger.debug(format_args!(
            "Fetching {} documents referenced by {}",
            requests.len(),
            root_url
        ));

        let shared = Arc::new(Mutex::new(tree));
        let requests = Self::attach_callbacks(requests, &shared, &self.logger);
        self.orchestrator.fetch_all(requests).await;

        let mut tree = unwrap_shared(shared, &self.logger);

        tree.attach_aux_data();
        tree.invalidate_lookups();
        tree.state = TreeState::Assembled;

        self.logger.info(format_args!(
            "Loaded catalog {} with {} board, {} app and {} middleware documents",
            root_url,
            tree.boards.len(),
            tree.apps.len(),
            tree.middleware.len()
        ));
        Ok(tree)
    }

    /// Load the first root, then merge each further root into it
    pub async fn load_all<S: AsRef<str>>(&self, root_urls: &[S]) -> CatalogResult<ManifestTree> {
        let (first, rest) = root_urls
            .split_first()
            .ok_or_else(|| CatalogError::User("No catalog root URL given".to_string()))?;

        let mut tree = self.load(first.as_ref()).await?;
        for url in rest {
            let other = self.load(url.as_ref()).await?;
            tree.merge(other);
        }
        Ok(tree)
    }

    fn requests_for(&self, tree: &ManifestTree) -> Vec<Pending> {
        let mut pending = Vec::new();
        let mut dependency_urls = BTreeSet::new();
        let mut capability_urls = BTreeSet::new();

        for (index, reference) in tree.boards.iter().enumerate() {
            pending.push(Pending::new(&reference.uri, index, DocumentKind::Boards));
            dependency_urls.extend(reference.dependency_source());
            capability_urls.extend(reference.capability_source());
        }
        for (index, reference) in tree.apps.iter().enumerate() {
            pending.push(Pending::new(&reference.uri, index, DocumentKind::Apps));
        }
        for (index, reference) in tree.middleware.iter().enumerate() {
            pending.push(Pending::new(&reference.uri, index, DocumentKind::Middleware));
            dependency_urls.extend(reference.dependency_source());
        }
        for (index, url) in dependency_urls.into_iter().enumerate() {
            pending.push(Pending::new(url, index, DocumentKind::Dependencies));
        }
        for (index, url) in capability_urls.into_iter().enumerate() {
            pending.push(Pending::new(url, index, DocumentKind::Capabilities));
        }

        pending.retain(|p| {
            if p.url.trim().is_empty() {
                self.logger
                    .warn(format_args!("Skipping {} entry {} with no URL", p.kind, p.index));
                false
            } else {
                true
            }
        });
        pending
    }

    fn attach_callbacks(
        pending: Vec<Pending>,
        shared: &Arc<Mutex<ManifestTree>>,
        logger: &Arc<dyn Logger>,
    ) -> Vec<FetchRequest> {
        pending
            .into_iter()
            .map(|p| {
                let shared = Arc::clone(shared);
                let logger = Arc::clone(logger);
                let kind = p.kind;
                FetchRequest::new(p.url, p.index).on_complete(move |outcome| {
                    let spliced = match kind {
                        DocumentKind::Boards => parse_outcome(&outcome, BoardDocument::parse)
                            .map(|doc| lock(&shared).set_board_document(outcome.index, doc)),
                        DocumentKind::Apps => parse_outcome(&outcome, AppDocument::parse)
                            .map(|doc| lock(&shared).set_app_document(outcome.index, doc)),
                        DocumentKind::Middleware => {
                            parse_outcome(&outcome, MiddlewareDocument::parse).map(|doc| {
                                lock(&shared).set_middleware_document(outcome.index, doc)
                            })
                        }
                        DocumentKind::Dependencies => {
                            parse_outcome(&outcome, DependencyDocument::parse).map(|doc| {
                                doc.index();
                                lock(&shared)
                                    .dependencies
                                    .insert(outcome.url.clone(), Arc::new(doc));
                            })
                        }
                        DocumentKind::Capabilities => {
                            parse_outcome(&outcome, CapabilitiesDocument::parse).map(|doc| {
                                lock(&shared)
                                    .capabilities
                                    .insert(outcome.url.clone(), Arc::new(doc));
                            })
                        }
                    };

                    if let Err(e) = spliced {
                        logger.error(format_args!(
                            "Skipping {} document {}: {}",
                            kind, outcome.url, e
                        ));
                    }
                })
            })
            .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DocumentKind {
    Boards,
    Apps,
    Middleware,
    Dependencies,
    Capabilities,
}

impl fmt::Display for DocumentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Boards => write!(f, "board"),
            Self::Apps => write!(f, "app"),
            Self::Middleware => write!(f, "middleware"),
            Self::Dependencies => write!(f, "dependency"),
            Self::Capabilities => write!(f, "capability"),
        }
    }
}

struct Pending {
    url: String,
    index: usize,
    kind: DocumentKind,
}

impl Pending {
    fn new(url: &str, index: usize, kind: DocumentKind) -> Self {
        Self {
            url: url.to_string(),
            index,
            kind,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{CacheOptions, CacheStore};
    use crate::logging::MemoryLogger;
    use crate::net::StaticFetcher;
    use tempfile::TempDir;
    use tracing::Level;

    const ROOT_URL: &str = "https://example.com/root.xml";

    fn root_xml(boards: &[(&str, &str, &str)], middleware: &[(&str, &str)]) -> String {
        let boards: String = boards
            .iter()
            .map(|(uri, deps, caps)| {
                format!(
                    r#"<board-manifest dependency-url="{deps}" capability-url="{caps}"><uri>{uri}</uri></board-manifest>"#
                )
            })
            .collect();
        let middleware: String = middleware
            .iter()
            .map(|(uri, deps)| {
                format!(r#"<middleware-manifest dependency-url="{deps}"><uri>{uri}</uri></middleware-manifest>"#)
            })
            .collect();
        format!(
            r#"<super-manifest version="2.0"><board-manifest-list>{boards}</board-manifest-list><app-manifest-list><app-manifest><uri>https://example.com/apps.xml</uri></app-manifest></app-manifest-list><middleware-manifest-list>{middleware}</middleware-manifest-list></super-manifest>"#
        )
    }

    fn boards_xml(ids: &[&str]) -> String {
        let boards: String = ids
            .iter()
            .map(|id| format!("<board><id>{id}</id><prov_capabilities>hal {id}</prov_capabilities></board>"))
            .collect();
        format!("<boards>{boards}</boards>")
    }

    const APPS: &str = r#"<apps version="2.0"><app req_capabilities_v2="hal"><n>Blinky</n><id>blinky</id></app></apps>"#;

    const MW: &str = r#"<middleware><middleware><n>Retarget</n><id>retarget-io</id></middleware></middleware>"#;

    const DEPS: &str = r#"<dependencies version="2.0">
  <depender><id>KIT_A</id><versions><version><commit>latest-v1.X</commit>
    <dependees><dependee><id>core-lib</id><commit>latest-v1.X</commit></dependee></dependees>
  </version></versions></depender>
  <depender><id>retarget-io</id><versions><version><commit>latest-v1.X</commit>
    <dependees><dependee><id>core-lib</id><commit>latest-v1.X</commit></dependee></dependees>
  </version></versions></depender>
</dependencies>"#;

    const CAPS: &str = r#"{"capabilities":[{"category":"Hardware Blocks","description":"HAL","name":"HAL","token":"hal","types":["board"]}]}"#;

    struct Fixture {
        _temp: TempDir,
        fetcher: Arc<StaticFetcher>,
        logger: Arc<MemoryLogger>,
        cache: Arc<CacheStore>,
        loader: TreeLoader,
    }

    fn fixture() -> Fixture {
        let temp = TempDir::new().unwrap();
        let fetcher = Arc::new(StaticFetcher::new());
        let logger = Arc::new(MemoryLogger::new());
        let cache = Arc::new(CacheStore::new(
            CacheOptions::new(temp.path()),
            fetcher.clone(),
            logger.clone(),
        ));
        let orchestrator = Arc::new(FetchOrchestrator::new(cache.clone(), logger.clone()));
        let loader = TreeLoader::new(orchestrator, logger.clone());
        Fixture {
            _temp: temp,
            fetcher,
            logger,
            cache,
            loader,
        }
    }

    fn serve_standard(f: &Fixture) {
        f.fetcher.insert(
            ROOT_URL,
            root_xml(
                &[
                    ("https://example.com/b1.xml", "https://example.com/deps.xml", "https://example.com/caps.json"),
                    ("https://example.com/b2.xml", "https://example.com/deps.xml", "N/A"),
                ],
                &[("https://example.com/mw.xml", "https://example.com/deps.xml")],
            ),
        );
        f.fetcher.insert("https://example.com/b1.xml", boards_xml(&["KIT_A", "KIT_B"]));
        f.fetcher.insert("https://example.com/b2.xml", boards_xml(&["KIT_C"]));
        f.fetcher.insert("https://example.com/apps.xml", APPS);
        f.fetcher.insert("https://example.com/mw.xml", MW);
        f.fetcher.insert("https://example.com/deps.xml", DEPS);
        f.fetcher.insert("https://example.com/caps.json", CAPS);
    }

    #[tokio::test]
    async fn assembles_full_tree() {
        let f = fixture();
        serve_standard(&f);

        let tree = f.loader.load(ROOT_URL).await.unwrap();
        assert_eq!(tree.state(), TreeState::Assembled);
        assert_eq!(tree.version(), "2.0");
        assert_eq!(tree.source_urls(), [ROOT_URL]);
        assert_eq!(tree.board_ids(), vec!["KIT_A", "KIT_B", "KIT_C"]);
        assert_eq!(tree.app_ids(), vec!["blinky"]);
        assert_eq!(tree.middleware_ids(), vec!["retarget-io"]);

        let kit_a = tree.board("KIT_A").unwrap();
        assert_eq!(kit_a.origin, Some(0));
        assert_eq!(tree.board_origin(kit_a).unwrap().uri, "https://example.com/b1.xml");
        assert_eq!(kit_a.dependencies.as_ref().unwrap().id, "KIT_A");
        assert!(kit_a.capabilities.as_ref().unwrap().is_known("hal"));

        let kit_c = tree.board("KIT_C").unwrap();
        assert_eq!(kit_c.origin, Some(1));
        assert!(kit_c.dependencies.is_none());
        assert!(kit_c.capabilities.is_none());

        let retarget = tree.middleware_item("retarget-io").unwrap();
        assert_eq!(retarget.dependencies.as_ref().unwrap().versions().len(), 1);
        assert!(tree.middleware_origin(retarget).is_some());

        assert!(tree.depender("https://example.com/deps.xml", "KIT_A").is_some());
        assert!(tree.capabilities("https://example.com/caps.json").is_some());
        f.cache.close().await;
    }

    #[tokio::test]
    async fn auxiliary_documents_fetched_once() {
        let f = fixture();
        serve_standard(&f);

        f.loader.load(ROOT_URL).await.unwrap();
        assert_eq!(f.fetcher.request_count("https://example.com/deps.xml"), 1);
        assert_eq!(f.fetcher.request_count("https://example.com/caps.json"), 1);
        assert_eq!(f.fetcher.request_count("N/A"), 0);
        f.cache.close().await;
    }

    #[tokio::test]
    async fn failing_child_leaves_empty_slot() {
        let f = fixture();
        serve_standard(&f);
        f.fetcher.remove("https://example.com/b2.xml");
        f.fetcher.insert("https://example.com/mw.xml", "<middleware><middleware>");

        let tree = f.loader.load(ROOT_URL).await.unwrap();
        assert!(tree.board_refs()[0].document.is_some());
        assert!(tree.board_refs()[1].document.is_none());
        assert!(tree.middleware_refs()[0].document.is_none());
        assert_eq!(tree.board_ids(), vec!["KIT_A", "KIT_B"]);
        assert!(f.logger.contains(Level::ERROR, "https://example.com/b2.xml"));
        assert!(f.logger.contains(Level::ERROR, "middleware document"));
        f.cache.close().await;
    }

    #[tokio::test]
    async fn root_failure_is_fatal() {
        let f = fixture();
        let err = f.loader.load(ROOT_URL).await.unwrap_err();
        assert!(matches!(err, CatalogError::RootManifest { .. }));

        f.fetcher.insert(ROOT_URL, "<super-manifest><board-manifest-list>");
        let err = f.loader.load(ROOT_URL).await.unwrap_err();
        match err {
            CatalogError::RootManifest { source, .. } => {
                assert!(matches!(*source, CatalogError::Parse { .. }))
            }
            other => panic!("unexpected error: {other}"),
        }
        f.cache.close().await;
    }

    #[tokio::test]
    async fn load_all_merges_roots() {
        let f = fixture();
        serve_standard(&f);
        let extra_root = "https://example.com/extra-root.xml";
        f.fetcher.insert(
            extra_root,
            root_xml(&[("https://example.com/b3.xml", "", "")], &[]),
        );
        f.fetcher.insert("https://example.com/b3.xml", boards_xml(&["KIT_D", "KIT_A"]));

        let tree = f.loader.load_all(&[ROOT_URL, extra_root]).await.unwrap();
        assert_eq!(tree.source_urls(), [ROOT_URL, extra_root]);
        assert_eq!(tree.board_refs().len(), 3);
        assert_eq!(tree.board_ids(), vec!["KIT_A", "KIT_B", "KIT_C", "KIT_D", "KIT_A"]);

        // Last listed wins, and origins point into the merged list
        let kit_a = tree.board("KIT_A").unwrap();
        assert_eq!(kit_a.origin, Some(2));
        assert!(kit_a.dependencies.is_none());
        assert_eq!(tree.board_origin(kit_a).unwrap().uri, "https://example.com/b3.xml");
        assert_eq!(tree.app_ids().len(), 2);
        f.cache.close().await;
    }

    #[test]
    fn merge_warns_on_conflicts_and_refreshes_lookups() {
        let logger = Arc::new(MemoryLogger::new());
        let mut first = ManifestTree::new(logger.clone());
        first.version = "2.0".into();
        first.boards.push(BoardManifestRef::new("https://example.com/a.xml"));
        first.set_board_document(0, BoardDocument::parse(boards_xml(&["A"]).as_bytes()).unwrap());
        first.dependencies.insert(
            "https://example.com/deps.xml".into(),
            Arc::new(DependencyDocument::parse(DEPS.as_bytes()).unwrap()),
        );
        assert!(first.board("B").is_none());

        let mut second = ManifestTree::new(logger.clone());
        second.version = "3.0".into();
        second.boards.push(BoardManifestRef::new("https://example.com/b.xml"));
        second.set_board_document(0, BoardDocument::parse(boards_xml(&["B"]).as_bytes()).unwrap());
        second.dependencies.insert(
            "https://example.com/deps.xml".into(),
            Arc::new(DependencyDocument::new("2.0", vec![])),
        );

        first.merge(second);
        assert!(logger.contains(Level::WARN, "different versions"));
        assert!(logger.contains(Level::WARN, "https://example.com/deps.xml"));

        let b = first.board("B").unwrap();
        assert_eq!(b.origin, Some(1));
        assert!(first
            .dependencies("https://example.com/deps.xml")
            .unwrap()
            .dependers
            .is_empty());
    }

    #[test]
    fn merge_identical_aux_is_quiet() {
        let logger = Arc::new(MemoryLogger::new());
        let mut first = ManifestTree::new(logger.clone());
        let mut second = ManifestTree::new(logger.clone());
        for tree in [&mut first, &mut second] {
            tree.capabilities.insert(
                "https://example.com/caps.json".into(),
                Arc::new(CapabilitiesDocument::parse(CAPS.as_bytes()).unwrap()),
            );
        }
        first.merge(second);
        assert!(logger.entries().is_empty());
        assert_eq!(first.capability_urls(), vec!["https://example.com/caps.json"]);
    }

    #[test]
    fn still_shared_tree_keeps_logger() {
        let logger = Arc::new(MemoryLogger::new());
        let injected: Arc<dyn Logger> = logger.clone();
        let mut tree = ManifestTree::new(Arc::clone(&injected));
        tree.version = "2.0".into();

        let shared = Arc::new(Mutex::new(tree));
        let held = Arc::clone(&shared);
        let tree = unwrap_shared(shared, &injected);

        assert_eq!(tree.version(), "2.0");
        assert!(logger.contains(Level::WARN, "still shared"));
        tree.logger.info(format_args!("detached tree logs here"));
        assert!(logger.contains(Level::INFO, "detached tree logs here"));
        assert!(lock(&held).version().is_empty());
    }

    #[test]
    fn empty_tree() {
        let tree = ManifestTree::default();
        assert_eq!(tree.state(), TreeState::Empty);
        assert!(tree.board_ids().is_empty());
        assert!(tree.board("x").is_none());
        assert!(tree.dependencies("x").is_none());
    }
}
