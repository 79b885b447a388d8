//! Integration tests for mtbcat

mod cli_tests {
    use assert_cmd::{cargo::cargo_bin_cmd, Command};
    use predicates::prelude::*;
    use tempfile::TempDir;

    /// Command isolated from the user's config and cache
    fn mtbcat(temp: &TempDir) -> Command {
        let mut cmd = cargo_bin_cmd!("mtbcat");
        cmd.arg("--config")
            .arg(temp.path().join("config.toml"))
            .arg("--cache-dir")
            .arg(temp.path().join("cache"));
        cmd
    }

    #[test]
    fn help_displays() {
        cargo_bin_cmd!("mtbcat")
            .arg("--help")
            .assert()
            .success()
            .stdout(predicate::str::contains("catalog"));
    }

    #[test]
    fn version_displays() {
        cargo_bin_cmd!("mtbcat")
            .arg("--version")
            .assert()
            .success()
            .stdout(predicate::str::contains("mtbcat"));
    }

    #[test]
    fn config_path() {
        let temp = TempDir::new().unwrap();
        mtbcat(&temp)
            .args(["config", "path"])
            .assert()
            .success()
            .stdout(predicate::str::contains("config.toml"));
    }

    #[test]
    fn config_show_defaults() {
        let temp = TempDir::new().unwrap();
        mtbcat(&temp)
            .args(["config", "show"])
            .assert()
            .success()
            .stdout(predicate::str::contains("[cache]"))
            .stdout(predicate::str::contains("ttl_days = 15"));
    }

    #[test]
    fn invalid_config_reports_hint() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join("config.toml"), "[cache\nttl_days = ").unwrap();
        mtbcat(&temp)
            .args(["cache", "path"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Invalid configuration"))
            .stderr(predicate::str::contains("Hint:"));
    }

    #[test]
    fn cache_path_uses_flag() {
        let temp = TempDir::new().unwrap();
        mtbcat(&temp)
            .args(["cache", "path"])
            .assert()
            .success()
            .stdout(predicate::str::contains("cache"));
    }

    #[test]
    fn cache_list_empty() {
        let temp = TempDir::new().unwrap();
        mtbcat(&temp)
            .args(["cache", "list"])
            .assert()
            .success()
            .stdout(predicate::str::contains("No cached documents"));

        mtbcat(&temp)
            .args(["cache", "list", "--format", "json"])
            .assert()
            .success()
            .stdout(predicate::str::contains("[]"));
    }

    #[test]
    fn cache_clear_empty() {
        let temp = TempDir::new().unwrap();
        mtbcat(&temp)
            .args(["cache", "clear", "--yes"])
            .assert()
            .success()
            .stdout(predicate::str::contains("No cached documents to clear"));
    }

    #[test]
    fn deps_requires_version() {
        let temp = TempDir::new().unwrap();
        mtbcat(&temp)
            .args(["deps", "KIT"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("<VERSION>"));
    }
}

mod tree_tests {
    use mtbcat::cache::{CacheOptions, CacheStore};
    use mtbcat::fetch::FetchOrchestrator;
    use mtbcat::logging::MemoryLogger;
    use mtbcat::manifest::{apps_for_board, middleware_for_board, Catalog, TreeLoader, TreeState};
    use mtbcat::net::StaticFetcher;
    use mtbcat::CatalogError;
    use std::sync::Arc;
    use tempfile::TempDir;
    use tracing::Level;

    const ROOT_URL: &str = "https://catalog.example/root.xml";

    const ROOT: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<super-manifest version="2.0">
  <board-manifest-list>
    <board-manifest dependency-url="https://catalog.example/bsp-deps.xml" capability-url="https://catalog.example/caps.json">
      <uri>https://catalog.example/boards-1.xml</uri>
    </board-manifest>
    <board-manifest dependency-url="https://catalog.example/bsp-deps.xml" capability-url="https://catalog.example/caps.json">
      <uri>https://catalog.example/boards-2.xml</uri>
    </board-manifest>
    <board-manifest>
      <uri>https://catalog.example/boards-missing.xml</uri>
    </board-manifest>
  </board-manifest-list>
  <app-manifest-list>
    <app-manifest><uri>https://catalog.example/apps.xml</uri></app-manifest>
  </app-manifest-list>
  <middleware-manifest-list>
    <middleware-manifest dependency-url="https://catalog.example/mw-deps.xml">
      <uri>https://catalog.example/mw.xml</uri>
    </middleware-manifest>
  </middleware-manifest-list>
</super-manifest>"#;

    const BOARDS_1: &str = r#"<boards>
  <board><id>KIT_T2G</id><name>T2G kit</name><prov_capabilities>hal t2gbe flash_1024k</prov_capabilities>
    <versions><version><num>1.0.0</num><commit>release-v1.0.0</commit></version></versions>
  </board>
</boards>"#;

    const BOARDS_2: &str = r#"<boards>
  <board><id>KIT_P6</id><name>PSoC 6 kit</name><prov_capabilities>hal psoc6 flash_512k</prov_capabilities></board>
</boards>"#;

    const APPS: &str = r#"<apps version="2.0">
  <app req_capabilities_v2="hal [psoc6,t2gbe] [flash_2048k,flash_1024k]"><n>Flash demo</n><id>flash-demo</id></app>
  <app><n>Hello</n><id>hello</id></app>
</apps>"#;

    const MW: &str = r#"<middleware>
  <middleware req_capabilities_v2="[psoc6]"><n>PSoC only</n><id>p6-lib</id></middleware>
  <middleware><n>Core</n><id>core-lib</id></middleware>
</middleware>"#;

    const BSP_DEPS: &str = r#"<dependencies version="2.0">
  <depender><id>KIT_T2G</id><versions><version><commit>release-v1.0.0</commit>
    <dependees><dependee><id>core-lib</id><commit>latest-v1.X</commit></dependee></dependees>
  </version></versions></depender>
</dependencies>"#;

    const MW_DEPS: &str = r#"<dependencies version="2.0">
  <depender><id>core-lib</id><versions><version><commit>latest-v1.X</commit></version></versions></depender>
</dependencies>"#;

    const CAPS: &str = r#"{"capabilities":[{"category":"Chip","description":"Traveo II","name":"T2G","token":"t2gbe","types":["chip"]}]}"#;

    struct Setup {
        _temp: TempDir,
        fetcher: Arc<StaticFetcher>,
        logger: Arc<MemoryLogger>,
        cache: Arc<CacheStore>,
        loader: TreeLoader,
    }

    fn setup() -> Setup {
        let temp = TempDir::new().unwrap();
        let fetcher = Arc::new(StaticFetcher::new());
        for (url, body) in [
            (ROOT_URL, ROOT),
            ("https://catalog.example/boards-1.xml", BOARDS_1),
            ("https://catalog.example/boards-2.xml", BOARDS_2),
            ("https://catalog.example/apps.xml", APPS),
            ("https://catalog.example/mw.xml", MW),
            ("https://catalog.example/bsp-deps.xml", BSP_DEPS),
            ("https://catalog.example/mw-deps.xml", MW_DEPS),
            ("https://catalog.example/caps.json", CAPS),
        ] {
            fetcher.insert(url, body);
        }

        let logger = Arc::new(MemoryLogger::new());
        let cache = Arc::new(CacheStore::new(
            CacheOptions::new(temp.path()),
            fetcher.clone(),
            logger.clone(),
        ));
        let orchestrator =
            Arc::new(FetchOrchestrator::new(cache.clone(), logger.clone()).with_max_concurrent(2));
        let loader = TreeLoader::new(orchestrator, logger.clone());

        Setup {
            _temp: temp,
            fetcher,
            logger,
            cache,
            loader,
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn failing_child_is_isolated() {
        let s = setup();
        let tree = s.loader.load(ROOT_URL).await.unwrap();

        assert_eq!(tree.state(), TreeState::Assembled);
        let refs = tree.board_refs();
        assert_eq!(refs.len(), 3);
        assert!(refs[0].document.is_some());
        assert!(refs[1].document.is_some());
        assert!(refs[2].document.is_none());
        assert!(s
            .logger
            .contains(Level::ERROR, "https://catalog.example/boards-missing.xml"));
        assert!(s.fetcher.peak_in_flight() <= 2);
        s.cache.close().await;
    }

    #[tokio::test]
    async fn auxiliary_documents_shared_and_attached() {
        let s = setup();
        let tree = s.loader.load(ROOT_URL).await.unwrap();

        assert_eq!(s.fetcher.request_count("https://catalog.example/bsp-deps.xml"), 1);
        assert_eq!(s.fetcher.request_count("https://catalog.example/caps.json"), 1);

        let t2g = tree.board("KIT_T2G").unwrap();
        let deps = t2g.dependencies.as_ref().unwrap();
        assert_eq!(deps.version("release-v1.0.0").unwrap().dependees()[0].id, "core-lib");
        assert_eq!(
            t2g.capabilities.as_ref().unwrap().explain(["t2gbe"])["t2gbe"],
            "Traveo II"
        );

        let core = tree.middleware_item("core-lib").unwrap();
        assert!(core.dependencies.is_some());
        assert!(tree
            .depender("https://catalog.example/mw-deps.xml", "core-lib")
            .is_some());
        s.cache.close().await;
    }

    #[tokio::test]
    async fn second_load_served_from_cache() {
        let s = setup();
        s.loader.load(ROOT_URL).await.unwrap();
        let first = s.fetcher.total_requests();

        let tree = s.loader.load(ROOT_URL).await.unwrap();
        assert_eq!(tree.board_ids(), vec!["KIT_T2G", "KIT_P6"]);
        // Only the failing document is asked for again
        assert_eq!(s.fetcher.total_requests(), first + 1);
        s.cache.close().await;
    }

    #[tokio::test]
    async fn compatibility_follows_capabilities() {
        let s = setup();
        let tree = s.loader.load(ROOT_URL).await.unwrap();

        let t2g = tree.board("KIT_T2G").unwrap();
        let apps: Vec<_> = apps_for_board(&tree, t2g).iter().map(|a| a.id.as_str()).collect();
        assert_eq!(apps, vec!["flash-demo", "hello"]);
        let mw: Vec<_> = middleware_for_board(&tree, t2g)
            .iter()
            .map(|m| m.id.as_str())
            .collect();
        assert_eq!(mw, vec!["core-lib"]);

        let p6 = tree.board("KIT_P6").unwrap();
        let apps: Vec<_> = apps_for_board(&tree, p6).iter().map(|a| a.id.as_str()).collect();
        assert_eq!(apps, vec!["hello"]);
        assert_eq!(middleware_for_board(&tree, p6).len(), 2);
        s.cache.close().await;
    }

    #[tokio::test]
    async fn missing_root_fails() {
        let s = setup();
        let err = s
            .loader
            .load("https://catalog.example/nope.xml")
            .await
            .unwrap_err();
        assert!(matches!(err, CatalogError::RootManifest { .. }));
        assert!(err.to_string().contains("nope.xml"));
        s.cache.close().await;
    }
}
