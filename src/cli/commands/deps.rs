//! Deps command - transitive dependency resolution

use crate::cli::args::{DepsArgs, OutputFormat};
use crate::cli::context::CatalogContext;
use crate::config::Config;
use crate::error::{CatalogError, CatalogResult};
use crate::manifest::{Catalog, DependencyDocument, ManifestTree};
use console::style;
use tracing::debug;

/// Dependency document describing `id`.
///
/// Boards and middleware use the document named by their origin reference;
/// anything else is looked up across all fetched dependency documents.
pub(crate) fn document_for<'a>(tree: &'a ManifestTree, id: &str) -> Option<&'a DependencyDocument> {
    let origin_url = tree
        .board(id)
        .and_then(|b| tree.board_origin(b))
        .and_then(|r| r.dependency_source())
        .or_else(|| {
            tree.middleware_item(id)
                .and_then(|m| tree.middleware_origin(m))
                .and_then(|r| r.dependency_source())
        });

    if let Some(doc) = origin_url.and_then(|url| tree.dependencies(url)) {
        if doc.depender(id).is_some() {
            return Some(doc);
        }
    }

    tree.dependency_urls()
        .into_iter()
        .filter_map(|url| tree.dependencies(url))
        .find(|doc| doc.depender(id).is_some())
}

/// Execute the deps command
pub async fn execute(args: DepsArgs, config: &Config) -> CatalogResult<()> {
    let ctx = CatalogContext::open(config)?;
    let tree = ctx.load_tree().await;
    ctx.close().await;
    let tree = tree?;

    let doc = document_for(&tree, &args.id)
        .ok_or_else(|| CatalogError::ComponentNotFound(args.id.clone()))?;
    if doc.dependees(&args.id, &args.version).is_none() {
        return Err(CatalogError::ComponentNotFound(format!(
            "{} at version {}",
            args.id, args.version
        )));
    }

    let resolved = doc.resolve_transitive(&args.id, &args.version);
    debug!("Resolved {} components for {}", resolved.len(), args.id);

    match args.format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&resolved)?),
        OutputFormat::Plain => resolved.iter().for_each(|id| println!("{}", id)),
        OutputFormat::Table => {
            println!(
                "{} {}",
                style(&args.id).bold().cyan(),
                style(&args.version).dim()
            );
            for id in resolved.iter().skip(1) {
                println!("  {} {}", style("•").cyan(), id);
            }
            println!();
            println!("{} dependencies", resolved.len().saturating_sub(1));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logging::MemoryLogger;
    use crate::net::StaticFetcher;
    use std::sync::Arc;
    use tempfile::TempDir;

    const ROOT: &str = r#"<super-manifest version="2.0">
  <board-manifest-list>
    <board-manifest dependency-url="https://example.com/bsp-deps.xml"><uri>https://example.com/boards.xml</uri></board-manifest>
  </board-manifest-list>
  <middleware-manifest-list>
    <middleware-manifest dependency-url="https://example.com/mw-deps.xml"><uri>https://example.com/mw.xml</uri></middleware-manifest>
  </middleware-manifest-list>
</super-manifest>"#;

    const BSP_DEPS: &str = r#"<dependencies version="2.0">
  <depender><id>KIT_A</id><versions><version><commit>latest-v4.X</commit>
    <dependees><dependee><id>core-lib</id><commit>latest-v1.X</commit></dependee></dependees>
  </version></versions></depender>
</dependencies>"#;

    const MW_DEPS: &str = r#"<dependencies version="2.0">
  <depender><id>core-lib</id><versions><version><commit>latest-v1.X</commit><dependees/></version></versions></depender>
  <depender><id>KIT_A</id><versions><version><commit>latest-v4.X</commit><dependees/></version></versions></depender>
</dependencies>"#;

    #[tokio::test]
    async fn board_uses_origin_document() {
        let temp = TempDir::new().unwrap();
        let fetcher = Arc::new(StaticFetcher::new());
        fetcher.insert("https://example.com/root.xml", ROOT);
        fetcher.insert(
            "https://example.com/boards.xml",
            "<boards><board><id>KIT_A</id></board></boards>",
        );
        fetcher.insert(
            "https://example.com/mw.xml",
            "<middleware><middleware><id>core-lib</id></middleware></middleware>",
        );
        fetcher.insert("https://example.com/bsp-deps.xml", BSP_DEPS);
        fetcher.insert("https://example.com/mw-deps.xml", MW_DEPS);

        let mut config = Config::default();
        config.cache.dir = Some(temp.path().to_path_buf());
        config.catalog.root_url = "https://example.com/root.xml".into();
        let ctx = CatalogContext::with_fetcher(&config, fetcher, Arc::new(MemoryLogger::new()));
        let tree = ctx.load_tree().await.unwrap();
        ctx.close().await;

        let doc = document_for(&tree, "KIT_A").unwrap();
        assert_eq!(
            doc.resolve_transitive("KIT_A", "latest-v4.X"),
            vec!["KIT_A", "core-lib"]
        );

        let doc = document_for(&tree, "core-lib").unwrap();
        assert!(doc.depender("core-lib").is_some());
        assert!(document_for(&tree, "unknown").is_none());
    }
}
