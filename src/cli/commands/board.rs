//! Board command - show one board

use crate::cli::args::{BoardArgs, OutputFormat};
use crate::cli::context::CatalogContext;
use crate::config::Config;
use crate::error::{CatalogError, CatalogResult};
use crate::manifest::{Board, Catalog, ManifestTree};
use console::style;
use serde::Serialize;
use std::collections::BTreeMap;

#[derive(Debug, Serialize)]
struct BoardView<'a> {
    id: &'a str,
    name: &'a str,
    category: &'a str,
    summary: &'a str,
    description: &'a str,
    documentation_url: &'a str,
    source: Option<&'a str>,
    mcu: &'a [String],
    radio: &'a [String],
    capabilities: BTreeMap<String, String>,
    versions: Vec<VersionView<'a>>,
}

#[derive(Debug, Serialize)]
struct VersionView<'a> {
    num: &'a str,
    commit: &'a str,
    dependencies: usize,
}

impl<'a> BoardView<'a> {
    fn new(tree: &'a ManifestTree, board: &'a Board) -> Self {
        let mut tokens: Vec<&str> = board.provided_capabilities().into_iter().collect();
        tokens.sort_unstable();
        let capabilities = match &board.capabilities {
            Some(dictionary) => dictionary.explain(tokens),
            None => tokens
                .into_iter()
                .map(|t| (t.to_string(), String::new()))
                .collect(),
        };

        let versions = board
            .versions()
            .iter()
            .map(|v| VersionView {
                num: &v.num,
                commit: &v.commit,
                dependencies: board
                    .dependencies
                    .as_ref()
                    .and_then(|d| d.version(&v.commit))
                    .map_or(0, |dv| dv.dependees().len()),
            })
            .collect();

        Self {
            id: &board.id,
            name: &board.name,
            category: &board.category,
            summary: &board.summary,
            description: &board.description,
            documentation_url: &board.documentation_url,
            source: tree.board_origin(board).map(|r| r.uri.as_str()),
            mcu: &board.chips.mcu,
            radio: &board.chips.radio,
            capabilities,
            versions,
        }
    }
}

/// Execute the board command
pub async fn execute(args: BoardArgs, config: &Config) -> CatalogResult<()> {
    let ctx = CatalogContext::open(config)?;
    let tree = ctx.load_tree().await;
    ctx.close().await;
    let tree = tree?;

    let board = tree
        .board(&args.id)
        .ok_or_else(|| CatalogError::ComponentNotFound(args.id.clone()))?;
    let view = BoardView::new(&tree, board);

    match args.format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&view)?),
        OutputFormat::Plain => {
            for version in &view.versions {
                println!("{}", version.commit);
            }
        }
        OutputFormat::Table => print_view(&view),
    }
    Ok(())
}

fn print_view(view: &BoardView<'_>) {
    println!("{} {}", style(view.id).bold().cyan(), style(view.name).bold());
    let fields = [
        ("Category", view.category),
        ("Summary", view.summary),
        ("Docs", view.documentation_url),
        ("Source", view.source.unwrap_or("")),
    ];
    for (label, value) in fields {
        if !value.is_empty() {
            println!("  {:<12} {}", style(label).dim(), value);
        }
    }
    if !view.mcu.is_empty() {
        println!("  {:<12} {}", style("MCU").dim(), view.mcu.join(", "));
    }
    if !view.radio.is_empty() {
        println!("  {:<12} {}", style("Radio").dim(), view.radio.join(", "));
    }

    println!();
    println!("{}", style("Capabilities").bold());
    for (token, description) in &view.capabilities {
        if description.is_empty() {
            println!("  {}", token);
        } else {
            println!("  {:<24} {}", token, style(description).dim());
        }
    }

    println!();
    println!("{}", style("Versions").bold());
    for version in &view.versions {
        println!(
            "  {:<24} {:<24} {} dependencies",
            version.num, version.commit, version.dependencies
        );
    }
}
