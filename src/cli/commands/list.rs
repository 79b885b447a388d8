//! List commands - boards, apps and middleware

use crate::cli::args::{ListArgs, MiddlewareArgs, OutputFormat};
use crate::cli::context::CatalogContext;
use crate::config::Config;
use crate::error::CatalogResult;
use crate::manifest::{App, Board, Catalog, MiddlewareItem};
use console::style;
use serde::Serialize;

/// One row of list output
#[derive(Debug, Serialize)]
pub(crate) struct Row<'a> {
    pub id: &'a str,
    pub name: &'a str,
    pub category: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub requires: Option<String>,
}

impl<'a> From<&'a Board> for Row<'a> {
    fn from(board: &'a Board) -> Self {
        Self {
            id: &board.id,
            name: &board.name,
            category: &board.category,
            requires: None,
        }
    }
}

impl<'a> From<&'a App> for Row<'a> {
    fn from(app: &'a App) -> Self {
        Self {
            id: &app.id,
            name: &app.name,
            category: &app.category,
            requires: Some(app.requirement().to_string()),
        }
    }
}

impl<'a> From<&'a MiddlewareItem> for Row<'a> {
    fn from(item: &'a MiddlewareItem) -> Self {
        Self {
            id: &item.id,
            name: &item.name,
            category: &item.category,
            requires: Some(item.requirement().to_string()),
        }
    }
}

/// Execute the boards command
pub async fn boards(args: ListArgs, config: &Config) -> CatalogResult<()> {
    let ctx = CatalogContext::open(config)?;
    let tree = ctx.load_tree().await;
    ctx.close().await;
    let tree = tree?;

    let rows: Vec<Row> = tree.boards().into_iter().map(Row::from).collect();
    print_rows("Boards", &rows, args.format)
}

/// Execute the apps command
pub async fn apps(args: ListArgs, config: &Config) -> CatalogResult<()> {
    let ctx = CatalogContext::open(config)?;
    let tree = ctx.load_tree().await;
    ctx.close().await;
    let tree = tree?;

    let rows: Vec<Row> = tree.apps().into_iter().map(Row::from).collect();
    print_rows("Apps", &rows, args.format)
}

/// Execute the middleware command
pub async fn middleware(args: MiddlewareArgs, config: &Config) -> CatalogResult<()> {
    let ctx = CatalogContext::open(config)?;
    let tree = ctx.load_tree().await;
    ctx.close().await;
    let tree = tree?;

    let rows: Vec<Row> = tree
        .middleware()
        .into_iter()
        .filter(|item| args.all || !item.is_hidden())
        .map(Row::from)
        .collect();
    print_rows("Middleware", &rows, args.format)
}

pub(crate) fn print_rows(title: &str, rows: &[Row<'_>], format: OutputFormat) -> CatalogResult<()> {
    match format {
        OutputFormat::Table => print_table(title, rows),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(rows)?),
        OutputFormat::Plain => rows.iter().for_each(|row| println!("{}", row.id)),
    }
    Ok(())
}

fn print_table(title: &str, rows: &[Row<'_>]) {
    if rows.is_empty() {
        println!("{}", style(format!("No {} found", title.to_lowercase())).dim());
        return;
    }

    println!(
        "{:<36} {:<44} {:<20}",
        style("ID").bold(),
        style("NAME").bold(),
        style("CATEGORY").bold()
    );
    println!("{}", "-".repeat(100));

    for row in rows {
        println!("{:<36} {:<44} {:<20}", row.id, truncate(row.name, 44), row.category);
    }

    println!();
    println!("{} {}", rows.len(), title.to_lowercase());
}

/// Shorten `text` to `width` characters, marking the cut
pub(crate) fn truncate(text: &str, width: usize) -> String {
    if text.chars().count() <= width {
        return text.to_string();
    }
    let kept: String = text.chars().take(width.saturating_sub(1)).collect();
    format!("{kept}…")
}
