//! Compat command - items usable on a board

use crate::cli::args::{CompatArgs, OutputFormat};
use crate::cli::commands::list::{print_rows, Row};
use crate::cli::context::CatalogContext;
use crate::config::Config;
use crate::error::{CatalogError, CatalogResult};
use crate::manifest::{apps_for_board, middleware_for_board, Catalog};
use serde::Serialize;

#[derive(Serialize)]
struct CompatView<'a> {
    board: &'a str,
    middleware: Vec<Row<'a>>,
    apps: Vec<Row<'a>>,
}

/// Execute the compat command
pub async fn execute(args: CompatArgs, config: &Config) -> CatalogResult<()> {
    let ctx = CatalogContext::open(config)?;
    let tree = ctx.load_tree().await;
    ctx.close().await;
    let tree = tree?;

    let board = tree
        .board(&args.board_id)
        .ok_or_else(|| CatalogError::ComponentNotFound(args.board_id.clone()))?;

    let view = CompatView {
        board: &board.id,
        middleware: middleware_for_board(&tree, board)
            .into_iter()
            .map(Row::from)
            .collect(),
        apps: apps_for_board(&tree, board).into_iter().map(Row::from).collect(),
    };

    match args.format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&view)?),
        format => {
            print_rows("Middleware", &view.middleware, format)?;
            if format == OutputFormat::Table {
                println!();
            }
            print_rows("Apps", &view.apps, format)?;
        }
    }
    Ok(())
}
