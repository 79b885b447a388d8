//! Board compatibility filters
//!
//! An item is compatible with a board when the board's provided tokens
//! satisfy the item's capability requirement. An item without a requirement
//! is compatible with every board. Duplicate ids resolve to the item the
//! catalog lookup returns.

use crate::manifest::schema::{App, Board, MiddlewareItem};
use crate::manifest::tree::Catalog;
use std::collections::HashSet;

/// Middleware usable on `board`, in catalog order
pub fn middleware_for_board<'a, C>(catalog: &'a C, board: &Board) -> Vec<&'a MiddlewareItem>
where
    C: Catalog + ?Sized,
{
    let available = board.provided_capabilities();
    let mut seen = HashSet::new();
    catalog
        .middleware_ids()
        .into_iter()
        .filter(|id| seen.insert(*id))
        .filter_map(|id| catalog.middleware_item(id))
        .filter(|item| item.requirement().matches(&available))
        .collect()
}

/// Apps usable on `board`, in catalog order
pub fn apps_for_board<'a, C>(catalog: &'a C, board: &Board) -> Vec<&'a App>
where
    C: Catalog + ?Sized,
{
    let available = board.provided_capabilities();
    let mut seen = HashSet::new();
    catalog
        .app_ids()
        .into_iter()
        .filter(|id| seen.insert(*id))
        .filter_map(|id| catalog.app(id))
        .filter(|app| app.requirement().matches(&available))
        .collect()
}
