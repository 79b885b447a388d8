//! Command line interface

pub mod args;
pub mod commands;
pub mod context;

pub use args::{Cli, Commands};
pub use context::CatalogContext;

use crate::config::Config;

/// Apply global flags on top of the loaded configuration
pub fn apply_overrides(cli: &Cli, config: &mut Config) {
    if let Some(dir) = &cli.cache_dir {
        config.cache.dir = Some(dir.clone());
    }
    if let Some((first, rest)) = cli.roots.split_first() {
        config.catalog.root_url = first.clone();
        config.catalog.extra_roots = rest.to_vec();
    }
    if cli.verbose > 0 {
        config.general.verbose = true;
    }
}
