//! mtbcat - distributed manifest catalog client
//!
//! Fetches a root manifest and the board, app, middleware, dependency and
//! capability documents it references, through a local
//! stale-while-revalidate cache with bounded concurrent fetching.

pub mod cache;
pub mod capability;
pub mod cli;
pub mod config;
pub mod error;
pub mod fetch;
pub mod logging;
pub mod manifest;
pub mod net;

pub use capability::CapabilityRequirement;
pub use error::{CatalogError, CatalogResult};
pub use manifest::{Catalog, ManifestTree, TreeLoader};
