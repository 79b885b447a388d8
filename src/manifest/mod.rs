//! Manifest catalog model
//!
//! A root document lists board, app and middleware documents; board and
//! middleware references may also name a dependency document and a
//! capability dictionary. [`TreeLoader`] fetches all of them and assembles a
//! [`ManifestTree`], which is read through the [`Catalog`] trait.

pub mod compat;
pub mod deps;
pub mod schema;
pub mod tree;

pub use compat::{apps_for_board, middleware_for_board};
pub use deps::{Dependee, Depender, DependerVersion, DependencyDocument};
pub use schema::{
    App, AppDocument, AppManifestRef, AppVersion, Board, BoardDocument, BoardManifestRef,
    BoardVersion, CapabilitiesDocument, Capability, MiddlewareDocument, MiddlewareItem,
    MiddlewareManifestRef, MiddlewareVersion, RootManifest, ToolsVersion,
};
pub use tree::{Catalog, ManifestTree, TreeLoader, TreeState};
