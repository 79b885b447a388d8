//! CLI command implementations

pub mod board;
pub mod cache;
pub mod compat;
pub mod config;
pub mod deps;
pub mod list;

pub use board::execute as board;
pub use cache::execute as cache;
pub use compat::execute as compat;
pub use config::execute as config;
pub use deps::execute as deps;
pub use list::{apps, boards, middleware};
