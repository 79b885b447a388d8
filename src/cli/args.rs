//! CLI argument definitions using clap derive

use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// mtbcat - board, app and middleware catalog browser
///
/// Fetches the distributed manifest catalog through a local
/// stale-while-revalidate cache.
#[derive(Parser, Debug)]
#[command(name = "mtbcat")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Increase verbosity (-v info, -vv debug)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    /// Configuration file path
    #[arg(short, long, global = true, env = "MTBCAT_CONFIG")]
    pub config: Option<PathBuf>,

    /// Catalog root URL; repeat to merge several roots
    #[arg(long = "root", global = true, value_name = "URL")]
    pub roots: Vec<String>,

    /// Document cache directory
    #[arg(long, global = true, value_name = "DIR")]
    pub cache_dir: Option<PathBuf>,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// List boards
    Boards(ListArgs),

    /// List code examples
    Apps(ListArgs),

    /// List middleware libraries
    Middleware(MiddlewareArgs),

    /// Show one board in detail
    Board(BoardArgs),

    /// Resolve the transitive dependencies of a component version
    Deps(DepsArgs),

    /// List middleware and apps compatible with a board
    Compat(CompatArgs),

    /// Manage the local document cache
    Cache(CacheArgs),

    /// Show configuration
    Config(ConfigArgs),
}

/// Arguments for the list commands
#[derive(Parser, Debug)]
pub struct ListArgs {
    /// Output format
    #[arg(short, long, default_value = "table")]
    pub format: OutputFormat,
}

/// Arguments for the middleware command
#[derive(Parser, Debug)]
pub struct MiddlewareArgs {
    /// Include hidden items
    #[arg(short, long)]
    pub all: bool,

    /// Output format
    #[arg(short, long, default_value = "table")]
    pub format: OutputFormat,
}

/// Arguments for the board command
#[derive(Parser, Debug)]
pub struct BoardArgs {
    /// Board id
    pub id: String,

    /// Output format
    #[arg(short, long, default_value = "table")]
    pub format: OutputFormat,
}

/// Arguments for the deps command
#[derive(Parser, Debug)]
pub struct DepsArgs {
    /// Board or library id
    pub id: String,

    /// Version commit, e.g. latest-v4.X
    #[arg(id = "version_commit", value_name = "VERSION")]
    pub version: String,

    /// Output format
    #[arg(short, long, default_value = "table")]
    pub format: OutputFormat,
}

/// Arguments for the compat command
#[derive(Parser, Debug)]
pub struct CompatArgs {
    /// Board id
    pub board_id: String,

    /// Output format
    #[arg(short, long, default_value = "table")]
    pub format: OutputFormat,
}

/// Arguments for the config command
#[derive(Parser, Debug)]
pub struct ConfigArgs {
    /// Subcommand for config
    #[command(subcommand)]
    pub action: Option<ConfigAction>,
}

/// Config subcommands
#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show effective configuration
    Show,

    /// Show configuration file path
    Path,
}

/// Output format for listing commands
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable table
    Table,
    /// JSON output
    Json,
    /// Simple text (one per line)
    Plain,
}

/// Arguments for the cache command
#[derive(Parser, Debug)]
pub struct CacheArgs {
    /// Subcommand for cache
    #[command(subcommand)]
    pub action: CacheAction,
}

/// Cache subcommands
#[derive(Subcommand, Debug)]
pub enum CacheAction {
    /// List cached documents
    List {
        /// Output format
        #[arg(short, long, default_value = "table")]
        format: OutputFormat,
    },

    /// Show the cache directory
    Path,

    /// Remove every cached document
    Clear {
        /// Skip confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },

    /// Remove documents older than the TTL
    ClearStale,

    /// Re-fetch every stale document now
    Refresh,
}
