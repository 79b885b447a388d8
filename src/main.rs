//! mtbcat - manifest catalog browser
//!
//! CLI entry point that dispatches to subcommands.

use clap::Parser;
use console::style;
use mtbcat::cli::{apply_overrides, Cli, Commands};
use mtbcat::config::ConfigManager;
use mtbcat::error::CatalogResult;
use mtbcat::logging::{init_tracing, LogFormat};
use std::process::ExitCode;
use tracing::debug;

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {}", style("Error:").red().bold(), e);
            if let Some(hint) = e.hint() {
                eprintln!("{} {}", style("Hint:").yellow(), hint);
            }
            ExitCode::FAILURE
        }
    }
}

async fn run() -> CatalogResult<()> {
    let cli = Cli::parse();

    let config_manager = match cli.config {
        Some(ref path) => ConfigManager::with_path(path.clone()),
        None => ConfigManager::new(),
    };
    let mut config = config_manager.load().await?;
    apply_overrides(&cli, &mut config);

    // 0 = warn, 1 = info, 2+ = debug; config `verbose` counts as -v
    let verbosity = cli.verbose.max(u8::from(config.general.verbose));
    init_tracing(verbosity, LogFormat::from_config(&config.general.log_format));
    debug!("Loaded configuration from {}", config_manager.path().display());

    match cli.command {
        Commands::Boards(args) => mtbcat::cli::commands::boards(args, &config).await,
        Commands::Apps(args) => mtbcat::cli::commands::apps(args, &config).await,
        Commands::Middleware(args) => mtbcat::cli::commands::middleware(args, &config).await,
        Commands::Board(args) => mtbcat::cli::commands::board(args, &config).await,
        Commands::Deps(args) => mtbcat::cli::commands::deps(args, &config).await,
        Commands::Compat(args) => mtbcat::cli::commands::compat(args, &config).await,
        Commands::Cache(args) => mtbcat::cli::commands::cache(args, &config).await,
        Commands::Config(args) => {
            mtbcat::cli::commands::config(args, &config, &config_manager).await
        }
    }
}
