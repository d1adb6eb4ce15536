//! flagcache - flag glyph substitution with a persistent asset cache
//!
//! CLI entry point that dispatches to subcommands.

use clap::Parser;
use console::style;
use flagcache::cli::{Cli, Commands};
use flagcache::config::ConfigManager;
use flagcache::error::FlagResult;
use std::process::ExitCode;
use tracing::debug;
use tracing_subscriber::EnvFilter;

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

async fn run() -> FlagResult<()> {
    let cli = Cli::parse();

    // Load configuration
    let config_manager = match cli.config {
        Some(ref path) => ConfigManager::with_path(path.clone()),
        None => ConfigManager::new(),
    };
    let config = config_manager.load().await?;

    // 0 = warn, 1 = info, 2+ = debug
    let filter = match cli.verbose {
        0 => EnvFilter::new("flagcache=warn"),
        1 => EnvFilter::new("flagcache=info"),
        _ => EnvFilter::new("flagcache=debug"),
    };

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .without_time()
        .with_writer(std::io::stderr);
    if config.general.log_format == "json" {
        subscriber.json().init();
    } else {
        subscriber.init();
    }

    debug!("Loaded config from {}", config_manager.path().display());
    let store_dir = ConfigManager::resolve_store_dir(&config, cli.store.as_deref());

    match cli.command {
        Commands::Render(args) => flagcache::cli::commands::render(args, &config, &store_dir).await,
        Commands::Cache(args) => flagcache::cli::commands::cache(args, &config, &store_dir).await,
        Commands::Config(args) => {
            flagcache::cli::commands::config(args, &config, &config_manager).await
        }
    }
}
