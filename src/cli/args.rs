//! CLI argument definitions using clap derive

use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// flagcache - flag glyph substitution with a persistent asset cache
///
/// Replaces flag emoji in text with image placeholders backed by
/// downloaded assets, caching every asset on disk between runs.
#[derive(Parser, Debug)]
#[command(name = "flagcache")]
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
    #[arg(short, long, global = true, env = "FLAGCACHE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Persistent store directory
    #[arg(long, global = true, env = "FLAGCACHE_STORE")]
    pub store: Option<PathBuf>,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Render a text file to HTML with flag images
    Render(RenderArgs),

    /// Inspect the persistent asset cache
    Cache(CacheArgs),

    /// Show or initialize configuration
    Config(ConfigArgs),
}

/// Arguments for the render command
#[derive(Parser, Debug)]
pub struct RenderArgs {
    /// Text file to render, one paragraph per line
    pub input: PathBuf,

    /// Write HTML here instead of stdout
    #[arg(short, long)]
    pub output: Option<PathBuf>,
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
    /// List persisted assets
    List {
        /// Output format
        #[arg(short, long, default_value = "table")]
        format: OutputFormat,
    },

    /// Drop expired assets and rewrite the record
    Prune,
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
    /// Show current configuration
    Show,

    /// Show configuration file path
    Path,

    /// Write the default configuration
    Init {
        /// Overwrite existing configuration
        #[arg(short, long)]
        force: bool,
    },
}

/// Output format for cache listings
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable table
    Table,
    /// JSON output
    Json,
    /// Simple text (one key per line)
    Plain,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_parses_render() {
        let cli = Cli::parse_from(["flagcache", "render", "notes.txt", "-o", "out.html"]);
        match cli.command {
            Commands::Render(args) => {
                assert_eq!(args.input, PathBuf::from("notes.txt"));
                assert_eq!(args.output, Some(PathBuf::from("out.html")));
            }
            _ => panic!("expected Render command"),
        }
    }

    #[test]
    fn cli_parses_cache_list_format() {
        let cli = Cli::parse_from(["flagcache", "cache", "list", "--format", "json"]);
        match cli.command {
            Commands::Cache(CacheArgs {
                action: CacheAction::List { format },
            }) => assert!(matches!(format, OutputFormat::Json)),
            _ => panic!("expected Cache List command"),
        }
    }

    #[test]
    fn cli_parses_cache_prune() {
        let cli = Cli::parse_from(["flagcache", "cache", "prune"]);
        assert!(matches!(
            cli.command,
            Commands::Cache(CacheArgs {
                action: CacheAction::Prune
            })
        ));
    }

    #[test]
    fn cli_parses_config_without_action() {
        let cli = Cli::parse_from(["flagcache", "config"]);
        match cli.command {
            Commands::Config(args) => assert!(args.action.is_none()),
            _ => panic!("expected Config command"),
        }
    }

    #[test]
    fn cli_global_flags_after_subcommand() {
        let cli = Cli::parse_from(["flagcache", "cache", "prune", "-vv", "--store", "/tmp/s"]);
        assert_eq!(cli.verbose, 2);
        assert_eq!(cli.store, Some(PathBuf::from("/tmp/s")));
    }

    #[test]
    fn cli_rejects_unknown_format() {
        let result = Cli::try_parse_from(["flagcache", "cache", "list", "--format", "xml"]);
        assert!(result.is_err());
    }
}
