//! CLI argument definitions using clap derive

use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// fwforge - Firmware build service
///
/// Builds firmware applications from a board and a list of module ids,
/// reusing compiled modules from a shared artifact cache.
#[derive(Parser, Debug)]
#[command(name = "fwforge")]
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
    #[arg(short, long, global = true, env = "FWFORGE_CONFIG")]
    pub config: Option<PathBuf>,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Build a firmware application
    Build(BuildArgs),

    /// Inspect the module artifact cache
    Cache(CacheArgs),

    /// Show or edit configuration
    Config(ConfigArgs),
}

/// Arguments for the build command
#[derive(Parser, Debug)]
pub struct BuildArgs {
    /// Target board
    #[arg(short, long)]
    pub board: String,

    /// Module ids, in order
    #[arg(short, long, num_args = 1.., required = true)]
    pub modules: Vec<i64>,

    /// Contents of main.c
    #[arg(long, conflicts_with = "mainfile_path")]
    pub mainfile: Option<String>,

    /// Read main.c from a file
    #[arg(long)]
    pub mainfile_path: Option<PathBuf>,

    /// Reuse and publish cached module builds
    #[arg(long)]
    pub caching: bool,

    /// Module registry file (overrides registry.path)
    #[arg(long)]
    pub registry: Option<PathBuf>,

    /// Write the output archive to this file
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Output format
    #[arg(short, long, default_value = "json")]
    pub format: OutputFormat,
}

/// Arguments for the cache command
#[derive(Parser, Debug)]
pub struct CacheArgs {
    #[command(subcommand)]
    pub action: CacheAction,
}

/// Cache subcommands
#[derive(Subcommand, Debug)]
pub enum CacheAction {
    /// List cache entries
    List {
        /// Only entries for this board
        #[arg(short, long)]
        board: Option<String>,

        /// Output format
        #[arg(short, long, default_value = "table")]
        format: OutputFormat,
    },

    /// Show the cache root directory
    Path,
}

/// Arguments for the config command
#[derive(Parser, Debug)]
pub struct ConfigArgs {
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

    /// Initialize default configuration
    Init {
        /// Overwrite existing configuration
        #[arg(short, long)]
        force: bool,
    },

    /// Set a configuration value
    Set {
        /// Configuration key (e.g., toolchain.program)
        key: String,
        /// Value to set
        value: String,
    },
}

/// Output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable table
    Table,
    /// JSON output
    Json,
    /// Simple text (one per line)
    Plain,
}
