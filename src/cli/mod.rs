//! CLI command definitions and parsing
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "vidsearch",
    version,
    about = "Multi-agent natural-language search over a video corpus",
    long_about = "vidsearch routes each query to text, visual and temporal retrieval agents, \
                  runs them concurrently and fuses their results into one ranked list."
)]
pub struct Cli {
    /// Global config file path (defaults to ~/.config/vidsearch/config.toml)
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Configuration profile to apply
    #[arg(short, long, global = true)]
    pub profile: Option<String>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Search the corpus with one query
    Query {
        /// Search query text
        query: String,

        /// Maximum number of results to print
        #[arg(short, long, default_value = "10")]
        limit: usize,

        /// Show the full response in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Run every non-empty line of a file as a query
    Batch {
        /// File with one query per line
        file: PathBuf,

        /// Show the responses in JSON format
        #[arg(long)]
        json: bool,

        /// Write the session history to this file afterwards
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Interactive search loop (`:stats` for statistics, `:quit` to exit)
    Repl,

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show current configuration
    Show,

    /// Validate configuration file
    Validate {
        /// Path to config file (defaults to standard location)
        #[arg(short, long)]
        file: Option<PathBuf>,
    },

    /// Initialize default configuration
    Init {
        /// Force overwrite existing config
        #[arg(short, long)]
        force: bool,
    },
}

impl Cli {
    /// Parse CLI arguments from command line
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
