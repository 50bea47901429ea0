//! CLI parse: clap types for Tapestry. No behavior; definitions only.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// Tapestry CLI - budget-aware content generation
#[derive(Parser)]
#[command(name = "tapestry")]
#[command(about = "Generate per-user text, image and audio content under a provider budget")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Workspace root directory (where tapestry.toml is looked up)
    #[arg(long, default_value = ".")]
    pub workspace: PathBuf,

    /// Configuration file path (overrides default config loading)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(long, default_value = "false")]
    pub verbose: bool,

    /// Log level (trace, debug, info, warn, error, off)
    #[arg(long)]
    pub log_level: Option<String>,

    /// Log format (json, text)
    #[arg(long)]
    pub log_format: Option<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Submit a user's metadata and wait for the run to finish
    Submit(SubmitArgs),
    /// Show provider usage budgets (needs the sled storage backend)
    Budget {
        /// Output format (text or json)
        #[arg(long, default_value = "text")]
        format: String,
    },
    /// Show a user's profile and processing status (needs the sled storage backend)
    Profile {
        email: String,
        /// Output format (text or json)
        #[arg(long, default_value = "text")]
        format: String,
    },
}

#[derive(Args, Debug, Clone)]
pub struct SubmitArgs {
    /// JSON or TOML file with the full metadata; flags below are ignored when given
    #[arg(long)]
    pub metadata: Option<PathBuf>,

    #[arg(long)]
    pub email: Option<String>,

    /// Content language code
    #[arg(long, default_value = "en")]
    pub language: String,

    #[arg(long, default_value = "")]
    pub country: String,

    #[arg(long, default_value = "")]
    pub city: String,

    /// Preference key (repeatable)
    #[arg(long = "preference")]
    pub preferences: Vec<String>,

    /// Religion key (repeatable)
    #[arg(long = "religion")]
    pub religions: Vec<String>,

    /// Output format (text or json)
    #[arg(long, default_value = "text")]
    pub format: String,
}
