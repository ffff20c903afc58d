//! CLI command definitions using clap.
//!
//! Defines the main CLI structure and subcommands:
//! - run: watch both artifacts and keep the runtime in sync with them
//! - config: print the resolved configuration

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Relaunch - restart the app runtime once per coherent pair of rebuilds
#[derive(Parser, Debug)]
#[command(name = "relaunch")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Optional config file path
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Option<Commands>,
}

impl Cli {
    /// Check if verbose mode is enabled
    pub fn is_verbose(&self) -> bool {
        self.verbose
    }
}

/// Main subcommands
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Commands {
    /// Watch both artifacts and supervise the runtime until interrupted
    Run {
        /// Run identity, e.g. the dev-server URL
        #[arg(short, long)]
        target: Option<String>,

        /// Restart debounce in milliseconds
        #[arg(short, long)]
        quiet_period_ms: Option<u64>,

        /// Extra arguments appended to every launch
        #[arg(last = true)]
        extra: Vec<String>,
    },

    /// Print the resolved configuration as YAML
    Config,
}
