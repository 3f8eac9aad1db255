//! CLI command definitions
//!
//! Defines the clap commands for the harness CLI.

use clap::Subcommand;
use std::path::PathBuf;

#[derive(Subcommand)]
pub enum Commands {
    /// Run collaborative scenarios defined in YAML files
    Run {
        /// Paths to scenario files
        #[arg(required = true)]
        paths: Vec<PathBuf>,

        /// Show every step each session reached
        #[arg(long, short)]
        verbose: bool,

        /// Print results as JSON instead of a report
        #[arg(long)]
        json: bool,

        /// Override the convergence timeout in seconds
        #[arg(long)]
        timeout_secs: Option<u64>,
    },

    /// Check scenario files without running them
    Validate {
        /// Paths to scenario files
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },

    /// Show the rule set a scenario verifies against
    Rules {
        /// Path to the scenario file
        path: PathBuf,
    },
}
