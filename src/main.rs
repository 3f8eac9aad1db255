//! Collaborative verification harness
//!
//! Runs multi-user scenarios: one user authors a record, the others must
//! eventually see it with the expected, normalized field values.

use clap::Parser;
use collab_harness::common::config::Config;
use collab_harness::common::logging;
use collab_harness::{cli, commands};
use commands::Commands;

#[derive(Parser)]
#[command(name = "collab-harness", about = "Multi-session collaboration checks")]
#[command(version, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = match Config::load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(2);
        }
    };

    // Guard flushes the file writer on exit
    let _guard = if config.logging.file {
        logging::init_with_file().map(|(guard, path)| {
            tracing::debug!(path = %path.display(), "Logging to file");
            guard
        })
    } else {
        logging::init_cli();
        None
    };

    match cli::dispatch(cli.command, &config).await {
        Ok(true) => {}
        Ok(false) => std::process::exit(1),
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(2);
        }
    }
}
