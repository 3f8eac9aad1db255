//! CLI command handling
//!
//! Loads scenarios, runs them against the simulated platform and formats output.

use colored::Colorize;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use crate::commands::Commands;
use crate::common::config::Config;
use crate::common::{Error, Result};
use crate::record::Field;
use crate::scenario::{self, ScenarioResult, ScenarioSpec};
use crate::sim::{PlatformSettings, SimulatedPlatform};

/// Dispatch a CLI command
///
/// Returns `Ok(false)` when a scenario ran but did not pass.
pub async fn dispatch(command: Commands, config: &Config) -> Result<bool> {
    match command {
        Commands::Run {
            paths,
            verbose,
            json,
            timeout_secs,
        } => {
            let mut results = Vec::with_capacity(paths.len());
            for path in &paths {
                let (mut spec, settings) = load(path, config)?;
                if let Some(secs) = timeout_secs {
                    spec.wait.timeout = Duration::from_secs(secs);
                }

                let platform = SimulatedPlatform::new(settings);
                let result = scenario::run(Arc::new(platform), &spec).await?;
                if !json {
                    result.print(verbose);
                }
                results.push(result);
            }

            let passed = results.iter().all(|r| r.passed);
            if json {
                println!("{}", serde_json::to_string_pretty(&results)?);
            } else if results.len() > 1 {
                print_summary(&results);
            }
            Ok(passed)
        }

        Commands::Validate { paths } => {
            let mut valid = true;
            for path in &paths {
                match load(path, config) {
                    Ok((spec, _)) => println!(
                        "{} {} ({} sessions, rules {})",
                        "✓".green(),
                        path.display(),
                        spec.sessions.len(),
                        spec.rules.label()
                    ),
                    Err(e) => {
                        valid = false;
                        println!("{} {}: {}", "✗".red(), path.display(), e);
                    }
                }
            }
            Ok(valid)
        }

        Commands::Rules { path } => {
            let (spec, _) = load(&path, config)?;
            println!("Rule set: {}", spec.rules.label().bold());
            if spec.rules.rules.is_empty() {
                println!("  (no rewrites)");
            }
            for (field, rule) in &spec.rules.rules {
                println!("  {:<12} {}", field.name(), serde_json::to_string(rule)?.dimmed());
            }

            let (_, record) = spec.instantiate();
            println!("\nExpected values:");
            for field in Field::ALL {
                let authored = record.value(field);
                let expected = spec.rules.apply(field, &authored);
                if authored == expected {
                    println!("  {:<12} {}", field.name(), expected);
                } else {
                    println!(
                        "  {:<12} {} {} {}",
                        field.name(),
                        authored.dimmed(),
                        "->".cyan(),
                        expected
                    );
                }
            }
            Ok(true)
        }
    }
}

fn load(path: &Path, config: &Config) -> Result<(ScenarioSpec, PlatformSettings)> {
    scenario::load_scenario(path)?
        .resolve(config)
        .map_err(|e| match e {
            Error::Config(msg) => Error::Config(format!("{}: {}", path.display(), msg)),
            other => other,
        })
}

fn print_summary(results: &[ScenarioResult]) {
    let passed = results.iter().filter(|r| r.passed).count();
    println!("{}", "Summary:".cyan());
    for result in results {
        let mark = if result.passed {
            "✓".green()
        } else {
            "✗".red()
        };
        println!("  {} {}", mark, result.name);
    }
    println!("\n  {}/{} scenarios passed\n", passed, results.len());
}
