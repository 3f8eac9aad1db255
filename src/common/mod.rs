//! Common utilities shared by the CLI and the harness library

pub mod config;
pub mod error;
pub mod logging;
pub mod paths;

pub use error::{Error, Result};

/// Generate a short random identifier for tagging titles and labels
///
/// Eight lowercase alphanumerics give ~2.8e12 combinations, enough that two
/// runs against the same workspace never produce colliding titles.
pub fn generate_id() -> String {
    use rand::distr::{Alphanumeric, SampleString};
    Alphanumeric
        .sample_string(&mut rand::rng(), 8)
        .to_lowercase()
}
