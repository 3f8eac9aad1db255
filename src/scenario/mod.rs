//! Collaborative scenarios
//!
//! A scenario opens one session per simulated user, has the author create a
//! uniquely titled record, and checks that every peer eventually sees it
//! with the expected field values. Scenarios are described in YAML so new
//! collaboration checks need no code.

mod config;
mod report;
mod runner;

pub use config::{
    load_scenario, parse_scenario, RulesSpec, ScenarioFile, ScenarioSpec, SessionSpec,
    WaitOverride,
};
pub use report::{Failure, Role, ScenarioResult, SessionReport, Step};
pub use runner::run;
