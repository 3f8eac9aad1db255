//! Collaborative Verification Harness
//!
//! Drives several independent user sessions against a shared collaborative
//! backend and checks that a record authored in one session converges,
//! field by field, in every other session.

pub mod cli;
pub mod commands;
pub mod common;
pub mod record;
pub mod registry;
pub mod scenario;
pub mod sequencer;
pub mod session;
pub mod sim;
pub mod transform;
pub mod verifier;
pub mod waiter;

// Re-export commonly used types for tests
pub use common::{Error, Result};
pub use scenario::{Failure, ScenarioResult, ScenarioSpec};
