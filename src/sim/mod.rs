//! In-process simulated tracker platform
//!
//! Stands in for the real collaborative backend so scenarios can run
//! without a deployment. It reproduces the externally visible behavior the
//! harness cares about: per-identity authorization, per-session view state,
//! replication latency between sessions, and the backend's normalization of
//! authored values. Time is measured with `tokio::time` so paused-clock
//! tests are deterministic.

mod platform;

pub use platform::{PlatformSettings, SimulatedPlatform};
