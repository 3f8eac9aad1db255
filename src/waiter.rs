//! Bounded polling for eventually-visible state
//!
//! Replication between sessions is not instantaneous, so a peer's first
//! look may miss a freshly authored record. [`wait_for`] re-runs a read-only
//! [`Observation`] until it reports [`Probe::Ready`] or the time budget runs out.
//! Probe errors are returned immediately: only "not visible yet" is retried.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::Instant;

use crate::common::{Error, Result};

/// How the interval between polls evolves
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Backoff {
    Fixed,
    Exponential { factor: f64, max_interval: Duration },
}

/// Polling policy for one wait
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PollPolicy {
    /// Total wall-clock budget
    pub timeout: Duration,
    /// First interval between polls
    pub interval: Duration,
    pub backoff: Backoff,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            interval: Duration::from_millis(250),
            backoff: Backoff::Exponential {
                factor: 2.0,
                max_interval: Duration::from_secs(2),
            },
        }
    }
}

impl PollPolicy {
    /// Reject policies that would poll without ever sleeping
    pub fn validate(&self) -> Result<()> {
        if self.interval.is_zero() {
            return Err(Error::Config("poll interval must be greater than zero".to_string()));
        }
        if let Backoff::Exponential {
            factor,
            max_interval,
        } = self.backoff
        {
            if !factor.is_finite() || factor < 1.0 {
                return Err(Error::Config(format!(
                    "backoff factor must be a finite number >= 1.0, got {}",
                    factor
                )));
            }
            if max_interval.is_zero() {
                return Err(Error::Config(
                    "backoff max_interval must be greater than zero".to_string(),
                ));
            }
        }
        Ok(())
    }

    /// Interval to use after `current`
    pub fn next_interval(&self, current: Duration) -> Duration {
        match self.backoff {
            Backoff::Fixed => self.interval,
            Backoff::Exponential {
                factor,
                max_interval,
            } => Duration::try_from_secs_f64(current.as_secs_f64() * factor.max(1.0))
                .map_or(max_interval, |next| next.min(max_interval)),
        }
    }
}

/// One probe result
#[derive(Debug, Clone, PartialEq)]
pub enum Probe<T> {
    Ready(T),
    /// Not there yet; carries a description of what was seen instead
    Pending(String),
}

/// A successful wait
#[derive(Debug, Clone, PartialEq)]
pub struct Observed<T> {
    pub value: T,
    pub waited: Duration,
    pub attempts: u32,
}

/// A wait that ran out of budget
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WaitTimeout {
    pub waited: Duration,
    pub attempts: u32,
    pub last_observed: String,
}

/// A read-only query that can be repeated safely
#[async_trait]
pub trait Observation: Send {
    type Output: Send;

    async fn probe(&mut self) -> Result<Probe<Self::Output>>;
}

/// Poll `observation` until it is ready or `policy.timeout` elapses
///
/// The probe always runs at least once. Sleeps are clipped to the remaining
/// budget, so the total wait exceeds the timeout by at most one probe. A
/// timeout too large to represent as an instant never expires.
pub async fn wait_for<O>(
    policy: &PollPolicy,
    observation: &mut O,
) -> Result<std::result::Result<Observed<O::Output>, WaitTimeout>>
where
    O: Observation + ?Sized,
{
    policy.validate()?;

    let start = Instant::now();
    let deadline = start.checked_add(policy.timeout);
    let mut interval = policy.interval;
    let mut attempts = 0u32;

    loop {
        attempts += 1;
        let last_observed = match observation.probe().await? {
            Probe::Ready(value) => {
                return Ok(Ok(Observed {
                    value,
                    waited: start.elapsed(),
                    attempts,
                }))
            }
            Probe::Pending(seen) => seen,
        };

        let now = Instant::now();
        let mut sleep = interval;
        if let Some(deadline) = deadline {
            if now >= deadline {
                tracing::debug!(attempts, "Wait budget exhausted");
                return Ok(Err(WaitTimeout {
                    waited: now - start,
                    attempts,
                    last_observed,
                }));
            }
            sleep = sleep.min(deadline - now);
        }

        tracing::trace!(attempts, ?interval, seen = %last_observed, "Not visible yet");
        tokio::time::sleep(sleep).await;
        interval = policy.next_interval(interval);
    }
}
