//! Bounded polling primitives.
//!
//! Deployment checks never wait open-ended: every wait is expressed as a
//! probe, a predicate over the probe's observation, a fixed retry interval
//! and a hard timeout. Key concepts:
//!
//! - **Probe**: an async read of current state (instance states, a log
//!   buffer, an HTTP body).
//! - **Predicate**: decides whether the observation is the one we wait for.
//! - **Outcome**: the last observation plus whether the deadline elapsed.
//!
//! # Invariants
//!
//! - `poll_until` returns no later than `timeout` after it was called, even
//!   if a probe hangs
//! - At least one probe is attempted whenever the timeout is non-zero
//! - The last completed observation is always reported, success or not

use std::future::Future;
use std::time::Duration;

use thiserror::Error;
use tokio::time::Instant;
use tracing::debug;

/// Polling errors.
#[derive(Debug, Error)]
pub enum PollError {
    /// Timeout waiting for the predicate to hold.
    #[error("timeout after {elapsed:?} waiting for {resource}")]
    Timeout {
        resource: String,
        elapsed: Duration,
    },
}

/// Default interval between probe attempts.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Default bound for instances to converge to running.
pub const DEFAULT_INSTANCE_TIMEOUT: Duration = Duration::from_secs(120);

/// Default retry window for log and body assertions.
pub const DEFAULT_ASSERTION_WINDOW: Duration = Duration::from_secs(10);

/// Interval and deadline for a single wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub interval: Duration,
    pub timeout: Duration,
}

impl PollPolicy {
    pub fn new(interval: Duration, timeout: Duration) -> Self {
        Self { interval, timeout }
    }

    /// Policy used while waiting for instances to become ready.
    pub fn instances() -> Self {
        Self::new(DEFAULT_POLL_INTERVAL, DEFAULT_INSTANCE_TIMEOUT)
    }

    /// Policy used by log and body assertions.
    pub fn assertion() -> Self {
        Self::new(DEFAULT_POLL_INTERVAL, DEFAULT_ASSERTION_WINDOW)
    }
}

/// Result of a bounded wait.
#[derive(Debug, Clone)]
pub struct PollOutcome<T> {
    /// Last completed observation. `None` only if no probe finished in time.
    pub value: Option<T>,

    /// True if the deadline elapsed before the predicate held.
    pub timed_out: bool,

    /// Number of completed probe attempts.
    pub attempts: u32,

    /// Wall time spent waiting.
    pub elapsed: Duration,
}

impl<T> PollOutcome<T> {
    /// Returns true if the predicate held before the deadline.
    pub fn is_satisfied(&self) -> bool {
        !self.timed_out && self.value.is_some()
    }

    /// Convert into the satisfying observation, or a timeout error naming
    /// `resource`.
    pub fn into_result(self, resource: impl Into<String>) -> Result<T, PollError> {
        match self.value {
            Some(value) if !self.timed_out => Ok(value),
            _ => Err(PollError::Timeout {
                resource: resource.into(),
                elapsed: self.elapsed,
            }),
        }
    }
}

/// Repeatedly run `probe` until `predicate` accepts its observation or the
/// policy's timeout elapses.
///
/// Each probe is itself bounded by the remaining time, so a hung probe cannot
/// extend the wait past the deadline.
pub async fn poll_until<T, P, Fut, F>(
    mut probe: P,
    predicate: F,
    policy: PollPolicy,
) -> PollOutcome<T>
where
    P: FnMut() -> Fut,
    Fut: Future<Output = T>,
    F: Fn(&T) -> bool,
{
    let start = Instant::now();
    let deadline = start + policy.timeout;
    let mut last = None;
    let mut attempts = 0u32;

    loop {
        match tokio::time::timeout_at(deadline, probe()).await {
            Ok(value) => {
                attempts += 1;
                let done = predicate(&value);
                last = Some(value);
                if done {
                    return PollOutcome {
                        value: last,
                        timed_out: false,
                        attempts,
                        elapsed: start.elapsed(),
                    };
                }
                debug!(attempt = attempts, "poll predicate not yet satisfied");
            }
            Err(_) => {
                debug!(attempts, "probe did not complete before deadline");
            }
        }

        let now = Instant::now();
        if now >= deadline {
            return PollOutcome {
                value: last,
                timed_out: true,
                attempts,
                elapsed: start.elapsed(),
            };
        }

        let remaining = deadline - now;
        tokio::time::sleep(policy.interval.min(remaining)).await;
    }
}

/// Convergence status for a group of instances.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConvergenceStatus {
    /// Every instance is ready.
    Converged,

    /// Some instances are not ready yet.
    Converging,

    /// At least one instance reports a failed state.
    Diverged,

    /// No instances reported.
    Unknown,
}

impl ConvergenceStatus {
    /// Returns true if the group has converged.
    pub fn is_converged(&self) -> bool {
        matches!(self, Self::Converged)
    }
}

/// Classify a group of instance observations.
///
/// Failure wins over readiness: a group with one crashed instance is
/// `Diverged` even if the rest are ready.
pub fn classify<I, R, F>(items: I, is_ready: R, is_failed: F) -> ConvergenceStatus
where
    I: IntoIterator,
    R: Fn(&I::Item) -> bool,
    F: Fn(&I::Item) -> bool,
{
    let mut seen = false;
    let mut all_ready = true;

    for item in items {
        seen = true;
        if is_failed(&item) {
            return ConvergenceStatus::Diverged;
        }
        if !is_ready(&item) {
            all_ready = false;
        }
    }

    match (seen, all_ready) {
        (false, _) => ConvergenceStatus::Unknown,
        (true, true) => ConvergenceStatus::Converged,
        (true, false) => ConvergenceStatus::Converging,
    }
}
