//! Bounded fixed-interval polling of a remote call.
//!
//! The poller knows nothing about severities: whether running out of time is
//! "unknown" or "critical" depends on what was being waited for, so callers
//! map [`PollOutcome::TimedOut`] themselves.

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, trace};

/// Result of a single remote call as seen by the poller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallOutcome<T> {
    /// The call succeeded
    Success(T),
    /// Not there yet (pending invite, event not federated, transient error)
    Retryable(String),
    /// The remote side gave a definite answer that will not change
    Terminal(String),
}

impl<T> CallOutcome<T> {
    /// Collapse into a `Result`, treating both failure kinds as errors.
    pub fn into_result(self) -> Result<T, String> {
        match self {
            Self::Success(value) => Ok(value),
            Self::Retryable(detail) | Self::Terminal(detail) => Err(detail),
        }
    }

    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }
}

/// Final outcome of a poll loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome<T> {
    Success(T),
    Terminal(String),
    /// The deadline passed while the call was still retryable.
    /// Carries the detail of the last retryable failure.
    TimedOut(String),
}

/// Default poll cadence. The observed latency is only known to within one
/// interval, so it must stay well below the gap between thresholds.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Absolute point in time after which a poll loop gives up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Deadline(Instant);

impl Deadline {
    /// Deadline `timeout` from now.
    #[must_use]
    pub fn after(timeout: Duration) -> Self {
        Self(Instant::now() + timeout)
    }

    pub fn has_passed(&self) -> bool {
        Instant::now() >= self.0
    }
}

/// Repeats an operation at a fixed cadence until it settles or the deadline
/// passes. No backoff growth.
#[derive(Debug, Clone, Copy)]
pub struct Poller {
    interval: Duration,
}

impl Poller {
    #[must_use]
    pub const fn new(interval: Duration) -> Self {
        Self { interval }
    }

    pub const fn interval(&self) -> Duration {
        self.interval
    }

    /// Poll `operation` until it succeeds, fails terminally, or `deadline`
    /// passes.
    ///
    /// The operation always runs at least once. A loop whose operation never
    /// settles returns no earlier than the deadline and at most one interval
    /// (plus the duration of the final call) after it.
    pub async fn poll<T, F, Fut>(&self, deadline: Deadline, mut operation: F) -> PollOutcome<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = CallOutcome<T>>,
    {
        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            match operation().await {
                CallOutcome::Success(value) => {
                    debug!(attempt, "poll succeeded");
                    return PollOutcome::Success(value);
                }
                CallOutcome::Terminal(detail) => {
                    debug!(attempt, detail = %detail, "poll failed terminally");
                    return PollOutcome::Terminal(detail);
                }
                CallOutcome::Retryable(detail) => {
                    if deadline.has_passed() {
                        debug!(attempt, detail = %detail, "poll deadline passed");
                        return PollOutcome::TimedOut(detail);
                    }
                    trace!(attempt, detail = %detail, "poll pending, retrying");
                    tokio::time::sleep(self.interval).await;
                }
            }
        }
    }
}

impl Default for Poller {
    fn default() -> Self {
        Self::new(DEFAULT_POLL_INTERVAL)
    }
}
