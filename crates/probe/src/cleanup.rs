//! Best-effort teardown of resources a probe created.
//!
//! Teardown failures are operational noise rather than a finding about the
//! monitored service: they are recorded and reported, and they can lift an
//! otherwise clean result to WARNING, but never further.

use std::fmt::Display;
use std::future::Future;

use futures::future::BoxFuture;
use serde::Serialize;
use tracing::{debug, warn};

use crate::severity::Severity;

/// Outcome of one teardown action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CleanupOutcome {
    /// What was being torn down, e.g. `leave !abc:example.org as @bot1:example.org`
    pub label: String,
    pub succeeded: bool,
    /// Error text for failures, empty on success
    pub detail: String,
}

impl CleanupOutcome {
    pub fn success(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            succeeded: true,
            detail: String::new(),
        }
    }

    pub fn failure(label: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            succeeded: false,
            detail: detail.into(),
        }
    }
}

/// A labelled teardown action that has not run yet.
pub struct TeardownAction<'a> {
    label: String,
    action: BoxFuture<'a, Result<(), String>>,
}

impl<'a> TeardownAction<'a> {
    pub fn new<F, E>(label: impl Into<String>, action: F) -> Self
    where
        F: Future<Output = Result<(), E>> + Send + 'a,
        E: Display,
    {
        Self {
            label: label.into(),
            action: Box::pin(async move { action.await.map_err(|e| e.to_string()) }),
        }
    }
}

/// Ordered record of teardown attempts.
#[derive(Debug, Default, Clone)]
pub struct CleanupLedger {
    outcomes: Vec<CleanupOutcome>,
}

impl CleanupLedger {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Run one teardown action now and record how it went.
    pub async fn attempt<F, E>(&mut self, label: impl Into<String>, action: F) -> bool
    where
        F: Future<Output = Result<(), E>>,
        E: Display,
    {
        let label = label.into();
        match action.await {
            Ok(()) => {
                debug!(action = %label, "cleanup succeeded");
                self.outcomes.push(CleanupOutcome::success(label));
                true
            }
            Err(e) => {
                warn!(action = %label, error = %e, "cleanup failed");
                self.outcomes
                    .push(CleanupOutcome::failure(label, e.to_string()));
                false
            }
        }
    }

    /// Run every action in order. A failing action does not stop the rest.
    pub async fn run_all(&mut self, actions: Vec<TeardownAction<'_>>) {
        for TeardownAction { label, action } in actions {
            self.attempt(label, action).await;
        }
    }

    /// Record an outcome produced elsewhere (e.g. a bulk sweep).
    pub fn record(&mut self, outcome: CleanupOutcome) {
        self.outcomes.push(outcome);
    }

    /// Move all outcomes of `other` into this ledger, keeping order.
    pub fn absorb(&mut self, other: CleanupLedger) {
        self.outcomes.extend(other.outcomes);
    }

    pub fn outcomes(&self) -> &[CleanupOutcome] {
        &self.outcomes
    }

    pub fn failures(&self) -> impl Iterator<Item = &CleanupOutcome> {
        self.outcomes.iter().filter(|o| !o.succeeded)
    }

    pub fn has_failures(&self) -> bool {
        self.failures().next().is_some()
    }

    /// Severity contributed on top of `primary`: a clean result becomes
    /// WARNING when any teardown failed, anything else is left alone.
    #[must_use]
    pub fn cap(&self, primary: Severity) -> Severity {
        if self.has_failures() && primary.is_ok() {
            Severity::Warning
        } else {
            primary
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn ok() -> Result<(), String> {
        Ok(())
    }

    async fn fail(msg: &str) -> Result<(), String> {
        Err(msg.to_string())
    }

    #[tokio::test]
    async fn test_failures_do_not_short_circuit() {
        let mut ledger = CleanupLedger::new();
        ledger
            .run_all(vec![
                TeardownAction::new("leave a", fail("M_UNKNOWN")),
                TeardownAction::new("leave b", ok()),
                TeardownAction::new("forget b", fail("timeout")),
            ])
            .await;

        let labels: Vec<_> = ledger.outcomes().iter().map(|o| o.label.as_str()).collect();
        assert_eq!(labels, vec!["leave a", "leave b", "forget b"]);
        assert_eq!(ledger.failures().count(), 2);
        assert_eq!(ledger.outcomes()[0].detail, "M_UNKNOWN");
    }

    #[tokio::test]
    async fn test_all_failures_cap_at_warning() {
        let mut ledger = CleanupLedger::new();
        for i in 0..3 {
            ledger.attempt(format!("leave {i}"), fail("boom")).await;
        }
        assert_eq!(ledger.cap(Severity::Ok), Severity::Warning);
        assert_eq!(ledger.cap(Severity::Warning), Severity::Warning);
        assert_eq!(ledger.cap(Severity::Critical), Severity::Critical);
        assert_eq!(ledger.cap(Severity::Unknown), Severity::Unknown);
    }

    #[tokio::test]
    async fn test_clean_ledger_keeps_primary() {
        let mut ledger = CleanupLedger::new();
        assert!(ledger.attempt("leave", ok()).await);
        assert!(!ledger.has_failures());
        assert_eq!(ledger.cap(Severity::Ok), Severity::Ok);
    }

    #[tokio::test]
    async fn test_absorb_keeps_order() {
        let mut first = CleanupLedger::new();
        first.attempt("one", ok()).await;
        let mut second = CleanupLedger::new();
        second.attempt("two", fail("x")).await;
        first.absorb(second);
        first.record(CleanupOutcome::success("three"));
        let labels: Vec<_> = first.outcomes().iter().map(|o| o.label.clone()).collect();
        assert_eq!(labels, ["one", "two", "three"]);
    }
}
