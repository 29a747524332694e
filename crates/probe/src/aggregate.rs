//! Folding several findings into one overall severity.

use crate::cleanup::CleanupLedger;
use crate::result::ProbeResult;
use crate::severity::Severity;

/// Separator printed between the findings and the cleanup warnings.
pub const SECTION_RULE: &str = "=================================";

/// Accumulates `(message, severity)` findings in the order probes complete.
///
/// The overall severity only ever moves up the aggregation order
/// (see [`Severity`]), so an UNKNOWN found early is never replaced by a later
/// OK. Cleanup failures go through [`CleanupLedger::cap`] and can at most
/// lift an OK to WARNING.
#[derive(Debug, Default, Clone)]
pub struct Aggregator {
    severity: Severity,
    messages: Vec<String>,
}

impl Aggregator {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a finding.
    pub fn push(&mut self, message: impl Into<String>, severity: Severity) {
        self.severity = self.severity.combine(severity);
        self.messages.push(message.into());
    }

    pub fn push_result(&mut self, result: &ProbeResult) {
        self.push(result.message.clone(), result.severity);
    }

    /// Report failed teardown actions under a warning header.
    pub fn push_cleanup(&mut self, ledger: &CleanupLedger) {
        if !ledger.has_failures() {
            return;
        }
        self.messages.push(SECTION_RULE.to_string());
        self.messages.push("WARN: failed to clean up:".to_string());
        for failure in ledger.failures() {
            self.messages
                .push(format!("{}: {}", failure.label, failure.detail));
        }
        self.severity = ledger.cap(self.severity);
    }

    pub fn severity(&self) -> Severity {
        self.severity
    }

    pub fn messages(&self) -> &[String] {
        &self.messages
    }

    pub fn finish(self) -> (Severity, Vec<String>) {
        (self.severity, self.messages)
    }
}

/// Fold a sequence of findings.
pub fn aggregate<I, S>(findings: I) -> (Severity, Vec<String>)
where
    I: IntoIterator<Item = (S, Severity)>,
    S: Into<String>,
{
    let mut agg = Aggregator::new();
    for (message, severity) in findings {
        agg.push(message, severity);
    }
    agg.finish()
}
