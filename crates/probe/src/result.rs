//! Outcome of a single probe run.

use serde::Serialize;

use crate::severity::Severity;

/// What one probe run found. Built once and not modified afterwards.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProbeResult {
    pub message: String,
    pub severity: Severity,
    /// Measured value, if the probe got far enough to measure anything
    pub metric: Option<f64>,
    /// Opaque IDs of remote resources the probe created (room IDs, event IDs)
    pub artifacts: Vec<String>,
}

impl ProbeResult {
    pub fn new(severity: Severity, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            severity,
            metric: None,
            artifacts: Vec::new(),
        }
    }

    /// Failure with a message prefixed by the severity label,
    /// e.g. `UNKNOWN: failed to create room`.
    pub fn failed(severity: Severity, detail: impl AsRef<str>) -> Self {
        Self::new(severity, format!("{severity}: {}", detail.as_ref()))
    }

    #[must_use]
    pub fn with_metric(mut self, metric: f64) -> Self {
        self.metric = Some(metric);
        self
    }

    #[must_use]
    pub fn with_artifact(mut self, artifact: impl Into<String>) -> Self {
        self.artifacts.push(artifact.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failed_prefixes_label() {
        let r = ProbeResult::failed(Severity::Unknown, "failed to join room, timeout.");
        assert_eq!(r.message, "UNKNOWN: failed to join room, timeout.");
        assert_eq!(r.severity, Severity::Unknown);
        assert!(r.metric.is_none());
    }

    #[test]
    fn test_builders() {
        let r = ProbeResult::new(Severity::Ok, "fine")
            .with_metric(1.25)
            .with_artifact("!room:example.org");
        assert_eq!(r.metric, Some(1.25));
        assert_eq!(r.artifacts, vec!["!room:example.org".to_string()]);
    }
}
