//! Rendering check results the way Nagios/Icinga expect them.
//!
//! Output is the status lines on stdout followed by performance data after a
//! `|` separator, and the process exits with the severity code.

use std::fmt;
use std::future::Future;

use crate::aggregate::Aggregator;
use crate::severity::Severity;

/// One performance data item, `'label'=value<unit>;;;`.
#[derive(Debug, Clone, PartialEq)]
pub struct PerfData {
    pub label: String,
    /// `None` renders as `U`, the Nagios marker for an unknown value
    pub value: Option<f64>,
    pub unit: &'static str,
}

impl PerfData {
    pub fn new(label: impl Into<String>, value: Option<f64>, unit: &'static str) -> Self {
        Self {
            label: label.into(),
            value,
            unit,
        }
    }

    /// Seconds-valued item.
    pub fn seconds(label: impl Into<String>, value: Option<f64>) -> Self {
        Self::new(label, value, "s")
    }
}

impl fmt::Display for PerfData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.value {
            Some(v) => write!(f, "'{}'={v}{};;;", self.label, self.unit),
            None => write!(f, "'{}'=U;;;", self.label),
        }
    }
}

/// Everything a check prints before exiting.
#[derive(Debug, Clone, PartialEq)]
pub struct CheckOutput {
    pub severity: Severity,
    pub lines: Vec<String>,
    pub perfdata: Vec<PerfData>,
}

impl CheckOutput {
    pub fn new(severity: Severity) -> Self {
        Self {
            severity,
            lines: Vec::new(),
            perfdata: Vec::new(),
        }
    }

    pub fn from_aggregator(agg: Aggregator) -> Self {
        let (severity, lines) = agg.finish();
        Self {
            severity,
            lines,
            perfdata: Vec::new(),
        }
    }

    /// Single status line, e.g. `CheckOutput::status(Severity::Ok, "DB lag is 0.001 sec.")`
    /// renders `OK: DB lag is 0.001 sec.`.
    pub fn status(severity: Severity, message: impl fmt::Display) -> Self {
        Self::new(severity).line(format!("{severity}: {message}"))
    }

    #[must_use]
    pub fn line(mut self, line: impl Into<String>) -> Self {
        self.lines.push(line.into());
        self
    }

    #[must_use]
    pub fn perf(mut self, item: PerfData) -> Self {
        self.perfdata.push(item);
        self
    }

    /// Print to stdout and terminate the process with the severity code.
    pub fn exit(self) -> ! {
        println!("{self}");
        std::process::exit(self.severity.code())
    }
}

impl fmt::Display for CheckOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for line in &self.lines {
            if !first {
                f.write_str("\n")?;
            }
            f.write_str(line)?;
            first = false;
        }
        if !self.perfdata.is_empty() {
            if !first {
                f.write_str(" ")?;
            }
            f.write_str("|")?;
            let items: Vec<String> = self.perfdata.iter().map(ToString::to_string).collect();
            f.write_str(&items.join(" "))?;
        }
        Ok(())
    }
}

/// Output for an error that escaped a check: `UNKNOWN: exception` plus the
/// error chain.
pub fn exception_output(error: &anyhow::Error) -> CheckOutput {
    CheckOutput::new(Severity::Unknown)
        .line("UNKNOWN: exception")
        .line(format!("{error:#}"))
}

/// Run a check to completion and exit with its severity. Errors become
/// UNKNOWN so no check ever exits without a status.
pub async fn run_check<F>(check: F) -> !
where
    F: Future<Output = anyhow::Result<CheckOutput>>,
{
    match check.await {
        Ok(output) => output.exit(),
        Err(e) => {
            tracing::error!(error = %format!("{e:#}"), "check failed");
            exception_output(&e).exit()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;

    #[test]
    fn test_perfdata_rendering() {
        assert_eq!(
            PerfData::seconds("matrix.example.org_outbound", Some(1.8)).to_string(),
            "'matrix.example.org_outbound'=1.8s;;;"
        );
        assert_eq!(PerfData::seconds("x_inbound", None).to_string(), "'x_inbound'=U;;;");
        assert_eq!(PerfData::new("rate", Some(3.0), "").to_string(), "'rate'=3;;;");
    }

    #[test]
    fn test_status_line_with_perfdata() {
        let out = CheckOutput::status(Severity::Ok, "DB lag is 0.002 sec.")
            .perf(PerfData::seconds("db-lag", Some(0.002)));
        assert_eq!(out.to_string(), "OK: DB lag is 0.002 sec. |'db-lag'=0.002s;;;");
    }

    #[test]
    fn test_multiline_output() {
        let out = CheckOutput::new(Severity::Warning)
            .line("OK: a -> b is 1.5 seconds.")
            .line("WARNING: a <- b is 2.1 seconds.")
            .perf(PerfData::seconds("a_outbound", Some(1.5)))
            .perf(PerfData::seconds("a_inbound", Some(2.1)));
        assert_eq!(
            out.to_string(),
            "OK: a -> b is 1.5 seconds.\nWARNING: a <- b is 2.1 seconds. |'a_outbound'=1.5s;;; 'a_inbound'=2.1s;;;"
        );
    }

    #[test]
    fn test_perfdata_only() {
        let out = CheckOutput::new(Severity::Ok).perf(PerfData::seconds("x", Some(1.0)));
        assert_eq!(out.to_string(), "|'x'=1s;;;");
    }

    #[test]
    fn test_exception_output_includes_chain() {
        let err = Err::<(), _>(std::io::Error::other("connection refused"))
            .context("failed to log in")
            .unwrap_err();
        let out = exception_output(&err);
        assert_eq!(out.severity, Severity::Unknown);
        assert_eq!(out.lines[0], "UNKNOWN: exception");
        assert_eq!(out.lines[1], "failed to log in: connection refused");
    }
}
