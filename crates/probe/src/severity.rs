//! Nagios severity levels.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

/// Result classification of a check, carrying the Nagios exit code as its
/// discriminant.
///
/// Ordering follows how severities combine, not the exit code:
/// `Ok < Unknown < Warning < Critical`. An `Unknown` therefore survives any
/// later `Ok`, but a definite `Warning` or `Critical` finding outranks it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    /// Everything within thresholds
    #[default]
    Ok = 0,
    /// Degraded but functional
    Warning = 1,
    /// Monitored behavior is broken or too slow
    Critical = 2,
    /// The probe itself could not be evaluated
    Unknown = 3,
}

impl Severity {
    /// Nagios plugin exit code.
    #[must_use]
    pub const fn code(self) -> i32 {
        self as i32
    }

    /// Map a Nagios/Icinga numeric state back to a severity.
    /// Anything outside 0..=2 is treated as unknown.
    #[must_use]
    pub const fn from_code(code: i64) -> Self {
        match code {
            0 => Self::Ok,
            1 => Self::Warning,
            2 => Self::Critical,
            _ => Self::Unknown,
        }
    }

    /// Position in the aggregation order.
    #[must_use]
    pub const fn rank(self) -> u8 {
        match self {
            Self::Ok => 0,
            Self::Unknown => 1,
            Self::Warning => 2,
            Self::Critical => 3,
        }
    }

    /// Label used as the status-line prefix.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Ok => "OK",
            Self::Warning => "WARNING",
            Self::Critical => "CRITICAL",
            Self::Unknown => "UNKNOWN",
        }
    }

    /// Combine two severities, keeping the more severe one.
    #[must_use]
    pub fn combine(self, other: Self) -> Self {
        self.max(other)
    }

    pub const fn is_ok(self) -> bool {
        matches!(self, Self::Ok)
    }
}

impl PartialOrd for Severity {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Severity {
    fn cmp(&self, other: &Self) -> Ordering {
        self.rank().cmp(&other.rank())
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "OK" => Ok(Self::Ok),
            "WARNING" | "WARN" => Ok(Self::Warning),
            "CRITICAL" | "CRIT" => Ok(Self::Critical),
            "UNKNOWN" => Ok(Self::Unknown),
            other => Err(format!("unknown severity: {other}")),
        }
    }
}
