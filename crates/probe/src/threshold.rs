//! Warn/critical threshold comparison.

use serde::{Deserialize, Serialize};

use crate::severity::Severity;

/// How a measured value is compared against a limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum Comparison {
    /// `value >= limit` breaches
    #[default]
    AtLeast,
    /// `value > limit` breaches
    Above,
}

impl Comparison {
    pub fn breaches(self, value: f64, limit: f64) -> bool {
        match self {
            Self::AtLeast => value >= limit,
            Self::Above => value > limit,
        }
    }
}

/// Upper limits for a measured value. Either limit may be absent.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Thresholds {
    pub warn: Option<f64>,
    pub crit: Option<f64>,
    #[serde(default)]
    pub comparison: Comparison,
}

impl Thresholds {
    #[must_use]
    pub const fn new(warn: f64, crit: f64) -> Self {
        Self {
            warn: Some(warn),
            crit: Some(crit),
            comparison: Comparison::AtLeast,
        }
    }

    /// Only a critical limit.
    #[must_use]
    pub const fn critical_only(crit: f64) -> Self {
        Self {
            warn: None,
            crit: Some(crit),
            comparison: Comparison::AtLeast,
        }
    }

    #[must_use]
    pub const fn with_comparison(mut self, comparison: Comparison) -> Self {
        self.comparison = comparison;
        self
    }

    /// Critical is checked first, so overlapping limits resolve to CRITICAL.
    pub fn classify(&self, value: f64) -> Severity {
        if self.crit.is_some_and(|c| self.comparison.breaches(value, c)) {
            Severity::Critical
        } else if self.warn.is_some_and(|w| self.comparison.breaches(value, w)) {
            Severity::Warning
        } else {
            Severity::Ok
        }
    }
}

/// Round to `places` decimals, the precision values are reported with.
pub fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round() / factor
}

/// Arithmetic mean, `None` for an empty series.
pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    #[allow(clippy::cast_precision_loss)]
    Some(values.iter().sum::<f64>() / values.len() as f64)
}
