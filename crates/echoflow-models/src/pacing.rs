//! Pacing recommendation rule.
//!
//! Two deployments of the pipeline disagree on how the ejection fraction maps
//! to a pacing recommendation (`> 50` versus `< 40`), so both the comparison
//! direction and the threshold are configuration.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Direction of the threshold comparison. Both are strict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Comparison {
    /// Pacing is required when the score is strictly greater than the threshold.
    Above,
    /// Pacing is required when the score is strictly less than the threshold.
    Below,
}

impl Comparison {
    pub fn as_str(&self) -> &'static str {
        match self {
            Comparison::Above => "gt",
            Comparison::Below => "lt",
        }
    }
}

impl FromStr for Comparison {
    type Err = PacingRuleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "gt" | ">" | "above" => Ok(Comparison::Above),
            "lt" | "<" | "below" => Ok(Comparison::Below),
            _ => Err(PacingRuleError::UnknownComparison(s.to_string())),
        }
    }
}

/// Threshold decision on the extracted ejection fraction.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PacingRule {
    pub comparison: Comparison,
    pub threshold: f64,
}

impl PacingRule {
    pub fn new(comparison: Comparison, threshold: f64) -> Self {
        Self {
            comparison,
            threshold,
        }
    }

    /// Decide whether pacing is required for the given score.
    ///
    /// NaN never requires pacing.
    pub fn requires_pacing(&self, ejection_fraction: f64) -> bool {
        match self.comparison {
            Comparison::Above => ejection_fraction > self.threshold,
            Comparison::Below => ejection_fraction < self.threshold,
        }
    }
}

impl Default for PacingRule {
    fn default() -> Self {
        Self::new(Comparison::Above, 50.0)
    }
}

impl fmt::Display for PacingRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.comparison.as_str(), self.threshold)
    }
}

/// Parses `gt:50`, `lt:40`, `>50` style rules.
impl FromStr for PacingRule {
    type Err = PacingRuleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (comparison, threshold) = match s.split_once(':') {
            Some((cmp, value)) => (cmp.parse::<Comparison>()?, value),
            None if s.starts_with('>') => (Comparison::Above, &s[1..]),
            None if s.starts_with('<') => (Comparison::Below, &s[1..]),
            None => return Err(PacingRuleError::Malformed(s.to_string())),
        };

        let threshold = threshold
            .trim()
            .parse::<f64>()
            .ok()
            .filter(|t| t.is_finite())
            .ok_or_else(|| PacingRuleError::InvalidThreshold(threshold.to_string()))?;

        Ok(Self::new(comparison, threshold))
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum PacingRuleError {
    #[error("Malformed pacing rule: {0} (expected e.g. gt:50 or lt:40)")]
    Malformed(String),

    #[error("Unknown pacing comparison: {0}")]
    UnknownComparison(String),

    #[error("Invalid pacing threshold: {0}")]
    InvalidThreshold(String),
}
