//! Ejection-fraction report returned to clients.

use serde::{Deserialize, Serialize};

/// One annotated point, rendered as text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Coordinate {
    pub x: String,
    pub y: String,
}

impl Coordinate {
    pub fn new(x: impl Into<String>, y: impl Into<String>) -> Self {
        Self {
            x: x.into(),
            y: y.into(),
        }
    }

    /// Build a coordinate from numeric components.
    ///
    /// Integral values print without a fractional part (`12`, not `12.0`),
    /// which is how downstream clients have always received them.
    pub fn from_numbers(x: f64, y: f64) -> Self {
        Self::new(number_text(x), number_text(y))
    }
}

fn number_text(value: f64) -> String {
    if value.is_finite() && value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        value.to_string()
    }
}

/// Successful pipeline result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EjectionReport {
    pub ejection_fraction: f64,
    pub pacing_required: bool,
    /// Points 2, 3 and 4, in that order.
    pub coordinates: [Coordinate; 3],
}
