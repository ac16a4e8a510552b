//! Coordinate payload emitted by the position-extraction tool.
//!
//! The tool prints one JSON object mapping marker labels to `[x, y]` pairs,
//! e.g. `{"2": [41, 56], "3": [38, 97], "4": [88, 30]}`. Only markers 2, 3 and
//! 4 are consumed, in that order.

use echoflow_models::Coordinate;
use serde_json::{Map, Value};

use crate::error::{PipelineError, PipelineResult};

/// Marker labels that become the report's coordinates, in output order.
pub const MARKER_KEYS: [&str; 3] = ["2", "3", "4"];

/// Parse the tool's stdout into the three report coordinates.
pub fn parse_coordinates(stdout: &str) -> PipelineResult<[Coordinate; 3]> {
    let payload: Map<String, Value> = serde_json::from_str(stdout.trim())
        .map_err(|e| PipelineError::malformed_coordinates(e.to_string()))?;

    let [a, b, c] = MARKER_KEYS;
    Ok([
        marker(&payload, a)?,
        marker(&payload, b)?,
        marker(&payload, c)?,
    ])
}

fn marker(payload: &Map<String, Value>, key: &str) -> PipelineResult<Coordinate> {
    let pair = payload
        .get(key)
        .and_then(Value::as_array)
        .ok_or_else(|| PipelineError::malformed_coordinates(format!("missing point {key}")))?;

    let component = |index: usize| {
        pair.get(index).and_then(Value::as_f64).ok_or_else(|| {
            PipelineError::malformed_coordinates(format!(
                "point {key} is not a numeric [x, y] pair"
            ))
        })
    };

    Ok(Coordinate::from_numbers(component(0)?, component(1)?))
}
