//! Timestamp-derived artifact names.
//!
//! Every file the pipeline touches for a request is keyed by one stem derived
//! from the wall clock: `month_day_hour_minute_second`, each component
//! unpadded (`3_5_9_7_2`). The tools locate their inputs and outputs by that
//! stem, so it is computed once per request and threaded through every stage.

use std::path::Path;

use chrono::{DateTime, Datelike, TimeZone, Timelike};

/// Extension the preprocessing tool converts every upload to.
pub const VIDEO_EXTENSION: &str = "avi";

/// Names for one request's artifacts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactNames {
    /// Shared stem, e.g. `3_5_9_7_2`
    stem: String,
    /// Original extension including the dot, or empty
    extension: String,
}

impl ArtifactNames {
    /// Derive names from a timestamp and the upload's original file name.
    pub fn derive<Tz: TimeZone>(now: &DateTime<Tz>, original_name: &str) -> Self {
        Self {
            stem: timestamp_stem(now),
            extension: original_extension(original_name),
        }
    }

    /// Same names with a numeric disambiguator appended to the stem.
    ///
    /// `0` returns the names unchanged.
    pub fn disambiguated(&self, n: u32) -> Self {
        if n == 0 {
            return self.clone();
        }
        Self {
            stem: format!("{}_{}", self.stem, n),
            extension: self.extension.clone(),
        }
    }

    pub fn stem(&self) -> &str {
        &self.stem
    }

    /// Name the upload is stored under: stem plus original extension.
    pub fn upload_file_name(&self) -> String {
        format!("{}{}", self.stem, self.extension)
    }

    /// Name of the converted video the tools produce: stem plus `.avi`.
    pub fn video_file_name(&self) -> String {
        format!("{}.{}", self.stem, VIDEO_EXTENSION)
    }
}

/// `M_D_H_m_s` in the timestamp's own timezone, month 1-based.
pub fn timestamp_stem<Tz: TimeZone>(now: &DateTime<Tz>) -> String {
    format!(
        "{}_{}_{}_{}_{}",
        now.month(),
        now.day(),
        now.hour(),
        now.minute(),
        now.second()
    )
}

/// Extension of `name` including the leading dot; empty when there is none.
///
/// Dotfiles such as `.hidden` have no extension.
pub fn original_extension(name: &str) -> String {
    Path::new(name)
        .extension()
        .map(|ext| format!(".{}", ext.to_string_lossy()))
        .unwrap_or_default()
}
