//! Error types for the scenario filtering core.

use thiserror::Error;

/// Errors the filtering core can report.
#[derive(Debug, Error)]
pub enum CoreError {
    /// The input table lacks columns the filter contract requires.
    #[error("missing required columns: {}", .0.join(", "))]
    MissingColumns(Vec<String>),

    /// A mobility-code pair whose difference is outside the defined
    /// classification range 0–4.
    #[error("invalid mobility code difference: PPM={ppm}, PEM={pem}")]
    InvalidCodeDifference { ppm: i64, pem: i64 },
}
