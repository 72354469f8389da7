//! Invalid-input errors raised by the measurement core.

use thiserror::Error;

/// Caller or configuration mistakes that make a measurement impossible.
///
/// These are never recovered internally. Expected data conditions (an
/// unmapped element class, a zero-width ramp, a parameter with no rule)
/// are not errors and never produce one of these.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MeasureError {
    #[error("reference bounding box is required for calibration")]
    MissingReference,

    #[error("reference bounding box {bbox} has zero extent; cannot calibrate")]
    DegenerateReference { bbox: String },

    #[error("known reference dimension must be a positive number of millimeters, got {0}")]
    InvalidDimension(f64),

    #[error("calibration factor must be positive and finite, got {0}")]
    InvalidFactor(f64),

    #[error("detection {index} ({class}) has confidence {confidence} outside 0..=1")]
    InvalidConfidence {
        index: usize,
        class: String,
        confidence: f64,
    },
}
