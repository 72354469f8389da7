//! Reference-object scale calibration and pixel to millimeter conversion.
//!
//! A single reference object of known physical size (an A4 sheet by default)
//! is placed in frame. Its longer visible edge gives the pixels-per-millimeter
//! factor that every other box in the same image is converted with.

use serde::{Deserialize, Serialize};

use crate::error::MeasureError;
use crate::geometry::{round_to, BoundingBox};

/// Known dimension of the default reference object: an A4 sheet's short edge.
pub const DEFAULT_REFERENCE_DIMENSION_MM: f64 = 210.0;

/// Pixels per millimeter. Always strictly positive and finite.
#[derive(Clone, Copy, Debug, Serialize, PartialEq, PartialOrd)]
#[serde(transparent)]
pub struct CalibrationFactor(f64);

impl CalibrationFactor {
    pub fn new(pixels_per_mm: f64) -> Result<Self, MeasureError> {
        if !pixels_per_mm.is_finite() || pixels_per_mm <= 0.0 {
            return Err(MeasureError::InvalidFactor(pixels_per_mm));
        }
        Ok(Self(pixels_per_mm))
    }

    pub fn pixels_per_mm(self) -> f64 {
        self.0
    }
}

/// Physical extent of a box, rounded to two decimals.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq)]
pub struct Dimensions {
    pub width_mm: f64,
    pub height_mm: f64,
}

/// Derive the calibration factor from a reference box of known size.
pub fn calibrate(
    reference: Option<&BoundingBox>,
    known_dimension_mm: f64,
) -> Result<CalibrationFactor, MeasureError> {
    let reference = reference.ok_or(MeasureError::MissingReference)?;
    if !known_dimension_mm.is_finite() || known_dimension_mm <= 0.0 {
        return Err(MeasureError::InvalidDimension(known_dimension_mm));
    }

    let ref_pixels = reference.longest_edge();
    if ref_pixels == 0.0 {
        return Err(MeasureError::DegenerateReference {
            bbox: reference.to_string(),
        });
    }

    CalibrationFactor::new(ref_pixels / known_dimension_mm)
}

/// Convert a box's pixel extent to millimeters.
pub fn to_millimeters(bbox: &BoundingBox, factor: CalibrationFactor) -> Dimensions {
    Dimensions {
        width_mm: round_to(bbox.width() / factor.pixels_per_mm(), 2),
        height_mm: round_to(bbox.height() / factor.pixels_per_mm(), 2),
    }
}
