//! Detector output records.
//!
//! Detection itself runs outside this crate. This module defines the record
//! shape the detector hands over and parses its JSON payloads.

mod result;

use anyhow::{anyhow, Result};
use serde::Deserialize;

use crate::error::MeasureError;

pub use result::{class_name_for_id, Detection, ElementClass};

#[derive(Deserialize)]
#[serde(untagged)]
enum DetectionsPayload {
    Bare(Vec<Detection>),
    Wrapped { detections: Vec<Detection> },
}

/// Parse a detector payload: either a bare array of records or an object
/// with a `detections` array.
///
/// Returns an error if the JSON is malformed or a record has a confidence
/// outside `0.0..=1.0`.
pub fn parse_detections(payload: &[u8]) -> Result<Vec<Detection>> {
    let parsed: DetectionsPayload =
        serde_json::from_slice(payload).map_err(|e| anyhow!("invalid detections payload: {}", e))?;
    let detections = match parsed {
        DetectionsPayload::Bare(detections) => detections,
        DetectionsPayload::Wrapped { detections } => detections,
    };
    validate_detections(&detections)?;
    Ok(detections)
}

/// Reject any record whose confidence is not a probability.
///
/// Every entry point that accepts detector records runs this, so a record
/// with confidence `42.0` can never outrank real markers during reference
/// selection.
pub fn validate_detections(detections: &[Detection]) -> Result<(), MeasureError> {
    for (index, det) in detections.iter().enumerate() {
        if !(0.0..=1.0).contains(&det.confidence) {
            return Err(MeasureError::InvalidConfidence {
                index,
                class: det.class.clone(),
                confidence: det.confidence,
            });
        }
    }
    Ok(())
}
