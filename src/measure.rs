//! Per-element measurement derivation.
//!
//! Each element class maps to the physical quantities an accessibility rule
//! can be checked against. Dispatch is an exhaustive match on
//! [`ElementClass`]; labels outside the class set are skipped.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::calibrate::{to_millimeters, CalibrationFactor};
use crate::detect::{Detection, ElementClass};
use crate::geometry::{round_to, BoundingBox};

/// Conventional measurement parameters.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Parameter {
    DoorWidth,
    DoorHeight,
    RampWidth,
    RampSlopeRatio,
    StairRiser,
    StairTread,
    HandrailHeight,
    CorridorWidth,
    ToiletDoor,
    SignageHeight,
    LiftButtonHeight,
}

impl Parameter {
    pub fn as_str(self) -> &'static str {
        match self {
            Parameter::DoorWidth => "door_width",
            Parameter::DoorHeight => "door_height",
            Parameter::RampWidth => "ramp_width",
            Parameter::RampSlopeRatio => "ramp_slope_ratio",
            Parameter::StairRiser => "stair_riser",
            Parameter::StairTread => "stair_tread",
            Parameter::HandrailHeight => "handrail_height",
            Parameter::CorridorWidth => "corridor_width",
            Parameter::ToiletDoor => "toilet_door",
            Parameter::SignageHeight => "signage_height",
            Parameter::LiftButtonHeight => "lift_button_height",
        }
    }
}

impl fmt::Display for Parameter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Named measurement set for one image.
///
/// Keys are an open vocabulary. A key may carry no value (`null` on the
/// wire); such entries are skipped at evaluation time.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(transparent)]
pub struct Measurements(BTreeMap<String, Option<f64>>);

impl Measurements {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a value, replacing any earlier value for the same key.
    pub fn insert(&mut self, key: impl Into<String>, value: f64) -> Option<f64> {
        self.0.insert(key.into(), Some(value)).flatten()
    }

    /// Record a parameter with no usable value.
    pub fn insert_missing(&mut self, key: impl Into<String>) {
        self.0.insert(key.into(), None);
    }

    pub fn get(&self, key: &str) -> Option<f64> {
        self.0.get(key).copied().flatten()
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, Option<f64>)> {
        self.0.iter().map(|(k, v)| (k.as_str(), *v))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K: Into<String>> FromIterator<(K, f64)> for Measurements {
    fn from_iter<I: IntoIterator<Item = (K, f64)>>(iter: I) -> Self {
        let mut out = Self::new();
        for (k, v) in iter {
            out.insert(k, v);
        }
        out
    }
}

/// Measurements one element contributes.
pub fn derive_measurements(
    class: ElementClass,
    bbox: &BoundingBox,
    factor: CalibrationFactor,
) -> Vec<(Parameter, f64)> {
    let dims = to_millimeters(bbox, factor);
    match class {
        ElementClass::Door => vec![
            (Parameter::DoorWidth, dims.width_mm),
            (Parameter::DoorHeight, dims.height_mm),
        ],
        ElementClass::Ramp => {
            let mut out = vec![(Parameter::RampWidth, dims.width_mm)];
            if let Some(slope) = ramp_slope(bbox, factor) {
                out.push((Parameter::RampSlopeRatio, slope));
            }
            out
        }
        // One box cannot separate individual steps; height and width stand in
        // for a single riser and tread.
        ElementClass::Stair => vec![
            (Parameter::StairRiser, dims.height_mm),
            (Parameter::StairTread, dims.width_mm),
        ],
        ElementClass::Handrail => vec![(Parameter::HandrailHeight, dims.height_mm)],
        ElementClass::Corridor => vec![(Parameter::CorridorWidth, dims.width_mm)],
        ElementClass::Toilet => vec![(Parameter::ToiletDoor, dims.width_mm)],
        ElementClass::Signage => vec![(Parameter::SignageHeight, dims.height_mm)],
        ElementClass::LiftPanel => vec![(Parameter::LiftButtonHeight, dims.height_mm)],
        ElementClass::ReferenceMarker => Vec::new(),
    }
}

/// Rise over run, four decimals. `None` when the ramp has no horizontal extent.
pub fn ramp_slope(bbox: &BoundingBox, factor: CalibrationFactor) -> Option<f64> {
    let width_mm = bbox.width() / factor.pixels_per_mm();
    if width_mm == 0.0 {
        return None;
    }
    let height_mm = bbox.height() / factor.pixels_per_mm();
    Some(round_to(height_mm / width_mm, 4))
}

/// Fold every detection into one measurement set.
///
/// When two detections produce the same parameter, the later one wins.
pub fn collect_measurements(detections: &[Detection], factor: CalibrationFactor) -> Measurements {
    let mut measurements = Measurements::new();
    for det in detections {
        let Some(class) = det.element_class() else {
            log::debug!("skipping detection of unmeasured class '{}'", det.class);
            continue;
        };
        for (param, value) in derive_measurements(class, &det.bbox, factor) {
            if let Some(previous) = measurements.insert(param.as_str(), value) {
                log::debug!(
                    "{} overwritten by later {} detection: {} -> {}",
                    param,
                    class,
                    previous,
                    value
                );
            }
        }
    }
    measurements
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::MeasureError;

    fn factor(px_per_mm: f64) -> CalibrationFactor {
        CalibrationFactor::new(px_per_mm).unwrap()
    }

    fn det(class: &str, bbox: BoundingBox) -> Detection {
        Detection {
            bbox,
            confidence: 0.9,
            class: class.to_string(),
            class_id: ElementClass::from_label(class).map_or(99, |c| c.class_id()),
        }
    }

    #[test]
    fn door_emits_width_and_height() {
        let out = derive_measurements(
            ElementClass::Door,
            &BoundingBox::new(0.0, 0.0, 1600.0, 4200.0),
            factor(2.0),
        );
        assert_eq!(
            out,
            vec![(Parameter::DoorWidth, 800.0), (Parameter::DoorHeight, 2100.0)]
        );
    }

    #[test]
    fn ramp_emits_width_and_slope() {
        let out = derive_measurements(
            ElementClass::Ramp,
            &BoundingBox::new(0.0, 0.0, 2400.0, 200.0),
            factor(2.0),
        );
        assert_eq!(
            out,
            vec![(Parameter::RampWidth, 1200.0), (Parameter::RampSlopeRatio, 0.0833)]
        );
    }

    #[test]
    fn zero_width_ramp_omits_slope() {
        let out = derive_measurements(
            ElementClass::Ramp,
            &BoundingBox::new(100.0, 0.0, 100.0, 300.0),
            factor(2.0),
        );
        assert_eq!(out, vec![(Parameter::RampWidth, 0.0)]);
        assert_eq!(
            ramp_slope(&BoundingBox::new(5.0, 0.0, 5.0, 10.0), factor(1.0)),
            None
        );
    }

    #[test]
    fn stair_splits_riser_and_tread() {
        let out = derive_measurements(
            ElementClass::Stair,
            &BoundingBox::new(0.0, 0.0, 600.0, 300.0),
            factor(2.0),
        );
        assert_eq!(
            out,
            vec![(Parameter::StairRiser, 150.0), (Parameter::StairTread, 300.0)]
        );
    }

    #[test]
    fn single_axis_classes() {
        let bbox = BoundingBox::new(0.0, 0.0, 300.0, 500.0);
        let f = factor(0.5);
        let cases = [
            (ElementClass::Handrail, Parameter::HandrailHeight, 1000.0),
            (ElementClass::Corridor, Parameter::CorridorWidth, 600.0),
            (ElementClass::Toilet, Parameter::ToiletDoor, 600.0),
            (ElementClass::Signage, Parameter::SignageHeight, 1000.0),
            (ElementClass::LiftPanel, Parameter::LiftButtonHeight, 1000.0),
        ];
        for (class, param, value) in cases {
            assert_eq!(derive_measurements(class, &bbox, f), vec![(param, value)]);
        }
        assert!(derive_measurements(ElementClass::ReferenceMarker, &bbox, f).is_empty());
    }

    #[test]
    fn collect_skips_unknown_classes_and_last_wins() -> Result<(), MeasureError> {
        let f = CalibrationFactor::new(1.0)?;
        let detections = vec![
            det("door", BoundingBox::new(0.0, 0.0, 900.0, 2000.0)),
            det("element_42", BoundingBox::new(0.0, 0.0, 10.0, 10.0)),
            det("reference_marker", BoundingBox::new(0.0, 0.0, 210.0, 297.0)),
            det("door", BoundingBox::new(0.0, 0.0, 750.0, 2100.0)),
        ];
        let m = collect_measurements(&detections, f);
        assert_eq!(m.len(), 2);
        assert_eq!(m.get("door_width"), Some(750.0));
        assert_eq!(m.get("door_height"), Some(2100.0));
        Ok(())
    }

    #[test]
    fn measurements_serialize_as_plain_map() {
        let mut m: Measurements = [("door_width", 800.0)].into_iter().collect();
        m.insert_missing("corridor_width");
        let json = serde_json::to_string(&m).unwrap();
        assert_eq!(json, r#"{"corridor_width":null,"door_width":800.0}"#);
        assert!(m.contains_key("corridor_width"));
        assert_eq!(m.get("corridor_width"), None);
    }
}
