use serde::{Deserialize, Serialize};
use std::fmt;

use crate::geometry::{round_to, BoundingBox};

/// One detector output record. This is the exact wire shape the external
/// detector produces.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Detection {
    pub bbox: BoundingBox,
    pub confidence: f64,
    pub class: String,
    pub class_id: i64,
}

impl Detection {
    /// Build a record from raw detector output, naming the class from its id.
    pub fn from_raw(bbox: BoundingBox, confidence: f64, class_id: i64) -> Self {
        Self {
            bbox,
            confidence: round_to(confidence, 3),
            class: class_name_for_id(class_id),
            class_id,
        }
    }

    /// Element class for measurement dispatch, `None` for labels we do not measure.
    pub fn element_class(&self) -> Option<ElementClass> {
        ElementClass::from_label(&self.class)
    }
}

/// Architectural element classes the detector is trained on.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ElementClass {
    Door,
    Ramp,
    Stair,
    Handrail,
    Corridor,
    LiftPanel,
    Signage,
    Toilet,
    ReferenceMarker,
}

impl ElementClass {
    pub const ALL: [ElementClass; 9] = [
        ElementClass::Door,
        ElementClass::Ramp,
        ElementClass::Stair,
        ElementClass::Handrail,
        ElementClass::Corridor,
        ElementClass::LiftPanel,
        ElementClass::Signage,
        ElementClass::Toilet,
        ElementClass::ReferenceMarker,
    ];

    pub fn from_label(label: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|class| class.label() == label)
    }

    pub fn from_class_id(class_id: i64) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|class| class.class_id() == class_id)
    }

    pub fn label(self) -> &'static str {
        match self {
            ElementClass::Door => "door",
            ElementClass::Ramp => "ramp",
            ElementClass::Stair => "stair",
            ElementClass::Handrail => "handrail",
            ElementClass::Corridor => "corridor",
            ElementClass::LiftPanel => "lift_panel",
            ElementClass::Signage => "signage",
            ElementClass::Toilet => "toilet",
            ElementClass::ReferenceMarker => "reference_marker",
        }
    }

    /// Class index in the detector's label map.
    pub fn class_id(self) -> i64 {
        match self {
            ElementClass::Door => 0,
            ElementClass::Ramp => 1,
            ElementClass::Stair => 2,
            ElementClass::Handrail => 3,
            ElementClass::Corridor => 4,
            ElementClass::LiftPanel => 5,
            ElementClass::Signage => 6,
            ElementClass::Toilet => 7,
            ElementClass::ReferenceMarker => 8,
        }
    }
}

impl fmt::Display for ElementClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Detector class id to label. Ids outside the label map become `element_{id}`.
pub fn class_name_for_id(class_id: i64) -> String {
    match ElementClass::from_class_id(class_id) {
        Some(class) => class.label().to_string(),
        None => format!("element_{class_id}"),
    }
}
