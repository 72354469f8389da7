//! Accessibility Audit Kernel
//!
//! Turns object detections from a single photograph into calibrated physical
//! measurements of architectural elements and judges them against a table of
//! accessibility thresholds.
//!
//! # Pipeline
//!
//! 1. **Calibrate**: a reference object of known size (an A4 sheet by
//!    default) fixes the pixels-per-millimeter factor for the image.
//! 2. **Measure**: every detection of a measurable element class is
//!    converted to millimeters and mapped to named parameters
//!    (`door_width`, `ramp_slope_ratio`, ...).
//! 3. **Evaluate**: each parameter is checked against its `min`/`max` rule;
//!    parameters without a rule need manual review.
//! 4. **Aggregate**: the share of compliant parameters becomes a percentage
//!    and a verdict.
//!
//! Object detection runs outside this crate; its records enter through
//! [`detect`].
//!
//! # Module Structure
//!
//! - `geometry`, `calibrate`: bounding boxes, scale factor, unit conversion
//! - `detect`: detector record shape and class labels
//! - `measure`: per-class measurement derivation
//! - `rules`, `engine`, `aggregate`: thresholds, verdicts, overall score
//! - `audit`: the single-image pipeline
//! - `config`, `api`: service configuration and HTTP front

pub mod aggregate;
pub mod api;
pub mod audit;
pub mod calibrate;
pub mod config;
pub mod detect;
pub mod engine;
pub mod error;
pub mod geometry;
pub mod measure;
pub mod rules;

pub use aggregate::{aggregate, OverallCompliance, Verdict};
pub use audit::{AuditReport, AuditRequest, Auditor, ReferenceSource};
pub use calibrate::{
    calibrate, to_millimeters, CalibrationFactor, Dimensions, DEFAULT_REFERENCE_DIMENSION_MM,
};
pub use detect::{parse_detections, validate_detections, Detection, ElementClass};
pub use engine::{
    check_compliance, evaluate_all, ComplianceReport, ComplianceResult, ComplianceStatus,
    RuleEngine,
};
pub use error::MeasureError;
pub use geometry::BoundingBox;
pub use measure::{collect_measurements, derive_measurements, Measurements, Parameter};
pub use rules::{Rule, RuleTable};
