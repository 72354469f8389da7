//! Single-image audit pipeline: calibrate, derive measurements, evaluate,
//! aggregate.

use serde::{Deserialize, Serialize};

use crate::aggregate::{aggregate, OverallCompliance};
use crate::calibrate::{calibrate, CalibrationFactor, DEFAULT_REFERENCE_DIMENSION_MM};
use crate::detect::{validate_detections, Detection, ElementClass};
use crate::engine::{ComplianceReport, RuleEngine};
use crate::error::MeasureError;
use crate::geometry::BoundingBox;
use crate::measure::{collect_measurements, Measurements};

/// Detections for one image plus the calibration reference.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct AuditRequest {
    pub detections: Vec<Detection>,
    #[serde(default)]
    pub reference_bbox: Option<BoundingBox>,
    #[serde(default)]
    pub reference_dimension_mm: Option<f64>,
}

/// Where the calibration reference came from.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ReferenceSource {
    Supplied,
    DetectedMarker,
    Missing,
}

#[derive(Clone, Debug, Serialize)]
pub struct AuditReport {
    pub detections: Vec<Detection>,
    pub measurements: Measurements,
    pub compliance: ComplianceReport,
    pub overall_compliance: OverallCompliance,
    pub pixels_per_mm: Option<CalibrationFactor>,
    pub reference_source: ReferenceSource,
    /// Hex SHA-256 fingerprint of the rule table used.
    pub rule_table: String,
}

#[derive(Clone, Debug)]
pub struct Auditor {
    engine: RuleEngine,
    default_reference_mm: f64,
}

impl Auditor {
    pub fn new(engine: RuleEngine) -> Self {
        Self {
            engine,
            default_reference_mm: DEFAULT_REFERENCE_DIMENSION_MM,
        }
    }

    /// Reference dimension used when a request does not carry one.
    pub fn with_default_reference_mm(mut self, dimension_mm: f64) -> Self {
        self.default_reference_mm = dimension_mm;
        self
    }

    pub fn engine(&self) -> &RuleEngine {
        &self.engine
    }

    /// Run the full pipeline for one image.
    ///
    /// Without any reference (none supplied and no `reference_marker`
    /// detected) no measurement can be calibrated: the report is empty and
    /// non-compliant. A confidence outside `0..=1`, a degenerate reference or
    /// a bad dimension is an error.
    pub fn audit(&self, request: AuditRequest) -> Result<AuditReport, MeasureError> {
        validate_detections(&request.detections)?;
        let dimension_mm = request
            .reference_dimension_mm
            .unwrap_or(self.default_reference_mm);
        let (reference, reference_source) = resolve_reference(&request);

        let factor = match calibrate(reference.as_ref(), dimension_mm) {
            Ok(factor) => Some(factor),
            Err(MeasureError::MissingReference) => {
                log::warn!(
                    "no reference object for {} detections; skipping measurement",
                    request.detections.len()
                );
                None
            }
            Err(err) => return Err(err),
        };

        let measurements = match factor {
            Some(factor) => collect_measurements(&request.detections, factor),
            None => Measurements::new(),
        };
        let compliance = self.engine.evaluate(&measurements);
        let overall_compliance = aggregate(compliance.values());
        log::debug!(
            "audit: {} detections, {} measurements, {}/{} compliant ({})",
            request.detections.len(),
            measurements.len(),
            overall_compliance.compliant,
            overall_compliance.total,
            overall_compliance.verdict
        );

        Ok(AuditReport {
            detections: request.detections,
            measurements,
            compliance,
            overall_compliance,
            pixels_per_mm: factor,
            reference_source,
            rule_table: self.engine.table().fingerprint_hex(),
        })
    }
}

/// Supplied reference first, else the most confident detected marker.
fn resolve_reference(request: &AuditRequest) -> (Option<BoundingBox>, ReferenceSource) {
    if let Some(bbox) = request.reference_bbox {
        return (Some(bbox), ReferenceSource::Supplied);
    }
    request
        .detections
        .iter()
        .filter(|det| det.element_class() == Some(ElementClass::ReferenceMarker))
        .max_by(|a, b| a.confidence.total_cmp(&b.confidence))
        .map_or((None, ReferenceSource::Missing), |det| {
            (Some(det.bbox), ReferenceSource::DetectedMarker)
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::Verdict;
    use crate::engine::ComplianceStatus;
    use crate::rules::RuleTable;
    use anyhow::Result;

    fn auditor(rules: &str) -> Result<Auditor> {
        Ok(Auditor::new(RuleEngine::from(RuleTable::from_json_str(rules)?)))
    }

    fn det(class_id: i64, confidence: f64, bbox: BoundingBox) -> Detection {
        Detection::from_raw(bbox, confidence, class_id)
    }

    #[test]
    fn door_scenario_is_fully_compliant() -> Result<()> {
        let auditor = auditor(r#"{"door_width": {"min": 800}}"#)?;
        let report = auditor.audit(AuditRequest {
            detections: vec![det(0, 0.9, BoundingBox::new(0.0, 0.0, 1600.0, 4200.0))],
            reference_bbox: Some(BoundingBox::new(0.0, 0.0, 420.0, 297.0)),
            reference_dimension_mm: Some(210.0),
        })?;

        assert_eq!(report.pixels_per_mm.map(|f| f.pixels_per_mm()), Some(2.0));
        assert_eq!(report.measurements.get("door_width"), Some(800.0));
        assert_eq!(report.measurements.get("door_height"), Some(2100.0));
        assert_eq!(report.compliance["door_width"].status, ComplianceStatus::Compliant);
        assert_eq!(
            report.compliance["door_height"].status,
            ComplianceStatus::NeedsReview
        );
        // door_height has no rule here, so it counts against the score.
        assert_eq!(report.overall_compliance.total, 2);
        assert_eq!(report.overall_compliance.compliant, 1);
        assert_eq!(report.overall_compliance.verdict, Verdict::NonCompliant);
        assert_eq!(report.reference_source, ReferenceSource::Supplied);
        Ok(())
    }

    #[test]
    fn falls_back_to_detected_marker() -> Result<()> {
        let auditor = auditor(r#"{"corridor_width": {"min": 1200}}"#)?;
        let report = auditor.audit(AuditRequest {
            detections: vec![
                det(8, 0.4, BoundingBox::new(0.0, 0.0, 105.0, 50.0)),
                det(8, 0.95, BoundingBox::new(0.0, 0.0, 210.0, 100.0)),
                det(4, 0.8, BoundingBox::new(0.0, 0.0, 1500.0, 900.0)),
            ],
            reference_bbox: None,
            reference_dimension_mm: None,
        })?;
        assert_eq!(report.reference_source, ReferenceSource::DetectedMarker);
        assert_eq!(report.pixels_per_mm.map(|f| f.pixels_per_mm()), Some(1.0));
        assert_eq!(report.measurements.get("corridor_width"), Some(1500.0));
        assert_eq!(report.overall_compliance.verdict, Verdict::FullyCompliant);
        Ok(())
    }

    #[test]
    fn no_reference_yields_empty_non_compliant_report() -> Result<()> {
        let auditor = auditor(r#"{"door_width": {"min": 800}}"#)?;
        let report = auditor.audit(AuditRequest {
            detections: vec![det(0, 0.9, BoundingBox::new(0.0, 0.0, 1600.0, 4200.0))],
            ..AuditRequest::default()
        })?;
        assert_eq!(report.reference_source, ReferenceSource::Missing);
        assert!(report.pixels_per_mm.is_none());
        assert!(report.measurements.is_empty());
        assert_eq!(report.overall_compliance, OverallCompliance::empty());
        assert_eq!(report.detections.len(), 1);
        Ok(())
    }

    #[test]
    fn degenerate_reference_is_an_error() -> Result<()> {
        let auditor = auditor(r#"{"door_width": {"min": 800}}"#)?;
        let err = auditor
            .audit(AuditRequest {
                detections: vec![],
                reference_bbox: Some(BoundingBox::new(10.0, 10.0, 10.0, 10.0)),
                reference_dimension_mm: None,
            })
            .unwrap_err();
        assert!(matches!(err, MeasureError::DegenerateReference { .. }));

        let err = auditor
            .audit(AuditRequest {
                detections: vec![],
                reference_bbox: Some(BoundingBox::new(0.0, 0.0, 420.0, 297.0)),
                reference_dimension_mm: Some(0.0),
            })
            .unwrap_err();
        assert_eq!(err, MeasureError::InvalidDimension(0.0));
        Ok(())
    }

    #[test]
    fn out_of_range_marker_confidence_is_rejected() -> Result<()> {
        let auditor = auditor(r#"{"door_width": {"min": 800}}"#)?;
        let err = auditor
            .audit(AuditRequest {
                detections: vec![
                    det(8, 0.99, BoundingBox::new(0.0, 0.0, 420.0, 297.0)),
                    Detection {
                        confidence: 42.0,
                        ..det(8, 0.5, BoundingBox::new(0.0, 0.0, 10.0, 10.0))
                    },
                    det(0, 0.9, BoundingBox::new(0.0, 0.0, 1600.0, 4200.0)),
                ],
                ..AuditRequest::default()
            })
            .unwrap_err();
        assert!(matches!(
            err,
            MeasureError::InvalidConfidence { index: 1, confidence, .. } if confidence == 42.0
        ));
        Ok(())
    }

    #[test]
    fn configured_default_dimension_applies() -> Result<()> {
        let auditor = auditor(r#"{"door_width": {"min": 800}}"#)?.with_default_reference_mm(297.0);
        let report = auditor.audit(AuditRequest {
            detections: vec![],
            reference_bbox: Some(BoundingBox::new(0.0, 0.0, 594.0, 420.0)),
            reference_dimension_mm: None,
        })?;
        assert_eq!(report.pixels_per_mm.map(|f| f.pixels_per_mm()), Some(2.0));
        Ok(())
    }
}
