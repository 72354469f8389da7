//! Roll per-parameter results up into one percentage and verdict.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::engine::ComplianceResult;
use crate::geometry::round_to;

/// Percentage at or above which an audit is partially compliant.
pub const PARTIAL_COMPLIANCE_THRESHOLD: f64 = 70.0;

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum Verdict {
    #[serde(rename = "Fully Compliant")]
    FullyCompliant,
    #[serde(rename = "Partially Compliant")]
    PartiallyCompliant,
    #[serde(rename = "Non-Compliant")]
    NonCompliant,
}

impl Verdict {
    pub fn from_percentage(percentage: f64) -> Self {
        if percentage >= 100.0 {
            Verdict::FullyCompliant
        } else if percentage >= PARTIAL_COMPLIANCE_THRESHOLD {
            Verdict::PartiallyCompliant
        } else {
            Verdict::NonCompliant
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Verdict::FullyCompliant => "Fully Compliant",
            Verdict::PartiallyCompliant => "Partially Compliant",
            Verdict::NonCompliant => "Non-Compliant",
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq)]
pub struct OverallCompliance {
    pub percentage: f64,
    pub total: usize,
    pub compliant: usize,
    pub verdict: Verdict,
}

impl OverallCompliance {
    /// No evaluated parameters. Conservatively non-compliant.
    pub fn empty() -> Self {
        Self {
            percentage: 0.0,
            total: 0,
            compliant: 0,
            verdict: Verdict::NonCompliant,
        }
    }
}

/// Reduce per-parameter results to an overall score.
///
/// `needs-review` results count toward the total but never as compliant.
pub fn aggregate<'a, I>(results: I) -> OverallCompliance
where
    I: IntoIterator<Item = &'a ComplianceResult>,
{
    let (total, compliant) = results.into_iter().fold((0usize, 0usize), |(t, c), r| {
        (t + 1, c + usize::from(r.is_compliant()))
    });
    if total == 0 {
        return OverallCompliance::empty();
    }
    let percentage = round_to(compliant as f64 / total as f64 * 100.0, 2);
    OverallCompliance {
        percentage,
        total,
        compliant,
        verdict: Verdict::from_percentage(percentage),
    }
}
