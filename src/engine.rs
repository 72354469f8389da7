//! Compliance evaluation of measurements against the rule table.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::measure::Measurements;
use crate::rules::RuleTable;

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum ComplianceStatus {
    Compliant,
    NonCompliant,
    /// No rule applies; the engine has no opinion.
    NeedsReview,
}

/// Verdict for one parameter.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ComplianceResult {
    pub status: ComplianceStatus,
    /// `None` when the status is `needs-review`.
    pub compliant: Option<bool>,
    pub measured: f64,
    /// `min` when the rule has one, else `max`.
    pub required: Option<f64>,
    pub min: Option<f64>,
    pub max: Option<f64>,
}

impl ComplianceResult {
    fn needs_review(measured: f64) -> Self {
        Self {
            status: ComplianceStatus::NeedsReview,
            compliant: None,
            measured,
            required: None,
            min: None,
            max: None,
        }
    }

    pub fn is_compliant(&self) -> bool {
        self.compliant == Some(true)
    }
}

/// Per-parameter results, keyed by parameter name.
pub type ComplianceReport = BTreeMap<String, ComplianceResult>;

/// Check one measured value against its rule, if the table has one.
pub fn check_compliance(parameter: &str, measured: f64, table: &RuleTable) -> ComplianceResult {
    let Some(rule) = table.get(parameter) else {
        return ComplianceResult::needs_review(measured);
    };

    let below_min = rule.min.is_some_and(|min| measured < min);
    let above_max = rule.max.is_some_and(|max| measured > max);
    let compliant = !below_min && !above_max;

    ComplianceResult {
        status: if compliant {
            ComplianceStatus::Compliant
        } else {
            ComplianceStatus::NonCompliant
        },
        compliant: Some(compliant),
        measured,
        required: rule.required(),
        min: rule.min,
        max: rule.max,
    }
}

/// Evaluate every measurement that carries a value. Valueless entries are
/// left out of the report entirely.
pub fn evaluate_all(measurements: &Measurements, table: &RuleTable) -> ComplianceReport {
    measurements
        .iter()
        .filter_map(|(parameter, value)| {
            let measured = value?;
            Some((
                parameter.to_string(),
                check_compliance(parameter, measured, table),
            ))
        })
        .collect()
}

/// Rule engine bound to one shared, immutable rule table.
///
/// Cloning is cheap; clones share the table.
#[derive(Clone, Debug)]
pub struct RuleEngine {
    table: Arc<RuleTable>,
}

impl RuleEngine {
    pub fn new(table: Arc<RuleTable>) -> Self {
        Self { table }
    }

    pub fn table(&self) -> &RuleTable {
        &self.table
    }

    pub fn check(&self, parameter: &str, measured: f64) -> ComplianceResult {
        check_compliance(parameter, measured, &self.table)
    }

    pub fn evaluate(&self, measurements: &Measurements) -> ComplianceReport {
        evaluate_all(measurements, &self.table)
    }
}

impl From<RuleTable> for RuleEngine {
    fn from(table: RuleTable) -> Self {
        Self::new(Arc::new(table))
    }
}
