//! Accessibility threshold table.
//!
//! The table is loaded once by the application and shared read-only between
//! evaluations. Every loaded table carries a SHA-256 fingerprint so a report
//! can name exactly which thresholds it was judged against.

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::OnceLock;

const BUILTIN_RULES_JSON: &str = include_str!("../rules/default.json");
const FINGERPRINT_DOMAIN: &[u8] = b"access-audit:rules:v1";

/// Threshold for one parameter. At least one bound is set; with both set the
/// value must lie within `[min, max]`.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct Rule {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
}

impl Rule {
    pub fn at_least(min: f64) -> Self {
        Self {
            min: Some(min),
            max: None,
        }
    }

    pub fn at_most(max: f64) -> Self {
        Self {
            min: None,
            max: Some(max),
        }
    }

    pub fn between(min: f64, max: f64) -> Self {
        Self {
            min: Some(min),
            max: Some(max),
        }
    }

    /// Single-bound summary for display: `min` when present, else `max`.
    pub fn required(&self) -> Option<f64> {
        self.min.or(self.max)
    }

    fn validate(&self, parameter: &str) -> Result<()> {
        if self.min.is_none() && self.max.is_none() {
            return Err(anyhow!("rule '{}' must set min or max", parameter));
        }
        for (name, bound) in [("min", self.min), ("max", self.max)] {
            if let Some(value) = bound {
                if !value.is_finite() {
                    return Err(anyhow!("rule '{}' has non-finite {}", parameter, name));
                }
            }
        }
        if let (Some(min), Some(max)) = (self.min, self.max) {
            if min > max {
                return Err(anyhow!(
                    "rule '{}' has min {} greater than max {}",
                    parameter,
                    min,
                    max
                ));
            }
        }
        Ok(())
    }
}

/// Parameter name to threshold rule.
#[derive(Clone, Debug, PartialEq)]
pub struct RuleTable {
    rules: BTreeMap<String, Rule>,
    fingerprint: [u8; 32],
}

impl RuleTable {
    pub fn new(rules: BTreeMap<String, Rule>) -> Result<Self> {
        for (parameter, rule) in &rules {
            validate_parameter_name(parameter)?;
            rule.validate(parameter)?;
        }
        let fingerprint = fingerprint_rules(&rules)?;
        Ok(Self { rules, fingerprint })
    }

    /// The table shipped with the crate.
    pub fn builtin() -> Result<Self> {
        Self::from_json_str(BUILTIN_RULES_JSON)
    }

    pub fn from_json_str(raw: &str) -> Result<Self> {
        let rules = serde_json::from_str(raw).map_err(|e| anyhow!("invalid rule table: {}", e))?;
        Self::new(rules)
    }

    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let rules = toml::from_str(raw).map_err(|e| anyhow!("invalid rule table: {}", e))?;
        Self::new(rules)
    }

    /// Load from a JSON file, or TOML when the extension is `.toml`.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| anyhow!("failed to read rule table {}: {}", path.display(), e))?;
        let table = if is_toml(path) {
            Self::from_toml_str(&raw)
        } else {
            Self::from_json_str(&raw)
        };
        table.map_err(|e| anyhow!("{}: {}", path.display(), e))
    }

    pub fn get(&self, parameter: &str) -> Option<&Rule> {
        self.rules.get(parameter)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Rule)> {
        self.rules.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn fingerprint(&self) -> [u8; 32] {
        self.fingerprint
    }

    pub fn fingerprint_hex(&self) -> String {
        hex::encode(self.fingerprint)
    }
}

pub fn validate_parameter_name(parameter: &str) -> Result<()> {
    static PARAM_RE: OnceLock<regex::Regex> = OnceLock::new();
    let re = PARAM_RE.get_or_init(|| {
        regex::Regex::new(r"^[a-z][a-z0-9_]{0,63}$").expect("parameter name pattern")
    });
    if !re.is_match(parameter) {
        return Err(anyhow!(
            "parameter name '{}' must match ^[a-z][a-z0-9_]{{0,63}}$",
            parameter
        ));
    }
    Ok(())
}

fn fingerprint_rules(rules: &BTreeMap<String, Rule>) -> Result<[u8; 32]> {
    let canonical = serde_json::to_vec(rules)?;
    let mut hasher = Sha256::new();
    hasher.update(FINGERPRINT_DOMAIN);
    hasher.update(&canonical);
    Ok(hasher.finalize().into())
}

fn is_toml(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"))
}
