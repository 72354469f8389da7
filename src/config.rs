//! Service configuration: optional JSON/TOML file, then env overrides.

use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use crate::calibrate::DEFAULT_REFERENCE_DIMENSION_MM;
use crate::rules::RuleTable;

pub(crate) const DEFAULT_API_ADDR: &str = "127.0.0.1:8000";
pub(crate) const DEFAULT_MAX_BODY_BYTES: usize = 1024 * 1024;
pub(crate) const DEFAULT_MAX_CONNECTIONS: usize = 16;

#[derive(Debug, Deserialize, Default)]
struct AuditdConfigFile {
    rules: Option<RulesConfigFile>,
    api: Option<ApiConfigFile>,
    reference: Option<ReferenceConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
struct RulesConfigFile {
    path: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Default)]
struct ApiConfigFile {
    addr: Option<String>,
    max_body_bytes: Option<usize>,
    max_connections: Option<usize>,
}

#[derive(Debug, Deserialize, Default)]
struct ReferenceConfigFile {
    dimension_mm: Option<f64>,
}

#[derive(Debug, Clone)]
pub struct AuditdConfig {
    /// Rule table file; `None` selects the built-in table.
    pub rules_path: Option<PathBuf>,
    pub api_addr: String,
    pub max_body_bytes: usize,
    /// API worker threads; connections beyond these plus the queue get 503.
    pub max_connections: usize,
    pub reference_dimension_mm: f64,
}

impl Default for AuditdConfig {
    fn default() -> Self {
        Self::from_file(AuditdConfigFile::default())
    }
}

impl AuditdConfig {
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("ACCESS_AUDIT_CONFIG").ok();
        let file_cfg = match config_path.as_deref() {
            Some(path) => Some(read_config_file(Path::new(path))?),
            None => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default());
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: AuditdConfigFile) -> Self {
        let rules_path = file.rules.and_then(|rules| rules.path);
        let api_addr = file
            .api
            .as_ref()
            .and_then(|api| api.addr.clone())
            .unwrap_or_else(|| DEFAULT_API_ADDR.to_string());
        let max_body_bytes = file
            .api
            .as_ref()
            .and_then(|api| api.max_body_bytes)
            .unwrap_or(DEFAULT_MAX_BODY_BYTES);
        let max_connections = file
            .api
            .and_then(|api| api.max_connections)
            .unwrap_or(DEFAULT_MAX_CONNECTIONS);
        let reference_dimension_mm = file
            .reference
            .and_then(|reference| reference.dimension_mm)
            .unwrap_or(DEFAULT_REFERENCE_DIMENSION_MM);
        Self {
            rules_path,
            api_addr,
            max_body_bytes,
            max_connections,
            reference_dimension_mm,
        }
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(path) = std::env::var("ACCESS_AUDIT_RULES") {
            if !path.trim().is_empty() {
                self.rules_path = Some(PathBuf::from(path));
            }
        }
        if let Ok(addr) = std::env::var("ACCESS_AUDIT_API_ADDR") {
            if !addr.trim().is_empty() {
                self.api_addr = addr;
            }
        }
        if let Ok(limit) = std::env::var("ACCESS_AUDIT_MAX_BODY_BYTES") {
            self.max_body_bytes = limit.trim().parse().map_err(|_| {
                anyhow!("ACCESS_AUDIT_MAX_BODY_BYTES must be an integer number of bytes")
            })?;
        }
        if let Ok(limit) = std::env::var("ACCESS_AUDIT_MAX_CONNECTIONS") {
            self.max_connections = limit.trim().parse().map_err(|_| {
                anyhow!("ACCESS_AUDIT_MAX_CONNECTIONS must be an integer number of connections")
            })?;
        }
        if let Ok(dimension) = std::env::var("ACCESS_AUDIT_REFERENCE_MM") {
            self.reference_dimension_mm = dimension.trim().parse().map_err(|_| {
                anyhow!("ACCESS_AUDIT_REFERENCE_MM must be a number of millimeters")
            })?;
        }
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        self.api_addr
            .parse::<SocketAddr>()
            .map_err(|e| anyhow!("invalid api address '{}': {}", self.api_addr, e))?;
        if self.max_body_bytes == 0 {
            return Err(anyhow!("api max_body_bytes must be greater than zero"));
        }
        if self.max_connections == 0 {
            return Err(anyhow!("api max_connections must be greater than zero"));
        }
        if !self.reference_dimension_mm.is_finite() || self.reference_dimension_mm <= 0.0 {
            return Err(anyhow!(
                "reference dimension must be a positive number of millimeters, got {}",
                self.reference_dimension_mm
            ));
        }
        Ok(())
    }

    /// Load the configured rule table, or the built-in one.
    pub fn load_rule_table(&self) -> Result<RuleTable> {
        match &self.rules_path {
            Some(path) => RuleTable::load(path),
            None => RuleTable::builtin(),
        }
    }
}

fn read_config_file(path: &Path) -> Result<AuditdConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let is_toml = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"));
    let cfg = if is_toml {
        toml::from_str(&raw).map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    } else {
        serde_json::from_str(&raw)
            .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    };
    Ok(cfg)
}
