//! audit_api - HTTP service for accessibility audits
//!
//! This daemon:
//! 1. Loads configuration and the rule table once
//! 2. Serves the audit API
//! 3. Does NOT run object detection; callers post detector output

use anyhow::Result;
use std::sync::{mpsc, Arc};

use access_audit::{
    api::{ApiConfig, ApiServer},
    config::AuditdConfig,
    Auditor, RuleEngine,
};

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = AuditdConfig::load()?;
    let table = config.load_rule_table()?;
    log::info!(
        "rule table {} loaded ({} rules) from {}",
        table.fingerprint_hex(),
        table.len(),
        config
            .rules_path
            .as_ref()
            .map_or_else(|| "built-in defaults".to_string(), |p| p.display().to_string())
    );

    let auditor = Auditor::new(RuleEngine::new(Arc::new(table)))
        .with_default_reference_mm(config.reference_dimension_mm);
    let api_config = ApiConfig {
        addr: config.api_addr.clone(),
        max_body_bytes: config.max_body_bytes,
        max_connections: config.max_connections,
    };
    let api_handle = ApiServer::new(api_config, auditor).spawn()?;
    log::info!("audit api listening on {}", api_handle.addr);

    let (tx, rx) = mpsc::channel();
    ctrlc::set_handler(move || {
        let _ = tx.send(());
    })
    .expect("error setting Ctrl-C handler");

    log::info!("audit_api waiting for shutdown signal (Ctrl-C)...");
    let _ = rx.recv();
    log::info!("shutdown signal received, stopping API server...");
    api_handle.stop()?;

    Ok(())
}
