use std::sync::Mutex;

use tempfile::NamedTempFile;

use access_audit::api::ApiConfig;
use access_audit::config::AuditdConfig;
use access_audit::Rule;

static ENV_LOCK: Mutex<()> = Mutex::new(());

fn clear_env() {
    for key in [
        "ACCESS_AUDIT_CONFIG",
        "ACCESS_AUDIT_RULES",
        "ACCESS_AUDIT_API_ADDR",
        "ACCESS_AUDIT_MAX_BODY_BYTES",
        "ACCESS_AUDIT_MAX_CONNECTIONS",
        "ACCESS_AUDIT_REFERENCE_MM",
    ] {
        std::env::remove_var(key);
    }
}

#[test]
fn defaults_without_config_file() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let cfg = AuditdConfig::load().expect("load config");
    assert_eq!(cfg.api_addr, "127.0.0.1:8000");
    assert_eq!(cfg.max_body_bytes, 1024 * 1024);
    assert_eq!(cfg.max_connections, 16);
    assert_eq!(cfg.reference_dimension_mm, 210.0);
    assert!(cfg.rules_path.is_none());

    let table = cfg.load_rule_table().expect("builtin rules");
    assert_eq!(table.get("door_width"), Some(&Rule::at_least(800.0)));
}

#[test]
fn loads_config_from_file_and_env_overrides() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let rules = NamedTempFile::new().expect("temp rules");
    std::fs::write(rules.path(), r#"{"door_width": {"min": 900}}"#).expect("write rules");

    let mut file = NamedTempFile::new().expect("temp config");
    let json = format!(
        r#"{{
            "rules": {{ "path": "{}" }},
            "api": {{ "addr": "0.0.0.0:9000", "max_body_bytes": 4096, "max_connections": 4 }},
            "reference": {{ "dimension_mm": 297.0 }}
        }}"#,
        rules.path().display()
    );
    std::io::Write::write_all(&mut file, json.as_bytes()).expect("write config");

    std::env::set_var("ACCESS_AUDIT_CONFIG", file.path());
    std::env::set_var("ACCESS_AUDIT_API_ADDR", "127.0.0.1:9100");
    std::env::set_var("ACCESS_AUDIT_REFERENCE_MM", "85.6");

    let cfg = AuditdConfig::load().expect("load config");

    assert_eq!(cfg.rules_path.as_deref(), Some(rules.path()));
    assert_eq!(cfg.api_addr, "127.0.0.1:9100");
    assert_eq!(cfg.max_body_bytes, 4096);
    assert_eq!(cfg.max_connections, 4);
    assert_eq!(cfg.reference_dimension_mm, 85.6);

    let table = cfg.load_rule_table().expect("file rules");
    assert_eq!(table.len(), 1);
    assert_eq!(table.get("door_width"), Some(&Rule::at_least(900.0)));

    clear_env();
}

#[test]
fn loads_toml_config() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let file = tempfile::Builder::new()
        .suffix(".toml")
        .tempfile()
        .expect("temp config");
    std::fs::write(
        file.path(),
        "[api]\naddr = \"127.0.0.1:8123\"\n\n[reference]\ndimension_mm = 297.0\n",
    )
    .expect("write config");
    std::env::set_var("ACCESS_AUDIT_CONFIG", file.path());

    let cfg = AuditdConfig::load().expect("load config");
    assert_eq!(cfg.api_addr, "127.0.0.1:8123");
    assert_eq!(cfg.reference_dimension_mm, 297.0);

    clear_env();
}

#[test]
fn api_defaults_match_service_defaults() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let cfg = AuditdConfig::load().expect("load config");
    let api = ApiConfig::default();
    assert_eq!(api.addr, cfg.api_addr);
    assert_eq!(api.max_body_bytes, cfg.max_body_bytes);
    assert_eq!(api.max_connections, cfg.max_connections);
}

#[test]
fn rejects_invalid_settings() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    std::env::set_var("ACCESS_AUDIT_REFERENCE_MM", "0");
    assert!(AuditdConfig::load().is_err());
    clear_env();

    std::env::set_var("ACCESS_AUDIT_REFERENCE_MM", "a4");
    assert!(AuditdConfig::load().is_err());
    clear_env();

    std::env::set_var("ACCESS_AUDIT_API_ADDR", "not-an-address");
    assert!(AuditdConfig::load().is_err());
    clear_env();

    std::env::set_var("ACCESS_AUDIT_MAX_BODY_BYTES", "0");
    assert!(AuditdConfig::load().is_err());
    clear_env();

    std::env::set_var("ACCESS_AUDIT_MAX_CONNECTIONS", "0");
    assert!(AuditdConfig::load().is_err());
    clear_env();

    std::env::set_var("ACCESS_AUDIT_CONFIG", "/nonexistent/access-audit.json");
    let err = AuditdConfig::load().unwrap_err();
    assert!(err.to_string().contains("failed to read config file"));
    clear_env();
}
