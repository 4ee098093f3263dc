// Config loading and validation tests

use fleetmon::config::AppConfig;

const VALID_CONFIG: &str = r#"
[server]
port = 3010
host = "0.0.0.0"

[fleet]
db_workers = 2
http_workers = 2
collect_timeout_ms = 1000
cache_interval_ms = 5000
refresh_interval_secs = 60

[probe]
enabled = true
endpoint = "127.0.0.1:3000"
http_port = 4000
http_host = "::"
ping_interval_ms = 10000
reconnect_backoff_ms = 5000
"#;

#[test]
fn test_config_loads_from_str() {
    let config = AppConfig::load_from_str(VALID_CONFIG).expect("load_from_str");
    assert_eq!(config.server.port, 3010);
    assert_eq!(config.server.host, "0.0.0.0");
    assert_eq!(config.fleet.db_workers, 2);
    assert_eq!(config.fleet.collect_timeout_ms, 1000);
    assert_eq!(config.fleet.cache_interval_ms, 5000);
    assert_eq!(config.probe.endpoint, "127.0.0.1:3000");
    assert_eq!(config.probe.ping_interval_ms, 10000);
}

#[test]
fn test_config_defaults_apply_when_fields_omitted() {
    let minimal = r#"
[server]
port = 3010
host = "0.0.0.0"

[fleet]
db_workers = 1
http_workers = 0

[probe]
enabled = false
endpoint = ""
http_port = 4000
http_host = "::"
"#;
    let config = AppConfig::load_from_str(minimal).expect("load_from_str");
    assert_eq!(config.fleet.collect_timeout_ms, 1000);
    assert_eq!(config.fleet.cache_interval_ms, 5000);
    assert_eq!(config.fleet.refresh_interval_secs, 60);
    assert_eq!(config.probe.channel, "0".repeat(32));
    assert_eq!(config.probe.ping_interval_ms, 10000);
    assert_eq!(config.probe.reconnect_backoff_ms, 5000);
}

#[test]
fn test_config_validation_rejects_invalid_port() {
    let bad = VALID_CONFIG.replace("port = 3010", "port = 0");
    let err = AppConfig::load_from_str(&bad).unwrap_err();
    assert!(err.to_string().contains("server.port"));
}

#[test]
fn test_config_validation_rejects_empty_fleet() {
    let bad = VALID_CONFIG
        .replace("db_workers = 2", "db_workers = 0")
        .replace("http_workers = 2", "http_workers = 0");
    let err = AppConfig::load_from_str(&bad).unwrap_err();
    assert!(err.to_string().contains("at least one worker"));
}

#[test]
fn test_config_validation_rejects_collect_timeout_zero() {
    let bad = VALID_CONFIG.replace("collect_timeout_ms = 1000", "collect_timeout_ms = 0");
    let err = AppConfig::load_from_str(&bad).unwrap_err();
    assert!(err.to_string().contains("collect_timeout_ms"));
}

#[test]
fn test_config_validation_rejects_cache_interval_zero() {
    let bad = VALID_CONFIG.replace("cache_interval_ms = 5000", "cache_interval_ms = 0");
    let err = AppConfig::load_from_str(&bad).unwrap_err();
    assert!(err.to_string().contains("cache_interval_ms"));
}

#[test]
fn test_config_validation_rejects_empty_probe_endpoint_when_enabled() {
    let bad = VALID_CONFIG.replace("endpoint = \"127.0.0.1:3000\"", "endpoint = \"\"");
    let err = AppConfig::load_from_str(&bad).unwrap_err();
    assert!(err.to_string().contains("probe.endpoint"));
}

#[test]
fn test_config_skips_probe_validation_when_disabled() {
    let ok = VALID_CONFIG
        .replace("enabled = true", "enabled = false")
        .replace("endpoint = \"127.0.0.1:3000\"", "endpoint = \"\"");
    assert!(AppConfig::load_from_str(&ok).is_ok());
}
