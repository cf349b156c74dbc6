/// Configuration from YAML files and SQLWEAVE_* environment variables.
use std::io::Write;

use serial_test::serial;
use sqlweave::config::{CliConfig, ConfigError, TranslatorConfig};
use sqlweave::DialectKind;

const ENV_KEYS: [&str; 4] = [
    "SQLWEAVE_DIALECT",
    "SQLWEAVE_PARAMETER_PREFIX",
    "SQLWEAVE_MAX_LIST_UNROLL",
    "SQLWEAVE_LOG_SQL",
];

fn clear_env() {
    for key in ENV_KEYS {
        std::env::remove_var(key);
    }
}

fn yaml_file(content: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().expect("create temp file");
    file.write_all(content.as_bytes()).expect("write temp file");
    file
}

#[test]
fn test_yaml_config() {
    let file = yaml_file("dialect: postgres\nmax_list_unroll: 250\nlog_sql: true\n");
    let config = TranslatorConfig::from_yaml_file(file.path()).unwrap();
    assert_eq!(config.dialect, DialectKind::Postgres);
    assert_eq!(config.max_list_unroll, 250);
    assert!(config.log_sql);
    // Unset fields keep their defaults
    assert_eq!(config.parameter_prefix, "");
}

#[test]
fn test_yaml_config_is_validated() {
    let file = yaml_file("max_list_unroll: 0\n");
    assert!(matches!(
        TranslatorConfig::from_yaml_file(file.path()),
        Err(ConfigError::Validation(_))
    ));
}

#[test]
fn test_malformed_yaml() {
    let file = yaml_file("dialect: [postgres\n");
    assert!(matches!(
        TranslatorConfig::from_yaml_file(file.path()),
        Err(ConfigError::Parse { .. })
    ));
}

#[test]
fn test_missing_yaml_file() {
    let dir = tempfile::tempdir().unwrap();
    let result = TranslatorConfig::from_yaml_file(dir.path().join("absent.yaml"));
    assert!(matches!(result, Err(ConfigError::Parse { .. })));
}

#[test]
#[serial]
fn test_env_defaults() {
    clear_env();
    let config = TranslatorConfig::from_env().unwrap();
    assert_eq!(config, TranslatorConfig::default());
}

#[test]
#[serial]
fn test_env_overrides() {
    clear_env();
    std::env::set_var("SQLWEAVE_DIALECT", "sqlserver");
    std::env::set_var("SQLWEAVE_PARAMETER_PREFIX", ":");
    std::env::set_var("SQLWEAVE_MAX_LIST_UNROLL", "64");
    std::env::set_var("SQLWEAVE_LOG_SQL", "true");

    let config = TranslatorConfig::from_env();
    clear_env();
    let config = config.unwrap();
    assert_eq!(config.dialect, DialectKind::SqlServer);
    assert_eq!(config.max_list_unroll, 64);
    assert!(config.log_sql);
    assert_eq!(config.dialect_settings().parameter_prefix, ":");
}

#[test]
#[serial]
fn test_env_parse_error_names_the_variable() {
    clear_env();
    std::env::set_var("SQLWEAVE_MAX_LIST_UNROLL", "lots");
    let result = TranslatorConfig::from_env();
    clear_env();
    match result {
        Err(ConfigError::Parse { field, value, .. }) => {
            assert_eq!(field, "SQLWEAVE_MAX_LIST_UNROLL");
            assert_eq!(value, "lots");
        }
        other => panic!("expected a parse error, got {:?}", other),
    }
}

#[test]
fn test_cli_merge_keeps_unset_options() {
    let file = yaml_file("dialect: mysql\nmax_list_unroll: 20\n");
    let mut config = TranslatorConfig::from_yaml_file(file.path()).unwrap();
    config
        .merge(CliConfig {
            max_list_unroll: Some(30),
            ..Default::default()
        })
        .unwrap();
    assert_eq!(config.dialect, DialectKind::Mysql);
    assert_eq!(config.max_list_unroll, 30);
}

#[test]
fn test_cli_merge_rejects_invalid_prefix() {
    let mut config = TranslatorConfig::default();
    let result = config.merge(CliConfig {
        parameter_prefix: Some("#".to_string()),
        ..Default::default()
    });
    assert!(matches!(result, Err(ConfigError::Validation(_))));
}
