//! Tests for the TOML configuration file

use crate::app::cli::config::CliConfig;
use crate::app::cli::display::OutputFormat;
use crate::app::error::AppError;
use std::path::PathBuf;
use tempfile::TempDir;

fn table(text: &str) -> toml::Table {
    toml::from_str(text).unwrap()
}

#[test]
fn test_toml_all_keys() {
    let mut config = CliConfig::default();
    config
        .apply_toml_values(&table(
            r#"
            log-level = "debug"
            log-format = "json"
            log-file = "/tmp/ddmq.log"
            color = true
            format = "YAML"
            "#,
        ))
        .unwrap();

    assert_eq!(
        config,
        CliConfig {
            log_level: Some("debug".to_string()),
            log_format: Some("json".to_string()),
            log_file: Some(PathBuf::from("/tmp/ddmq.log")),
            color: Some(true),
            format: Some(OutputFormat::Yaml),
        }
    );
}

#[test]
fn test_toml_log_file_none_disables() {
    let mut config = CliConfig {
        log_file: Some(PathBuf::from("/tmp/a.log")),
        ..CliConfig::default()
    };
    config
        .apply_toml_values(&table(r#"log-file = "none""#))
        .unwrap();
    assert_eq!(config.log_file, None);
}

#[test]
fn test_toml_unknown_keys_ignored() {
    let mut config = CliConfig::default();
    config
        .apply_toml_values(&table(r#"owner = "ops""#))
        .unwrap();
    assert_eq!(config, CliConfig::default());
}

#[test]
fn test_toml_invalid_values() {
    for text in [
        r#"log-level = "loud""#,
        r#"log-format = "xml""#,
        r#"color = "yes""#,
        r#"format = "csv""#,
        "log-level = 3",
    ] {
        let mut config = CliConfig::default();
        assert!(config.apply_toml_values(&table(text)).is_err(), "{}", text);
    }
}

#[test]
fn test_explicit_config_file_must_exist() {
    let dir = TempDir::new().unwrap();
    let missing = dir.path().join("missing.toml");
    let err = CliConfig::load(Some(&missing)).unwrap_err();
    assert!(matches!(err, AppError::ConfigFile { .. }));
}

#[test]
fn test_load_explicit_config_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("ddmq.toml");
    std::fs::write(&path, "format = \"json\"\ncolor = false\n").unwrap();

    let config = CliConfig::load(Some(&path)).unwrap();
    assert_eq!(config.format, Some(OutputFormat::Json));
    assert_eq!(config.color, Some(false));
}

#[test]
fn test_malformed_config_file_names_the_path() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("ddmq.toml");
    std::fs::write(&path, "format = ").unwrap();

    let err = CliConfig::load(Some(&path)).unwrap_err();
    assert!(err.to_string().contains("ddmq.toml"), "{}", err);
}
