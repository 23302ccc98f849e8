//! TOML configuration file for the command line tool
//!
//! The file sets defaults for the global flags. It is read from
//! `--config-file` when given (and must then exist), otherwise from
//! `<config_dir>/Ddmq/ddmq.toml` when that exists.
//!
//! ```toml
//! log-level = "info"
//! log-format = "ext"
//! log-file = "/var/log/ddmq.log"
//! color = false
//! format = "yaml"
//! ```

use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::app::cli::display::OutputFormat;
use crate::app::error::{AppError, AppResult};

const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error", "off"];
const LOG_FORMATS: &[&str] = &["text", "ext", "json"];

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CliConfig {
    pub log_level: Option<String>,
    pub log_format: Option<String>,
    pub log_file: Option<PathBuf>,
    pub color: Option<bool>,
    pub format: Option<OutputFormat>,
}

/// `<config_dir>/Ddmq/ddmq.toml`
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("Ddmq").join("ddmq.toml"))
}

impl CliConfig {
    /// Load the explicit config file, or the default one if present
    pub fn load(config_file: Option<&Path>) -> AppResult<Self> {
        let path = match config_file {
            Some(path) if !path.exists() => {
                return Err(AppError::ConfigFile {
                    path: path.to_path_buf(),
                    message: "file does not exist".to_string(),
                })
            }
            Some(path) => path.to_path_buf(),
            None => match default_config_path() {
                Some(path) if path.exists() => path,
                _ => return Ok(Self::default()),
            },
        };
        Self::from_file(&path)
    }

    pub fn from_file(path: &Path) -> AppResult<Self> {
        let config_error = |message: String| AppError::ConfigFile {
            path: path.to_path_buf(),
            message,
        };
        let contents = std::fs::read_to_string(path).map_err(|e| config_error(e.to_string()))?;
        let table = toml::from_str::<toml::Table>(&contents).map_err(|e| config_error(e.to_string()))?;

        let mut config = Self::default();
        config.apply_toml_values(&table).map_err(config_error)?;
        log::debug!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Apply the recognised keys of a parsed TOML table; unknown keys are ignored
    pub fn apply_toml_values(&mut self, config: &toml::Table) -> Result<(), String> {
        if let Some(value) = config.get("log-level") {
            let level = expect_str(value, "log-level")?;
            if !LOG_LEVELS.contains(&level) {
                return Err(format!(
                    "log-level '{}' is not one of {}",
                    level,
                    LOG_LEVELS.join(", ")
                ));
            }
            self.log_level = Some(level.to_string());
        }
        if let Some(value) = config.get("log-format") {
            let log_format = expect_str(value, "log-format")?;
            if !LOG_FORMATS.contains(&log_format) {
                return Err(format!(
                    "log-format '{}' is not one of {}",
                    log_format,
                    LOG_FORMATS.join(", ")
                ));
            }
            self.log_format = Some(log_format.to_string());
        }
        if let Some(value) = config.get("log-file") {
            let log_file = expect_str(value, "log-file")?;
            // "none" and "-" disable file logging
            self.log_file = if log_file.eq_ignore_ascii_case("none") || log_file == "-" {
                None
            } else {
                Some(PathBuf::from(log_file))
            };
        }
        if let Some(value) = config.get("color") {
            self.color = Some(
                value
                    .as_bool()
                    .ok_or_else(|| "color must be true or false".to_string())?,
            );
        }
        if let Some(value) = config.get("format") {
            let name = expect_str(value, "format")?;
            let format = OutputFormat::from_str(name).map_err(|_| {
                format!(
                    "format '{}' is not one of {}",
                    name,
                    OutputFormat::names().collect::<Vec<_>>().join(", ")
                )
            })?;
            self.format = Some(format);
        }
        Ok(())
    }
}

fn expect_str<'a>(value: &'a toml::Value, key: &str) -> Result<&'a str, String> {
    value
        .as_str()
        .ok_or_else(|| format!("{} must be a string", key))
}
