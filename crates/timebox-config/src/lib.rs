//! Configuration parsing and validation for timeboxd
//!
//! Supports TOML configuration with:
//! - Versioned schema
//! - Socket/data-dir/log-level settings with XDG-derived defaults
//! - Validation with clear error messages

mod schema;
mod validation;

pub use schema::*;
pub use validation::*;

use std::path::Path;
use thiserror::Error;

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Validation failed: {errors:?}")]
    ValidationFailed { errors: Vec<ValidationError> },

    #[error("Unsupported config version: {0}")]
    UnsupportedVersion(u32),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// Current supported config version
pub const CURRENT_CONFIG_VERSION: u32 = 1;

/// Load and validate configuration from a TOML file.
///
/// A missing file is not an error: every setting has a default.
pub fn load_config(path: impl AsRef<Path>) -> ConfigResult<Config> {
    let path = path.as_ref();
    if !path.exists() {
        return Ok(Config::default());
    }
    let content = std::fs::read_to_string(path)?;
    parse_config(&content)
}

/// Parse and validate configuration from a TOML string
pub fn parse_config(content: &str) -> ConfigResult<Config> {
    let raw: RawConfig = toml::from_str(content)?;

    if raw.config_version != CURRENT_CONFIG_VERSION {
        return Err(ConfigError::UnsupportedVersion(raw.config_version));
    }

    let errors = validate_config(&raw);
    if !errors.is_empty() {
        return Err(ConfigError::ValidationFailed { errors });
    }

    Ok(Config::from_raw(raw))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_minimal_config() {
        let config = r#"
            config_version = 1
        "#;

        let config = parse_config(config).unwrap();
        assert!(config.service.socket_path.to_string_lossy().contains("timeboxd"));
        assert_eq!(config.service.log_level, "info");
    }

    #[test]
    fn parse_full_config() {
        let config = r#"
            config_version = 1

            [service]
            socket_path = "/tmp/test-timebox/control.sock"
            data_dir = "/tmp/test-timebox/data"
            log_level = "debug"
        "#;

        let config = parse_config(config).unwrap();
        assert_eq!(
            config.service.socket_path.to_string_lossy(),
            "/tmp/test-timebox/control.sock"
        );
        assert_eq!(config.service.log_level, "debug");
    }

    #[test]
    fn reject_wrong_version() {
        let config = r#"
            config_version = 99
        "#;

        let result = parse_config(config);
        assert!(matches!(result, Err(ConfigError::UnsupportedVersion(99))));
    }

    #[test]
    fn reject_bad_log_level() {
        let config = r#"
            config_version = 1

            [service]
            log_level = "loud"
        "#;

        let result = parse_config(config);
        assert!(matches!(result, Err(ConfigError::ValidationFailed { .. })));
    }

    #[test]
    fn missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_config(dir.path().join("nope.toml")).unwrap();
        assert_eq!(config.service.log_level, "info");
    }
}
