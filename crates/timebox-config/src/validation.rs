//! Configuration validation

use crate::RawConfig;

/// A single validation failure, with the offending field
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// Validate a raw config, collecting every problem rather than stopping at
/// the first one.
pub fn validate_config(raw: &RawConfig) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    if let Some(path) = &raw.service.socket_path {
        if path.file_name().is_none() {
            errors.push(ValidationError::new(
                "service.socket_path",
                "must name a socket file, not a directory",
            ));
        }
    }

    if let Some(path) = &raw.service.data_dir {
        if path.as_os_str().is_empty() {
            errors.push(ValidationError::new(
                "service.data_dir",
                "must not be empty",
            ));
        }
    }

    if let Some(level) = &raw.service.log_level {
        if !LOG_LEVELS.contains(&level.as_str()) {
            errors.push(ValidationError::new(
                "service.log_level",
                format!("unknown level {:?}, expected one of {:?}", level, LOG_LEVELS),
            ));
        }
    }

    errors
}
