//! Configuration schema: raw TOML shape and validated config

use serde::Deserialize;
use std::path::PathBuf;

/// Raw TOML shape, exactly as written by the user
#[derive(Debug, Deserialize)]
pub struct RawConfig {
    pub config_version: u32,

    #[serde(default)]
    pub service: RawServiceConfig,
}

#[derive(Debug, Default, Deserialize)]
pub struct RawServiceConfig {
    /// Control socket path (default: XDG runtime dir)
    pub socket_path: Option<PathBuf>,

    /// Data directory holding the session database (default: XDG data dir)
    pub data_dir: Option<PathBuf>,

    /// Log level: trace, debug, info, warn, error
    pub log_level: Option<String>,
}

/// Validated configuration with all defaults applied
#[derive(Debug, Clone)]
pub struct Config {
    pub service: ServiceConfig,
}

#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub socket_path: PathBuf,
    pub data_dir: PathBuf,
    pub log_level: String,
}

impl Config {
    pub fn from_raw(raw: RawConfig) -> Self {
        Self {
            service: ServiceConfig {
                socket_path: raw
                    .service
                    .socket_path
                    .unwrap_or_else(timebox_util::socket_path_without_env),
                data_dir: raw
                    .service
                    .data_dir
                    .unwrap_or_else(timebox_util::data_dir_without_env),
                log_level: raw.service.log_level.unwrap_or_else(|| "info".to_string()),
            },
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::from_raw(RawConfig {
            config_version: crate::CURRENT_CONFIG_VERSION,
            service: RawServiceConfig::default(),
        })
    }
}
