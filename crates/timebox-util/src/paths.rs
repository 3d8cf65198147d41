//! Default paths for timeboxd components
//!
//! Paths are user-writable by default (no root required):
//! - Socket: `$XDG_RUNTIME_DIR/timeboxd/timeboxd.sock` or `/tmp/timeboxd-$USER/timeboxd.sock`
//! - Data: `$XDG_DATA_HOME/timeboxd` or `~/.local/share/timeboxd`

use std::path::PathBuf;

/// Environment variable for overriding the socket path
pub const TIMEBOX_SOCKET_ENV: &str = "TIMEBOX_SOCKET";

/// Environment variable for overriding the data directory
pub const TIMEBOX_DATA_DIR_ENV: &str = "TIMEBOX_DATA_DIR";

/// Socket filename within the socket directory
const SOCKET_FILENAME: &str = "timeboxd.sock";

/// Application subdirectory name
const APP_DIR: &str = "timeboxd";

/// Get the default socket path.
///
/// Order of precedence:
/// 1. `$TIMEBOX_SOCKET` environment variable (if set)
/// 2. `$XDG_RUNTIME_DIR/timeboxd/timeboxd.sock` (if XDG_RUNTIME_DIR is set)
/// 3. `/tmp/timeboxd-$USER/timeboxd.sock` (fallback)
pub fn default_socket_path() -> PathBuf {
    if let Ok(path) = std::env::var(TIMEBOX_SOCKET_ENV) {
        return PathBuf::from(path);
    }

    socket_path_without_env()
}

/// Get the socket path without checking TIMEBOX_SOCKET env var.
/// Used for default values in configs where the env var is checked separately.
pub fn socket_path_without_env() -> PathBuf {
    if let Ok(runtime_dir) = std::env::var("XDG_RUNTIME_DIR") {
        return PathBuf::from(runtime_dir).join(APP_DIR).join(SOCKET_FILENAME);
    }

    let username = std::env::var("USER").unwrap_or_else(|_| "unknown".to_string());
    PathBuf::from(format!("/tmp/{}-{}", APP_DIR, username)).join(SOCKET_FILENAME)
}

/// Get the default data directory.
///
/// Order of precedence:
/// 1. `$TIMEBOX_DATA_DIR` environment variable (if set)
/// 2. `$XDG_DATA_HOME/timeboxd` (if XDG_DATA_HOME is set)
/// 3. `~/.local/share/timeboxd` (fallback)
pub fn default_data_dir() -> PathBuf {
    if let Ok(path) = std::env::var(TIMEBOX_DATA_DIR_ENV) {
        return PathBuf::from(path);
    }

    data_dir_without_env()
}

/// Get the data directory without checking TIMEBOX_DATA_DIR env var.
pub fn data_dir_without_env() -> PathBuf {
    if let Ok(data_home) = std::env::var("XDG_DATA_HOME") {
        return PathBuf::from(data_home).join(APP_DIR);
    }

    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home)
            .join(".local")
            .join("share")
            .join(APP_DIR);
    }

    // Last resort
    PathBuf::from("/tmp").join(APP_DIR).join("data")
}

/// Get the default config file path (`~/.config/timebox/config.toml`).
pub fn default_config_path() -> PathBuf {
    if let Ok(config_home) = std::env::var("XDG_CONFIG_HOME") {
        return PathBuf::from(config_home).join("timebox").join("config.toml");
    }

    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home)
            .join(".config")
            .join("timebox")
            .join("config.toml");
    }

    PathBuf::from("/etc/timebox/config.toml")
}
