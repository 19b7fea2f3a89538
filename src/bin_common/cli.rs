//! CLI utilities for binaries
//!
//! Handles configuration path resolution and command line arguments
//! for all binary executables.

use std::path::PathBuf;

/// Type of configuration to load
#[derive(Debug, Clone)]
pub enum ConfigType {
    /// Realtime configuration (realtime.yaml)
    Realtime,
    /// Custom path
    Custom(String),
}

impl ConfigType {
    /// Get the default path for this config type
    pub fn default_path(&self) -> &str {
        match self {
            ConfigType::Realtime => "config/realtime.yaml",
            ConfigType::Custom(path) => path,
        }
    }

    /// Get the environment variable name for this config type
    pub fn env_var_name(&self) -> &str {
        match self {
            ConfigType::Realtime => "REALTIME_CONFIG_PATH",
            ConfigType::Custom(_) => "CONFIG_PATH",
        }
    }
}

/// Load configuration path from environment or use default
///
/// # Examples
/// ```
/// use realtime_hub::bin_common::{load_config_from_env, ConfigType};
///
/// let path = load_config_from_env(ConfigType::Realtime);
/// ```
pub fn load_config_from_env(config_type: ConfigType) -> PathBuf {
    std::env::var(config_type.env_var_name())
        .unwrap_or_else(|_| config_type.default_path().to_string())
        .into()
}

/// Parse command line arguments for a binary
///
/// Returns a vector of arguments (excluding the program name)
pub fn parse_args() -> Vec<String> {
    std::env::args().skip(1).collect()
}

/// Config path from the first positional argument, else the environment
pub fn config_path_from_args(args: &[String], config_type: ConfigType) -> PathBuf {
    match args.iter().find(|a| !a.starts_with('-')) {
        Some(path) => PathBuf::from(path),
        None => load_config_from_env(config_type),
    }
}
