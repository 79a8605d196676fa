//! Configuration management for deskfleet
//!
//! Configuration is read once at process start. A missing file means
//! defaults for every section.

mod fleet;
mod remote;
pub mod serde_utils;
mod tunnel;

pub use fleet::{FleetConfig, FleetSection, NetworkConfig, RangeMode};
pub use remote::{ActionTemplate, BackupConfig, SshConfig, UnknownHostPolicy};
pub use tunnel::{ExtraSignature, SignatureClass, TunnelConfig};

use crate::error::ConfigError;
use std::path::{Path, PathBuf};

/// Get the default configuration directory
pub fn default_config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("deskfleet")
}

/// Get the default configuration file path
pub fn default_config_path() -> PathBuf {
    default_config_dir().join("config.toml")
}

/// Load configuration from a file
pub fn load_config<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::NotFound(path.to_path_buf()));
    }

    let content = std::fs::read_to_string(path)
        .map_err(|e| ConfigError::Invalid(format!("Failed to read config: {}", e)))?;

    let config: T = toml::from_str(&content)?;
    Ok(config)
}

/// Load configuration, falling back to defaults when the file does not exist
pub fn load_or_default<T>(path: &Path) -> Result<T, ConfigError>
where
    T: serde::de::DeserializeOwned + Default,
{
    match load_config(path) {
        Err(ConfigError::NotFound(p)) => {
            tracing::debug!("No config at {}, using defaults", p.display());
            Ok(T::default())
        }
        other => other,
    }
}

/// Save configuration to a file
pub fn save_config<T: serde::Serialize>(path: &Path, config: &T) -> Result<(), ConfigError> {
    let content = toml::to_string_pretty(config)?;

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| ConfigError::Invalid(format!("Failed to create config dir: {}", e)))?;
    }

    std::fs::write(path, content)
        .map_err(|e| ConfigError::Invalid(format!("Failed to write config: {}", e)))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_yields_defaults() {
        let dir = TempDir::new().unwrap();
        let config: FleetConfig = load_or_default(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config.network.admin_port, 22);
    }

    #[test]
    fn test_save_then_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut config = FleetConfig::default();
        config.fleet.admin_user = "suporte".to_string();
        config.network.exclusions = vec!["192.168.0.120".parse().unwrap()];
        save_config(&path, &config).unwrap();

        let loaded: FleetConfig = load_config(&path).unwrap();
        assert_eq!(loaded.fleet.admin_user, "suporte");
        assert_eq!(loaded.network.exclusions, config.network.exclusions);
        assert_eq!(loaded.tunnel.ready_timeout, config.tunnel.ready_timeout);
    }

    #[test]
    fn test_invalid_toml_is_parse_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[network\nadmin_port = ").unwrap();
        let result: Result<FleetConfig, _> = load_config(&path);
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }
}
