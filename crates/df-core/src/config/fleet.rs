//! Top-level fleet configuration and network range settings

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::net::Ipv4Addr;
use std::time::Duration;

use super::serde_utils::{duration_millis, duration_secs};
use super::{ActionTemplate, BackupConfig, SshConfig, TunnelConfig};

/// Complete configuration file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FleetConfig {
    pub fleet: FleetSection,
    pub network: NetworkConfig,
    pub ssh: SshConfig,
    pub backup: BackupConfig,
    pub tunnel: TunnelConfig,
    /// Externally supplied command templates, keyed by action name
    pub actions: BTreeMap<String, ActionTemplate>,
}

/// Control-point identity and local listener
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FleetSection {
    /// Administrative account used on every host
    pub admin_user: String,

    /// Loopback port of the control server
    pub control_port: u16,
}

impl Default for FleetSection {
    fn default() -> Self {
        Self {
            admin_user: whoami::username(),
            control_port: 22240,
        }
    }
}

impl FleetSection {
    /// Control server address (always loopback)
    pub fn control_address(&self) -> String {
        format!("127.0.0.1:{}", self.control_port)
    }
}

/// How the discovery range is chosen
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RangeMode {
    /// Configured `range_start..=range_end`
    #[default]
    Static,
    /// The /24 of the control point's own address
    Dynamic,
}

/// Discovery range and probing parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    pub range_mode: RangeMode,
    pub range_start: Ipv4Addr,
    pub range_end: Ipv4Addr,

    /// Port the administration service listens on
    pub admin_port: u16,

    /// Addresses never reported by discovery
    pub exclusions: Vec<Ipv4Addr>,

    /// Outer deadline for one discovery call
    #[serde(with = "duration_secs")]
    pub discovery_timeout: Duration,

    /// Deadline for a single external discovery tool
    #[serde(with = "duration_secs")]
    pub tool_timeout: Duration,

    /// Per-address TCP connect timeout
    #[serde(with = "duration_millis")]
    pub probe_timeout: Duration,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            range_mode: RangeMode::Static,
            range_start: Ipv4Addr::new(192, 168, 0, 100),
            range_end: Ipv4Addr::new(192, 168, 0, 125),
            admin_port: 22,
            exclusions: Vec::new(),
            discovery_timeout: Duration::from_secs(45),
            tool_timeout: Duration::from_secs(20),
            probe_timeout: Duration::from_millis(1500),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_file_keeps_defaults() {
        let config: FleetConfig = toml::from_str(
            r#"
            [network]
            range_mode = "dynamic"
            exclusions = ["192.168.0.120", "192.168.0.121"]

            [actions.lock_screen]
            command = "loginctl lock-sessions"
            "#,
        )
        .unwrap();

        assert_eq!(config.network.range_mode, RangeMode::Dynamic);
        assert_eq!(config.network.exclusions.len(), 2);
        assert_eq!(config.network.probe_timeout, Duration::from_millis(1500));
        assert_eq!(config.fleet.control_port, 22240);
        assert_eq!(
            config.actions["lock_screen"].command,
            "loginctl lock-sessions"
        );
    }

    #[test]
    fn test_control_address_is_loopback() {
        let section = FleetSection {
            admin_user: "admin".into(),
            control_port: 4000,
        };
        assert_eq!(section.control_address(), "127.0.0.1:4000");
    }
}
