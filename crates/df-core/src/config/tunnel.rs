//! Screen-sharing tunnel settings

use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::serde_utils::{duration_millis, duration_secs};

/// Outcome a readiness signature maps to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignatureClass {
    Ready,
    Authentication,
    ConnectionRefused,
    NoRoute,
    HostKey,
    MissingDependency,
    NoDisplay,
    Configuration,
}

/// Additional readiness signature appended after the built-in table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtraSignature {
    /// Case-insensitive substring
    pub phrase: String,
    pub class: SignatureClass,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TunnelConfig {
    /// Overall wait for a readiness signature
    #[serde(with = "duration_secs")]
    pub ready_timeout: Duration,

    /// Time between the graceful signal and the forced kill
    #[serde(with = "duration_millis")]
    pub grace_period: Duration,

    /// Remote screen-capture port (loopback on the host)
    pub capture_port: u16,

    /// Remote browser-relay port
    pub bridge_port: u16,

    pub ssh_program: String,

    /// Password feeder; reads the secret from `SSHPASS`
    pub sshpass_program: String,

    /// Characters of captured output kept in timeout diagnostics
    pub sample_chars: usize,

    pub extra_signatures: Vec<ExtraSignature>,
}

impl Default for TunnelConfig {
    fn default() -> Self {
        Self {
            ready_timeout: Duration::from_secs(20),
            grace_period: Duration::from_millis(2000),
            capture_port: 5900,
            bridge_port: 6080,
            ssh_program: "ssh".to_string(),
            sshpass_program: "sshpass".to_string(),
            sample_chars: 600,
            extra_signatures: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extra_signatures_parse() {
        let config: TunnelConfig = toml::from_str(
            r#"
            ready_timeout = 30
            [[extra_signatures]]
            phrase = "listening on port"
            class = "ready"
            "#,
        )
        .unwrap();
        assert_eq!(config.ready_timeout, Duration::from_secs(30));
        assert_eq!(config.extra_signatures[0].class, SignatureClass::Ready);
        assert_eq!(config.bridge_port, 6080);
    }
}
