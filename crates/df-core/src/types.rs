//! Core domain types

use serde::{Deserialize, Serialize};
use std::fmt;

/// Network address identifying a managed host
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HostId(pub String);

impl HostId {
    /// Create a new host ID
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the raw address string
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Trailing numeric component of the address (`192.168.0.105` -> 105)
    ///
    /// Addresses without a numeric tail sort after every numeric one.
    pub fn trailing_number(&self) -> u32 {
        self.0
            .rsplit(|c: char| !c.is_ascii_digit())
            .next()
            .and_then(|tail| tail.parse().ok())
            .unwrap_or(u32::MAX)
    }
}

impl fmt::Display for HostId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for HostId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for HostId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Last-known reachability of a host
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HostStatus {
    /// Not checked yet
    #[default]
    Unknown,
    /// Administration port answered
    Online,
    /// Administration port did not answer
    Offline,
    /// Reachable but the credential was rejected
    AuthError,
}

impl fmt::Display for HostStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HostStatus::Unknown => write!(f, "unknown"),
            HostStatus::Online => write!(f, "online"),
            HostStatus::Offline => write!(f, "offline"),
            HostStatus::AuthError => write!(f, "auth_error"),
        }
    }
}

/// A managed host as seen by the control point
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Host {
    /// Network address
    pub id: HostId,
    /// Last-known reachability
    #[serde(default)]
    pub status: HostStatus,
    /// Discovery strategy that found this host
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
}

impl Host {
    /// Create a host with unknown status
    pub fn new(id: impl Into<HostId>) -> Self {
        Self {
            id: id.into(),
            status: HostStatus::Unknown,
            method: None,
        }
    }

    /// Attach the discovery strategy name
    pub fn discovered_by(mut self, method: impl Into<String>) -> Self {
        self.method = Some(method.into());
        self
    }

    /// Replace the status
    pub fn with_status(mut self, status: HostStatus) -> Self {
        self.status = status;
        self
    }
}

/// Username and secret supplied per request
///
/// The secret never appears in `Debug` output.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    pub username: String,
    pub secret: String,
}

impl Credential {
    /// Create a credential
    pub fn new(username: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            secret: secret.into(),
        }
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("username", &self.username)
            .field("secret", &"<redacted>")
            .finish()
    }
}

/// Output of a remote command that exited with status zero
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandResult {
    pub stdout: String,
    /// Non-fatal stderr lines
    pub warnings: Vec<String>,
    pub exit_code: i32,
}

/// Where an action runs on a host
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionScope {
    /// Once, as root
    #[default]
    System,
    /// Once per interactive local account
    PerAccount,
}

/// Whether the caller waits for the command to finish
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplyMode {
    #[default]
    AwaitReply,
    /// Detached on the remote side; a dropped link counts as delivered
    FireAndForget,
}

/// Lifecycle of a screen-sharing tunnel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TunnelStatus {
    Pending,
    Ready,
    Failed,
    Terminated,
}

impl fmt::Display for TunnelStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TunnelStatus::Pending => write!(f, "pending"),
            TunnelStatus::Ready => write!(f, "ready"),
            TunnelStatus::Failed => write!(f, "failed"),
            TunnelStatus::Terminated => write!(f, "terminated"),
        }
    }
}
