use thiserror::Error;

use df_core::config::SignatureClass;
use df_core::ErrorKind;

/// Why a tunnel did not become ready
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TunnelError {
    #[error("Authentication failed for {host}")]
    Authentication { host: String },

    #[error("Connection to {host} refused")]
    ConnectionRefused { host: String },

    #[error("No route to {host}")]
    NoRoute { host: String },

    #[error("Host key verification failed for {host}")]
    HostKey { host: String },

    #[error("A required program is missing on {host}")]
    MissingDependency { host: String },

    #[error("No graphical session is active on {host}")]
    NoDisplay { host: String },

    #[error("Tunnel command rejected an option")]
    Configuration,

    /// No signature seen before the deadline
    #[error("Tunnel to {host} not ready after {seconds}s: {sample}")]
    Timeout {
        host: String,
        seconds: u64,
        sample: String,
    },

    /// The child exited without a recognizable message
    #[error("Tunnel process for {host} exited: {sample}")]
    Exited { host: String, sample: String },

    #[error("Failed to start tunnel process: {0}")]
    Spawn(String),

    #[error("No free local port: {0}")]
    PortAllocation(String),
}

impl TunnelError {
    /// Error for a failure signature; `None` for [`SignatureClass::Ready`]
    pub fn from_class(class: SignatureClass, host: &str) -> Option<Self> {
        let host = host.to_string();
        Some(match class {
            SignatureClass::Ready => return None,
            SignatureClass::Authentication => TunnelError::Authentication { host },
            SignatureClass::ConnectionRefused => TunnelError::ConnectionRefused { host },
            SignatureClass::NoRoute => TunnelError::NoRoute { host },
            SignatureClass::HostKey => TunnelError::HostKey { host },
            SignatureClass::MissingDependency => TunnelError::MissingDependency { host },
            SignatureClass::NoDisplay => TunnelError::NoDisplay { host },
            SignatureClass::Configuration => TunnelError::Configuration,
        })
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            TunnelError::Authentication { .. } => ErrorKind::Authentication,
            TunnelError::HostKey { .. } => ErrorKind::HostKey,
            TunnelError::Timeout { .. } => ErrorKind::Timeout,
            TunnelError::ConnectionRefused { .. } | TunnelError::NoRoute { .. } => {
                ErrorKind::Connection
            }
            TunnelError::MissingDependency { .. }
            | TunnelError::NoDisplay { .. }
            | TunnelError::Configuration
            | TunnelError::Exited { .. } => ErrorKind::CommandFailed,
            TunnelError::Spawn(_) | TunnelError::PortAllocation(_) => ErrorKind::Internal,
        }
    }

    /// Operator hint shown with the error
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            TunnelError::MissingDependency { .. } => {
                Some("Install x11vnc and websockify on the host")
            }
            TunnelError::NoDisplay { .. } => Some("Someone must be logged in to a graphical session"),
            TunnelError::HostKey { .. } => Some("Refresh the host key with ssh-keygen -R"),
            TunnelError::Spawn(_) => Some("Check that ssh and sshpass are installed locally"),
            _ => None,
        }
    }
}
