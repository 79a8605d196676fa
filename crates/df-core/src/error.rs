//! Error taxonomy for deskfleet
//!
//! Every error that can reach a caller classifies into an [`ErrorKind`],
//! which in turn maps to a fixed HTTP-style status code.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Closed classification of every caller-visible failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Authentication,
    HostKey,
    Timeout,
    Connection,
    CommandFailed,
    PartialFailure,
    InvalidRequest,
    UnknownAction,
    Transport,
    Internal,
}

impl ErrorKind {
    /// Status code reported for this kind
    pub fn status_code(self) -> u16 {
        match self {
            ErrorKind::Authentication => 401,
            ErrorKind::HostKey => 409,
            ErrorKind::Timeout => 504,
            ErrorKind::Connection => 502,
            ErrorKind::PartialFailure => 207,
            ErrorKind::InvalidRequest => 400,
            ErrorKind::UnknownAction => 404,
            ErrorKind::CommandFailed | ErrorKind::Transport | ErrorKind::Internal => 500,
        }
    }
}

/// Why a TCP-level connection could not be established
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectFailure {
    Timeout,
    Refused,
    NoRoute,
}

impl fmt::Display for ConnectFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectFailure::Timeout => write!(f, "timed out"),
            ConnectFailure::Refused => write!(f, "connection refused"),
            ConnectFailure::NoRoute => write!(f, "no route to host"),
        }
    }
}

/// Host-key verification outcome that blocks a connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HostKeyProblem {
    /// Cached fingerprint differs from the one presented
    Mismatch,
    /// No cached fingerprint and the policy refuses to learn one
    Unknown,
}

impl fmt::Display for HostKeyProblem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HostKeyProblem::Mismatch => write!(f, "remote host identification has changed"),
            HostKeyProblem::Unknown => write!(f, "host is not in known_hosts"),
        }
    }
}

/// Errors raised while opening or using a remote session
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// TCP-level failure
    #[error("Connection to {host} failed: {kind}")]
    Connection { host: String, kind: ConnectFailure },

    /// Credential rejected
    #[error("Authentication failed for {username}@{host}")]
    Authentication { host: String, username: String },

    /// Host key rejected
    #[error("Host key verification failed for {host}: {problem}")]
    HostKey {
        host: String,
        problem: HostKeyProblem,
        remediation_attempted: bool,
    },

    /// The command never started: no channel, or the exec request was refused
    #[error("Could not start remote command: {0}")]
    Dispatch(String),

    /// Anything else on the wire, including use of a closed session
    #[error("Transport error: {0}")]
    Transport(String),
}

impl SessionError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SessionError::Connection {
                kind: ConnectFailure::Timeout,
                ..
            } => ErrorKind::Timeout,
            SessionError::Connection { .. } => ErrorKind::Connection,
            SessionError::Authentication { .. } => ErrorKind::Authentication,
            SessionError::HostKey { .. } => ErrorKind::HostKey,
            SessionError::Dispatch(_) | SessionError::Transport(_) => ErrorKind::Transport,
        }
    }

    /// Operator hint for errors that need manual intervention
    pub fn remediation(&self) -> Option<String> {
        match self {
            SessionError::HostKey {
                host,
                remediation_attempted,
                ..
            } => {
                let prefix = if *remediation_attempted {
                    "Automatic key purge did not help. "
                } else {
                    ""
                };
                Some(format!(
                    "{}Run `ssh-keygen -R {host}` then `ssh-keyscan -H {host} >> ~/.ssh/known_hosts`",
                    prefix
                ))
            }
            _ => None,
        }
    }
}

/// A remote command exited with a non-zero status
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[error("Command failed with exit code {exit_code}: {error_details}")]
pub struct CommandExecutionError {
    pub exit_code: i32,
    pub error_details: String,
    pub warnings: Vec<String>,
}

/// Errors from running a command through a session
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExecError {
    #[error(transparent)]
    Session(#[from] SessionError),

    #[error(transparent)]
    Command(#[from] CommandExecutionError),

    /// No exit status within the command timeout
    #[error("Command timed out after {0} seconds")]
    Timeout(u64),

    /// Account enumeration came back empty
    #[error("Could not find users on {0}")]
    NoAccounts(String),
}

impl ExecError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ExecError::Session(e) => e.kind(),
            ExecError::Command(_) => ErrorKind::CommandFailed,
            ExecError::Timeout(_) => ErrorKind::Timeout,
            ExecError::NoAccounts(_) => ErrorKind::CommandFailed,
        }
    }
}

/// Errors resolving or building an action
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ActionError {
    /// No action registered under this name
    #[error("Unknown action: {0}")]
    UnknownAction(String),

    /// The payload was rejected by the command builder
    #[error("Invalid payload for {action}: {reason}")]
    InvalidPayload { action: String, reason: String },
}

impl ActionError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ActionError::UnknownAction(_) => ErrorKind::UnknownAction,
            ActionError::InvalidPayload { .. } => ErrorKind::InvalidRequest,
        }
    }
}

/// Errors from launcher backup and restore
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BackupError {
    /// Neither the user-directory query nor any fallback name exists
    #[error("No desktop directory found for {account}")]
    NoDesktopDirectory { account: String },

    /// Some files could not be moved
    #[error("{} file(s) could not be moved, {completed} moved", .failures.len())]
    Incomplete {
        completed: usize,
        failures: Vec<String>,
    },

    #[error(transparent)]
    Exec(#[from] ExecError),
}

impl BackupError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            BackupError::NoDesktopDirectory { .. } => ErrorKind::CommandFailed,
            BackupError::Incomplete { .. } => ErrorKind::CommandFailed,
            BackupError::Exec(e) => e.kind(),
        }
    }
}

impl From<SessionError> for BackupError {
    fn from(e: SessionError) -> Self {
        BackupError::Exec(ExecError::Session(e))
    }
}

/// Configuration-related errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Config file not found
    #[error("Config file not found: {0}")]
    NotFound(PathBuf),

    /// Invalid configuration
    #[error("Invalid config: {0}")]
    Invalid(String),

    /// TOML parse error
    #[error("TOML parse error: {0}")]
    Parse(#[from] toml::de::Error),

    /// TOML serialize error
    #[error("TOML serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),
}

/// Top-level error type for the deskfleet ecosystem
#[derive(Error, Debug)]
pub enum FleetError {
    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    #[error("{0}")]
    Exec(#[from] ExecError),

    #[error("{0}")]
    Action(#[from] ActionError),

    #[error("Backup error: {0}")]
    Backup(#[from] BackupError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Some units of a fan-out or batch failed
    #[error("{failed} of {total} operations failed")]
    PartialFailure { failed: usize, total: usize },

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<CommandExecutionError> for FleetError {
    fn from(e: CommandExecutionError) -> Self {
        FleetError::Exec(ExecError::Command(e))
    }
}

impl FleetError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            FleetError::Session(e) => e.kind(),
            FleetError::Exec(e) => e.kind(),
            FleetError::Action(e) => e.kind(),
            FleetError::Backup(e) => e.kind(),
            FleetError::Config(_) | FleetError::Io(_) => ErrorKind::Internal,
            FleetError::PartialFailure { .. } => ErrorKind::PartialFailure,
            FleetError::InvalidRequest(_) => ErrorKind::InvalidRequest,
        }
    }

    pub fn status_code(&self) -> u16 {
        self.kind().status_code()
    }

    /// Diagnostic details suitable for the response `details` field
    pub fn details(&self) -> Option<String> {
        match self {
            FleetError::Session(e) | FleetError::Exec(ExecError::Session(e)) => e.remediation(),
            FleetError::Backup(BackupError::Exec(ExecError::Session(e))) => e.remediation(),
            FleetError::Backup(BackupError::Incomplete { failures, .. }) => {
                Some(failures.join("\n"))
            }
            FleetError::Exec(ExecError::Command(e)) => {
                if e.warnings.is_empty() {
                    Some(e.error_details.clone())
                } else {
                    Some(format!(
                        "{}\nWarnings:\n{}",
                        e.error_details,
                        e.warnings.join("\n")
                    ))
                }
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(ErrorKind::Authentication.status_code(), 401);
        assert_eq!(ErrorKind::HostKey.status_code(), 409);
        assert_eq!(ErrorKind::Timeout.status_code(), 504);
        assert_eq!(ErrorKind::PartialFailure.status_code(), 207);
    }

    #[test]
    fn test_missing_accounts_is_command_failure() {
        let err = FleetError::from(ExecError::NoAccounts("192.168.0.105".into()));
        assert_eq!(err.status_code(), 500);
        assert_eq!(err.to_string(), "Could not find users on 192.168.0.105");
    }

    #[test]
    fn test_connection_timeout_maps_to_timeout() {
        let err = SessionError::Connection {
            host: "192.168.0.101".into(),
            kind: ConnectFailure::Timeout,
        };
        assert_eq!(err.kind(), ErrorKind::Timeout);
        assert_eq!(FleetError::from(err).status_code(), 504);
    }

    #[test]
    fn test_refused_maps_to_connection() {
        let err = SessionError::Connection {
            host: "192.168.0.101".into(),
            kind: ConnectFailure::Refused,
        };
        assert_eq!(err.kind(), ErrorKind::Connection);
    }

    #[test]
    fn test_host_key_remediation_hint() {
        let err = SessionError::HostKey {
            host: "192.168.0.7".into(),
            problem: HostKeyProblem::Mismatch,
            remediation_attempted: true,
        };
        let hint = err.remediation().unwrap();
        assert!(hint.contains("ssh-keygen -R 192.168.0.7"));
        assert!(hint.starts_with("Automatic key purge"));
    }

    #[test]
    fn test_command_error_details_include_warnings() {
        let err = FleetError::from(CommandExecutionError {
            exit_code: 100,
            error_details: "E: Unable to locate package".into(),
            warnings: vec!["W: stale cache".into()],
        });
        assert_eq!(err.status_code(), 500);
        let details = err.details().unwrap();
        assert!(details.contains("E: Unable"));
        assert!(details.contains("W: stale cache"));
    }

    #[test]
    fn test_action_error_kinds() {
        assert_eq!(
            ActionError::UnknownAction("x".into()).kind().status_code(),
            404
        );
        let invalid = ActionError::InvalidPayload {
            action: "kill_process".into(),
            reason: "process_name is required".into(),
        };
        assert_eq!(invalid.kind().status_code(), 400);
    }
}
