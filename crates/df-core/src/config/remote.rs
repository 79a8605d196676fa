//! SSH, backup and action-template settings

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use super::serde_utils::duration_secs;
use crate::types::{ActionScope, ReplyMode};

/// What to do when a host presents a key not yet in known_hosts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnknownHostPolicy {
    /// Record the key on first contact
    #[default]
    AcceptNew,
    /// Refuse with a host-key error
    Strict,
}

/// Remote-shell connection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SshConfig {
    #[serde(with = "duration_secs")]
    pub connect_timeout: Duration,

    #[serde(with = "duration_secs")]
    pub command_timeout: Duration,

    /// Fingerprint cache; `None` means `~/.ssh/known_hosts`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub known_hosts_path: Option<PathBuf>,

    pub unknown_host_policy: UnknownHostPolicy,

    /// Key-purge helper invoked during host-key reconciliation
    pub keygen_program: String,
}

impl Default for SshConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            command_timeout: Duration::from_secs(20),
            known_hosts_path: None,
            unknown_host_policy: UnknownHostPolicy::AcceptNew,
            keygen_program: "ssh-keygen".to_string(),
        }
    }
}

impl SshConfig {
    /// Resolved known_hosts location
    pub fn known_hosts(&self) -> PathBuf {
        self.known_hosts_path.clone().unwrap_or_else(|| {
            dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".ssh")
                .join("known_hosts")
        })
    }
}

/// Launcher backup settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackupConfig {
    /// Directory under each home holding disabled launchers
    pub root_dir: String,

    /// Launcher file extension, including the dot
    pub launcher_extension: String,

    /// Desktop directory names tried in order when the user-directory query fails
    pub desktop_names: Vec<String>,

    /// SFTP server binaries tried in order when moving files as an account
    pub file_server_paths: Vec<String>,
}

impl Default for BackupConfig {
    fn default() -> Self {
        Self {
            root_dir: "disabled_launchers".to_string(),
            launcher_extension: ".desktop".to_string(),
            desktop_names: vec![
                "Área de Trabalho".to_string(),
                "Desktop".to_string(),
                "Área de trabalho".to_string(),
                "Escritorio".to_string(),
            ],
            file_server_paths: vec![
                "/usr/lib/openssh/sftp-server".to_string(),
                "/usr/libexec/openssh/sftp-server".to_string(),
                "/usr/lib/ssh/sftp-server".to_string(),
            ],
        }
    }
}

/// A static command template registered from configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionTemplate {
    pub command: String,
    #[serde(default)]
    pub scope: ActionScope,
    #[serde(default)]
    pub reply: ReplyMode,
}
