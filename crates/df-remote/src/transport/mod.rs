//! Seams between the execution engine and the wire
//!
//! [`Dialer`] opens a [`Transport`]; a transport runs commands and hands out
//! a [`RemoteFs`] for file operations. The production implementation lives
//! in [`ssh`]; tests use the in-memory one from [`crate::mock`].

pub mod ssh;

use async_trait::async_trait;
use tokio::sync::mpsc;

use df_core::error::SessionError;
use df_core::{Credential, HostId};

pub use ssh::{SftpFs, SshDialer, SshTransport};

/// Everything a finished command produced
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawOutput {
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    /// `None` when the channel closed without reporting a status
    pub exit_status: Option<u32>,
}

/// Incremental output of a spawned command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecEvent {
    Stdout(Vec<u8>),
    Stderr(Vec<u8>),
    /// Last event of a command
    Exit(Option<u32>),
}

/// One directory entry on the remote side
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteEntry {
    pub name: String,
    pub is_dir: bool,
}

/// An authenticated connection to one host
#[async_trait]
pub trait Transport: Send + Sync {
    /// Run `command`, write `stdin` followed by EOF, and collect all output
    async fn run(&self, command: &str, stdin: Option<&[u8]>) -> Result<RawOutput, SessionError>;

    /// Start `command`, write `stdin`, and forward output through `events`
    ///
    /// Returns once the command is started; the final event is always
    /// [`ExecEvent::Exit`] unless the receiver is dropped first.
    async fn spawn(
        &self,
        command: &str,
        stdin: Option<&[u8]>,
        events: mpsc::Sender<ExecEvent>,
    ) -> Result<(), SessionError>;

    /// Open the file-transfer subsystem
    async fn open_fs(&self) -> Result<Box<dyn RemoteFs>, SessionError>;

    /// Speak the file-transfer protocol to a server started by `command`
    ///
    /// `stdin` is written to the channel before the handshake, so a
    /// privilege wrapper in front of the server can consume it.
    async fn open_fs_via(
        &self,
        command: &str,
        stdin: &[u8],
    ) -> Result<Box<dyn RemoteFs>, SessionError>;

    async fn close(&self) -> Result<(), SessionError>;
}

/// File operations over the file-transfer subsystem
///
/// Paths are absolute POSIX paths on the remote host.
#[async_trait]
pub trait RemoteFs: Send + Sync {
    /// Home directory of the connected account
    async fn home_dir(&self) -> Result<String, SessionError>;

    async fn exists(&self, path: &str) -> Result<bool, SessionError>;

    async fn is_dir(&self, path: &str) -> Result<bool, SessionError>;

    /// Entries directly inside `path`, excluding `.` and `..`
    async fn list_dir(&self, path: &str) -> Result<Vec<RemoteEntry>, SessionError>;

    /// Create `path` if it does not exist yet
    async fn ensure_dir(&self, path: &str) -> Result<(), SessionError>;

    async fn rename(&self, from: &str, to: &str) -> Result<(), SessionError>;
}

/// Opens authenticated transports
#[async_trait]
pub trait Dialer: Send + Sync {
    async fn dial(
        &self,
        host: &HostId,
        credential: &Credential,
    ) -> Result<Box<dyn Transport>, SessionError>;
}

/// Join two POSIX path segments
pub fn join_path(base: &str, name: &str) -> String {
    if name.starts_with('/') {
        name.to_string()
    } else if base.ends_with('/') {
        format!("{}{}", base, name)
    } else {
        format!("{}/{}", base, name)
    }
}

/// Last component of a POSIX path
pub fn base_name(path: &str) -> &str {
    path.trim_end_matches('/')
        .rsplit('/')
        .next()
        .unwrap_or(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_path() {
        assert_eq!(join_path("/home/ana", "Desktop"), "/home/ana/Desktop");
        assert_eq!(join_path("/home/ana/", "Desktop"), "/home/ana/Desktop");
        assert_eq!(join_path("/home/ana", "/srv/x"), "/srv/x");
    }

    #[test]
    fn test_base_name() {
        assert_eq!(base_name("/home/ana/Área de Trabalho"), "Área de Trabalho");
        assert_eq!(base_name("/home/ana/Desktop/"), "Desktop");
        assert_eq!(base_name("Desktop"), "Desktop");
    }
}
