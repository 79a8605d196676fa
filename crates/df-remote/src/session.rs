//! One authenticated session against one host
//!
//! A session serves a single logical operation and is never pooled. It
//! moves through `Disconnected -> Connecting -> Connected -> Closed`;
//! `Closed` is terminal and any further use fails without touching the
//! network.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, OwnedMutexGuard};

use df_core::error::{HostKeyProblem, SessionError};
use df_core::{Credential, HostId};

use crate::known_hosts::KeyPurger;
use crate::transport::{Dialer, RemoteFs, Transport};

/// Lifecycle of a [`RemoteSession`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Connecting,
    Connected,
    Closed,
}

/// Connection to a single host bound to one credential
pub struct RemoteSession {
    host: HostId,
    username: String,
    state: SessionState,
    transport: Option<Box<dyn Transport>>,
    /// Serializes command execution on this session
    gate: Arc<Mutex<()>>,
    command_timeout: Duration,
    remediations: u32,
}

impl RemoteSession {
    /// Create a disconnected session
    pub fn new(host: HostId, username: impl Into<String>, command_timeout: Duration) -> Self {
        Self {
            host,
            username: username.into(),
            state: SessionState::Disconnected,
            transport: None,
            gate: Arc::new(Mutex::new(())),
            command_timeout,
            remediations: 0,
        }
    }

    /// Create and connect a session in one step
    pub async fn open(
        host: HostId,
        credential: &Credential,
        dialer: &dyn Dialer,
        purger: &dyn KeyPurger,
        command_timeout: Duration,
    ) -> Result<Self, SessionError> {
        let mut session = Self::new(host, credential.username.clone(), command_timeout);
        session.connect(dialer, purger, credential).await?;
        Ok(session)
    }

    /// Establish the transport
    ///
    /// A host-key mismatch triggers one purge of the cached fingerprint and
    /// one retry. If the retry fails too, the original error is returned
    /// with `remediation_attempted` set.
    pub async fn connect(
        &mut self,
        dialer: &dyn Dialer,
        purger: &dyn KeyPurger,
        credential: &Credential,
    ) -> Result<(), SessionError> {
        match self.state {
            SessionState::Closed => {
                return Err(SessionError::Transport("Session is closed".to_string()))
            }
            SessionState::Connected => return Ok(()),
            _ => {}
        }

        self.state = SessionState::Connecting;

        let first = dialer.dial(&self.host, credential).await;
        let transport = match first {
            Ok(transport) => transport,
            Err(SessionError::HostKey {
                host,
                problem: HostKeyProblem::Mismatch,
                ..
            }) => {
                tracing::warn!("Host key mismatch for {}, purging cached key", host);
                self.remediations += 1;
                if let Err(e) = purger.purge(&self.host).await {
                    tracing::warn!("Key purge for {} failed: {:#}", host, e);
                }

                match dialer.dial(&self.host, credential).await {
                    Ok(transport) => transport,
                    Err(retry_err) => {
                        tracing::warn!("Retry after key purge failed: {}", retry_err);
                        self.state = SessionState::Disconnected;
                        return Err(SessionError::HostKey {
                            host,
                            problem: HostKeyProblem::Mismatch,
                            remediation_attempted: true,
                        });
                    }
                }
            }
            Err(e) => {
                self.state = SessionState::Disconnected;
                return Err(e);
            }
        };

        self.transport = Some(transport);
        self.state = SessionState::Connected;
        Ok(())
    }

    pub fn host(&self) -> &HostId {
        &self.host
    }

    /// Account the session authenticated as
    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Number of host-key remediations performed while connecting
    pub fn remediation_attempts(&self) -> u32 {
        self.remediations
    }

    pub fn command_timeout(&self) -> Duration {
        self.command_timeout
    }

    /// Borrow the transport, failing fast unless connected
    pub(crate) fn transport(&self) -> Result<&dyn Transport, SessionError> {
        match (self.state, &self.transport) {
            (SessionState::Connected, Some(transport)) => Ok(transport.as_ref()),
            (SessionState::Closed, _) => {
                Err(SessionError::Transport("Session is closed".to_string()))
            }
            _ => Err(SessionError::Transport("Session is not connected".to_string())),
        }
    }

    /// Wait for exclusive use of the session
    pub(crate) async fn acquire(&self) -> OwnedMutexGuard<()> {
        Arc::clone(&self.gate).lock_owned().await
    }

    /// Open the file-transfer subsystem
    pub async fn file_system(&self) -> Result<Box<dyn RemoteFs>, SessionError> {
        self.transport()?.open_fs().await
    }

    /// File access through a server started by `command`, e.g. under sudo
    pub async fn file_system_via(
        &self,
        command: &str,
        stdin: &[u8],
    ) -> Result<Box<dyn RemoteFs>, SessionError> {
        self.transport()?.open_fs_via(command, stdin).await
    }

    /// Close the session; later calls fail fast
    pub async fn close(&mut self) {
        if let Some(transport) = self.transport.take() {
            if let Err(e) = transport.close().await {
                tracing::debug!("Error closing session to {}: {}", self.host, e);
            }
        }
        self.state = SessionState::Closed;
    }
}

impl std::fmt::Debug for RemoteSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteSession")
            .field("host", &self.host)
            .field("username", &self.username)
            .field("state", &self.state)
            .finish()
    }
}
