//! russh-backed transport and SFTP file access

use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use russh::client::{self, Config, Handle};
use russh::{ChannelMsg, Disconnect};
use russh_keys::key::PublicKey;
use russh_sftp::client::SftpSession;
use tokio::sync::mpsc;

use df_core::config::{SshConfig, UnknownHostPolicy};
use df_core::error::{ConnectFailure, HostKeyProblem, SessionError};
use df_core::{Credential, HostId};

use super::{Dialer, ExecEvent, RawOutput, RemoteEntry, RemoteFs, Transport};

/// Opens password-authenticated SSH connections
pub struct SshDialer {
    port: u16,
    connect_timeout: Duration,
    known_hosts: PathBuf,
    policy: UnknownHostPolicy,
}

impl SshDialer {
    pub fn new(config: &SshConfig, port: u16) -> Self {
        Self {
            port,
            connect_timeout: config.connect_timeout,
            known_hosts: config.known_hosts(),
            policy: config.unknown_host_policy,
        }
    }
}

#[async_trait]
impl Dialer for SshDialer {
    async fn dial(
        &self,
        host: &HostId,
        credential: &Credential,
    ) -> Result<Box<dyn Transport>, SessionError> {
        let rejected = Arc::new(Mutex::new(None));
        let handler = FleetHandler {
            host: host.to_string(),
            port: self.port,
            known_hosts: self.known_hosts.clone(),
            policy: self.policy,
            rejected: Arc::clone(&rejected),
        };

        tracing::debug!("Connecting to {}:{}", host, self.port);
        let connected = tokio::time::timeout(
            self.connect_timeout,
            client::connect(
                Arc::new(Config::default()),
                (host.as_str(), self.port),
                handler,
            ),
        )
        .await
        .map_err(|_| SessionError::Connection {
            host: host.to_string(),
            kind: ConnectFailure::Timeout,
        })?;

        let mut handle = match connected {
            Ok(handle) => handle,
            Err(e) => {
                let problem = rejected.lock().ok().and_then(|slot| *slot);
                return Err(match problem {
                    Some(problem) => SessionError::HostKey {
                        host: host.to_string(),
                        problem,
                        remediation_attempted: false,
                    },
                    None => classify_connect_error(host, e),
                });
            }
        };

        tracing::debug!("Authenticating as '{}'", credential.username);
        let authenticated = tokio::time::timeout(
            self.connect_timeout,
            handle.authenticate_password(&credential.username, &credential.secret),
        )
        .await
        .map_err(|_| SessionError::Connection {
            host: host.to_string(),
            kind: ConnectFailure::Timeout,
        })?
        .map_err(|e| SessionError::Transport(format!("Authentication error: {}", e)))?;

        if !authenticated {
            return Err(SessionError::Authentication {
                host: host.to_string(),
                username: credential.username.clone(),
            });
        }

        tracing::info!("Connected to {} as {}", host, credential.username);
        Ok(Box::new(SshTransport {
            host: host.to_string(),
            handle,
        }))
    }
}

fn classify_connect_error(host: &HostId, err: russh::Error) -> SessionError {
    let kind = match &err {
        russh::Error::IO(io) => match io.kind() {
            std::io::ErrorKind::ConnectionRefused => Some(ConnectFailure::Refused),
            std::io::ErrorKind::TimedOut => Some(ConnectFailure::Timeout),
            _ if io.to_string().to_lowercase().contains("no route") => {
                Some(ConnectFailure::NoRoute)
            }
            _ if io.to_string().to_lowercase().contains("unreachable") => {
                Some(ConnectFailure::NoRoute)
            }
            _ => None,
        },
        russh::Error::ConnectionTimeout => Some(ConnectFailure::Timeout),
        _ => None,
    };

    match kind {
        Some(kind) => SessionError::Connection {
            host: host.to_string(),
            kind,
        },
        None => SessionError::Transport(format!("Failed to connect to {}: {}", host, err)),
    }
}

/// Verifies host keys against known_hosts
///
/// A rejection is recorded in `rejected` so the dialer can tell a host-key
/// failure apart from other handshake errors.
struct FleetHandler {
    host: String,
    port: u16,
    known_hosts: PathBuf,
    policy: UnknownHostPolicy,
    rejected: Arc<Mutex<Option<HostKeyProblem>>>,
}

impl FleetHandler {
    fn reject(&self, problem: HostKeyProblem) -> bool {
        if let Ok(mut slot) = self.rejected.lock() {
            *slot = Some(problem);
        }
        false
    }
}

#[async_trait]
impl client::Handler for FleetHandler {
    type Error = russh::Error;

    async fn check_server_key(
        &mut self,
        server_public_key: &PublicKey,
    ) -> Result<bool, Self::Error> {
        let known = russh_keys::check_known_hosts_path(
            &self.host,
            self.port,
            server_public_key,
            &self.known_hosts,
        );

        match known {
            Ok(true) => Ok(true),
            Ok(false) => match self.policy {
                UnknownHostPolicy::AcceptNew => {
                    tracing::info!(
                        "Learning host key {} for {}",
                        server_public_key.fingerprint(),
                        self.host
                    );
                    if let Err(e) = russh_keys::learn_known_hosts_path(
                        &self.host,
                        self.port,
                        server_public_key,
                        &self.known_hosts,
                    ) {
                        tracing::warn!("Could not record host key for {}: {}", self.host, e);
                    }
                    Ok(true)
                }
                UnknownHostPolicy::Strict => Ok(self.reject(HostKeyProblem::Unknown)),
            },
            Err(russh_keys::Error::KeyChanged { line }) => {
                tracing::warn!(
                    "Host key for {} differs from known_hosts line {}",
                    self.host,
                    line
                );
                Ok(self.reject(HostKeyProblem::Mismatch))
            }
            Err(e) => {
                tracing::warn!("Could not read known_hosts: {}", e);
                match self.policy {
                    UnknownHostPolicy::AcceptNew => Ok(true),
                    UnknownHostPolicy::Strict => Ok(self.reject(HostKeyProblem::Unknown)),
                }
            }
        }
    }
}

/// One authenticated SSH connection
pub struct SshTransport {
    host: String,
    handle: Handle<FleetHandler>,
}

impl SshTransport {
    async fn open_channel(&self) -> Result<russh::Channel<client::Msg>, SessionError> {
        self.handle
            .channel_open_session()
            .await
            .map_err(|e| SessionError::Dispatch(format!("no channel: {}", e)))
    }

    async fn start(
        &self,
        command: &str,
        stdin: Option<&[u8]>,
    ) -> Result<russh::Channel<client::Msg>, SessionError> {
        let channel = self.open_channel().await?;
        channel
            .exec(true, command)
            .await
            .map_err(|e| SessionError::Dispatch(format!("exec refused: {}", e)))?;

        if let Some(input) = stdin {
            channel
                .data(input)
                .await
                .map_err(|e| SessionError::Transport(format!("Failed to write stdin: {}", e)))?;
        }
        channel
            .eof()
            .await
            .map_err(|e| SessionError::Transport(format!("Failed to close stdin: {}", e)))?;

        Ok(channel)
    }
}

#[async_trait]
impl Transport for SshTransport {
    async fn run(&self, command: &str, stdin: Option<&[u8]>) -> Result<RawOutput, SessionError> {
        let mut channel = self.start(command, stdin).await?;
        let mut output = RawOutput::default();

        // ExitStatus may arrive after Eof; only Close ends the command.
        while let Some(msg) = channel.wait().await {
            match msg {
                ChannelMsg::Data { data } => output.stdout.extend_from_slice(&data),
                ChannelMsg::ExtendedData { data, ext } if ext == 1 => {
                    output.stderr.extend_from_slice(&data)
                }
                ChannelMsg::ExitStatus { exit_status } => output.exit_status = Some(exit_status),
                ChannelMsg::Close => break,
                _ => {}
            }
        }

        Ok(output)
    }

    async fn spawn(
        &self,
        command: &str,
        stdin: Option<&[u8]>,
        events: mpsc::Sender<ExecEvent>,
    ) -> Result<(), SessionError> {
        let mut channel = self.start(command, stdin).await?;

        tokio::spawn(async move {
            let mut exit = None;
            while let Some(msg) = channel.wait().await {
                let event = match msg {
                    ChannelMsg::Data { data } => ExecEvent::Stdout(data.to_vec()),
                    ChannelMsg::ExtendedData { data, ext } if ext == 1 => {
                        ExecEvent::Stderr(data.to_vec())
                    }
                    ChannelMsg::ExitStatus { exit_status } => {
                        exit = Some(exit_status);
                        continue;
                    }
                    ChannelMsg::Close => break,
                    _ => continue,
                };
                if events.send(event).await.is_err() {
                    return;
                }
            }
            let _ = events.send(ExecEvent::Exit(exit)).await;
        });

        Ok(())
    }

    async fn open_fs(&self) -> Result<Box<dyn RemoteFs>, SessionError> {
        let channel = self.open_channel().await?;
        channel
            .request_subsystem(true, "sftp")
            .await
            .map_err(|e| SessionError::Transport(format!("SFTP subsystem refused: {}", e)))?;
        sftp_over(channel).await
    }

    async fn open_fs_via(
        &self,
        command: &str,
        stdin: &[u8],
    ) -> Result<Box<dyn RemoteFs>, SessionError> {
        let channel = self.open_channel().await?;
        channel
            .exec(true, command)
            .await
            .map_err(|e| SessionError::Dispatch(format!("exec refused: {}", e)))?;
        channel
            .data(stdin)
            .await
            .map_err(|e| SessionError::Transport(format!("Failed to write stdin: {}", e)))?;
        sftp_over(channel).await
    }

    async fn close(&self) -> Result<(), SessionError> {
        tracing::debug!("Disconnecting from {}", self.host);
        self.handle
            .disconnect(Disconnect::ByApplication, "closing", "en")
            .await
            .map_err(|e| SessionError::Transport(format!("Disconnect failed: {}", e)))
    }
}

async fn sftp_over(
    channel: russh::Channel<client::Msg>,
) -> Result<Box<dyn RemoteFs>, SessionError> {
    let sftp = SftpSession::new(channel.into_stream())
        .await
        .map_err(|e| SessionError::Transport(format!("SFTP handshake failed: {}", e)))?;
    Ok(Box::new(SftpFs { sftp }))
}

/// File access over the SFTP subsystem
pub struct SftpFs {
    sftp: SftpSession,
}

fn sftp_error(path: &str, err: russh_sftp::client::error::Error) -> SessionError {
    SessionError::Transport(format!("SFTP {}: {}", path, err))
}

#[async_trait]
impl RemoteFs for SftpFs {
    async fn home_dir(&self) -> Result<String, SessionError> {
        self.sftp
            .canonicalize(".")
            .await
            .map_err(|e| sftp_error(".", e))
    }

    async fn exists(&self, path: &str) -> Result<bool, SessionError> {
        self.sftp
            .try_exists(path)
            .await
            .map_err(|e| sftp_error(path, e))
    }

    async fn is_dir(&self, path: &str) -> Result<bool, SessionError> {
        if !self.exists(path).await? {
            return Ok(false);
        }
        let meta = self
            .sftp
            .metadata(path)
            .await
            .map_err(|e| sftp_error(path, e))?;
        Ok(meta.is_dir())
    }

    async fn list_dir(&self, path: &str) -> Result<Vec<RemoteEntry>, SessionError> {
        let entries = self
            .sftp
            .read_dir(path)
            .await
            .map_err(|e| sftp_error(path, e))?;

        Ok(entries
            .filter(|entry| entry.file_name() != "." && entry.file_name() != "..")
            .map(|entry| RemoteEntry {
                is_dir: entry.file_type().is_dir(),
                name: entry.file_name(),
            })
            .collect())
    }

    async fn ensure_dir(&self, path: &str) -> Result<(), SessionError> {
        if self.is_dir(path).await? {
            return Ok(());
        }
        self.sftp
            .create_dir(path)
            .await
            .map_err(|e| sftp_error(path, e))
    }

    async fn rename(&self, from: &str, to: &str) -> Result<(), SessionError> {
        self.sftp
            .rename(from, to)
            .await
            .map_err(|e| sftp_error(from, e))
    }
}
