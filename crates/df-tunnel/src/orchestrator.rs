//! Tunnel start, readiness detection and teardown

use std::net::{Ipv4Addr, TcpListener};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use futures::StreamExt;
use tokio::io::AsyncRead;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::codec::{FramedRead, LinesCodec};

use df_core::config::{SignatureClass, TunnelConfig};
use df_core::control::TunnelInfo;
use df_core::{Credential, HostId, TunnelStatus};

use crate::error::TunnelError;
use crate::launcher::{LaunchRequest, TunnelLauncher};
use crate::process::TunnelChild;
use crate::registry::{TunnelEntry, TunnelRegistry};
use crate::signature::SignatureTable;

const OUTPUT_QUEUE_CAPACITY: usize = 256;

/// Longest line kept from the child; longer lines are dropped
const MAX_LINE_LENGTH: usize = 8 * 1024;

/// Starts and tracks at most one tunnel per host
pub struct TunnelOrchestrator {
    registry: Arc<TunnelRegistry>,
    launcher: Arc<dyn TunnelLauncher>,
    signatures: SignatureTable,
    ready_timeout: Duration,
    grace_period: Duration,
    capture_port: u16,
    bridge_port: u16,
    sample_chars: usize,
}

impl TunnelOrchestrator {
    pub fn new(
        config: &TunnelConfig,
        launcher: Arc<dyn TunnelLauncher>,
        registry: Arc<TunnelRegistry>,
    ) -> Self {
        Self {
            registry,
            launcher,
            signatures: SignatureTable::with_extra(&config.extra_signatures),
            ready_timeout: config.ready_timeout,
            grace_period: config.grace_period,
            capture_port: config.capture_port,
            bridge_port: config.bridge_port,
            sample_chars: config.sample_chars,
        }
    }

    pub fn registry(&self) -> &Arc<TunnelRegistry> {
        &self.registry
    }

    /// Start a tunnel to `host`, replacing any existing one
    ///
    /// Returns once a readiness signature is seen, a failure signature is
    /// seen, or the readiness timeout passes. On failure the child is
    /// terminated and unregistered before returning.
    pub async fn start(&self, host: &HostId, credential: &Credential) -> Result<TunnelInfo, TunnelError> {
        if let Some(mut previous) = self.registry.remove(host).await {
            tracing::info!("Replacing existing tunnel to {}", host);
            previous.child.terminate(self.grace_period).await;
        }

        let local_port = free_local_port()?;
        let request = LaunchRequest {
            host: host.clone(),
            credential: credential.clone(),
            local_port,
            capture_port: self.capture_port,
            bridge_port: self.bridge_port,
        };

        let mut command = self.launcher.command(&request);
        command
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        let mut child = command
            .spawn()
            .map_err(|e| TunnelError::Spawn(e.to_string()))?;

        let (tx, mut rx) = mpsc::channel(OUTPUT_QUEUE_CAPACITY);
        if let Some(stdout) = child.stdout.take() {
            spawn_reader(stdout, tx.clone());
        }
        if let Some(stderr) = child.stderr.take() {
            spawn_reader(stderr, tx.clone());
        }
        drop(tx);

        let generation = self.registry.next_generation();
        let entry = TunnelEntry {
            generation,
            local_port,
            capture_port: self.capture_port,
            bridge_port: self.bridge_port,
            status: TunnelStatus::Pending,
            message: "Starting".to_string(),
            child: TunnelChild::new(child),
        };
        if let Some(mut displaced) = self.registry.insert(host.clone(), entry).await {
            tracing::debug!("Concurrent start for {} displaced an older tunnel", host);
            displaced.child.terminate(self.grace_period).await;
        }
        tracing::debug!("Tunnel to {} spawned on local port {}", host, local_port);

        let (class, captured, expired) = self.await_signature(&mut rx).await;
        match class {
            Some(SignatureClass::Ready) => {
                let message = format!("Screen sharing ready on local port {}", local_port);
                self.registry
                    .mark(host, generation, TunnelStatus::Ready, message.clone())
                    .await;
                tracing::info!("Tunnel to {} ready on port {}", host, local_port);
                Ok(TunnelInfo {
                    host: host.clone(),
                    local_port,
                    capture_port: self.capture_port,
                    bridge_port: self.bridge_port,
                    status: TunnelStatus::Ready,
                    message,
                })
            }
            other => {
                let sample = truncate(&captured, self.sample_chars);
                let err = other
                    .and_then(|class| TunnelError::from_class(class, host.as_str()))
                    .unwrap_or_else(|| {
                        if expired {
                            TunnelError::Timeout {
                                host: host.to_string(),
                                seconds: self.ready_timeout.as_secs(),
                                sample,
                            }
                        } else {
                            TunnelError::Exited {
                                host: host.to_string(),
                                sample,
                            }
                        }
                    });

                if let Some(mut entry) = self.registry.remove_generation(host, generation).await {
                    entry.child.terminate(self.grace_period).await;
                }
                tracing::warn!("Tunnel to {} failed: {}", host, err);
                Err(err)
            }
        }
    }

    /// Wait for the first line matching a signature
    ///
    /// Returns the class, everything captured, and whether the deadline
    /// expired. When no line matched, the whole capture is scanned once more.
    async fn await_signature(
        &self,
        rx: &mut mpsc::Receiver<String>,
    ) -> (Option<SignatureClass>, String, bool) {
        let deadline = Instant::now() + self.ready_timeout;
        let mut captured = String::new();

        let expired = loop {
            match tokio::time::timeout_at(deadline, rx.recv()).await {
                Ok(Some(line)) => {
                    tracing::trace!("tunnel: {}", line);
                    captured.push_str(&line);
                    captured.push('\n');
                    if let Some(class) = self.signatures.classify(&line) {
                        return (Some(class), captured, false);
                    }
                }
                Ok(None) => break false,
                Err(_) => break true,
            }
        };

        let class = self.signatures.scan(&captured);
        (class, captured, expired)
    }

    /// Start tunnels to every host concurrently, one result per host
    pub async fn start_many(
        &self,
        hosts: &[HostId],
        credential: &Credential,
    ) -> Vec<(HostId, Result<TunnelInfo, TunnelError>)> {
        let starts = hosts.iter().map(|host| async move {
            let result = self.start(host, credential).await;
            (host.clone(), result)
        });
        join_all(starts).await
    }

    /// Tear down the tunnel to `host`; false if there was none
    pub async fn stop(&self, host: &HostId) -> bool {
        match self.registry.remove(host).await {
            Some(mut entry) => {
                entry.child.terminate(self.grace_period).await;
                tracing::info!("Tunnel to {} stopped", host);
                true
            }
            None => false,
        }
    }

    pub async fn list(&self) -> Vec<TunnelInfo> {
        self.registry.list().await
    }

    /// Terminate every tunnel
    pub async fn shutdown(&self) -> usize {
        let entries = self.registry.drain().await;
        let count = entries.len();
        let grace = self.grace_period;
        join_all(
            entries
                .into_iter()
                .map(|(_, mut entry)| async move { entry.child.terminate(grace).await }),
        )
        .await;
        if count > 0 {
            tracing::info!("Terminated {} tunnel(s)", count);
        }
        count
    }
}

/// Forward each line of `stream` to `tx` until the stream ends
///
/// Keeps draining after the receiver is gone so the child never blocks on
/// a full pipe.
fn spawn_reader<R>(stream: R, tx: mpsc::Sender<String>)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = FramedRead::new(stream, LinesCodec::new_with_max_length(MAX_LINE_LENGTH));
        while let Some(line) = lines.next().await {
            match line {
                Ok(line) => {
                    if !tx.is_closed() {
                        let _ = tx.send(line).await;
                    }
                }
                Err(e) => tracing::debug!("Skipping unreadable tunnel output: {}", e),
            }
        }
    });
}

/// A port the OS considers free right now
fn free_local_port() -> Result<u16, TunnelError> {
    let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0))
        .map_err(|e| TunnelError::PortAllocation(e.to_string()))?;
    listener
        .local_addr()
        .map(|addr| addr.port())
        .map_err(|e| TunnelError::PortAllocation(e.to_string()))
}

/// First `max` characters of `text`, marked when cut
fn truncate(text: &str, max: usize) -> String {
    let trimmed = text.trim();
    match trimmed.char_indices().nth(max) {
        Some((idx, _)) => format!("{}...", &trimmed[..idx]),
        None => trimmed.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_respects_char_boundaries() {
        assert_eq!(truncate("Área de Trabalho", 4), "Área...");
        assert_eq!(truncate("  short \n", 20), "short");
    }

    #[test]
    fn test_free_local_port_is_nonzero() {
        assert_ne!(free_local_port().unwrap(), 0);
    }
}
