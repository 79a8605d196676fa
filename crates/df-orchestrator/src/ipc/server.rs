//! Control server implementation
//!
//! One JSON request per line. Each request gets one response line, except
//! `stream`, which gets output lines until a sentinel line.

use std::sync::Arc;

use anyhow::{Context, Result};
use serde::Serialize;
use tokio::io::{AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use df_core::control::{ControlRequest, ControlResponse, StreamLine};

use crate::handler::{handle_request, stream_action};
use crate::state::FleetState;

/// Buffered stream lines between the remote command and a slow client
const STREAM_BUFFER: usize = 64;

/// Control server for CLI communication
///
/// Listens on localhost (127.0.0.1) only - not accessible from network.
pub struct ControlServer {
    /// Address to bind (127.0.0.1:port)
    pub address: String,
    state: Arc<FleetState>,
    shutdown_token: Option<CancellationToken>,
}

impl ControlServer {
    pub fn new(address: String, state: Arc<FleetState>) -> Self {
        Self {
            address,
            state,
            shutdown_token: None,
        }
    }

    /// Set the shutdown token (call before run)
    pub fn with_shutdown_token(mut self, token: CancellationToken) -> Self {
        self.shutdown_token = Some(token);
        self
    }

    /// Serve until the shutdown token is cancelled
    ///
    /// Every registered tunnel is terminated on the way out.
    pub async fn run(&self) -> Result<()> {
        let listener = TcpListener::bind(&self.address)
            .await
            .with_context(|| format!("Failed to bind control server to {}", self.address))?;

        tracing::info!("Control server listening on {}", self.address);

        let token = self.shutdown_token.clone().unwrap_or_default();
        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer_addr)) => {
                        if !peer_addr.ip().is_loopback() {
                            tracing::warn!("Rejected non-localhost connection from {}", peer_addr);
                            continue;
                        }

                        let state = Arc::clone(&self.state);
                        let token = token.clone();
                        tokio::spawn(async move {
                            if let Err(e) = handle_client(stream, state, token).await {
                                tracing::warn!("Control client error: {}", e);
                            }
                        });
                    }
                    Err(e) => {
                        tracing::error!("Failed to accept control connection: {}", e);
                    }
                },
            }
        }

        let stopped = self.state.tunnels.shutdown().await;
        tracing::info!("Control server stopped ({} tunnel(s) terminated)", stopped);
        Ok(())
    }
}

async fn handle_client(
    stream: TcpStream,
    state: Arc<FleetState>,
    shutdown_token: CancellationToken,
) -> Result<()> {
    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);
    let mut line = String::new();

    loop {
        line.clear();
        if reader.read_line(&mut line).await? == 0 {
            break;
        }
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        match serde_json::from_str::<ControlRequest>(trimmed) {
            Ok(ControlRequest::Stream(request)) => {
                let (tx, mut rx) = mpsc::channel::<StreamLine>(STREAM_BUFFER);
                let producer = stream_action(request, &state, tx);
                let consumer = async {
                    while let Some(out) = rx.recv().await {
                        write_line(&mut writer, &out).await?;
                    }
                    Ok::<_, anyhow::Error>(())
                };
                let ((), written) = tokio::join!(producer, consumer);
                written?;
            }
            Ok(request) => {
                let response = handle_request(request, &state, Some(&shutdown_token)).await;
                write_line(&mut writer, &response).await?;
            }
            Err(e) => {
                let response = ControlResponse::failure(400, format!("Invalid request: {}", e));
                write_line(&mut writer, &response).await?;
            }
        }

        if shutdown_token.is_cancelled() {
            break;
        }
    }

    Ok(())
}

async fn write_line<W, T>(writer: &mut W, message: &T) -> Result<()>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    let mut json = serde_json::to_string(message)?;
    json.push('\n');
    writer.write_all(json.as_bytes()).await?;
    writer.flush().await?;
    Ok(())
}
