//! Privileged command execution on a connected session

pub mod classify;
pub mod privilege;
mod stream;

pub use stream::{ExecStream, StreamItem};

use std::time::Duration;

use tokio::sync::mpsc;

use df_core::error::ExecError;
use df_core::{CommandResult, Credential};

use crate::session::RemoteSession;

/// Capacity of the channel between a spawned command and its [`ExecStream`]
const STREAM_EVENT_CAPACITY: usize = 64;

/// Streamed commands (package upgrades) may stay silent for a long time
const STREAM_IDLE_TIMEOUT: Duration = Duration::from_secs(300);

/// Run `script` under sudo and wait for it to finish
///
/// The secret is written to the channel right after invocation. A non-zero
/// exit status is always an error; warnings-only stderr is not.
pub async fn execute(
    session: &RemoteSession,
    script: &str,
    credential: &Credential,
    as_user: Option<&str>,
) -> Result<CommandResult, ExecError> {
    let transport = session.transport()?;
    let command = privilege::wrap(script, as_user);
    let secret = privilege::secret_line(credential);
    let timeout = session.command_timeout();

    let _turn = session.acquire().await;
    tracing::debug!(
        "Executing on {}{}",
        session.host(),
        as_user.map(|u| format!(" as {}", u)).unwrap_or_default()
    );

    let output = tokio::time::timeout(timeout, transport.run(&command, Some(&secret)))
        .await
        .map_err(|_| ExecError::Timeout(timeout.as_secs()))??;

    let result = classify::into_result(&output.stdout, &output.stderr, output.exit_status)?;
    if !result.warnings.is_empty() {
        tracing::debug!("{} warning line(s) from {}", result.warnings.len(), session.host());
    }
    Ok(result)
}

/// Run `script` under sudo and return its output as it arrives
///
/// The session stays reserved until the returned stream is dropped or
/// reaches its sentinel.
pub async fn stream_execute(
    session: &RemoteSession,
    script: &str,
    credential: &Credential,
) -> Result<ExecStream, ExecError> {
    let transport = session.transport()?;
    let command = privilege::wrap(script, None);
    let secret = privilege::secret_line(credential);

    let turn = session.acquire().await;
    let (tx, rx) = mpsc::channel(STREAM_EVENT_CAPACITY);
    transport.spawn(&command, Some(&secret), tx).await?;

    tracing::debug!("Streaming command on {}", session.host());
    Ok(ExecStream::new(
        rx,
        STREAM_IDLE_TIMEOUT.max(session.command_timeout()),
        turn,
    ))
}
