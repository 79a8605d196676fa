//! Request dispatch
//!
//! Every remote request opens its own session and closes it before the
//! response is sent. Failures are mapped to a status-coded response here;
//! nothing below this layer knows about the wire format.

use futures::future::join_all;
use serde_json::json;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use df_core::control::{ActionRequest, ControlRequest, ControlResponse, StreamLine};
use df_core::error::{ErrorKind, SessionError};
use df_core::{Credential, FleetError, Host, HostId, HostStatus};
use df_discovery::probe_status;
use df_remote::{ActionOutcome, StreamItem};
use df_tunnel::TunnelError;

use crate::state::FleetState;

/// Answer one non-streaming request
pub async fn handle_request(
    request: ControlRequest,
    state: &FleetState,
    shutdown_token: Option<&CancellationToken>,
) -> ControlResponse {
    match request {
        ControlRequest::Ping => ControlResponse::ok("pong"),

        ControlRequest::Discover => {
            let report = state.discover().await;
            let hosts: Vec<&HostId> = report.iter().map(|h| &h.id).collect();
            ControlResponse::with_data(
                format!("Found {} host(s)", report.len()),
                &json!({ "hosts": hosts, "report": report }),
            )
        }

        ControlRequest::CheckStatus { hosts, credential } => {
            let report = check_status(state, &hosts, credential.as_ref()).await;
            let online = report
                .iter()
                .filter(|h| h.status == HostStatus::Online)
                .count();
            ControlResponse::with_data(
                format!("{} of {} host(s) online", online, report.len()),
                &report,
            )
        }

        ControlRequest::Execute(request) => execute(state, request).await,

        ControlRequest::Stream(_) => ControlResponse::failure(
            ErrorKind::InvalidRequest.status_code(),
            "Stream requests are answered line by line",
        ),

        ControlRequest::ListBackups {
            host,
            credential,
            account,
        } => list_backups(state, &host, &credential, account.as_deref()).await,

        ControlRequest::StartTunnel { host, credential } => {
            match state.tunnels.start(&host, &credential).await {
                Ok(info) => ControlResponse::with_data(info.message.clone(), &info),
                Err(e) => tunnel_failure(&e),
            }
        }

        ControlRequest::StartTunnels { hosts, credential } => {
            start_tunnels(state, &hosts, &credential).await
        }

        ControlRequest::StopTunnel { host } => {
            if state.tunnels.stop(&host).await {
                ControlResponse::ok(format!("Tunnel to {} stopped", host))
            } else {
                ControlResponse::failure(
                    ErrorKind::UnknownAction.status_code(),
                    format!("No tunnel for {}", host),
                )
            }
        }

        ControlRequest::ListTunnels => {
            let tunnels = state.tunnels.list().await;
            ControlResponse::with_data(format!("{} tunnel(s)", tunnels.len()), &tunnels)
        }

        ControlRequest::Shutdown => {
            let stopped = state.tunnels.shutdown().await;
            tracing::info!("Shutdown requested, {} tunnel(s) stopped", stopped);
            if let Some(token) = shutdown_token {
                token.cancel();
            }
            ControlResponse::ok("Shutting down")
        }
    }
}

/// Probe reachability; with a credential, online hosts also get a login attempt
async fn check_status(
    state: &FleetState,
    hosts: &[HostId],
    credential: Option<&Credential>,
) -> Vec<Host> {
    let report = probe_status(
        hosts,
        state.config.network.admin_port,
        state.config.network.probe_timeout,
    )
    .await;

    let Some(credential) = credential else {
        return report;
    };

    join_all(report.into_iter().map(|host| async move {
        if host.status != HostStatus::Online {
            return host;
        }
        match state.open_session(&host.id, credential).await {
            Ok(mut session) => {
                session.close().await;
                host
            }
            Err(SessionError::Authentication { .. }) => host.with_status(HostStatus::AuthError),
            Err(e) => {
                tracing::debug!("Credential check on {} failed: {}", host.id, e);
                host
            }
        }
    }))
    .await
}

async fn execute(state: &FleetState, request: ActionRequest) -> ControlResponse {
    let action = match state.actions.resolve(&request.action) {
        Ok(action) => action,
        Err(e) => return ControlResponse::from_error(&FleetError::from(e)),
    };

    let mut session = match state.open_session(&request.host, &request.credential).await {
        Ok(session) => session,
        Err(e) => return ControlResponse::from_error(&FleetError::from(e)),
    };

    tracing::info!("Running {} on {}", action.name, request.host);
    let outcome = state
        .runner
        .run(&session, &request.credential, action, &request.payload)
        .await;
    session.close().await;

    match outcome {
        Ok(ActionOutcome::System(output)) => {
            ControlResponse::with_data(output.message.clone(), &output)
        }
        Ok(ActionOutcome::PerAccount(result)) => {
            let total = result.len();
            let failures: Vec<String> = result
                .failed()
                .map(|(account, e)| format!("{}: {}", account, e))
                .collect();
            let report = serde_json::to_value(result.report()).ok();

            if failures.is_empty() {
                ControlResponse {
                    data: report,
                    ..ControlResponse::ok(format!(
                        "{} completed for {} account(s)",
                        action.name, total
                    ))
                }
            } else {
                let err = FleetError::PartialFailure {
                    failed: failures.len(),
                    total,
                };
                ControlResponse {
                    data: report,
                    ..ControlResponse::from_error(&err).with_details(failures.join("\n"))
                }
            }
        }
        Err(e) => {
            tracing::warn!("{} on {} failed: {}", action.name, request.host, e);
            ControlResponse::from_error(&e)
        }
    }
}

async fn list_backups(
    state: &FleetState,
    host: &HostId,
    credential: &Credential,
    account: Option<&str>,
) -> ControlResponse {
    let mut session = match state.open_session(host, credential).await {
        Ok(session) => session,
        Err(e) => return ControlResponse::from_error(&FleetError::from(e)),
    };
    let listing = state
        .runner
        .backup()
        .list_backups(&session, credential, account)
        .await;
    session.close().await;

    match listing {
        Ok(listing) => {
            let count: usize = listing.values().map(Vec::len).sum();
            ControlResponse::with_data(format!("{} launcher(s) backed up", count), &listing)
        }
        Err(e) => ControlResponse::from_error(&FleetError::from(e)),
    }
}

fn tunnel_failure(err: &TunnelError) -> ControlResponse {
    let response = ControlResponse::failure(err.kind().status_code(), err.to_string());
    match err.hint() {
        Some(hint) => response.with_details(hint),
        None => response,
    }
}

async fn start_tunnels(
    state: &FleetState,
    hosts: &[HostId],
    credential: &Credential,
) -> ControlResponse {
    let results = state.tunnels.start_many(hosts, credential).await;
    let total = results.len();
    let mut failed = 0;

    let entries: Vec<serde_json::Value> = results
        .iter()
        .map(|(host, result)| match result {
            Ok(info) => json!({ "host": host, "success": true, "status": 200, "tunnel": info }),
            Err(e) => {
                failed += 1;
                json!({
                    "host": host,
                    "success": false,
                    "status": e.kind().status_code(),
                    "error": e.to_string(),
                })
            }
        })
        .collect();

    if failed == 0 {
        ControlResponse::with_data(format!("{} tunnel(s) ready", total), &entries)
    } else {
        let err = FleetError::PartialFailure { failed, total };
        ControlResponse {
            data: Some(serde_json::Value::Array(entries)),
            ..ControlResponse::from_error(&err)
        }
    }
}

/// Relay a command's output as [`StreamLine`]s, ending with one sentinel
///
/// Stops early if the receiver goes away. The session is closed in every
/// case.
pub async fn stream_action(
    request: ActionRequest,
    state: &FleetState,
    lines: mpsc::Sender<StreamLine>,
) {
    let action = match state.actions.resolve(&request.action) {
        Ok(action) => action,
        Err(e) => {
            let _ = lines.send(error_line(&FleetError::from(e))).await;
            return;
        }
    };

    let mut session = match state.open_session(&request.host, &request.credential).await {
        Ok(session) => session,
        Err(e) => {
            let _ = lines.send(error_line(&FleetError::from(e))).await;
            return;
        }
    };

    match state
        .runner
        .stream(&session, &request.credential, action, &request.payload)
        .await
    {
        Ok(mut stream) => {
            let mut terminated = false;
            while let Some(item) = stream.next_item().await {
                let line = match item {
                    Ok(StreamItem::Chunk(text)) => StreamLine::Chunk { text },
                    Ok(StreamItem::Exit(code)) => StreamLine::Exit { code },
                    Err(e) => StreamLine::Error {
                        message: e.to_string(),
                        status: e.kind().status_code(),
                    },
                };
                let sentinel = line.is_sentinel();
                if lines.send(line).await.is_err() {
                    tracing::debug!("Stream client for {} went away", request.host);
                    terminated = true;
                    break;
                }
                if sentinel {
                    terminated = true;
                    break;
                }
            }
            if !terminated {
                let _ = lines
                    .send(StreamLine::Error {
                        message: "Stream ended without an exit status".to_string(),
                        status: ErrorKind::Transport.status_code(),
                    })
                    .await;
            }
        }
        Err(e) => {
            let _ = lines.send(error_line(&e)).await;
        }
    }

    session.close().await;
}

fn error_line(err: &FleetError) -> StreamLine {
    StreamLine::Error {
        message: err.to_string(),
        status: err.status_code(),
    }
}
