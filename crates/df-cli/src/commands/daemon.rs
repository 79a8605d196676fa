//! Orchestrator lifecycle commands

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use tokio_util::sync::CancellationToken;

use df_core::config::FleetConfig;
use df_orchestrator::{ControlServer, FleetState};

use crate::ipc::FleetClient;
use crate::output::{print_info, print_success, print_warning};

/// Start the orchestrator, detached unless `foreground`
pub async fn serve_command(
    config: FleetConfig,
    foreground: bool,
    config_path: Option<&PathBuf>,
) -> Result<()> {
    let address = config.fleet.control_address();

    if !foreground {
        let mut probe = FleetClient::with_address(address.clone());
        if probe.ping().await {
            print_warning(&format!("Orchestrator already running at {}", address));
            return Ok(());
        }

        // Daemonize by re-spawning ourselves
        let exe = std::env::current_exe()?;
        let mut cmd = std::process::Command::new(exe);
        cmd.arg("serve")
            .arg("--foreground")
            .arg("--port")
            .arg(config.fleet.control_port.to_string());
        if let Some(path) = config_path {
            cmd.arg("--config").arg(path);
        }

        let child = cmd
            .stdin(std::process::Stdio::null())
            .stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::null())
            .spawn()?;

        print_success(&format!("Orchestrator started (PID: {})", child.id()));
        return Ok(());
    }

    tracing::info!("deskfleet orchestrator starting...");

    let state = Arc::new(FleetState::new(config));
    let cancel = CancellationToken::new();
    spawn_signal_handler(cancel.clone());

    ControlServer::new(address, state)
        .with_shutdown_token(cancel)
        .run()
        .await?;

    tracing::info!("Orchestrator shutdown complete");
    Ok(())
}

fn spawn_signal_handler(cancel: CancellationToken) {
    tokio::spawn(async move {
        let ctrl_c = tokio::signal::ctrl_c();

        #[cfg(unix)]
        let terminate = async {
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(mut signal) => {
                    signal.recv().await;
                }
                Err(e) => {
                    tracing::warn!("Failed to install SIGTERM handler: {}", e);
                    std::future::pending::<()>().await;
                }
            }
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            _ = ctrl_c => {
                tracing::info!("Received Ctrl+C, initiating shutdown...");
            }
            _ = terminate => {
                tracing::info!("Received SIGTERM, initiating shutdown...");
            }
        }

        cancel.cancel();
    });
}

/// Ask a running orchestrator to stop
pub async fn stop_command(client: &mut FleetClient) -> Result<()> {
    print_info("Stopping orchestrator...");
    match client.shutdown().await {
        Ok(()) => print_success("Orchestrator stopped"),
        Err(e) if e.to_string().contains("Is it running") => {
            print_warning("Orchestrator is not running");
        }
        Err(e) => return Err(e.context("Failed to stop orchestrator")),
    }
    Ok(())
}
