//! Screen-sharing tunnel commands

use anyhow::{Context, Result};
use serde_json::Value;

use df_core::control::{ControlRequest, TunnelInfo};
use df_core::{Credential, HostId};

use super::expect_success;
use crate::ipc::FleetClient;
use crate::output::{format_tunnels, print_error, print_success, viewer_endpoint};

/// Start tunnels; one host gets a single request, several a batch
pub async fn tunnel_start(
    client: &mut FleetClient,
    mut hosts: Vec<HostId>,
    credential: Credential,
) -> Result<()> {
    if hosts.len() == 1 {
        let host = hosts.remove(0);
        let response = expect_success(
            client
                .request(ControlRequest::StartTunnel { host, credential })
                .await?,
        )?;
        let info: TunnelInfo = serde_json::from_value(response.data.unwrap_or_default())
            .context("Unexpected tunnel response")?;
        print_success(&format!(
            "Tunnel to {} ready at {}",
            info.host,
            viewer_endpoint(info.local_port)
        ));
        return Ok(());
    }

    let response = client
        .request(ControlRequest::StartTunnels { hosts, credential })
        .await?;
    let entries = response
        .data
        .as_ref()
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();

    for entry in &entries {
        let host = entry.get("host").and_then(Value::as_str).unwrap_or("?");
        match entry.get("tunnel") {
            Some(tunnel) => {
                let port = tunnel.get("localPort").and_then(Value::as_u64).unwrap_or(0);
                print_success(&format!("{}: ready at ws://127.0.0.1:{}", host, port));
            }
            None => {
                let error = entry.get("error").and_then(Value::as_str).unwrap_or("failed");
                print_error(&format!("{}: {}", host, error));
            }
        }
    }

    if response.success {
        Ok(())
    } else {
        anyhow::bail!("{}", response.message)
    }
}

pub async fn tunnel_stop(client: &mut FleetClient, host: HostId) -> Result<()> {
    let response = expect_success(client.request(ControlRequest::StopTunnel { host }).await?)?;
    print_success(&response.message);
    Ok(())
}

pub async fn tunnel_list(client: &mut FleetClient) -> Result<()> {
    let response = expect_success(client.request(ControlRequest::ListTunnels).await?)?;
    let tunnels: Vec<TunnelInfo> = match response.data {
        Some(data) => serde_json::from_value(data).context("Unexpected tunnel list")?,
        None => Vec::new(),
    };
    println!("{}", format_tunnels(&tunnels));
    Ok(())
}
