//! Discovery and reachability commands

use anyhow::{Context, Result};

use df_core::control::ControlRequest;
use df_core::{Credential, Host, HostId};

use super::expect_success;
use crate::ipc::FleetClient;
use crate::output::{format_hosts, print_info};

/// Scan the configured range
pub async fn discover_command(client: &mut FleetClient, json: bool) -> Result<()> {
    print_info("Scanning network, this can take a while...");
    let response = expect_success(client.request(ControlRequest::Discover).await?)?;

    let report: Vec<Host> = response
        .data
        .as_ref()
        .and_then(|d| d.get("report"))
        .cloned()
        .map(serde_json::from_value)
        .transpose()
        .context("Unexpected discovery report")?
        .unwrap_or_default();

    if json {
        let hosts: Vec<&HostId> = report.iter().map(|h| &h.id).collect();
        println!("{}", serde_json::to_string_pretty(&hosts)?);
    } else {
        println!("{}", format_hosts(&report));
    }
    Ok(())
}

/// Probe hosts, optionally verifying a login
pub async fn status_command(
    client: &mut FleetClient,
    hosts: Vec<HostId>,
    credential: Option<Credential>,
) -> Result<()> {
    let response = expect_success(
        client
            .request(ControlRequest::CheckStatus { hosts, credential })
            .await?,
    )?;

    let report: Vec<Host> = match response.data {
        Some(data) => serde_json::from_value(data).context("Unexpected status report")?,
        None => Vec::new(),
    };
    println!("{}", format_hosts(&report));
    print_info(&response.message);
    Ok(())
}
