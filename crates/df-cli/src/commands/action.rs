//! Action commands: exec, stream, backups

use std::collections::BTreeMap;
use std::io::Write;

use anyhow::{Context, Result};
use serde_json::{Map, Value};

use df_core::config::FleetConfig;
use df_core::control::{ActionRequest, ControlRequest, StreamLine};
use df_core::{ActionScope, Credential, HostId, ReplyMode};
use df_remote::ActionRegistry;

use super::expect_success;
use crate::ipc::FleetClient;
use crate::output::{
    format_account_report, format_backups, format_fields, print_error, print_success,
    print_warning,
};

/// Build an action payload from `--payload` JSON and `-a key=value` pairs
///
/// Pair values that parse as JSON keep their type; anything else is a
/// string. Pairs override keys of the JSON object.
pub fn parse_payload(json: Option<&str>, pairs: &[String]) -> Result<Value> {
    let mut object = match json {
        Some(text) => match serde_json::from_str(text).context("Invalid --payload JSON")? {
            Value::Object(map) => map,
            _ => anyhow::bail!("--payload must be a JSON object"),
        },
        None => Map::new(),
    };

    for pair in pairs {
        let (key, raw) = pair
            .split_once('=')
            .with_context(|| format!("Expected key=value, got {:?}", pair))?;
        let value = serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()));
        object.insert(key.trim().to_string(), value);
    }

    Ok(Value::Object(object))
}

/// Run an action and print its aggregate result
pub async fn exec_command(
    client: &mut FleetClient,
    host: HostId,
    credential: Credential,
    action: String,
    payload: Value,
) -> Result<()> {
    let request = ActionRequest {
        host,
        credential,
        action,
        payload,
    };
    let response = expect_success(client.request(ControlRequest::Execute(request)).await?)?;

    print_success(&response.message);
    let Some(data) = response.data else {
        return Ok(());
    };

    if let Some(table) = format_account_report(&data) {
        println!("{}", table);
        return Ok(());
    }

    if let Some(warnings) = data.get("warnings").and_then(Value::as_array) {
        for warning in warnings.iter().filter_map(Value::as_str) {
            print_warning(warning);
        }
    }
    if let Some(fields) = data.get("data").and_then(format_fields) {
        println!("{}", fields);
    }
    Ok(())
}

/// Run a command action and print its output as it arrives
pub async fn stream_command(
    client: &mut FleetClient,
    host: HostId,
    credential: Credential,
    action: String,
    payload: Value,
) -> Result<()> {
    let request = ActionRequest {
        host,
        credential,
        action,
        payload,
    };

    let mut stdout = std::io::stdout();
    let sentinel = client
        .stream(request, |line| {
            let _ = writeln!(stdout, "{}", line);
            let _ = stdout.flush();
        })
        .await?;

    match sentinel {
        StreamLine::Exit { code: 0 } => {
            print_success("Command finished");
            Ok(())
        }
        StreamLine::Exit { code } => anyhow::bail!("Command exited with code {}", code),
        StreamLine::Error { message, status } => {
            print_error(&format!("[{}] {}", status, message));
            anyhow::bail!("Stream failed with status {}", status)
        }
        StreamLine::Chunk { .. } => anyhow::bail!("Stream ended without a sentinel"),
    }
}

/// List disabled launchers on a host
pub async fn backups_command(
    client: &mut FleetClient,
    host: HostId,
    credential: Credential,
    account: Option<String>,
) -> Result<()> {
    let response = expect_success(
        client
            .request(ControlRequest::ListBackups {
                host,
                credential,
                account,
            })
            .await?,
    )?;

    let listing: BTreeMap<String, Vec<String>> = match response.data {
        Some(data) => serde_json::from_value(data).context("Unexpected backup listing")?,
        None => BTreeMap::new(),
    };
    print!("{}", format_backups(&listing));
    println!();
    Ok(())
}

/// Print the actions the orchestrator would accept with this config
pub fn actions_command(config: &FleetConfig) -> Result<()> {
    let registry = ActionRegistry::with_templates(&config.actions);
    for name in registry.names() {
        let action = registry.resolve(name)?;
        let scope = match action.scope {
            ActionScope::System => "system",
            ActionScope::PerAccount => "per-account",
        };
        let reply = match action.reply {
            ReplyMode::AwaitReply => "",
            ReplyMode::FireAndForget => " (fire-and-forget)",
        };
        println!("{:20} {}{}", name, scope, reply);
    }
    Ok(())
}
