//! Output formatting utilities for the CLI
//!
//! Tables for hosts, tunnels and per-account reports, plus colored
//! status messages.

use std::collections::BTreeMap;

use serde_json::Value;
use tabled::{
    settings::{Style, Width},
    Table, Tabled,
};

use df_core::control::{ControlResponse, TunnelInfo};
use df_core::Host;

/// Format hosts as a table
pub fn format_hosts(hosts: &[Host]) -> String {
    if hosts.is_empty() {
        return "No hosts found".to_string();
    }

    #[derive(Tabled)]
    struct HostRow {
        #[tabled(rename = "HOST")]
        host: String,
        #[tabled(rename = "STATUS")]
        status: String,
        #[tabled(rename = "FOUND BY")]
        method: String,
    }

    let rows: Vec<HostRow> = hosts
        .iter()
        .map(|h| HostRow {
            host: h.id.to_string(),
            status: h.status.to_string(),
            method: h.method.clone().unwrap_or_else(|| "-".to_string()),
        })
        .collect();

    Table::new(rows).with(Style::rounded()).to_string()
}

/// Format tunnels as a table
pub fn format_tunnels(tunnels: &[TunnelInfo]) -> String {
    if tunnels.is_empty() {
        return "No active tunnels".to_string();
    }

    #[derive(Tabled)]
    struct TunnelRow {
        #[tabled(rename = "HOST")]
        host: String,
        #[tabled(rename = "LOCAL")]
        local_port: u16,
        #[tabled(rename = "STATUS")]
        status: String,
        #[tabled(rename = "ENDPOINT")]
        endpoint: String,
    }

    let rows: Vec<TunnelRow> = tunnels
        .iter()
        .map(|t| TunnelRow {
            host: t.host.to_string(),
            local_port: t.local_port,
            status: t.status.to_string(),
            endpoint: viewer_endpoint(t.local_port),
        })
        .collect();

    Table::new(rows).with(Style::rounded()).to_string()
}

/// WebSocket address a browser viewer connects to
pub fn viewer_endpoint(local_port: u16) -> String {
    format!("ws://127.0.0.1:{}", local_port)
}

/// Format backed-up launchers grouped by subdirectory
pub fn format_backups(listing: &BTreeMap<String, Vec<String>>) -> String {
    if listing.is_empty() {
        return "No launchers backed up".to_string();
    }

    let mut output = String::new();
    for (subdirectory, files) in listing {
        output.push_str(&format!("{}/\n", subdirectory));
        for file in files {
            output.push_str(&format!("  {}\n", file));
        }
    }
    output
}

/// Format a per-account report (`{allSucceeded, accounts}`) as a table
///
/// Returns `None` if `data` is not such a report.
pub fn format_account_report(data: &Value) -> Option<String> {
    let accounts = data.get("accounts")?.as_object()?;
    if accounts.is_empty() {
        return Some("No interactive accounts on this host".to_string());
    }

    #[derive(Tabled)]
    struct AccountRow {
        #[tabled(rename = "ACCOUNT")]
        account: String,
        #[tabled(rename = "STATUS")]
        status: String,
        #[tabled(rename = "RESULT")]
        result: String,
    }

    let rows: Vec<AccountRow> = accounts
        .iter()
        .map(|(account, entry)| {
            let result = match entry.get("error").and_then(Value::as_str) {
                Some(error) => error.to_string(),
                None => entry
                    .pointer("/result/message")
                    .and_then(Value::as_str)
                    .unwrap_or("-")
                    .to_string(),
            };
            AccountRow {
                account: account.clone(),
                status: entry
                    .get("status")
                    .map(Value::to_string)
                    .unwrap_or_default(),
                result,
            }
        })
        .collect();

    Some(
        Table::new(rows)
            .with(Style::rounded())
            .with(Width::wrap(100))
            .to_string(),
    )
}

/// Format key/value pairs of a JSON object, one per line
pub fn format_fields(data: &Value) -> Option<String> {
    let object = data.as_object()?;
    let width = object.keys().map(String::len).max().unwrap_or(0);
    Some(
        object
            .iter()
            .map(|(key, value)| {
                let text = value.as_str().map(str::to_string).unwrap_or_else(|| value.to_string());
                format!("{:width$}  {}", key, text, width = width)
            })
            .collect::<Vec<_>>()
            .join("\n"),
    )
}

/// Print a failed response and its details
pub fn print_response_error(response: &ControlResponse) {
    print_error(&format!("[{}] {}", response.status, response.message));
    if let Some(details) = &response.details {
        for line in details.lines() {
            eprintln!("    {}", line);
        }
    }
}

/// Print a success message in green with a checkmark prefix
pub fn print_success(msg: &str) {
    use crossterm::style::{Color, Print, ResetColor, SetForegroundColor};

    let mut stdout = std::io::stdout();
    let _ = crossterm::execute!(
        stdout,
        SetForegroundColor(Color::Green),
        Print("✓ "),
        ResetColor,
        Print(msg),
        Print("\n")
    );
}

/// Print an error message in red with an X prefix
pub fn print_error(msg: &str) {
    use crossterm::style::{Color, Print, ResetColor, SetForegroundColor};

    let mut stderr = std::io::stderr();
    let _ = crossterm::execute!(
        stderr,
        SetForegroundColor(Color::Red),
        Print("✗ "),
        ResetColor,
        Print(msg),
        Print("\n")
    );
}

/// Print a warning message in yellow
pub fn print_warning(msg: &str) {
    use crossterm::style::{Color, Print, ResetColor, SetForegroundColor};

    let mut stderr = std::io::stderr();
    let _ = crossterm::execute!(
        stderr,
        SetForegroundColor(Color::Yellow),
        Print("⚠ "),
        ResetColor,
        Print(msg),
        Print("\n")
    );
}

/// Print an informational message in cyan
pub fn print_info(msg: &str) {
    use crossterm::style::{Color, Print, ResetColor, SetForegroundColor};

    let mut stdout = std::io::stdout();
    let _ = crossterm::execute!(
        stdout,
        SetForegroundColor(Color::Cyan),
        Print("ℹ "),
        ResetColor,
        Print(msg),
        Print("\n")
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use df_core::{HostStatus, TunnelStatus};
    use serde_json::json;

    #[test]
    fn test_empty_tables() {
        assert_eq!(format_hosts(&[]), "No hosts found");
        assert_eq!(format_tunnels(&[]), "No active tunnels");
        assert_eq!(format_backups(&BTreeMap::new()), "No launchers backed up");
    }

    #[test]
    fn test_host_table_lists_status() {
        let hosts = vec![
            Host::new("192.168.0.101").with_status(HostStatus::Online),
            Host::new("192.168.0.102").with_status(HostStatus::AuthError),
        ];
        let table = format_hosts(&hosts);
        assert!(table.contains("192.168.0.101"));
        assert!(table.contains("auth_error"));
    }

    #[test]
    fn test_tunnel_table_has_endpoint() {
        let tunnels = vec![TunnelInfo {
            host: "192.168.0.105".into(),
            local_port: 41000,
            capture_port: 5900,
            bridge_port: 6080,
            status: TunnelStatus::Ready,
            message: "ready".into(),
        }];
        assert!(format_tunnels(&tunnels).contains("ws://127.0.0.1:41000"));
    }

    #[test]
    fn test_account_report_shows_errors() {
        let data = json!({
            "allSucceeded": false,
            "accounts": {
                "ana": {"success": true, "status": 200, "result": {"message": "Message displayed"}},
                "bia": {"success": false, "status": 500, "error": "zenity is not installed"}
            }
        });
        let table = format_account_report(&data).unwrap();
        assert!(table.contains("Message displayed"));
        assert!(table.contains("zenity is not installed"));
        assert!(format_account_report(&json!({"cpu": "3%"})).is_none());
    }

    #[test]
    fn test_backups_grouped_by_directory() {
        let mut listing = BTreeMap::new();
        listing.insert("Desktop".to_string(), vec!["App.desktop".to_string()]);
        assert_eq!(format_backups(&listing), "Desktop/\n  App.desktop\n");
    }
}
