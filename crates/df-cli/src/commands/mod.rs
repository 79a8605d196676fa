//! CLI command implementations

mod action;
mod config;
mod daemon;
mod fleet;
mod tunnel;

pub use action::{actions_command, backups_command, exec_command, parse_payload, stream_command};
pub use config::{config_get, config_init, config_path, config_show};
pub use daemon::{serve_command, stop_command};
pub use fleet::{discover_command, status_command};
pub use tunnel::{tunnel_list, tunnel_start, tunnel_stop};

use anyhow::Result;
use df_core::control::ControlResponse;

use crate::output::{format_account_report, print_response_error};

/// Pass a successful response through; report a failed one and bail
pub(crate) fn expect_success(response: ControlResponse) -> Result<ControlResponse> {
    if response.success {
        return Ok(response);
    }
    print_response_error(&response);
    if let Some(table) = response.data.as_ref().and_then(format_account_report) {
        eprintln!("{}", table);
    }
    anyhow::bail!("Request failed with status {}", response.status)
}
