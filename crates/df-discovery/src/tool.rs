//! Running external discovery tools

use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;

use crate::strategy::StrategyUnavailable;

/// Run `program` and return its stdout
///
/// A missing binary, a failed exit or a timeout all mean the tool is
/// unavailable. The child is killed if the deadline passes.
pub(crate) async fn run_tool(
    program: &str,
    args: &[String],
    timeout: Duration,
) -> Result<String, StrategyUnavailable> {
    let mut command = Command::new(program);
    command
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let child = command.spawn().map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => StrategyUnavailable::ToolMissing(program.to_string()),
        _ => StrategyUnavailable::ToolFailed {
            tool: program.to_string(),
            reason: e.to_string(),
        },
    })?;

    let output = tokio::time::timeout(timeout, child.wait_with_output())
        .await
        .map_err(|_| StrategyUnavailable::Timeout(program.to_string()))?
        .map_err(|e| StrategyUnavailable::ToolFailed {
            tool: program.to_string(),
            reason: e.to_string(),
        })?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(StrategyUnavailable::ToolFailed {
            tool: program.to_string(),
            reason: format!("{}: {}", output.status, stderr.trim()),
        });
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}
