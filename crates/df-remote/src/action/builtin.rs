//! Built-in action catalog

use serde_json::Value;

use df_core::error::ActionError;
use df_core::{ActionScope, ReplyMode};

use super::system_info::SYSTEM_INFO_SCRIPT;
use super::{Action, ActionKind, CommandProducer, OutputDecoder};
use crate::exec::privilege::quote;

const SLEEP_TARGETS: &str = "sleep.target suspend.target hibernate.target hybrid-sleep.target";

/// Graphical environment of the account the script runs as
const X11_ENV: &str = r#"export DISPLAY="${DISPLAY:-:0}"
export XAUTHORITY="${XAUTHORITY:-$HOME/.Xauthority}"
"#;

const UPDATE_SYSTEM_SCRIPT: &str = r#"set -e
if command -v apt-get > /dev/null 2>&1; then
    export DEBIAN_FRONTEND=noninteractive
    apt-get update
    apt-get -y upgrade
elif command -v dnf > /dev/null 2>&1; then
    dnf -y upgrade
elif command -v yum > /dev/null 2>&1; then
    yum -y update
elif command -v pacman > /dev/null 2>&1; then
    pacman -Syu --noconfirm
else
    echo "No supported package manager found" >&2
    exit 1
fi
echo "System update finished"
"#;

fn command(
    name: &str,
    scope: ActionScope,
    reply: ReplyMode,
    producer: CommandProducer,
    decoder: OutputDecoder,
) -> Action {
    Action {
        name: name.to_string(),
        scope,
        reply,
        kind: ActionKind::Command { producer, decoder },
    }
}

fn fixed(name: &str, text: impl Into<String>) -> Action {
    command(
        name,
        ActionScope::System,
        ReplyMode::AwaitReply,
        CommandProducer::Static(text.into()),
        OutputDecoder::Text,
    )
}

fn fire_and_forget(name: &str, text: &str) -> Action {
    command(
        name,
        ActionScope::System,
        ReplyMode::FireAndForget,
        CommandProducer::Static(text.to_string()),
        OutputDecoder::Text,
    )
}

/// Non-empty string field of the payload
fn required_str<'a>(payload: &'a Value, field: &str, action: &str) -> Result<&'a str, ActionError> {
    payload
        .get(field)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| ActionError::InvalidPayload {
            action: action.to_string(),
            reason: format!("{} must be a non-empty string", field),
        })
}

/// Minimal escaping for Pango markup
fn escape_markup(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#x27;"),
            _ => out.push(ch),
        }
    }
    out
}

fn build_kill_process(payload: &Value) -> Result<String, ActionError> {
    let process = required_str(payload, "process_name", "kill_process")?;
    let shown = quote(process);
    Ok(format!(
        "if pkill -f {pattern}; then\n    echo \"Termination signal sent to processes matching \"{shown}\nelse\n    echo \"No process matching \"{shown}\nfi\n",
        pattern = quote(process),
        shown = shown,
    ))
}

fn build_send_message(payload: &Value) -> Result<String, ActionError> {
    let message = required_str(payload, "message", "send_message")?;
    let markup = format!(
        "<span font_size='xx-large'>{}</span>",
        escape_markup(message)
    );
    Ok(format!(
        "{env}if ! command -v zenity > /dev/null 2>&1; then\n    echo \"zenity is not installed\" >&2\n    exit 1\nfi\nnohup zenity --info --title=\"Administrator message\" --text={text} --width=500 > /dev/null 2>&1 &\necho \"Message displayed\"\n",
        env = X11_ENV,
        text = quote(&markup),
    ))
}

/// Restore needs the list of `subdirectory/filename` paths to bring back
pub(super) fn validate_restore(payload: &Value) -> Result<Vec<String>, ActionError> {
    let invalid = |reason: &str| ActionError::InvalidPayload {
        action: "restore_launchers".to_string(),
        reason: reason.to_string(),
    };
    let files = payload
        .get("backup_files")
        .and_then(Value::as_array)
        .ok_or_else(|| invalid("backup_files must be a list"))?;

    let paths: Vec<String> = files
        .iter()
        .filter_map(Value::as_str)
        .map(str::to_string)
        .collect();
    if paths.is_empty() || paths.len() != files.len() {
        return Err(invalid("backup_files must be a non-empty list of paths"));
    }
    Ok(paths)
}

pub(super) fn builtins() -> Vec<Action> {
    vec![
        command(
            "get_system_info",
            ActionScope::System,
            ReplyMode::AwaitReply,
            CommandProducer::Static(SYSTEM_INFO_SCRIPT.to_string()),
            OutputDecoder::SystemInfo,
        ),
        command(
            "kill_process",
            ActionScope::System,
            ReplyMode::AwaitReply,
            CommandProducer::Parameterized(build_kill_process),
            OutputDecoder::Text,
        ),
        command(
            "send_message",
            ActionScope::PerAccount,
            ReplyMode::AwaitReply,
            CommandProducer::Parameterized(build_send_message),
            OutputDecoder::Text,
        ),
        fire_and_forget("reboot", "systemctl reboot"),
        fire_and_forget("shutdown", "systemctl poweroff"),
        fixed(
            "disable_sleep",
            format!("systemctl mask {} && echo 'Sleep modes disabled'", SLEEP_TARGETS),
        ),
        fixed(
            "enable_sleep",
            format!("systemctl unmask {} && echo 'Sleep modes enabled'", SLEEP_TARGETS),
        ),
        fixed("update_system", UPDATE_SYSTEM_SCRIPT),
        Action {
            name: "disable_launchers".to_string(),
            scope: ActionScope::PerAccount,
            reply: ReplyMode::AwaitReply,
            kind: ActionKind::DisableLaunchers,
        },
        Action {
            name: "restore_launchers".to_string(),
            scope: ActionScope::PerAccount,
            reply: ReplyMode::AwaitReply,
            kind: ActionKind::RestoreLaunchers,
        },
    ]
}
