use serde::Serialize;
use serde_json::Value;

use df_core::config::BackupConfig;
use df_core::error::{BackupError, ExecError, SessionError};
use df_core::{ActionScope, CommandResult, Credential, FleetError, ReplyMode};

use super::builtin::validate_restore;
use super::system_info::parse_system_info;
use super::{Action, ActionKind, OutputDecoder};
use crate::backup::LauncherBackup;
use crate::exec::{execute, privilege, stream_execute, ExecStream};
use crate::fanout::{fan_out_per_account, FanOutResult};
use crate::session::RemoteSession;

/// Result of one action on one target (the host or one account)
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ActionOutput {
    pub message: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl ActionOutput {
    fn text(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            ..Default::default()
        }
    }
}

#[derive(Debug)]
pub enum ActionOutcome {
    System(ActionOutput),
    PerAccount(FanOutResult<ActionOutput>),
}

impl ActionOutcome {
    pub fn all_succeeded(&self) -> bool {
        match self {
            ActionOutcome::System(_) => true,
            ActionOutcome::PerAccount(result) => result.all_succeeded(),
        }
    }
}

/// Executes resolved actions against a connected session
#[derive(Debug, Clone)]
pub struct ActionRunner {
    backup: LauncherBackup,
}

impl ActionRunner {
    pub fn new(backup: BackupConfig) -> Self {
        Self {
            backup: LauncherBackup::new(backup),
        }
    }

    pub fn backup(&self) -> &LauncherBackup {
        &self.backup
    }

    /// Run `action` once for the host, or once per account
    ///
    /// A per-account action whose payload names an `account` runs for that
    /// account only. Payload validation happens before any remote work.
    pub async fn run(
        &self,
        session: &RemoteSession,
        credential: &Credential,
        action: &Action,
        payload: &Value,
    ) -> Result<ActionOutcome, FleetError> {
        let script = action.script(payload).transpose()?;
        let restore_paths = match action.kind {
            ActionKind::RestoreLaunchers => validate_restore(payload)?,
            _ => Vec::new(),
        };
        tracing::info!("Running {} on {}", action.name, session.host());

        match action.scope {
            ActionScope::System => {
                let output = self
                    .run_for(session, credential, action, script.as_deref(), &restore_paths, None)
                    .await?;
                Ok(ActionOutcome::System(output))
            }
            ActionScope::PerAccount => {
                let op = |account: String| {
                    let script = script.as_deref();
                    let restore_paths = &restore_paths;
                    async move {
                        self.run_for(
                            session,
                            credential,
                            action,
                            script,
                            restore_paths,
                            Some(&account),
                        )
                        .await
                    }
                };

                let result = match payload.get("account").and_then(Value::as_str) {
                    Some(account) => FanOutResult {
                        entries: [(account.to_string(), op(account.to_string()).await)]
                            .into_iter()
                            .collect(),
                    },
                    None => fan_out_per_account(session, credential, op).await?,
                };
                Ok(ActionOutcome::PerAccount(result))
            }
        }
    }

    async fn run_for(
        &self,
        session: &RemoteSession,
        credential: &Credential,
        action: &Action,
        script: Option<&str>,
        restore_paths: &[String],
        account: Option<&str>,
    ) -> Result<ActionOutput, FleetError> {
        match &action.kind {
            ActionKind::Command { decoder, .. } => {
                let script = script.unwrap_or_default();
                match action.reply {
                    ReplyMode::AwaitReply => {
                        let result = execute(session, script, credential, account).await?;
                        Ok(decode(*decoder, result))
                    }
                    ReplyMode::FireAndForget => {
                        fire_and_forget(session, credential, script, account).await
                    }
                }
            }
            ActionKind::DisableLaunchers => {
                let account = account.unwrap_or_else(|| session.username());
                let report = self.backup.disable(session, credential, account).await?;
                if !report.failures.is_empty() {
                    return Err(BackupError::Incomplete {
                        completed: report.moved,
                        failures: report.failures,
                    }
                    .into());
                }
                Ok(ActionOutput {
                    message: format!("{} launcher(s) disabled", report.moved),
                    warnings: Vec::new(),
                    data: serde_json::to_value(&report).ok(),
                })
            }
            ActionKind::RestoreLaunchers => {
                let account = account.unwrap_or_else(|| session.username());
                let report = self
                    .backup
                    .restore(session, credential, account, restore_paths)
                    .await?;
                if !report.errors.is_empty() {
                    return Err(BackupError::Incomplete {
                        completed: report.restored,
                        failures: report.errors,
                    }
                    .into());
                }
                Ok(ActionOutput {
                    message: format!("{} launcher(s) restored", report.restored),
                    warnings: report.warnings.clone(),
                    data: serde_json::to_value(&report).ok(),
                })
            }
        }
    }

    /// Start a system-scope command action and stream its output
    pub async fn stream(
        &self,
        session: &RemoteSession,
        credential: &Credential,
        action: &Action,
        payload: &Value,
    ) -> Result<ExecStream, FleetError> {
        if action.scope != ActionScope::System || action.reply != ReplyMode::AwaitReply {
            return Err(FleetError::InvalidRequest(format!(
                "{} cannot be streamed",
                action.name
            )));
        }
        let script = action.script(payload).transpose()?.ok_or_else(|| {
            FleetError::InvalidRequest(format!("{} cannot be streamed", action.name))
        })?;
        Ok(stream_execute(session, &script, credential).await?)
    }
}

fn decode(decoder: OutputDecoder, result: CommandResult) -> ActionOutput {
    match decoder {
        OutputDecoder::Text => ActionOutput {
            message: result.stdout.trim().to_string(),
            warnings: result.warnings,
            data: None,
        },
        OutputDecoder::SystemInfo => ActionOutput {
            message: "System information collected".to_string(),
            warnings: result.warnings,
            data: serde_json::to_value(parse_system_info(&result.stdout)).ok(),
        },
    }
}

/// Detach `script` remotely; losing the connection afterwards is expected
///
/// Only a timeout or a transport loss once the command is dispatched counts
/// as sent. A command that never started is an error.
async fn fire_and_forget(
    session: &RemoteSession,
    credential: &Credential,
    script: &str,
    account: Option<&str>,
) -> Result<ActionOutput, FleetError> {
    match execute(session, &privilege::detach(script), credential, account).await {
        Ok(_) => Ok(ActionOutput::text("Signal sent")),
        Err(ExecError::Timeout(_)) | Err(ExecError::Session(SessionError::Transport(_))) => {
            tracing::debug!("Connection to {} dropped after fire-and-forget", session.host());
            Ok(ActionOutput::text("Signal sent"))
        }
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::ActionRegistry;
    use crate::mock::{MockDialer, MockHost, MockPurger};
    use crate::transport::RawOutput;
    use df_core::HostId;
    use serde_json::json;
    use std::time::Duration;

    fn cred() -> Credential {
        Credential::new("admin", "pw")
    }

    async fn session_on(host: &MockHost) -> RemoteSession {
        RemoteSession::open(
            HostId::new("192.168.0.101"),
            &cred(),
            &MockDialer::new(host.clone()),
            &MockPurger::default(),
            Duration::from_secs(5),
        )
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn test_invalid_payload_runs_nothing() {
        let host = MockHost::new("/home/admin");
        let session = session_on(&host).await;
        let registry = ActionRegistry::builtin();
        let runner = ActionRunner::new(BackupConfig::default());

        let err = runner
            .run(&session, &cred(), registry.resolve("kill_process").unwrap(), &json!({}))
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), 400);
        assert!(host.commands().is_empty());
    }

    #[tokio::test]
    async fn test_system_info_is_decoded() {
        let host = MockHost::new("/home/admin");
        host.respond_ok(
            &["CPU_USAGE"],
            "---CPU_USAGE---\n3.0%\n----MEMORY----\n1G/8G\n----DISK----\n5G/50G\n----UPTIME----\nup 1 hour\n----END----\n",
        );
        let session = session_on(&host).await;
        let registry = ActionRegistry::builtin();
        let runner = ActionRunner::new(BackupConfig::default());

        let outcome = runner
            .run(&session, &cred(), registry.resolve("get_system_info").unwrap(), &Value::Null)
            .await
            .unwrap();
        let ActionOutcome::System(output) = outcome else {
            panic!("expected a system outcome");
        };
        let data = output.data.unwrap();
        assert_eq!(data["cpu"], "3.0%");
        assert_eq!(data["uptime"], "up 1 hour");
    }

    #[tokio::test]
    async fn test_fire_and_forget_treats_drop_as_sent() {
        let registry = ActionRegistry::builtin();
        let runner = ActionRunner::new(BackupConfig::default());

        let host = MockHost::new("/home/admin");
        let session = session_on(&host).await;
        let outcome = runner
            .run(&session, &cred(), registry.resolve("shutdown").unwrap(), &Value::Null)
            .await
            .unwrap();
        let ActionOutcome::System(output) = outcome else {
            panic!("expected a system outcome");
        };
        assert_eq!(output.message, "Signal sent");
        assert!(host.commands()[0].command.contains("nohup"));

        let host = MockHost::new("/home/admin");
        host.respond_err(
            &["systemctl reboot"],
            SessionError::Transport("connection reset by peer".into()),
        );
        let session = session_on(&host).await;
        let outcome = runner
            .run(&session, &cred(), registry.resolve("reboot").unwrap(), &Value::Null)
            .await
            .unwrap();
        let ActionOutcome::System(output) = outcome else {
            panic!("expected a system outcome");
        };
        assert_eq!(output.message, "Signal sent");
    }

    #[tokio::test]
    async fn test_fire_and_forget_that_never_started_is_an_error() {
        let registry = ActionRegistry::builtin();
        let runner = ActionRunner::new(BackupConfig::default());

        let host = MockHost::new("/home/admin");
        host.respond_err(
            &["systemctl reboot"],
            SessionError::Dispatch("no channel: channel open failure".into()),
        );
        let session = session_on(&host).await;
        let err = runner
            .run(&session, &cred(), registry.resolve("reboot").unwrap(), &Value::Null)
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), 500);

        // No exit status at all is a failed command, not a dropped link
        let host = MockHost::new("/home/admin");
        host.respond(
            &["systemctl reboot"],
            RawOutput {
                exit_status: None,
                ..Default::default()
            },
        );
        let session = session_on(&host).await;
        let result = runner
            .run(&session, &cred(), registry.resolve("reboot").unwrap(), &Value::Null)
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_per_account_command_runs_as_each_account() {
        let host = MockHost::new("/home/admin");
        host.respond_ok(&["getent passwd | awk"], "ana\nbia\n");
        let session = session_on(&host).await;
        let registry = ActionRegistry::builtin();
        let runner = ActionRunner::new(BackupConfig::default());

        let outcome = runner
            .run(
                &session,
                &cred(),
                registry.resolve("send_message").unwrap(),
                &json!({"message": "Aula encerrada"}),
            )
            .await
            .unwrap();
        assert!(outcome.all_succeeded());
        let commands = host.commands();
        assert!(commands.iter().any(|c| c.command.contains("-u ana")));
        assert!(commands.iter().any(|c| c.command.contains("-u bia")));
    }

    #[tokio::test]
    async fn test_restore_failures_become_account_errors() {
        let host = MockHost::new("/home/admin");
        host.respond_ok(&["getent passwd ana"], "/home/ana\n");
        host.respond_ok(&["-u ana", "xdg-user-dir"], "/home/ana/Desktop\n");
        host.add_dir("/home/ana/Desktop");
        host.add_file("/home/ana/disabled_launchers/Desktop/Locked.desktop");
        host.fail_rename("/home/ana/disabled_launchers/Desktop/Locked.desktop");
        let session = session_on(&host).await;
        let registry = ActionRegistry::builtin();
        let runner = ActionRunner::new(BackupConfig::default());

        let outcome = runner
            .run(
                &session,
                &cred(),
                registry.resolve("restore_launchers").unwrap(),
                &json!({"account": "ana", "backup_files": ["Desktop/Locked.desktop"]}),
            )
            .await
            .unwrap();
        let ActionOutcome::PerAccount(result) = outcome else {
            panic!("expected a per-account outcome");
        };
        assert!(!result.all_succeeded());
        assert_eq!(result.entries["ana"].as_ref().unwrap_err().status_code(), 500);
    }

    #[tokio::test]
    async fn test_backup_actions_cannot_stream() {
        let host = MockHost::new("/home/admin");
        let session = session_on(&host).await;
        let registry = ActionRegistry::builtin();
        let runner = ActionRunner::new(BackupConfig::default());

        let err = runner
            .stream(&session, &cred(), registry.resolve("disable_launchers").unwrap(), &Value::Null)
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), 400);
    }
}
