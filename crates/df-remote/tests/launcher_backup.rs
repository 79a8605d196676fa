//! Disable/restore through the action runner and fan-out

use std::collections::BTreeSet;
use std::time::Duration;

use serde_json::json;

use df_core::config::BackupConfig;
use df_core::{Credential, HostId};
use df_remote::mock::{MockDialer, MockHost, MockPurger};
use df_remote::{ActionOutcome, ActionRegistry, ActionRunner, LauncherBackup, RemoteSession};

fn cred() -> Credential {
    Credential::new("admin", "s3cret")
}

async fn session_on(host: &MockHost) -> RemoteSession {
    RemoteSession::open(
        HostId::new("192.168.0.105"),
        &cred(),
        &MockDialer::new(host.clone()),
        &MockPurger::default(),
        Duration::from_secs(5),
    )
    .await
    .unwrap()
}

fn add_account(host: &MockHost, account: &str) {
    let home = format!("/home/{account}");
    let getent = format!("getent passwd {account}");
    let as_user = format!("-u {account}");
    host.respond_ok(&[getent.as_str()], &format!("{home}\n"));
    host.respond_ok(&[as_user.as_str(), "xdg-user-dir"], &format!("{home}/Desktop\n"));
    host.add_dir(&format!("{home}/Desktop"));
    // Homes are private to their account, as on a default install
    host.set_owner(&home, account);
}

#[tokio::test]
async fn fan_out_disable_reports_per_account_counts() {
    let host = MockHost::new("/home/admin");
    host.respond_ok(&["getent passwd | awk"], "ana\nbia\n");
    add_account(&host, "ana");
    add_account(&host, "bia");
    for name in ["Firefox.desktop", "Writer.desktop", "Calc-2.desktop"] {
        host.add_file(&format!("/home/ana/Desktop/{name}"));
    }
    let session = session_on(&host).await;

    let registry = ActionRegistry::builtin();
    let runner = ActionRunner::new(BackupConfig::default());
    let outcome = runner
        .run(&session, &cred(), registry.resolve("disable_launchers").unwrap(), &json!({}))
        .await
        .unwrap();

    let ActionOutcome::PerAccount(result) = outcome else {
        panic!("disable_launchers must fan out");
    };
    assert!(result.all_succeeded());
    let moved = |account: &str| {
        result.entries[account].as_ref().unwrap().data.as_ref().unwrap()["moved"].clone()
    };
    assert_eq!(moved("ana"), 3);
    assert_eq!(moved("bia"), 0);

    let report = serde_json::to_value(result.report()).unwrap();
    assert_eq!(report["allSucceeded"], true);
}

#[tokio::test]
async fn disable_then_restore_round_trips_exactly() {
    let host = MockHost::new("/home/admin");
    add_account(&host, "ana");
    let original: BTreeSet<String> = ["App.desktop", "App-2.desktop", "Game_10.desktop", "Terminal.desktop"]
        .into_iter()
        .map(String::from)
        .collect();
    for name in &original {
        host.add_file(&format!("/home/ana/Desktop/{name}"));
    }
    let session = session_on(&host).await;
    let backup = LauncherBackup::new(BackupConfig::default());

    let disabled = backup.disable(&session, &cred(), "ana").await.unwrap();
    assert_eq!(disabled.moved, original.len());
    assert!(host.files_in("/home/ana/Desktop").is_empty());

    let requested: Vec<String> = host
        .files_in("/home/ana/disabled_launchers/Desktop")
        .into_iter()
        .map(|name| format!("Desktop/{name}"))
        .collect();
    let restored = backup.restore(&session, &cred(), "ana", &requested).await.unwrap();

    assert_eq!(restored.restored, original.len());
    assert!(restored.errors.is_empty());
    assert!(restored.warnings.is_empty());
    assert_eq!(host.files_in("/home/ana/Desktop"), original);
}

#[tokio::test]
async fn restore_list_from_another_host_warns_on_misses() {
    let host = MockHost::new("/home/admin");
    add_account(&host, "ana");
    host.add_file("/home/ana/disabled_launchers/Desktop/App-7.desktop");
    let session = session_on(&host).await;

    let registry = ActionRegistry::builtin();
    let runner = ActionRunner::new(BackupConfig::default());
    let outcome = runner
        .run(
            &session,
            &cred(),
            registry.resolve("restore_launchers").unwrap(),
            &json!({
                "account": "ana",
                "backup_files": ["Desktop/App-999.desktop", "Desktop/Inkscape.desktop"]
            }),
        )
        .await
        .unwrap();

    assert!(outcome.all_succeeded());
    let ActionOutcome::PerAccount(result) = outcome else {
        panic!("restore_launchers must be per account");
    };
    let output = result.entries["ana"].as_ref().unwrap();
    assert_eq!(output.message, "1 launcher(s) restored");
    assert_eq!(output.warnings, vec!["Desktop/Inkscape.desktop not found in this machine's backup"]);
    assert!(host.files_in("/home/ana/Desktop").contains("App-7.desktop"));
}
