//! Session connect, host-key reconciliation and close

use std::time::Duration;

use df_core::error::{ConnectFailure, HostKeyProblem, SessionError};
use df_core::{Credential, HostId};
use df_remote::mock::{MockDialer, MockHost, MockPurger};
use df_remote::{execute, RemoteSession, SessionState};

fn cred() -> Credential {
    Credential::new("admin", "s3cret")
}

fn mismatch(host: &str) -> SessionError {
    SessionError::HostKey {
        host: host.to_string(),
        problem: HostKeyProblem::Mismatch,
        remediation_attempted: false,
    }
}

#[tokio::test]
async fn mismatch_is_remediated_once_then_connects() {
    let dialer = MockDialer::new(MockHost::new("/home/admin"));
    dialer.fail_next(mismatch("192.168.0.105"));
    let purger = MockPurger::default();

    let mut session = RemoteSession::new(HostId::new("192.168.0.105"), "admin", Duration::from_secs(5));
    session.connect(&dialer, &purger, &cred()).await.unwrap();

    assert_eq!(session.state(), SessionState::Connected);
    assert_eq!(session.remediation_attempts(), 1);
    assert_eq!(purger.count(), 1);
    assert_eq!(dialer.dial_count(), 2);
}

#[tokio::test]
async fn failed_retry_reports_remediation_attempted() {
    let dialer = MockDialer::new(MockHost::new("/home/admin"));
    dialer.fail_next(mismatch("192.168.0.105"));
    dialer.fail_next(mismatch("192.168.0.105"));
    let purger = MockPurger::default();

    let err = RemoteSession::open(
        HostId::new("192.168.0.105"),
        &cred(),
        &dialer,
        &purger,
        Duration::from_secs(5),
    )
    .await
    .unwrap_err();

    match err {
        SessionError::HostKey {
            problem,
            remediation_attempted,
            ..
        } => {
            assert_eq!(problem, HostKeyProblem::Mismatch);
            assert!(remediation_attempted);
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(purger.count(), 1);
    assert_eq!(dialer.dial_count(), 2);
}

#[tokio::test]
async fn other_connect_errors_are_not_retried() {
    let dialer = MockDialer::new(MockHost::new("/home/admin"));
    dialer.fail_next(SessionError::Authentication {
        host: "192.168.0.110".into(),
        username: "admin".into(),
    });
    let purger = MockPurger::default();

    let err = RemoteSession::open(HostId::new("192.168.0.110"), &cred(), &dialer, &purger, Duration::from_secs(5))
        .await
        .unwrap_err();
    assert!(matches!(err, SessionError::Authentication { .. }));
    assert_eq!(dialer.dial_count(), 1);
    assert_eq!(purger.count(), 0);

    dialer.fail_next(SessionError::Connection {
        host: "192.168.0.110".into(),
        kind: ConnectFailure::Refused,
    });
    let err = RemoteSession::open(HostId::new("192.168.0.110"), &cred(), &dialer, &purger, Duration::from_secs(5))
        .await
        .unwrap_err();
    assert!(matches!(err, SessionError::Connection { .. }));
    assert_eq!(dialer.dial_count(), 2);
}

#[tokio::test]
async fn closed_session_fails_fast_without_io() {
    let host = MockHost::new("/home/admin");
    let dialer = MockDialer::new(host.clone());
    let mut session = RemoteSession::open(
        HostId::new("192.168.0.101"),
        &cred(),
        &dialer,
        &MockPurger::default(),
        Duration::from_secs(5),
    )
    .await
    .unwrap();

    session.close().await;
    assert_eq!(session.state(), SessionState::Closed);
    assert!(host.is_closed());

    let err = execute(&session, "uptime", &cred(), None).await.unwrap_err();
    assert_eq!(err.kind().status_code(), 500);
    assert!(host.commands().is_empty());

    let err = session
        .connect(&dialer, &MockPurger::default(), &cred())
        .await
        .unwrap_err();
    assert!(matches!(err, SessionError::Transport(_)));
    assert_eq!(dialer.dial_count(), 1);
}
