//! Remote execution for deskfleet
//!
//! Sessions against single hosts, privileged command execution with output
//! classification and streaming, per-account fan-out, the action catalog,
//! and the launcher backup subsystem.

pub mod action;
pub mod backup;
pub mod exec;
pub mod fanout;
pub mod known_hosts;
pub mod session;
pub mod transport;

#[cfg(any(test, feature = "mock"))]
pub mod mock;

pub use action::{Action, ActionOutcome, ActionOutput, ActionRegistry, ActionRunner};
pub use backup::{BackupEntry, LauncherBackup};
pub use exec::{execute, stream_execute, ExecStream, StreamItem};
pub use fanout::{fan_out_per_account, FanOutResult};
pub use known_hosts::{KeyPurger, SshKeygenPurger};
pub use session::{RemoteSession, SessionState};
pub use transport::{Dialer, RemoteFs, SshDialer, Transport};
