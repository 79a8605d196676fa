//! df-core: shared types, error taxonomy and configuration for deskfleet
//!
//! Every other crate in the workspace depends on this one. It performs no
//! I/O beyond reading and writing the configuration file.

pub mod config;
pub mod control;
pub mod error;
pub mod types;

pub use error::{ErrorKind, FleetError};
pub use types::{
    ActionScope, CommandResult, Credential, Host, HostId, HostStatus, ReplyMode, TunnelStatus,
};
