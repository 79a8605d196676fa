//! df-orchestrator: local control daemon for deskfleet
//!
//! Accepts newline-delimited JSON requests from local clients on a
//! loopback TCP port, opens one remote session per request, and owns the
//! tunnel registry for the lifetime of the process.

pub mod handler;
pub mod ipc;
pub mod state;

pub use ipc::ControlServer;
pub use state::FleetState;
