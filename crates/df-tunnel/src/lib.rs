//! Screen-sharing tunnels for deskfleet
//!
//! A tunnel is one local child process that logs into the host, starts
//! the remote capture and relay services, and forwards a local port to
//! the relay. Readiness is decided by matching the child's output against
//! a [`SignatureTable`].

pub mod error;
pub mod launcher;
pub mod orchestrator;
pub mod process;
pub mod registry;
pub mod signature;

pub use error::TunnelError;
pub use launcher::{LaunchRequest, SshTunnelLauncher, TunnelLauncher};
pub use orchestrator::TunnelOrchestrator;
pub use registry::TunnelRegistry;
pub use signature::{Signature, SignatureTable};
