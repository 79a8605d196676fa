//! Host discovery for deskfleet
//!
//! [`DiscoveryEngine::discover`] tries its strategies in priority order
//! and keeps the first non-empty answer. A strategy that cannot run is
//! skipped, never reported.

pub mod engine;
pub mod range;
pub mod status;
pub mod strategy;
mod tool;

pub use engine::DiscoveryEngine;
pub use range::{HostRange, NetworkContext};
pub use status::probe_status;
pub use strategy::{HitSink, Strategy, StrategyUnavailable};
