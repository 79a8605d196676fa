//! Control client for talking to the orchestrator
//!
//! Uses TCP on localhost, one JSON line per request.

mod client;

pub use client::FleetClient;
