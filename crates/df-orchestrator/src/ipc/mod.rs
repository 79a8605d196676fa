//! Control server for CLI communication
//!
//! Listens on 127.0.0.1 only; requests from other peers are dropped.

mod server;

pub use server::ControlServer;
