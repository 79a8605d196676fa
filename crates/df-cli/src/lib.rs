//! deskfleet: command-line interface for the desktop fleet
//!
//! Provides the `deskfleet` CLI for running the control daemon and
//! sending it requests.

pub mod commands;
pub mod ipc;
pub mod output;
