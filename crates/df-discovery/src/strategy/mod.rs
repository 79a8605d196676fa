//! Discovery strategies
//!
//! Each strategy reports confirmed hosts into a [`HitSink`] as it finds
//! them, so hits survive when the engine's deadline cuts a strategy short.

mod arp;
mod probe;
mod sweep;

pub use arp::ArpSweep;
pub use probe::{probe, TcpProbe};
pub use sweep::NmapSweep;

use std::collections::BTreeSet;
use std::net::Ipv4Addr;
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use thiserror::Error;

use crate::range::HostRange;

/// A strategy could not run; the engine falls through to the next one
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StrategyUnavailable {
    #[error("{0} is not installed")]
    ToolMissing(String),

    #[error("{tool} failed: {reason}")]
    ToolFailed { tool: String, reason: String },

    #[error("{0} timed out")]
    Timeout(String),

    #[error("{0}")]
    Unsupported(String),
}

/// Shared set of addresses found so far
#[derive(Debug, Clone, Default)]
pub struct HitSink {
    hits: Arc<Mutex<BTreeSet<Ipv4Addr>>>,
}

impl HitSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, addr: Ipv4Addr) {
        self.hits
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(addr);
    }

    pub fn snapshot(&self) -> Vec<Ipv4Addr> {
        self.hits
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .copied()
            .collect()
    }

    pub fn clear(&self) {
        self.hits
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    pub fn is_empty(&self) -> bool {
        self.hits
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_empty()
    }
}

/// One way of finding hosts with the administration port open
#[async_trait]
pub trait Strategy: Send + Sync {
    /// Name recorded on the hosts this strategy finds
    fn name(&self) -> &'static str;

    /// Record every reachable address of `range` into `sink`
    async fn discover(&self, range: &HostRange, sink: &HitSink) -> Result<(), StrategyUnavailable>;
}
