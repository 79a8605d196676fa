//! Host to tunnel registry
//!
//! The only shared mutable state of the tunnel subsystem. Every insert,
//! replace and removal goes through one mutex, and each entry carries a
//! generation so a superseded start cannot remove its successor.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::Mutex;

use df_core::control::TunnelInfo;
use df_core::{HostId, TunnelStatus};

use crate::process::TunnelChild;

/// One registered tunnel
#[derive(Debug)]
pub struct TunnelEntry {
    pub generation: u64,
    pub local_port: u16,
    pub capture_port: u16,
    pub bridge_port: u16,
    pub status: TunnelStatus,
    pub message: String,
    pub child: TunnelChild,
}

impl TunnelEntry {
    fn info(&self, host: &HostId) -> TunnelInfo {
        TunnelInfo {
            host: host.clone(),
            local_port: self.local_port,
            capture_port: self.capture_port,
            bridge_port: self.bridge_port,
            status: self.status,
            message: self.message.clone(),
        }
    }
}

#[derive(Debug, Default)]
pub struct TunnelRegistry {
    entries: Mutex<HashMap<HostId, TunnelEntry>>,
    generations: AtomicU64,
}

impl TunnelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fresh generation number for a new entry
    pub fn next_generation(&self) -> u64 {
        self.generations.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Register `entry`, returning the entry it displaced
    pub async fn insert(&self, host: HostId, entry: TunnelEntry) -> Option<TunnelEntry> {
        self.entries.lock().await.insert(host, entry)
    }

    /// Remove the entry for `host`, whatever its generation
    pub async fn remove(&self, host: &HostId) -> Option<TunnelEntry> {
        self.entries.lock().await.remove(host)
    }

    /// Remove the entry for `host` only if it is still `generation`
    pub async fn remove_generation(&self, host: &HostId, generation: u64) -> Option<TunnelEntry> {
        let mut entries = self.entries.lock().await;
        match entries.get(host) {
            Some(entry) if entry.generation == generation => entries.remove(host),
            _ => None,
        }
    }

    /// Update status and message of `host` if it is still `generation`
    pub async fn mark(
        &self,
        host: &HostId,
        generation: u64,
        status: TunnelStatus,
        message: impl Into<String>,
    ) -> bool {
        let mut entries = self.entries.lock().await;
        match entries.get_mut(host) {
            Some(entry) if entry.generation == generation => {
                entry.status = status;
                entry.message = message.into();
                true
            }
            _ => false,
        }
    }

    /// Snapshot of every tunnel, ordered by host
    ///
    /// Entries whose process has died are reported as terminated.
    pub async fn list(&self) -> Vec<TunnelInfo> {
        let mut entries = self.entries.lock().await;
        let mut infos: Vec<TunnelInfo> = entries
            .iter_mut()
            .map(|(host, entry)| {
                if entry.status == TunnelStatus::Ready && entry.child.has_exited() {
                    entry.status = TunnelStatus::Terminated;
                    entry.message = "Tunnel process exited".to_string();
                }
                entry.info(host)
            })
            .collect();
        infos.sort_by(|a, b| {
            a.host
                .trailing_number()
                .cmp(&b.host.trailing_number())
                .then_with(|| a.host.cmp(&b.host))
        });
        infos
    }

    pub async fn contains(&self, host: &HostId) -> bool {
        self.entries.lock().await.contains_key(host)
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }

    /// Remove every entry
    pub async fn drain(&self) -> Vec<(HostId, TunnelEntry)> {
        self.entries.lock().await.drain().collect()
    }
}
