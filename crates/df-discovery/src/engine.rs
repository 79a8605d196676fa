//! Strategy fallback, filtering and ordering

use std::collections::BTreeSet;
use std::net::Ipv4Addr;
use std::time::Duration;

use tokio::time::Instant;

use df_core::config::NetworkConfig;
use df_core::{Host, HostId, HostStatus};

use crate::range::{HostRange, NetworkContext};
use crate::strategy::{ArpSweep, HitSink, NmapSweep, Strategy, TcpProbe};

/// Runs strategies in priority order under one overall deadline
pub struct DiscoveryEngine {
    strategies: Vec<Box<dyn Strategy>>,
    context: NetworkContext,
    exclusions: BTreeSet<Ipv4Addr>,
    overall_timeout: Duration,
}

impl DiscoveryEngine {
    /// Engine with explicit strategies, highest priority first
    pub fn new(strategies: Vec<Box<dyn Strategy>>, context: NetworkContext) -> Self {
        Self {
            strategies,
            context,
            exclusions: BTreeSet::new(),
            overall_timeout: Duration::from_secs(45),
        }
    }

    /// The standard nmap, arp-scan, TCP probe chain
    pub fn from_config(config: &NetworkConfig, context: NetworkContext) -> Self {
        let strategies: Vec<Box<dyn Strategy>> = vec![
            Box::new(NmapSweep::new(
                config.admin_port,
                config.tool_timeout,
                context.nested,
            )),
            Box::new(ArpSweep::new(
                config.admin_port,
                config.tool_timeout,
                config.probe_timeout,
            )),
            Box::new(TcpProbe::new(config.admin_port, config.probe_timeout)),
        ];
        Self::new(strategies, context)
            .with_exclusions(config.exclusions.iter().copied())
            .with_timeout(config.discovery_timeout)
    }

    pub fn with_exclusions(mut self, exclusions: impl IntoIterator<Item = Ipv4Addr>) -> Self {
        self.exclusions.extend(exclusions);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.overall_timeout = timeout;
        self
    }

    pub fn context(&self) -> &NetworkContext {
        &self.context
    }

    /// Reachable hosts in `range`, ordered by their last address component
    ///
    /// Never fails; when nothing is found the list is empty.
    pub async fn discover(&self, range: &HostRange) -> Vec<HostId> {
        self.discover_report(range)
            .await
            .into_iter()
            .map(|host| host.id)
            .collect()
    }

    /// Like [`discover`](Self::discover), with the strategy that found the hosts
    pub async fn discover_report(&self, range: &HostRange) -> Vec<Host> {
        let deadline = Instant::now() + self.overall_timeout;
        let sink = HitSink::new();

        for strategy in &self.strategies {
            sink.clear();
            let name = strategy.name();
            tracing::debug!("Trying discovery strategy {}", name);

            match tokio::time::timeout_at(deadline, strategy.discover(range, &sink)).await {
                Ok(Ok(())) if !sink.is_empty() => {
                    tracing::info!("Discovery strategy {} found hosts", name);
                    return self.finish(sink.snapshot(), name);
                }
                Ok(Ok(())) => tracing::debug!("Strategy {} found nothing", name),
                Ok(Err(reason)) => tracing::warn!("Strategy {} unavailable: {}", name, reason),
                Err(_) => {
                    tracing::warn!(
                        "Discovery deadline of {:?} reached during {}",
                        self.overall_timeout,
                        name
                    );
                    return self.finish(sink.snapshot(), name);
                }
            }
        }

        tracing::info!("No hosts found in {}-{}", range.start(), range.end());
        Vec::new()
    }

    fn finish(&self, found: Vec<Ipv4Addr>, method: &str) -> Vec<Host> {
        let mut hosts: Vec<Ipv4Addr> = found
            .into_iter()
            .filter(|addr| Some(*addr) != self.context.own_address)
            .filter(|addr| Some(*addr) != self.context.gateway)
            .filter(|addr| !self.exclusions.contains(addr))
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        hosts.sort_by_key(|addr| (addr.octets()[3], *addr));

        hosts
            .into_iter()
            .map(|addr| {
                Host::new(addr.to_string())
                    .discovered_by(method)
                    .with_status(HostStatus::Online)
            })
            .collect()
    }
}
