use std::net::Ipv4Addr;
use std::time::Duration;

use async_trait::async_trait;

use super::probe::TcpProbe;
use super::{HitSink, Strategy, StrategyUnavailable};
use crate::range::HostRange;
use crate::tool::run_tool;

/// Link-layer sweep of the local segment, then a port check per answer
#[derive(Debug, Clone)]
pub struct ArpSweep {
    timeout: Duration,
    confirm: TcpProbe,
}

impl ArpSweep {
    pub fn new(port: u16, timeout: Duration, probe_timeout: Duration) -> Self {
        Self {
            timeout,
            confirm: TcpProbe::new(port, probe_timeout),
        }
    }
}

/// Addresses listed by `arp-scan --plain`
pub fn parse_arp_scan(output: &str) -> Vec<Ipv4Addr> {
    output
        .lines()
        .filter_map(|line| line.split_whitespace().next())
        .filter_map(|field| field.parse().ok())
        .collect()
}

#[async_trait]
impl Strategy for ArpSweep {
    fn name(&self) -> &'static str {
        "arp_scan"
    }

    async fn discover(&self, range: &HostRange, sink: &HitSink) -> Result<(), StrategyUnavailable> {
        let args = vec![
            "--localnet".to_string(),
            "--quiet".to_string(),
            "--plain".to_string(),
        ];
        let output = run_tool("arp-scan", &args, self.timeout).await?;

        let mut candidates: Vec<Ipv4Addr> = parse_arp_scan(&output)
            .into_iter()
            .filter(|addr| range.contains(*addr))
            .collect();
        candidates.sort();
        candidates.dedup();
        tracing::debug!("arp-scan saw {} neighbour(s) in range", candidates.len());

        self.confirm.probe_all(candidates, sink).await;
        Ok(())
    }
}
