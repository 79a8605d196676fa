use std::net::Ipv4Addr;
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use tokio::net::TcpStream;

use super::{HitSink, Strategy, StrategyUnavailable};
use crate::range::HostRange;

/// Concurrent connects per available CPU
const PROBES_PER_CPU: usize = 16;

/// True if `addr:port` accepts a TCP connection within `timeout`
pub async fn probe(addr: Ipv4Addr, port: u16, timeout: Duration) -> bool {
    matches!(
        tokio::time::timeout(timeout, TcpStream::connect((addr, port))).await,
        Ok(Ok(_))
    )
}

/// Connect to every address of the range, a bounded number at a time
#[derive(Debug, Clone)]
pub struct TcpProbe {
    port: u16,
    timeout: Duration,
    workers: usize,
}

impl TcpProbe {
    pub fn new(port: u16, timeout: Duration) -> Self {
        let cpus = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(4);
        Self {
            port,
            timeout,
            workers: cpus * PROBES_PER_CPU,
        }
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    /// Probe `addrs` and record the ones that answer
    pub async fn probe_all(&self, addrs: impl IntoIterator<Item = Ipv4Addr>, sink: &HitSink) {
        let (port, timeout) = (self.port, self.timeout);
        stream::iter(addrs)
            .map(|addr| async move { (addr, probe(addr, port, timeout).await) })
            .buffer_unordered(self.workers)
            .for_each(|(addr, open)| async move {
                if open {
                    tracing::debug!("{}:{} is open", addr, port);
                    sink.record(addr);
                }
            })
            .await;
    }
}

#[async_trait]
impl Strategy for TcpProbe {
    fn name(&self) -> &'static str {
        "tcp_probe"
    }

    async fn discover(&self, range: &HostRange, sink: &HitSink) -> Result<(), StrategyUnavailable> {
        tracing::debug!(
            "Probing {} address(es) with {} worker(s)",
            range.len(),
            self.workers
        );
        self.probe_all(range.iter(), sink).await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_probe_finds_listening_port() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let sink = HitSink::new();
        let strategy = TcpProbe::new(port, Duration::from_millis(500)).with_workers(2);
        let range = HostRange::new(Ipv4Addr::LOCALHOST, Ipv4Addr::LOCALHOST);
        strategy.discover(&range, &sink).await.unwrap();

        assert_eq!(sink.snapshot(), vec![Ipv4Addr::LOCALHOST]);
    }

    #[tokio::test]
    async fn test_closed_port_is_not_recorded() {
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            listener.local_addr().unwrap().port()
        };
        assert!(!probe(Ipv4Addr::LOCALHOST, port, Duration::from_millis(500)).await);
    }
}
