//! Reachability checks for known hosts

use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use futures::future::join_all;
use tokio::net::{lookup_host, TcpStream};

use df_core::{Host, HostId, HostStatus};

async fn reachable(host: &HostId, port: u16, timeout: Duration) -> bool {
    let attempt = async {
        let addr: SocketAddr = match host.as_str().parse::<IpAddr>() {
            Ok(ip) => SocketAddr::new(ip, port),
            Err(_) => lookup_host((host.as_str(), port)).await?.next().ok_or_else(|| {
                std::io::Error::new(std::io::ErrorKind::NotFound, "no address")
            })?,
        };
        TcpStream::connect(addr).await
    };
    matches!(tokio::time::timeout(timeout, attempt).await, Ok(Ok(_)))
}

/// Mark each host `online` or `offline` by a TCP connect to `port`
///
/// Hosts are checked concurrently; the order of `hosts` is preserved.
pub async fn probe_status(hosts: &[HostId], port: u16, timeout: Duration) -> Vec<Host> {
    let checks = hosts.iter().map(|host| async move {
        let status = if reachable(host, port, timeout).await {
            HostStatus::Online
        } else {
            HostStatus::Offline
        };
        tracing::debug!("{} is {}", host, status);
        Host::new(host.clone()).with_status(status)
    });
    join_all(checks).await
}
