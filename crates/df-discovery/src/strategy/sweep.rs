use std::net::Ipv4Addr;
use std::time::Duration;

use async_trait::async_trait;

use super::{HitSink, Strategy, StrategyUnavailable};
use crate::range::HostRange;
use crate::tool::run_tool;

/// Base address of the Windows host, printed by PowerShell
const WINDOWS_ADDRESS_QUERY: &str = "(Get-NetIPConfiguration | Where-Object { $_.IPv4DefaultGateway -ne $null } | Select-Object -First 1).IPv4Address.IPAddress";

/// nmap restricted to the administration port
///
/// Inside WSL the Linux side sees only the virtual switch, so the Windows
/// binaries are used and the range is moved onto the host's real subnet.
#[derive(Debug, Clone)]
pub struct NmapSweep {
    port: u16,
    timeout: Duration,
    nested: bool,
}

impl NmapSweep {
    pub fn new(port: u16, timeout: Duration, nested: bool) -> Self {
        Self {
            port,
            timeout,
            nested,
        }
    }

    async fn windows_base_address(&self) -> Result<Ipv4Addr, StrategyUnavailable> {
        let args = vec![
            "-NoProfile".to_string(),
            "-Command".to_string(),
            WINDOWS_ADDRESS_QUERY.to_string(),
        ];
        let output = run_tool("powershell.exe", &args, self.timeout).await?;
        output
            .lines()
            .find_map(|line| line.trim().parse().ok())
            .ok_or_else(|| {
                StrategyUnavailable::Unsupported("Windows host address not found".to_string())
            })
    }
}

/// Addresses with `port` open in nmap's grepable output
pub fn parse_grepable(output: &str, port: u16) -> Vec<Ipv4Addr> {
    let open = format!("{}/open/", port);
    output
        .lines()
        .filter(|line| line.contains("Ports:") && line.contains(&open))
        .filter_map(|line| line.strip_prefix("Host: "))
        .filter_map(|rest| rest.split_whitespace().next())
        .filter_map(|addr| addr.parse().ok())
        .collect()
}

#[async_trait]
impl Strategy for NmapSweep {
    fn name(&self) -> &'static str {
        "nmap"
    }

    async fn discover(&self, range: &HostRange, sink: &HitSink) -> Result<(), StrategyUnavailable> {
        let (program, range) = if self.nested {
            let base = self.windows_base_address().await?;
            tracing::debug!("WSL detected, sweeping from Windows around {}", base);
            ("nmap.exe", range.rebase(base))
        } else {
            ("nmap", *range)
        };

        let mut args = vec![
            "-n".to_string(),
            "-p".to_string(),
            self.port.to_string(),
            "--open".to_string(),
            "-oG".to_string(),
            "-".to_string(),
        ];
        args.extend(range.targets());

        let output = run_tool(program, &args, self.timeout).await?;
        for addr in parse_grepable(&output, self.port) {
            sink.record(addr);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_grepable_output() {
        let output = "# Nmap 7.94 scan initiated\n\
                      Host: 192.168.0.101 ()\tStatus: Up\n\
                      Host: 192.168.0.101 ()\tPorts: 22/open/tcp//ssh///\n\
                      Host: 192.168.0.105 ()\tPorts: 22/open/tcp//ssh///\n\
                      Host: 192.168.0.107 ()\tPorts: 2222/open/tcp//ssh///\n\
                      # Nmap done\n";
        assert_eq!(
            parse_grepable(output, 22),
            vec![Ipv4Addr::new(192, 168, 0, 101), Ipv4Addr::new(192, 168, 0, 105)]
        );
    }
}
