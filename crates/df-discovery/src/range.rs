//! Address ranges and facts about the local network

use std::net::{Ipv4Addr, UdpSocket};

use df_core::config::{NetworkConfig, RangeMode};

/// Inclusive IPv4 range
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HostRange {
    start: Ipv4Addr,
    end: Ipv4Addr,
}

impl HostRange {
    /// Range from `start` to `end`; bounds are swapped if reversed
    pub fn new(start: Ipv4Addr, end: Ipv4Addr) -> Self {
        if u32::from(start) <= u32::from(end) {
            Self { start, end }
        } else {
            Self {
                start: end,
                end: start,
            }
        }
    }

    /// `.1` to `.254` of the /24 containing `addr`
    pub fn subnet_of(addr: Ipv4Addr) -> Self {
        let [a, b, c, _] = addr.octets();
        Self::new(Ipv4Addr::new(a, b, c, 1), Ipv4Addr::new(a, b, c, 254))
    }

    /// Range selected by the configuration
    ///
    /// Dynamic mode needs the own address; without it the static bounds apply.
    pub fn from_config(config: &NetworkConfig, own: Option<Ipv4Addr>) -> Self {
        match (config.range_mode, own) {
            (RangeMode::Dynamic, Some(addr)) => Self::subnet_of(addr),
            (RangeMode::Dynamic, None) => {
                tracing::warn!("Own address unknown, using the static range");
                Self::new(config.range_start, config.range_end)
            }
            (RangeMode::Static, _) => Self::new(config.range_start, config.range_end),
        }
    }

    pub fn start(&self) -> Ipv4Addr {
        self.start
    }

    pub fn end(&self) -> Ipv4Addr {
        self.end
    }

    pub fn contains(&self, addr: Ipv4Addr) -> bool {
        (u32::from(self.start)..=u32::from(self.end)).contains(&u32::from(addr))
    }

    pub fn len(&self) -> usize {
        (u32::from(self.end) - u32::from(self.start)) as usize + 1
    }

    pub fn is_empty(&self) -> bool {
        false
    }

    pub fn iter(&self) -> impl Iterator<Item = Ipv4Addr> {
        (u32::from(self.start)..=u32::from(self.end)).map(Ipv4Addr::from)
    }

    /// Target list for sweep tools: `a.b.c.x-y` within one /24, else each address
    pub fn targets(&self) -> Vec<String> {
        let [a, b, c, x] = self.start.octets();
        let [a2, b2, c2, y] = self.end.octets();
        if (a, b, c) == (a2, b2, c2) {
            vec![format!("{}.{}.{}.{}-{}", a, b, c, x, y)]
        } else {
            self.iter().map(|addr| addr.to_string()).collect()
        }
    }

    /// Same host numbers on the /24 of `base`
    ///
    /// Only meaningful for ranges inside a single /24.
    pub fn rebase(&self, base: Ipv4Addr) -> Self {
        let [a, b, c, _] = base.octets();
        Self::new(
            Ipv4Addr::new(a, b, c, self.start.octets()[3]),
            Ipv4Addr::new(a, b, c, self.end.octets()[3]),
        )
    }
}

/// What discovery needs to know about the machine it runs on
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NetworkContext {
    pub own_address: Option<Ipv4Addr>,
    pub gateway: Option<Ipv4Addr>,
    /// Running inside WSL, where LAN tools live on the Windows side
    pub nested: bool,
}

impl NetworkContext {
    /// Inspect the local machine
    pub async fn detect() -> Self {
        let gateway = match tokio::fs::read_to_string("/proc/net/route").await {
            Ok(table) => parse_default_gateway(&table),
            Err(e) => {
                tracing::debug!("Cannot read routing table: {}", e);
                None
            }
        };
        let nested = tokio::fs::read_to_string("/proc/version")
            .await
            .map(|version| version.to_lowercase().contains("microsoft"))
            .unwrap_or(false);

        let context = Self {
            own_address: own_address(),
            gateway,
            nested,
        };
        tracing::debug!("Network context: {:?}", context);
        context
    }
}

/// Address of the interface that routes to the internet
///
/// Connecting a UDP socket only selects a route; nothing is sent.
pub fn own_address() -> Option<Ipv4Addr> {
    let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0)).ok()?;
    socket.connect((Ipv4Addr::new(8, 8, 8, 8), 80)).ok()?;
    match socket.local_addr().ok()?.ip() {
        std::net::IpAddr::V4(addr) if !addr.is_unspecified() => Some(addr),
        _ => None,
    }
}

/// Gateway of the default route in `/proc/net/route` format
pub fn parse_default_gateway(table: &str) -> Option<Ipv4Addr> {
    table.lines().skip(1).find_map(|line| {
        let fields: Vec<&str> = line.split_whitespace().collect();
        match fields.as_slice() {
            [_iface, "00000000", gateway, ..] => u32::from_str_radix(gateway, 16)
                .ok()
                .map(|raw| Ipv4Addr::from(raw.to_le_bytes()))
                .filter(|addr| !addr.is_unspecified()),
            _ => None,
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_range_iteration_and_targets() {
        let range = HostRange::new(Ipv4Addr::new(192, 168, 0, 100), Ipv4Addr::new(192, 168, 0, 103));
        assert_eq!(range.len(), 4);
        assert_eq!(range.iter().last(), Some(Ipv4Addr::new(192, 168, 0, 103)));
        assert_eq!(range.targets(), vec!["192.168.0.100-103"]);
        assert!(range.contains(Ipv4Addr::new(192, 168, 0, 101)));
        assert!(!range.contains(Ipv4Addr::new(192, 168, 0, 104)));
    }

    #[test]
    fn test_reversed_bounds_are_swapped() {
        let range = HostRange::new(Ipv4Addr::new(10, 0, 0, 9), Ipv4Addr::new(10, 0, 0, 2));
        assert_eq!(range.start(), Ipv4Addr::new(10, 0, 0, 2));
    }

    #[test]
    fn test_dynamic_range_uses_own_subnet() {
        let config = NetworkConfig {
            range_mode: RangeMode::Dynamic,
            ..Default::default()
        };
        let range = HostRange::from_config(&config, Some(Ipv4Addr::new(10, 1, 2, 50)));
        assert_eq!(range.start(), Ipv4Addr::new(10, 1, 2, 1));
        assert_eq!(range.end(), Ipv4Addr::new(10, 1, 2, 254));

        let fallback = HostRange::from_config(&config, None);
        assert_eq!(fallback.start(), config.range_start);
    }

    #[test]
    fn test_rebase_keeps_host_numbers() {
        let range = HostRange::new(Ipv4Addr::new(172, 20, 0, 100), Ipv4Addr::new(172, 20, 0, 125));
        let rebased = range.rebase(Ipv4Addr::new(192, 168, 0, 33));
        assert_eq!(rebased.start(), Ipv4Addr::new(192, 168, 0, 100));
        assert_eq!(rebased.end(), Ipv4Addr::new(192, 168, 0, 125));
    }

    #[test]
    fn test_parse_default_gateway() {
        let table = "Iface\tDestination\tGateway \tFlags\tRefCnt\tUse\tMetric\tMask\n\
                     eth0\t0000A8C0\t00000000\t0001\t0\t0\t0\t00FFFFFF\n\
                     eth0\t00000000\t0100A8C0\t0003\t0\t0\t0\t00000000\n";
        assert_eq!(parse_default_gateway(table), Some(Ipv4Addr::new(192, 168, 0, 1)));
        assert_eq!(parse_default_gateway("Iface\tDestination\n"), None);
    }
}
