use std::fmt;
use std::net::{IpAddr, Ipv4Addr};
use std::time::SystemTime;

use pnet::util::MacAddr;
use serde::{Deserialize, Serialize};

use crate::model::Source;

/// An IPv4 block in `address/prefix` form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Cidr {
    pub network: Ipv4Addr,
    pub prefix: u8,
}

impl Cidr {
    pub fn new(network: Ipv4Addr, prefix: u8) -> Self {
        Self { network, prefix }
    }

    pub fn contains(&self, ip: Ipv4Addr) -> bool {
        let mask: u32 = u32::MAX.checked_shl(32 - u32::from(self.prefix)).unwrap_or(0);
        u32::from(ip) & mask == u32::from(self.network) & mask
    }
}

impl fmt::Display for Cidr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.network, self.prefix)
    }
}

/// Ordered worst to best, so the best of several reports is the maximum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ScanOutcome {
    Failed,
    PassiveDegraded,
    Active,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Subnet {
    pub interface: String,
    pub cidr: Option<Cidr>,
    pub gateway: Option<Ipv4Addr>,
    pub outcome: ScanOutcome,
}

/// A single address sighting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Observation {
    pub ip: IpAddr,
    pub mac: Option<MacAddr>,
    pub interface: Option<String>,
    pub seen_at: SystemTime,
    pub source: Source,
}

impl Observation {
    pub fn new(ip: IpAddr, mac: Option<MacAddr>, interface: &str, source: Source) -> Self {
        Self {
            ip,
            mac,
            interface: Some(interface.to_string()),
            seen_at: SystemTime::now(),
            source,
        }
    }
}

// ╔════════════════════════════════════════════╗
// ║ ████████╗███████╗███████╗████████╗███████╗ ║
// ║ ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝██╔════╝ ║
// ║    ██║   █████╗  ███████╗   ██║   ███████╗ ║
// ║    ██║   ██╔══╝  ╚════██║   ██║   ╚════██║ ║
// ║    ██║   ███████╗███████║   ██║   ███████║ ║
// ║    ╚═╝   ╚══════╝╚══════╝   ╚═╝   ╚══════╝ ║
// ╚════════════════════════════════════════════╝
