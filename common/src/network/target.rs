//! # Trace Target Model
//!
//! Parses the operator's trace targets. A target can be:
//! * A single IP address (e.g., `8.8.8.8`, `2001:db8::1`).
//! * An IPv4 range (e.g., `192.168.1.1-50`, `10.0.0.1-10.0.1.20`).
//! * A CIDR block (e.g., `192.168.1.0/28`).
//!
//! Several targets may be given comma-separated. Everything expands to concrete
//! addresses before tracing starts.

use std::collections::BTreeSet;
use std::net::{IpAddr, Ipv4Addr};
use std::str::FromStr;

use pnet::ipnetwork::Ipv4Network;

use crate::error::InputError;
use crate::network::range::{self, Ipv4Range};

/// Upper bound on the number of addresses a target list may expand to.
pub const MAX_EXPANDED_TARGETS: u64 = 65_536;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Target {
    Host { target_addr: IpAddr },
    Range { ipv4_range: Ipv4Range },
}

impl Target {
    pub fn len(&self) -> u64 {
        match self {
            Target::Host { .. } => 1,
            Target::Range { ipv4_range } => ipv4_range.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn addresses(&self) -> Vec<IpAddr> {
        match self {
            Target::Host { target_addr } => vec![*target_addr],
            Target::Range { ipv4_range } => ipv4_range.to_iter().collect(),
        }
    }
}

impl FromStr for Target {
    type Err = String;

    /// Parses a string into a `Target`.
    ///
    /// Supported formats:
    /// * **Host**: Single IPv4/IPv6 address (e.g. "192.168.1.5").
    /// * **Range**: "Start-End" (e.g. "192.168.1.1-50", "192.168.1.1-192.168.1.50").
    /// * **CIDR**: "Network/Prefix" (e.g. "192.168.1.0/24").
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s: &str = s.trim();

        if let Some(target) = parse_host(s) {
            return Ok(target);
        }

        if let Some(target) = parse_ip_range(s)? {
            return Ok(target);
        }

        if let Some(target) = parse_cidr_range(s)? {
            return Ok(target);
        }

        Err("not an address, range or CIDR block".to_string())
    }
}

/// Parses a comma-separated target list and expands it to sorted, unique addresses.
pub fn parse_targets(s: &str) -> Result<Vec<IpAddr>, InputError> {
    let mut addrs: BTreeSet<IpAddr> = BTreeSet::new();
    let mut total: u64 = 0;

    for part in s.split(',') {
        let part: &str = part.trim();
        if part.is_empty() {
            continue;
        }

        let target: Target = Target::from_str(part).map_err(|reason| InputError::InvalidTarget {
            input: part.to_string(),
            reason,
        })?;

        total += target.len();
        if total > MAX_EXPANDED_TARGETS {
            return Err(InputError::InvalidTarget {
                input: part.to_string(),
                reason: format!("target list expands to more than {MAX_EXPANDED_TARGETS} addresses"),
            });
        }
        addrs.extend(target.addresses());
    }

    Ok(addrs.into_iter().collect())
}

fn parse_host(s: &str) -> Option<Target> {
    s.parse::<IpAddr>()
        .ok()
        .map(|target_addr| Target::Host { target_addr })
}

/// Parses a range string like "1.1.1.1-2.2.2.2" or "1.1.1.1-50".
fn parse_ip_range(s: &str) -> Result<Option<Target>, String> {
    let Some((start_str, end_str)) = s.split_once('-') else {
        return Ok(None);
    };

    let start_addr = start_str
        .trim()
        .parse::<Ipv4Addr>()
        .map_err(|e| format!("invalid start IP in range '{start_str}': {e}"))?;

    let end_addr = parse_range_end_addr(end_str.trim(), &start_addr, s)?;
    if end_addr < start_addr {
        return Err(format!("range end {end_addr} lies before start {start_addr}"));
    }

    let ipv4_range = Ipv4Range::new(start_addr, end_addr);
    Ok(Some(Target::Range { ipv4_range }))
}

/// Helper to parse the end address of a range.
///
/// Handles abbreviated forms like "192.168.1.1-50" (implies 192.168.1.50)
/// and full forms like "192.168.1.1-192.168.1.255".
fn parse_range_end_addr(
    end_str: &str,
    start_addr: &Ipv4Addr,
    original_s: &str,
) -> Result<Ipv4Addr, String> {
    if let Ok(full_addr) = end_str.parse::<Ipv4Addr>() {
        return Ok(full_addr);
    }

    if end_str.is_empty() {
        return Err(format!("end range cannot be empty: {original_s}"));
    }

    let mut end_octets = start_addr.octets();
    let partial_octets: Vec<u8> = end_str
        .split('.')
        .map(|octet_str| octet_str.parse::<u8>())
        .collect::<Result<Vec<u8>, _>>()
        .map_err(|e| format!("invalid end range '{end_str}': {e}"))?;

    if partial_octets.len() > 4 {
        return Err(format!("end range has too many octets: {end_str}"));
    }

    let start_index: usize = 4 - partial_octets.len();
    end_octets[start_index..].copy_from_slice(&partial_octets);

    Ok(Ipv4Addr::from(end_octets))
}

/// Parses CIDR notation like "192.168.1.0/24" into its usable hosts.
fn parse_cidr_range(s: &str) -> Result<Option<Target>, String> {
    let Some((ip_str, prefix_str)) = s.split_once('/') else {
        return Ok(None);
    };

    let ipv4_addr = ip_str
        .parse::<Ipv4Addr>()
        .map_err(|e| format!("invalid IP in CIDR '{ip_str}': {e}"))?;

    let prefix = prefix_str
        .parse::<u8>()
        .map_err(|e| format!("invalid prefix in CIDR '{prefix_str}': {e}"))?;

    let network = Ipv4Network::new(ipv4_addr, prefix).map_err(|e| e.to_string())?;
    let ipv4_range = range::host_range(network);

    Ok(Some(Target::Range { ipv4_range }))
}

// ╔════════════════════════════════════════════╗
// ║ ████████╗███████╗███████╗████████╗███████╗ ║
// ║ ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝██╔════╝ ║
// ║    ██║   █████╗  ███████╗   ██║   ███████╗ ║
// ║    ██║   ██╔══╝  ╚════██║   ██║   ╚════██║ ║
// ║    ██║   ███████╗███████║   ██║   ███████║ ║
// ║    ╚═╝   ╚══════╝╚══════╝   ╚═╝   ╚══════╝ ║
// ╚════════════════════════════════════════════╝
