use std::cmp::Reverse;
use std::fmt;
use std::net::IpAddr;

use pnet::util::MacAddr;
use serde::{Deserialize, Serialize};

use crate::model::{NodeKey, Source};
use crate::network::mac;

/// Collector that reported an edge, ordered by confidence (lowest first).
///
/// Manual overrides beat LLDP, LLDP beats SNMP forwarding tables, and anything
/// beats an attachment guessed from a traceroute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EdgeSource {
    Trace,
    Snmp,
    Lldp,
    Manual,
}

impl EdgeSource {
    pub fn rank(&self) -> u8 {
        match self {
            EdgeSource::Trace => 0,
            EdgeSource::Snmp => 1,
            EdgeSource::Lldp => 2,
            EdgeSource::Manual => 3,
        }
    }
}

impl From<EdgeSource> for Source {
    fn from(source: EdgeSource) -> Self {
        match source {
            EdgeSource::Trace => Source::Trace,
            EdgeSource::Snmp => Source::Snmp,
            EdgeSource::Lldp => Source::Lldp,
            EdgeSource::Manual => Source::Manual,
        }
    }
}

impl fmt::Display for EdgeSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name: &str = match self {
            EdgeSource::Trace => "trace",
            EdgeSource::Snmp => "snmp",
            EdgeSource::Lldp => "lldp",
            EdgeSource::Manual => "manual",
        };
        write!(f, "{name}")
    }
}

/// An edge endpoint as a collector saw it, before it is resolved to a node.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Endpoint {
    Mac(MacAddr),
    Ip(IpAddr),
    Name(String),
    /// An LLDP chassis: matched by MAC first, then by advertised name.
    Chassis {
        mac: Option<MacAddr>,
        name: Option<String>,
    },
}

impl Endpoint {
    /// Reads an operator-typed identifier: an address, a MAC, or else a hostname.
    pub fn from_identifier(s: &str) -> Self {
        let s: &str = s.trim();
        if let Ok(ip) = s.parse::<IpAddr>() {
            return Endpoint::Ip(ip);
        }
        if let Some(mac) = mac::parse_mac(s) {
            return Endpoint::Mac(mac);
        }
        Endpoint::Name(s.to_string())
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Endpoint::Mac(mac) => write!(f, "{mac}"),
            Endpoint::Ip(ip) => write!(f, "{ip}"),
            Endpoint::Name(name) => write!(f, "{name}"),
            Endpoint::Chassis { mac, name } => match (name, mac) {
                (Some(name), _) => write!(f, "{name}"),
                (None, Some(mac)) => write!(f, "{mac}"),
                (None, None) => write!(f, "unidentified chassis"),
            },
        }
    }
}

/// Raw edge contribution: `child` is attached to `parent`, at `parent`'s `port`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EdgeReport {
    pub parent: Endpoint,
    pub child: Endpoint,
    pub port: Option<String>,
    pub source: EdgeSource,
}

/// One source's claim about a resolved edge.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EdgeClaim {
    pub parent: NodeKey,
    pub child: NodeKey,
    pub port: Option<String>,
    pub source: EdgeSource,
}

impl EdgeClaim {
    /// Preference order: highest confidence first, then a labeled port over none,
    /// then the lexicographically smallest port, then node order. Smaller sorts first.
    pub fn preference(&self) -> (Reverse<EdgeSource>, bool, Option<&str>, &NodeKey, &NodeKey) {
        (
            Reverse(self.source),
            self.port.is_none(),
            self.port.as_deref(),
            &self.parent,
            &self.child,
        )
    }
}

/// An authoritative edge plus every losing claim about the same node pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Edge {
    pub parent: NodeKey,
    pub child: NodeKey,
    pub port: Option<String>,
    pub source: EdgeSource,
    pub alternates: Vec<EdgeClaim>,
}

impl Edge {
    pub fn from_claims(winner: EdgeClaim, alternates: Vec<EdgeClaim>) -> Self {
        Self {
            parent: winner.parent,
            child: winner.child,
            port: winner.port,
            source: winner.source,
            alternates,
        }
    }

    /// The unordered endpoint pair, smaller key first.
    pub fn pair(&self) -> (&NodeKey, &NodeKey) {
        ordered_pair(&self.parent, &self.child)
    }

    pub fn touches(&self, key: &NodeKey) -> bool {
        &self.parent == key || &self.child == key
    }
}

pub fn ordered_pair<'a>(a: &'a NodeKey, b: &'a NodeKey) -> (&'a NodeKey, &'a NodeKey) {
    if a <= b { (a, b) } else { (b, a) }
}

// ╔════════════════════════════════════════════╗
// ║ ████████╗███████╗███████╗████████╗███████╗ ║
// ║ ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝██╔════╝ ║
// ║    ██║   █████╗  ███████╗   ██║   ███████╗ ║
// ║    ██║   ██╔══╝  ╚════██║   ██║   ╚════██║ ║
// ║    ██║   ███████╗███████║   ██║   ███████║ ║
// ║    ╚═╝   ╚══════╝╚══════╝   ╚═╝   ╚══════╝ ║
// ╚════════════════════════════════════════════╝
