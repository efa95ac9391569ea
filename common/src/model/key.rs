use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;

use pnet::util::MacAddr;
use serde::{Deserialize, Serialize};

use crate::network::mac;

/// Identity of a node in the topology.
///
/// Hosts are keyed by MAC and fall back to an IP key only while no MAC is known
/// for them. Switch nodes that are not themselves discovered hosts may also be
/// keyed by the name another device advertised for them.
///
/// On the wire a key is the normalized MAC, the address, or `name:` followed by
/// the name. The prefix keeps a switch that calls itself `10.0.0.99` apart from
/// the host at that address. [`Display`](fmt::Display) shows names bare.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum NodeKey {
    Mac(MacAddr),
    Ip(IpAddr),
    Name(String),
}

impl NodeKey {
    pub fn mac(&self) -> Option<MacAddr> {
        match self {
            NodeKey::Mac(mac) => Some(*mac),
            _ => None,
        }
    }

    pub fn ip(&self) -> Option<IpAddr> {
        match self {
            NodeKey::Ip(ip) => Some(*ip),
            _ => None,
        }
    }
}

/// Marks a [`NodeKey::Name`] in the serialized form.
pub const NAME_PREFIX: &str = "name:";

impl NodeKey {
    /// The serialized form; parses back to the same variant.
    pub fn wire(&self) -> String {
        match self {
            NodeKey::Name(name) => format!("{NAME_PREFIX}{name}"),
            other => other.to_string(),
        }
    }
}

impl fmt::Display for NodeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeKey::Mac(mac) => write!(f, "{mac}"),
            NodeKey::Ip(ip) => write!(f, "{ip}"),
            NodeKey::Name(name) => write!(f, "{name}"),
        }
    }
}

impl FromStr for NodeKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Err("empty node key".to_string());
        }
        if let Some(name) = s.strip_prefix(NAME_PREFIX) {
            if name.is_empty() {
                return Err("empty node name".to_string());
            }
            return Ok(NodeKey::Name(name.to_string()));
        }
        if let Ok(ip) = s.parse::<IpAddr>() {
            return Ok(NodeKey::Ip(ip));
        }
        if s.len() == 17
            && let Some(mac) = mac::parse_mac(s)
        {
            return Ok(NodeKey::Mac(mac));
        }
        Ok(NodeKey::Name(s.to_string()))
    }
}

impl From<NodeKey> for String {
    fn from(key: NodeKey) -> Self {
        key.wire()
    }
}

impl TryFrom<String> for NodeKey {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
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
