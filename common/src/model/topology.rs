use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::net::IpAddr;

use serde::{Deserialize, Serialize};

use crate::model::{Category, Edge, Host, NodeKey, Source, Subnet, TracerouteResult};

/// A forwarding device that is not itself a discovered host: an SNMP-walked
/// switch without an ARP entry, an LLDP chassis, a manual switch identifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwitchNode {
    pub key: NodeKey,
    pub name: Option<String>,
    pub address: Option<IpAddr>,
    pub sources: BTreeSet<Source>,
}

impl SwitchNode {
    pub fn label(&self) -> String {
        match (&self.name, self.address) {
            (Some(name), Some(addr)) if name != &addr.to_string() => format!("{name} ({addr})"),
            (Some(name), _) => name.clone(),
            (None, Some(addr)) => addr.to_string(),
            (None, None) => self.key.to_string(),
        }
    }
}

/// A non-fatal problem recorded during the run.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Warning {
    /// Collector or stage that raised it, e.g. `"snmp"`.
    pub component: String,
    /// The interface, host, switch or target concerned.
    pub subject: Option<String>,
    pub message: String,
}

impl Warning {
    pub fn new(component: &str, subject: Option<String>, message: impl Into<String>) -> Self {
        Self {
            component: component.to_string(),
            subject,
            message: message.into(),
        }
    }
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.subject {
            Some(subject) => write!(f, "{}: {}: {}", self.component, subject, self.message),
            None => write!(f, "{}: {}", self.component, self.message),
        }
    }
}

/// The finished result of a discovery run.
///
/// Maps are keyed and lists are sorted, so serializing the same topology always
/// yields the same bytes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkTopology {
    pub hosts: BTreeMap<NodeKey, Host>,
    pub switches: BTreeMap<NodeKey, SwitchNode>,
    /// Sorted by unordered endpoint pair.
    pub edges: Vec<Edge>,
    pub traceroutes: BTreeMap<IpAddr, TracerouteResult>,
    /// Sorted by interface name.
    pub subnets: Vec<Subnet>,
    pub warnings: Vec<Warning>,
}

impl NetworkTopology {
    pub fn node_count(&self) -> usize {
        self.hosts.len() + self.switches.len()
    }

    pub fn contains_node(&self, key: &NodeKey) -> bool {
        self.hosts.contains_key(key) || self.switches.contains_key(key)
    }

    pub fn host_by_ip(&self, ip: IpAddr) -> Option<&Host> {
        self.hosts.values().find(|host| host.ips.contains(&ip))
    }

    /// Edges on which `key` is the parent.
    pub fn child_edges<'a>(&'a self, key: &'a NodeKey) -> impl Iterator<Item = &'a Edge> + 'a {
        self.edges.iter().filter(move |edge| &edge.parent == key)
    }

    /// Edges on which `key` is the child.
    pub fn parent_edges<'a>(&'a self, key: &'a NodeKey) -> impl Iterator<Item = &'a Edge> + 'a {
        self.edges.iter().filter(move |edge| &edge.child == key)
    }

    /// Category of a node; switch nodes are switches by construction.
    pub fn category_of(&self, key: &NodeKey) -> Category {
        match self.hosts.get(key) {
            Some(host) => host.category.unwrap_or(Category::Unknown),
            None if self.switches.contains_key(key) => Category::Switch,
            None => Category::Unknown,
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::EdgeSource;

    fn switch_node(name: Option<&str>, addr: Option<&str>) -> SwitchNode {
        SwitchNode {
            key: NodeKey::Name("sw".into()),
            name: name.map(str::to_string),
            address: addr.map(|a| a.parse().unwrap()),
            sources: BTreeSet::new(),
        }
    }

    #[test]
    fn switch_label_should_combine_name_and_address() {
        assert_eq!(
            switch_node(Some("core"), Some("10.0.0.1")).label(),
            "core (10.0.0.1)"
        );
        assert_eq!(switch_node(None, Some("10.0.0.1")).label(), "10.0.0.1");
        assert_eq!(switch_node(None, None).label(), "sw");
    }

    #[test]
    fn warning_display_includes_subject() {
        let warning = Warning::new("snmp", Some("10.0.0.1".into()), "switch unreachable");
        assert_eq!(warning.to_string(), "snmp: 10.0.0.1: switch unreachable");
    }

    #[test]
    fn child_edges_should_filter_by_parent() {
        let parent = NodeKey::Ip("10.0.0.1".parse().unwrap());
        let child = NodeKey::Ip("10.0.0.10".parse().unwrap());
        let topology = NetworkTopology {
            edges: vec![Edge {
                parent: parent.clone(),
                child: child.clone(),
                port: Some("g3".into()),
                source: EdgeSource::Manual,
                alternates: Vec::new(),
            }],
            ..Default::default()
        };
        assert_eq!(topology.child_edges(&parent).count(), 1);
        assert_eq!(topology.child_edges(&child).count(), 0);
        assert_eq!(topology.parent_edges(&child).count(), 1);
        assert_eq!(topology.category_of(&parent), Category::Unknown);
    }
}
