//! Structured JSON document: the topology model, field for field.

use anyhow::Context;
use lantopo_common::model::NetworkTopology;

/// Pretty-printed with two-space indentation and a trailing newline.
pub fn to_json(topology: &NetworkTopology) -> anyhow::Result<String> {
    let mut text: String =
        serde_json::to_string_pretty(topology).context("serializing topology")?;
    text.push('\n');
    Ok(text)
}

pub fn from_json(text: &str) -> anyhow::Result<NetworkTopology> {
    serde_json::from_str(text).context("parsing topology document")
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
    use lantopo_common::model::{
        Category, Edge, EdgeClaim, EdgeSource, Hop, Host, NodeKey, TraceState, TracerouteResult,
        Warning,
    };
    use pnet::util::MacAddr;

    fn sample() -> NetworkTopology {
        let mut topology = NetworkTopology::default();
        let mut host = Host::new(NodeKey::Mac(MacAddr::new(0xaa, 0xbb, 0xcc, 0, 0, 1)));
        host.ips.insert("10.0.0.10".parse().unwrap());
        host.category = Some(Category::Server);
        let switch = NodeKey::Ip("10.0.0.1".parse().unwrap());
        topology.edges.push(Edge {
            parent: switch.clone(),
            child: host.key.clone(),
            port: Some("g3".into()),
            source: EdgeSource::Manual,
            alternates: vec![EdgeClaim {
                parent: switch,
                child: host.key.clone(),
                port: Some("5".into()),
                source: EdgeSource::Snmp,
            }],
        });
        topology.hosts.insert(host.key.clone(), host);
        let target = "8.8.8.8".parse().unwrap();
        topology.traceroutes.insert(
            target,
            TracerouteResult {
                target,
                hops: vec![Hop::unresponsive(1)],
                state: TraceState::TimedOut,
            },
        );
        topology.warnings.push(Warning::new("snmp", Some("10.0.0.2".into()), "switch unreachable"));
        topology
    }

    #[test]
    fn document_should_read_back_into_the_same_topology() {
        let topology = sample();
        let text = to_json(&topology).unwrap();
        assert_eq!(from_json(&text).unwrap(), topology);
        assert_eq!(to_json(&topology).unwrap(), text);
    }

    #[test]
    fn document_should_use_readable_keys_and_enums() {
        let text = to_json(&sample()).unwrap();
        assert!(text.contains("\"aa:bb:cc:00:00:01\": {"));
        assert!(text.contains("\"source\": \"manual\""));
        assert!(text.contains("\"state\": \"timed-out\""));
        assert!(text.contains("\"category\": \"server\""));
        assert!(text.ends_with("}\n"));
    }
}
