//! # lldpctl JSON
//!
//! `lldpctl -f json` changes shape with the number of neighbors and with the
//! lldpd version, so the document is walked as a `serde_json::Value`:
//!
//! - `lldp.interface` is an object keyed by local interface, or a list of such objects.
//! - `chassis` is either `{ "id": {..}, "name": ".." }` or `{ "<name>": { "id": {..} } }`.

use anyhow::Context;
use lantopo_common::network::mac::parse_mac;
use pnet::util::MacAddr;
use serde_json::{Map, Value};

/// One neighbor seen on one local interface.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct LldpNeighbor {
    pub local_interface: String,
    pub chassis_mac: Option<MacAddr>,
    pub chassis_name: Option<String>,
    /// The neighbor's port: `port.id.value`, else `port.descr`.
    pub port: Option<String>,
}

pub fn parse_neighbors(raw: &str) -> anyhow::Result<Vec<LldpNeighbor>> {
    let document: Value = serde_json::from_str(raw).context("lldpctl output is not JSON")?;
    Ok(neighbors_from_value(&document))
}

pub fn neighbors_from_value(document: &Value) -> Vec<LldpNeighbor> {
    let interfaces: Vec<(&String, &Value)> = match document.pointer("/lldp/interface") {
        Some(Value::Object(map)) => map.iter().collect(),
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(Value::as_object)
            .flat_map(|map| map.iter())
            .collect(),
        _ => Vec::new(),
    };

    interfaces
        .into_iter()
        .filter_map(|(name, data)| {
            let data: &Map<String, Value> = data.as_object()?;
            let (chassis_mac, chassis_name) = data
                .get("chassis")
                .and_then(Value::as_object)
                .map(parse_chassis)
                .unwrap_or_default();
            Some(LldpNeighbor {
                local_interface: name.clone(),
                chassis_mac,
                chassis_name,
                port: data.get("port").and_then(parse_port),
            })
        })
        .collect()
}

fn parse_chassis(chassis: &Map<String, Value>) -> (Option<MacAddr>, Option<String>) {
    if chassis.contains_key("id") {
        return (
            chassis_id_mac(chassis.get("id")),
            non_empty(chassis.get("name").and_then(Value::as_str)),
        );
    }
    for (key, inner) in chassis {
        if let Some(inner) = inner.as_object() {
            let name: Option<String> =
                non_empty(inner.get("name").and_then(Value::as_str)).or_else(|| non_empty(Some(key.as_str())));
            return (chassis_id_mac(inner.get("id")), name);
        }
    }
    (None, None)
}

fn chassis_id_mac(id: Option<&Value>) -> Option<MacAddr> {
    let id: &Map<String, Value> = id?.as_object()?;
    if id.get("type").and_then(Value::as_str) != Some("mac") {
        return None;
    }
    parse_mac(id.get("value")?.as_str()?)
}

fn parse_port(port: &Value) -> Option<String> {
    non_empty(port.pointer("/id/value").and_then(Value::as_str))
        .or_else(|| non_empty(port.get("descr").and_then(Value::as_str)))
}

fn non_empty(s: Option<&str>) -> Option<String> {
    s.map(str::trim).filter(|s| !s.is_empty()).map(str::to_string)
}

// ╔════════════════════════════════════════════╗
// ║ ████████╗███████╗███████╗████████╗███████╗ ║
// ║ ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝██╔════╝ ║
// ║    ██║   █████╗  ███████╗   ██║   ███████╗ ║
// ║    ██║   ██╔══╝  ╚════██║   ██║   ╚════██║ ║
// ║    ██║   ███████╗███████║   ██║   ███████║ ║
// ║    ╚═╝   ╚══════╝╚══════╝   ╚═╝   ╚══════╝ ║
// ╚════════════════════════════════════════════╝
