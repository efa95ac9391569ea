//! # BRIDGE-MIB / Q-BRIDGE-MIB decoding
//!
//! Turns walked forwarding-table rows into `MAC -> port` mappings. The SNMP transport
//! lives in `lantopo-core`; rows arrive here as plain `(oid components, value)` pairs.

use std::collections::BTreeMap;

use pnet::util::MacAddr;

pub const SYS_NAME: &[u64] = &[1, 3, 6, 1, 2, 1, 1, 5, 0];
pub const IF_DESCR: &[u64] = &[1, 3, 6, 1, 2, 1, 2, 2, 1, 2];
pub const DOT1D_BASE_PORT_IF_INDEX: &[u64] = &[1, 3, 6, 1, 2, 1, 17, 1, 4, 1, 2];
pub const DOT1D_TP_FDB_PORT: &[u64] = &[1, 3, 6, 1, 2, 1, 17, 4, 3, 1, 2];
pub const DOT1Q_TP_FDB_PORT: &[u64] = &[1, 3, 6, 1, 2, 1, 17, 7, 1, 2, 2, 1, 2];

/// A walked value, detached from the transport's borrowed types.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VarValue {
    Integer(i64),
    Text(String),
    Other,
}

impl VarValue {
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            VarValue::Integer(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            VarValue::Text(s) => Some(s),
            _ => None,
        }
    }
}

pub type Row = (Vec<u64>, VarValue);

/// Everything read from one switch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BridgeTables {
    pub sys_name: Option<String>,
    pub if_descr: Vec<Row>,
    pub base_port_if_index: Vec<Row>,
    pub q_fdb_port: Vec<Row>,
    pub fdb_port: Vec<Row>,
}

/// Where one MAC was learned on a switch.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct PortMapping {
    pub if_index: u32,
    pub port_name: String,
}

/// Friendly port name for an `ifDescr` string.
///
/// `unit 1 port 5 Gigabit - Level` and `Slot: 0 Port: 3 10G - Level` become
/// `U1/g5` and `U0/x3`; `lag 2` becomes `LAG2`; anything else is kept trimmed.
/// Blank descriptions yield `None`.
pub fn port_name_from_descr(descr: &str) -> Option<String> {
    if let Some(name) = unit_port_name(descr) {
        return Some(name);
    }
    let trimmed: &str = descr.trim();
    if let Some(rest) = trimmed.strip_prefix("lag ")
        && let Some(Ok(lag)) = rest.split_whitespace().next().map(str::parse::<u32>)
    {
        return Some(format!("LAG{lag}"));
    }
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

fn unit_port_name(descr: &str) -> Option<String> {
    let rest: &str = strip_prefix_ignore_case(descr, "unit")
        .or_else(|| strip_prefix_ignore_case(descr, "slot:"))?;
    let (unit, rest) = leading_number(rest.trim_start())?;
    let rest: &str = rest.trim_start();
    let rest: &str = strip_prefix_ignore_case(rest, "port:")
        .or_else(|| strip_prefix_ignore_case(rest, "port"))?;
    let (port, rest) = leading_number(rest.trim_start())?;
    if !rest.starts_with(char::is_whitespace) {
        return None;
    }
    let speed: char = if rest.contains("10G") { 'x' } else { 'g' };
    Some(format!("U{unit}/{speed}{port}"))
}

fn strip_prefix_ignore_case<'a>(s: &'a str, prefix: &str) -> Option<&'a str> {
    let head: &str = s.get(..prefix.len())?;
    head.eq_ignore_ascii_case(prefix).then(|| &s[prefix.len()..])
}

fn leading_number(s: &str) -> Option<(u32, &str)> {
    let end: usize = s.find(|c: char| !c.is_ascii_digit()).unwrap_or(s.len());
    let n: u32 = s[..end].parse().ok()?;
    Some((n, &s[end..]))
}

/// `ifIndex -> port name` for every described interface.
pub fn port_names(if_descr: &[Row]) -> BTreeMap<u32, String> {
    if_descr
        .iter()
        .filter_map(|(oid, value)| {
            let if_index: u32 = last_index(oid)?;
            let name: String = port_name_from_descr(value.as_text()?)?;
            Some((if_index, name))
        })
        .collect()
}

/// `bridge port -> ifIndex` from `dot1dBasePortIfIndex`.
pub fn bridge_port_if_index(rows: &[Row]) -> BTreeMap<u32, u32> {
    rows.iter()
        .filter_map(|(oid, value)| {
            let bridge_port: u32 = last_index(oid)?;
            let if_index: u32 = u32::try_from(value.as_integer()?).ok()?;
            Some((bridge_port, if_index))
        })
        .collect()
}

/// MAC encoded in the last six components of a forwarding-table OID.
pub fn mac_from_index(oid: &[u64]) -> Option<MacAddr> {
    let tail: &[u64] = oid.get(oid.len().checked_sub(6)?..)?;
    let mut octets: [u8; 6] = [0; 6];
    for (octet, component) in octets.iter_mut().zip(tail) {
        *octet = u8::try_from(*component).ok()?;
    }
    let [a, b, c, d, e, f] = octets;
    Some(MacAddr::new(a, b, c, d, e, f))
}

fn last_index(oid: &[u64]) -> Option<u32> {
    oid.last().and_then(|component| u32::try_from(*component).ok())
}

/// Resolves the forwarding table of one switch to `MAC -> port`.
///
/// Q-BRIDGE rows are preferred; the plain BRIDGE-MIB table is used only when the
/// VLAN-aware walk returned nothing. Entries on bridge port 0 (the switch itself)
/// are skipped, and a MAC seen on several VLANs keeps its first port.
pub fn resolve_ports(tables: &BridgeTables) -> BTreeMap<MacAddr, PortMapping> {
    let names: BTreeMap<u32, String> = port_names(&tables.if_descr);
    let bridge_ports: BTreeMap<u32, u32> = bridge_port_if_index(&tables.base_port_if_index);
    let fdb: &[Row] = if tables.q_fdb_port.is_empty() {
        &tables.fdb_port
    } else {
        &tables.q_fdb_port
    };

    let mut result: BTreeMap<MacAddr, PortMapping> = BTreeMap::new();
    for (oid, value) in fdb {
        let Some(mac) = mac_from_index(oid) else {
            continue;
        };
        let Some(bridge_port) = value.as_integer().and_then(|p| u32::try_from(p).ok()) else {
            continue;
        };
        if bridge_port == 0 {
            continue;
        }
        let if_index: u32 = bridge_ports.get(&bridge_port).copied().unwrap_or(bridge_port);
        let port_name: String = names
            .get(&if_index)
            .cloned()
            .unwrap_or_else(|| format!("port{if_index}"));
        result.entry(mac).or_insert(PortMapping {
            if_index,
            port_name,
        });
    }
    result
}

// ╔════════════════════════════════════════════╗
// ║ ████████╗███████╗███████╗████████╗███████╗ ║
// ║ ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝██╔════╝ ║
// ║    ██║   █████╗  ███████╗   ██║   ███████╗ ║
// ║    ██║   ██╔══╝  ╚════██║   ██║   ╚════██║ ║
// ║    ██║   ███████╗███████║   ██║   ███████║ ║
// ║    ╚═╝   ╚══════╝╚══════╝   ╚═╝   ╚══════╝ ║
// ╚════════════════════════════════════════════╝
