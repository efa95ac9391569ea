//! # Mermaid Flowcharts
//!
//! Node identifiers are derived from node keys (`m` + MAC hex, `i` + address,
//! `n_` + slugged name) and disambiguated in key order, so they are stable
//! across runs and never collide. Every list is emitted in key or edge order.
//!
//! Styles:
//!
//! - **flat**: every node at top level, edges between them.
//! - **hierarchical**: one subgraph per parent node holding the parent and its
//!   leaf children.
//! - **categorized**: one subgraph per category, in category order.
//!
//! Nodes without a parent hang off their subnet's gateway with a dotted link.
//! With more than one scanned subnet every subnet becomes its own subgraph,
//! grouped inside by the chosen style, and a local-host node links to each
//! gateway. Distinct hosts on different subnets reporting the same name are
//! joined with a dotted `same:` link. Every node is declared exactly once.

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::net::IpAddr;

use lantopo_common::config::{DiagramStyle, Direction, RenderOptions};
use lantopo_common::model::host::UNKNOWN_VENDOR;
use lantopo_common::model::{Category, Edge, EdgeSource, Hop, Host, NetworkTopology, NodeKey};
use serde_json::{Map, Value, json};
use tracing::debug;

use crate::tracer;
use crate::vendors;

/// `auto` only picks the hierarchical style above this many nodes.
pub const AUTO_HIERARCHY_MIN_NODES: usize = 5;
/// Labels drop vendor and services above this many nodes.
pub const COMPACT_ABOVE: usize = 40;
/// Spacing is tightened above this many nodes.
pub const TIGHT_SPACING_ABOVE: usize = 30;

const INDENT: &str = "    ";
const LOCAL_ID: &str = "local";

pub fn resolve_style(topology: &NetworkTopology, requested: DiagramStyle) -> DiagramStyle {
    match requested {
        DiagramStyle::Auto
            if !topology.edges.is_empty() && topology.node_count() > AUTO_HIERARCHY_MIN_NODES =>
        {
            DiagramStyle::Hierarchical
        }
        DiagramStyle::Auto => DiagramStyle::Flat,
        explicit => explicit,
    }
}

/// Deep and narrow reads best top-down; wide and shallow left-right.
pub fn resolve_direction(topology: &NetworkTopology, requested: Direction) -> Direction {
    match requested {
        Direction::Auto => {
            let (depth, breadth) = shape(topology);
            if depth >= breadth {
                Direction::TopDown
            } else {
                Direction::LeftRight
            }
        }
        explicit => explicit,
    }
}

/// Number of levels and size of the widest level of the attachment forest.
pub fn shape(topology: &NetworkTopology) -> (usize, usize) {
    let nodes: BTreeSet<&NodeKey> = topology.hosts.keys().chain(topology.switches.keys()).collect();
    let mut children: BTreeMap<&NodeKey, Vec<&NodeKey>> = BTreeMap::new();
    let mut has_parent: BTreeSet<&NodeKey> = BTreeSet::new();
    for edge in &topology.edges {
        children.entry(&edge.parent).or_default().push(&edge.child);
        has_parent.insert(&edge.child);
    }

    let mut level: BTreeMap<&NodeKey, usize> = BTreeMap::new();
    let mut queue: VecDeque<&NodeKey> = VecDeque::new();
    for root in nodes.iter().copied().filter(|key| !has_parent.contains(key)) {
        level.insert(root, 0);
        queue.push_back(root);
    }
    while let Some(key) = queue.pop_front() {
        let next: usize = level[key] + 1;
        for child in children.get(key).into_iter().flatten().copied() {
            if !level.contains_key(child) {
                level.insert(child, next);
                queue.push_back(child);
            }
        }
    }

    let mut widths: BTreeMap<usize, usize> = BTreeMap::new();
    for depth in level.values() {
        *widths.entry(*depth).or_default() += 1;
    }
    let depth: usize = widths.len().max(1);
    let breadth: usize = widths.values().copied().max().unwrap_or(0);
    (depth, breadth)
}

pub fn sanitize(text: &str) -> String {
    text.replace('"', "'").replace('<', "&lt;").replace('>', "&gt;")
}

/// Stable, collision-free identifiers for every node.
pub fn node_ids(topology: &NetworkTopology) -> BTreeMap<NodeKey, String> {
    let keys: BTreeSet<&NodeKey> = topology.hosts.keys().chain(topology.switches.keys()).collect();
    let mut taken: BTreeSet<String> = BTreeSet::new();
    let mut ids: BTreeMap<NodeKey, String> = BTreeMap::new();
    for key in keys {
        let base: String = match key {
            NodeKey::Mac(mac) => format!("m{}", mac.to_string().replace(':', "")),
            NodeKey::Ip(ip) => format!("i{}", ip.to_string().replace(['.', ':'], "_")),
            NodeKey::Name(name) => format!("n_{}", slug(name)),
        };
        let mut id: String = base.clone();
        let mut suffix: usize = 2;
        while !taken.insert(id.clone()) {
            id = format!("{base}_{suffix}");
            suffix += 1;
        }
        ids.insert(key.clone(), id);
    }
    ids
}

fn slug(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_lowercase() } else { '_' })
        .collect()
}

pub fn host_label(host: &Host, compact: bool) -> String {
    let mut parts: Vec<String> = vec![
        host.primary_ip()
            .map_or_else(|| host.key.to_string(), |ip| ip.to_string()),
    ];
    if let Some(name) = &host.hostname {
        parts.push(sanitize(name));
    }
    let vendor: &str = vendors::abbreviate(&host.vendor);
    if vendor != UNKNOWN_VENDOR && (!compact || host.hostname.is_none()) {
        parts.push(sanitize(vendor));
    }
    if !compact {
        parts.extend(
            host.services
                .iter()
                .flatten()
                .take(3)
                .map(|service| sanitize(&service.to_string())),
        );
    }
    parts.join("<br/>")
}

/// One-line title for a subgraph around `key`.
fn title(topology: &NetworkTopology, key: &NodeKey) -> String {
    if let Some(host) = topology.hosts.get(key) {
        let ip: String = host
            .primary_ip()
            .map_or_else(|| key.to_string(), |ip| ip.to_string());
        return match &host.hostname {
            Some(name) => sanitize(&format!("{name} ({ip})")),
            None => ip,
        };
    }
    match topology.switches.get(key) {
        Some(switch) => sanitize(&switch.label()),
        None => sanitize(&key.to_string()),
    }
}

fn addresses_of(topology: &NetworkTopology, key: &NodeKey) -> Vec<IpAddr> {
    match (topology.hosts.get(key), topology.switches.get(key)) {
        (Some(host), _) => host.ips.iter().copied().collect(),
        (None, Some(switch)) => switch.address.into_iter().collect(),
        (None, None) => Vec::new(),
    }
}

/// Index into `topology.subnets` of the subnet each node is drawn in.
///
/// A node lives in the first subnet holding one of its addresses. Nodes without
/// one (switches known only by name) follow their first placed child; anything
/// still unplaced is left out of the map.
pub fn subnet_homes(topology: &NetworkTopology) -> BTreeMap<NodeKey, usize> {
    let mut homes: BTreeMap<NodeKey, usize> = BTreeMap::new();
    for key in topology.hosts.keys().chain(topology.switches.keys()) {
        let addresses: Vec<IpAddr> = addresses_of(topology, key);
        let home: Option<usize> = topology.subnets.iter().position(|subnet| {
            subnet.cidr.is_some_and(|cidr| {
                addresses
                    .iter()
                    .any(|ip| matches!(ip, IpAddr::V4(v4) if cidr.contains(*v4)))
            })
        });
        if let Some(home) = home {
            homes.insert(key.clone(), home);
        }
    }

    loop {
        let mut changed: bool = false;
        for edge in &topology.edges {
            if !homes.contains_key(&edge.parent)
                && topology.contains_node(&edge.parent)
                && let Some(home) = homes.get(&edge.child).copied()
            {
                homes.insert(edge.parent.clone(), home);
                changed = true;
            }
        }
        if !changed {
            return homes;
        }
    }
}

/// Distinct non-gateway hosts on different subnets that report the same name.
pub fn cross_subnet_pairs(
    topology: &NetworkTopology,
    homes: &BTreeMap<NodeKey, usize>,
) -> Vec<(NodeKey, NodeKey, String)> {
    let mut by_name: BTreeMap<String, Vec<(usize, &Host)>> = BTreeMap::new();
    for host in topology.hosts.values().filter(|host| !host.is_gateway) {
        if let (Some(name), Some(home)) = (&host.hostname, homes.get(&host.key)) {
            by_name.entry(name.to_ascii_lowercase()).or_default().push((*home, host));
        }
    }

    let mut pairs: Vec<(NodeKey, NodeKey, String)> = Vec::new();
    for (name, group) in &by_name {
        for (i, (home_a, a)) in group.iter().enumerate() {
            for (home_b, b) in &group[i + 1..] {
                if home_a != home_b {
                    pairs.push((a.key.clone(), b.key.clone(), name.clone()));
                }
            }
        }
    }
    pairs
}

struct Diagram<'a> {
    topology: &'a NetworkTopology,
    ids: BTreeMap<NodeKey, String>,
    compact: bool,
    lines: Vec<String>,
}

impl<'a> Diagram<'a> {
    fn new(topology: &'a NetworkTopology) -> Self {
        Self {
            topology,
            ids: node_ids(topology),
            compact: topology.node_count() > COMPACT_ABOVE,
            lines: Vec::new(),
        }
    }

    fn line(&mut self, depth: usize, text: impl AsRef<str>) {
        self.lines.push(format!("{}{}", INDENT.repeat(depth), text.as_ref()));
    }

    fn blank(&mut self) {
        if self.lines.last().is_some_and(|line| !line.is_empty()) {
            self.lines.push(String::new());
        }
    }

    fn node(&mut self, depth: usize, key: &NodeKey) {
        let Some(id) = self.ids.get(key) else {
            return;
        };
        let declaration: String = match (self.topology.hosts.get(key), self.topology.switches.get(key)) {
            (Some(host), _) if host.is_gateway => {
                format!("{id}{{{{\"{}\"}}}}", host_label(host, self.compact))
            }
            (Some(host), _) if host.is_infrastructure || host.category == Some(Category::Switch) => {
                format!("{id}(\"{}\")", host_label(host, self.compact))
            }
            (Some(host), _) => format!("{id}[\"{}\"]", host_label(host, self.compact)),
            (None, Some(switch)) => format!("{id}(\"{}\")", sanitize(&switch.label())),
            (None, None) => return,
        };
        self.line(depth, declaration);
    }

    fn edge(&mut self, edge: &Edge) {
        let (Some(parent), Some(child)) = (self.ids.get(&edge.parent), self.ids.get(&edge.child)) else {
            return;
        };
        let arrow: &str = match edge.source {
            EdgeSource::Trace => "-.->",
            _ => "-->",
        };
        let text: String = match &edge.port {
            Some(port) => format!("{parent} {arrow}|\"{}\"| {child}", sanitize(port)),
            None => format!("{parent} {arrow} {child}"),
        };
        self.line(1, text);
    }

    fn edges(&mut self) {
        let topology: &NetworkTopology = self.topology;
        for edge in &topology.edges {
            self.edge(edge);
        }
    }

    /// Gateway host that parentless `key` hangs off, if any.
    fn gateway_of(&self, key: &NodeKey) -> Option<&'a NodeKey> {
        let topology: &'a NetworkTopology = self.topology;
        let address = match (topology.hosts.get(key), topology.switches.get(key)) {
            (Some(host), _) => host.primary_ip(),
            (None, Some(switch)) => switch.address,
            (None, None) => None,
        };
        if let Some(gateway) = address
            .and_then(|ip| tracer::gateway_for(&topology.subnets, ip))
            .and_then(|ip| topology.host_by_ip(ip))
        {
            return Some(&gateway.key);
        }
        let mut gateways = topology.hosts.values().filter(|host| host.is_gateway);
        match (gateways.next(), gateways.next()) {
            (Some(only), None) => Some(&only.key),
            _ => None,
        }
    }

    fn gateway_links(&mut self) {
        let topology: &NetworkTopology = self.topology;
        let with_parent: BTreeSet<&NodeKey> = topology.edges.iter().map(|edge| &edge.child).collect();
        let mut links: Vec<String> = Vec::new();
        for key in self.ids.keys() {
            if with_parent.contains(key) || topology.hosts.get(key).is_some_and(|host| host.is_gateway) {
                continue;
            }
            if let Some(gateway) = self.gateway_of(key)
                && gateway != key
            {
                links.push(format!("{} -.- {}", self.ids[gateway], self.ids[key]));
            }
        }
        for link in links {
            self.line(1, link);
        }
    }

    fn body(&mut self, style: DiagramStyle, keys: &BTreeSet<NodeKey>, depth: usize, scope: &str) {
        match style {
            DiagramStyle::Hierarchical => self.hierarchical(keys, depth),
            DiagramStyle::Categorized => self.categorized(keys, depth, scope),
            DiagramStyle::Flat | DiagramStyle::Auto => self.flat(keys, depth),
        }
    }

    fn flat(&mut self, keys: &BTreeSet<NodeKey>, depth: usize) {
        for key in keys {
            self.node(depth, key);
        }
    }

    fn hierarchical(&mut self, keys: &BTreeSet<NodeKey>, depth: usize) {
        let topology: &NetworkTopology = self.topology;
        let parents: BTreeSet<&NodeKey> = topology
            .edges
            .iter()
            .map(|edge| &edge.parent)
            .filter(|parent| keys.contains(*parent))
            .collect();
        let mut placed: BTreeSet<&NodeKey> = BTreeSet::new();

        for parent in &parents {
            let Some(id) = self.ids.get(*parent).cloned() else {
                continue;
            };
            let leaves: BTreeSet<&NodeKey> = topology
                .child_edges(parent)
                .map(|edge| &edge.child)
                .filter(|child| keys.contains(*child) && !parents.contains(child) && !placed.contains(child))
                .collect();
            self.line(depth, format!("subgraph g_{id}[\"{}\"]", title(topology, parent)));
            self.node(depth + 1, parent);
            placed.insert(*parent);
            for leaf in leaves {
                self.node(depth + 1, leaf);
                placed.insert(leaf);
            }
            self.line(depth, "end");
        }

        for key in keys.iter().filter(|key| !placed.contains(key)) {
            self.node(depth, key);
        }
    }

    fn categorized(&mut self, keys: &BTreeSet<NodeKey>, depth: usize, scope: &str) {
        let topology: &NetworkTopology = self.topology;
        let mut clusters: BTreeMap<Category, Vec<&NodeKey>> = BTreeMap::new();
        for key in keys {
            clusters.entry(topology.category_of(key)).or_default().push(key);
        }
        for (category, members) in clusters {
            let id: String = format!("c_{scope}{}", category.to_string().replace('-', "_"));
            self.line(depth, format!("subgraph {id}[\"{} ({})\"]", category.label(), members.len()));
            for key in members {
                self.node(depth + 1, key);
            }
            self.line(depth, "end");
        }
    }

    /// One subgraph per scanned subnet plus the local host fanning out to
    /// every gateway.
    fn subnets(&mut self, style: DiagramStyle, homes: &BTreeMap<NodeKey, usize>) {
        let topology: &NetworkTopology = self.topology;
        let interfaces: Vec<String> = topology
            .subnets
            .iter()
            .filter_map(|subnet| Some(sanitize(&format!("{}: {}", subnet.interface, subnet.cidr?))))
            .collect();
        self.line(1, "subgraph localbox[\"Local Host\"]");
        self.line(2, format!("{LOCAL_ID}[\"{}\"]", interfaces.join("<br/>")));
        self.line(1, "end");

        for (n, subnet) in topology.subnets.iter().enumerate() {
            let Some(cidr) = subnet.cidr else {
                continue;
            };
            let members: BTreeSet<NodeKey> = homes
                .iter()
                .filter(|(_, home)| **home == n)
                .map(|(key, _)| key.clone())
                .collect();
            self.blank();
            self.line(1, format!("subgraph s{n}[\"{cidr} ({})\"]", sanitize(&subnet.interface)));
            self.body(style, &members, 2, &format!("s{n}_"));
            self.line(1, "end");
        }

        let rest: BTreeSet<NodeKey> = self.ids.keys().filter(|key| !homes.contains_key(*key)).cloned().collect();
        if !rest.is_empty() {
            self.blank();
            self.body(style, &rest, 1, "");
        }

        self.blank();
        let links: Vec<String> = topology
            .subnets
            .iter()
            .filter_map(|subnet| {
                let gateway: &Host = topology.host_by_ip(IpAddr::V4(subnet.gateway?))?;
                let id: &String = self.ids.get(&gateway.key)?;
                Some(format!("{LOCAL_ID} -->|{}| {id}", sanitize(&subnet.interface)))
            })
            .collect();
        for link in links {
            self.line(1, link);
        }
    }

    fn cross_subnet_links(&mut self, homes: &BTreeMap<NodeKey, usize>) {
        let links: Vec<String> = cross_subnet_pairs(self.topology, homes)
            .into_iter()
            .filter_map(|(a, b, name)| {
                Some(format!(
                    "{} <-.->|\"same: {}\"| {}",
                    self.ids.get(&a)?,
                    sanitize(&name),
                    self.ids.get(&b)?
                ))
            })
            .collect();
        for link in links {
            self.line(1, link);
        }
    }

    fn traceroutes(&mut self) {
        let topology: &NetworkTopology = self.topology;
        let gateway: Option<String> = topology
            .hosts
            .values()
            .find(|host| host.is_gateway)
            .and_then(|host| self.ids.get(&host.key).cloned());

        for (n, trace) in topology.traceroutes.values().enumerate() {
            if trace.hops.is_empty() {
                continue;
            }
            self.blank();
            self.line(1, format!("subgraph t{n}[\"Traceroute: {}\"]", trace.target));
            let hop_ids: Vec<String> = trace.hops.iter().map(|hop| format!("t{n}_{}", hop.index)).collect();
            for (hop, id) in trace.hops.iter().zip(&hop_ids) {
                self.line(2, format!("{id}[\"{}\"]", hop_label(hop)));
            }
            self.line(1, "end");
            for pair in hop_ids.windows(2) {
                self.line(1, format!("{} --> {}", pair[0], pair[1]));
            }
            if let (Some(gateway), Some(first)) = (&gateway, hop_ids.first()) {
                self.line(1, format!("{gateway} --> {first}"));
            }
        }
    }
}

fn hop_label(hop: &Hop) -> String {
    let Some(addr) = hop.addr else {
        return format!("Hop {}: * * *", hop.index);
    };
    let mut label: String = format!("Hop {}: {addr}", hop.index);
    if let Some(name) = &hop.hostname {
        label.push_str(&format!("<br/>{}", sanitize(name)));
    }
    if let Some(micros) = hop.rtt_micros {
        label.push_str(&format!("<br/>{:.1} ms", micros as f64 / 1000.0));
    }
    label
}

/// `%%{init: ...}%%` line, when the viewer needs any hint.
fn preamble(topology: &NetworkTopology, elk: bool) -> Option<String> {
    let mut flowchart: Map<String, Value> = Map::new();
    if elk {
        flowchart.insert("defaultRenderer".into(), json!("elk"));
    }
    if topology.node_count() > TIGHT_SPACING_ABOVE {
        flowchart.insert("nodeSpacing".into(), json!(30));
        flowchart.insert("rankSpacing".into(), json!(30));
    }
    (!flowchart.is_empty()).then(|| format!("%%{{init: {}}}%%", json!({ "flowchart": flowchart })))
}

/// The complete fenced diagram.
pub fn render(topology: &NetworkTopology, options: &RenderOptions) -> String {
    let style: DiagramStyle = resolve_style(topology, options.style);
    let direction: Direction = resolve_direction(topology, options.direction);
    debug!(?style, %direction, nodes = topology.node_count(), "rendering diagram");

    let scanned: usize = topology.subnets.iter().filter(|subnet| subnet.cidr.is_some()).count();
    let mut diagram: Diagram = Diagram::new(topology);
    diagram.line(0, format!("flowchart {direction}"));
    let homes: Option<BTreeMap<NodeKey, usize>> = (scanned > 1).then(|| subnet_homes(topology));
    match &homes {
        Some(homes) => diagram.subnets(style, homes),
        None => {
            let keys: BTreeSet<NodeKey> = diagram.ids.keys().cloned().collect();
            diagram.body(style, &keys, 1, "");
        }
    }
    diagram.blank();
    diagram.edges();
    diagram.gateway_links();
    if let Some(homes) = &homes {
        diagram.cross_subnet_links(homes);
    }
    diagram.traceroutes();

    let mut out: String = String::from("```mermaid\n");
    if let Some(init) = preamble(topology, options.elk) {
        out.push_str(&init);
        out.push('\n');
    }
    while diagram.lines.last().is_some_and(String::is_empty) {
        diagram.lines.pop();
    }
    for line in &diagram.lines {
        out.push_str(line);
        out.push('\n');
    }
    out.push_str("```\n");
    out
}

// ╔════════════════════════════════════════════╗
// ║ ████████╗███████╗███████╗████████╗███████╗ ║
// ║ ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝██╔════╝ ║
// ║    ██║   █████╗  ███████╗   ██║   ███████╗ ║
// ║    ██║   ██╔══╝  ╚════██║   ██║   ╚════██║ ║
// ║    ██║   ███████╗███████║   ██║   ███████║ ║
// ║    ╚═╝   ╚══════╝╚══════╝   ╚═╝   ╚══════╝ ║
// ╚════════════════════════════════════════════╝
