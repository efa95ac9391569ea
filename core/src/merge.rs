//! # Topology Merger
//!
//! Collectors never touch the topology. They emit [`Contribution`]s over a channel
//! and a single reducer task folds them into a [`Merger`], which keeps every input
//! in canonical (sorted, de-duplicated) form. All identity and conflict decisions
//! are deferred to [`Merger::finish`], so the finished topology depends only on the
//! *set* of contributions: arrival order and repetition make no difference.
//!
//! ## Identity
//!
//! Hosts are keyed by MAC. An address without a known MAC is keyed by itself until
//! some collector binds a MAC to it, at which point it joins the MAC-keyed host.
//!
//! ## Edges
//!
//! Raw [`EdgeReport`]s name their endpoints however the collector saw them. They
//! are resolved against the host set, grouped by unordered node pair, and the
//! highest-confidence claim wins; the others stay on the edge as alternates.

use std::collections::{BTreeMap, BTreeSet};
use std::net::IpAddr;

use lantopo_common::model::{
    Edge, EdgeClaim, EdgeReport, EdgeSource, Endpoint, Host, KnownHost, NetworkTopology, NodeKey,
    Observation, Service, Source, Subnet, SwitchNode, TracerouteResult, Warning, ordered_pair,
};
use lantopo_common::network::{hostname, mac};
use pnet::util::MacAddr;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, warn};

use crate::l2::snmp::{self, SwitchTable};
use crate::vendors::VendorRepository;

/// One complete unit of collector output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Contribution {
    Subnet(Subnet),
    Observed(Observation),
    /// Result of a reverse lookup; `None` when nothing was found.
    Hostname {
        ip: IpAddr,
        hostname: Option<String>,
    },
    /// Open services of a probed address, possibly none.
    Services {
        ip: IpAddr,
        services: Vec<Service>,
    },
    Edge(EdgeReport),
    /// A walked forwarding table; attachment edges are derived in [`Merger::finish`].
    SwitchTable(SwitchTable),
    /// A name a device advertised for itself (SNMP `sysName`, LLDP chassis name).
    SwitchName {
        endpoint: Endpoint,
        name: String,
    },
    /// An address seen forwarding for others on the LAN.
    Infrastructure {
        ip: IpAddr,
    },
    Trace(TracerouteResult),
    Warning(Warning),
}

pub type ContributionSink = UnboundedSender<Contribution>;

/// Sends `contribution`, ignoring a closed reducer (the run is over).
pub fn emit(sink: &ContributionSink, contribution: Contribution) {
    if sink.send(contribution).is_err() {
        debug!("reducer closed, dropping contribution");
    }
}

/// Records a warning both in the log and in the topology.
pub fn emit_warning(sink: &ContributionSink, warning: Warning) {
    warn!("{warning}");
    emit(sink, Contribution::Warning(warning));
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Merger {
    bindings: BTreeSet<(IpAddr, MacAddr)>,
    seen: BTreeMap<IpAddr, BTreeSet<Source>>,
    gateways: BTreeSet<IpAddr>,
    hostnames: BTreeMap<IpAddr, BTreeSet<String>>,
    probed: BTreeSet<IpAddr>,
    services: BTreeMap<IpAddr, BTreeSet<Service>>,
    reports: BTreeSet<EdgeReport>,
    switch_tables: BTreeSet<SwitchTable>,
    switch_names: BTreeMap<Endpoint, BTreeSet<String>>,
    infrastructure: BTreeSet<IpAddr>,
    traces: BTreeMap<IpAddr, BTreeSet<TracerouteResult>>,
    subnets: BTreeSet<Subnet>,
    warnings: BTreeSet<Warning>,
}

impl Merger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fold(&mut self, contribution: Contribution) {
        match contribution {
            Contribution::Subnet(subnet) => {
                if let Some(gateway) = subnet.gateway {
                    self.gateways.insert(IpAddr::V4(gateway));
                }
                self.subnets.insert(subnet);
            }
            Contribution::Observed(observation) => {
                if let Some(mac) = observation.mac.filter(mac::is_usable) {
                    self.bindings.insert((observation.ip, mac));
                }
                self.seen
                    .entry(observation.ip)
                    .or_default()
                    .insert(observation.source);
            }
            Contribution::Hostname { ip, hostname } => {
                if let Some(name) = hostname.and_then(|name| hostname::normalize(&name, &[])) {
                    self.hostnames.entry(ip).or_default().insert(name);
                }
            }
            Contribution::Services { ip, services } => {
                self.probed.insert(ip);
                self.services.entry(ip).or_default().extend(services);
            }
            Contribution::Edge(report) => {
                self.reports.insert(report);
            }
            Contribution::SwitchTable(table) => {
                self.switch_tables.insert(table);
            }
            Contribution::SwitchName { endpoint, name } => {
                let name: String = name.trim().to_string();
                if !name.is_empty() {
                    self.switch_names.entry(endpoint).or_default().insert(name);
                }
            }
            Contribution::Infrastructure { ip } => {
                self.infrastructure.insert(ip);
            }
            Contribution::Trace(result) => {
                self.traces.entry(result.target).or_default().insert(result);
            }
            Contribution::Warning(warning) => {
                self.warnings.insert(warning);
            }
        }
    }

    pub fn fold_all<I: IntoIterator<Item = Contribution>>(&mut self, contributions: I) {
        for contribution in contributions {
            self.fold(contribution);
        }
    }

    /// No host was observed and no edge was reported.
    pub fn is_empty(&self) -> bool {
        self.seen.is_empty() && self.bindings.is_empty() && self.reports.is_empty()
    }

    /// Builds the finished topology. Categories are left unset.
    pub fn finish(&self, vendors: &dyn VendorRepository) -> NetworkTopology {
        let mut warnings: BTreeSet<Warning> = self.warnings.clone();

        let mut hosts: BTreeMap<NodeKey, Host> = self.build_hosts(&mut warnings);
        for host in hosts.values_mut() {
            self.decorate(host, vendors);
        }
        self.apply_names_to_hosts(&mut hosts);

        let reports: BTreeSet<EdgeReport> = self.all_reports();
        let mut index: NodeIndex = NodeIndex::new(&hosts, &reports);
        let claims: Vec<EdgeClaim> =
            self.resolve_reports(&reports, &mut hosts, &mut index, vendors, &mut warnings);
        let edges: Vec<Edge> = settle_edges(claims, &mut warnings);

        let mut switches: BTreeMap<NodeKey, SwitchNode> = BTreeMap::new();
        for edge in &edges {
            for (key, source) in [(&edge.parent, edge.source), (&edge.child, edge.source)] {
                if let Some(host) = hosts.get_mut(key) {
                    host.sources.insert(source.into());
                    continue;
                }
                switches
                    .entry(key.clone())
                    .or_insert_with(|| SwitchNode {
                        key: key.clone(),
                        name: None,
                        address: key.ip(),
                        sources: BTreeSet::new(),
                    })
                    .sources
                    .insert(source.into());
            }
            if let Some(parent) = hosts.get_mut(&edge.parent) {
                parent.is_infrastructure = true;
            }
        }
        self.apply_names_to_switches(&mut switches, &index);

        NetworkTopology {
            hosts,
            switches,
            edges,
            traceroutes: self.best_traces(),
            subnets: self.best_subnets(),
            warnings: warnings.into_iter().collect(),
        }
    }

    /// Collector reports plus the attachments derived from the forwarding tables.
    fn all_reports(&self) -> BTreeSet<EdgeReport> {
        let mut reports: BTreeSet<EdgeReport> = self.reports.clone();
        if !self.switch_tables.is_empty() {
            let tables: Vec<SwitchTable> = snmp::latest_tables(&self.switch_tables);
            let derived: Vec<EdgeReport> = snmp::build_edges(&tables, &self.known_hosts());
            debug!(tables = tables.len(), edges = derived.len(), "derived SNMP attachments");
            reports.extend(derived);
        }
        reports
    }

    /// Every observed address with its smallest MAC and gateway flag.
    fn known_hosts(&self) -> Vec<KnownHost> {
        let mut hosts: BTreeMap<IpAddr, KnownHost> = self
            .seen
            .keys()
            .map(|ip| {
                let host: KnownHost = KnownHost {
                    ip: *ip,
                    mac: None,
                    is_gateway: self.gateways.contains(ip),
                };
                (*ip, host)
            })
            .collect();
        for (ip, mac) in &self.bindings {
            let host: &mut KnownHost = hosts.entry(*ip).or_insert(KnownHost {
                ip: *ip,
                mac: None,
                is_gateway: self.gateways.contains(ip),
            });
            if host.mac.is_none() {
                host.mac = Some(*mac);
            }
        }
        hosts.into_values().collect()
    }

    fn build_hosts(&self, warnings: &mut BTreeSet<Warning>) -> BTreeMap<NodeKey, Host> {
        let mut macs_by_ip: BTreeMap<IpAddr, BTreeSet<MacAddr>> = BTreeMap::new();
        for (ip, mac) in &self.bindings {
            macs_by_ip.entry(*ip).or_default().insert(*mac);
        }

        let addresses: BTreeSet<IpAddr> = self
            .seen
            .keys()
            .chain(macs_by_ip.keys())
            .copied()
            .collect();

        let mut hosts: BTreeMap<NodeKey, Host> = BTreeMap::new();
        for ip in addresses {
            let key: NodeKey = match macs_by_ip.get(&ip) {
                Some(macs) => {
                    if macs.len() > 1 {
                        let list: Vec<String> = macs.iter().map(MacAddr::to_string).collect();
                        warnings.insert(Warning::new(
                            "merge",
                            Some(ip.to_string()),
                            format!("address claimed by several MACs: {}", list.join(", ")),
                        ));
                    }
                    macs.iter()
                        .next()
                        .map_or(NodeKey::Ip(ip), |mac| NodeKey::Mac(*mac))
                }
                None => NodeKey::Ip(ip),
            };
            let host: &mut Host = hosts
                .entry(key.clone())
                .or_insert_with(|| Host::new(key));
            host.ips.insert(ip);
            host.sources
                .extend(self.seen.get(&ip).into_iter().flatten().copied());
        }
        hosts
    }

    /// Fills the per-address attributes of a host from the folded inputs.
    fn decorate(&self, host: &mut Host, vendors: &dyn VendorRepository) {
        host.vendor = vendors.vendor_or_unknown(host.mac);
        if host.hostname.is_none() {
            host.hostname = host
                .ips
                .iter()
                .filter_map(|ip| self.hostnames.get(ip))
                .flatten()
                .next()
                .cloned();
        }
        if host.ips.iter().any(|ip| self.hostnames.contains_key(ip)) {
            host.sources.insert(Source::Dns);
        }
        if host.ips.iter().any(|ip| self.probed.contains(ip)) {
            let services: BTreeSet<Service> = host
                .ips
                .iter()
                .filter_map(|ip| self.services.get(ip))
                .flatten()
                .cloned()
                .collect();
            host.services = Some(services.into_iter().collect());
        }
        host.is_gateway = host.ips.iter().any(|ip| self.gateways.contains(ip));
        if host.ips.iter().any(|ip| self.infrastructure.contains(ip)) {
            host.is_infrastructure = true;
            host.sources.insert(Source::Trace);
        }
    }

    /// A host without a DNS name takes the name it advertises about itself.
    fn apply_names_to_hosts(&self, hosts: &mut BTreeMap<NodeKey, Host>) {
        for (endpoint, names) in &self.switch_names {
            let Some(name) = names.iter().next() else {
                continue;
            };
            let host: Option<&mut Host> = match endpoint {
                Endpoint::Ip(ip) => hosts.values_mut().find(|host| host.ips.contains(ip)),
                Endpoint::Mac(mac) => hosts.get_mut(&NodeKey::Mac(*mac)),
                Endpoint::Chassis { mac: Some(mac), .. } => hosts.get_mut(&NodeKey::Mac(*mac)),
                _ => None,
            };
            if let Some(host) = host
                && host.hostname.is_none()
            {
                host.hostname = hostname::normalize(name, &[]);
            }
        }
    }

    fn apply_names_to_switches(
        &self,
        switches: &mut BTreeMap<NodeKey, SwitchNode>,
        index: &NodeIndex,
    ) {
        for (endpoint, names) in &self.switch_names {
            let Some(key) = index.parent(endpoint) else {
                continue;
            };
            if let Some(switch) = switches.get_mut(&key)
                && switch.name.is_none()
            {
                switch.name = names.iter().next().cloned();
            }
        }
        for switch in switches.values_mut() {
            if switch.name.is_none()
                && let NodeKey::Name(name) = &switch.key
            {
                switch.name = Some(name.clone());
            }
        }
    }

    fn resolve_reports(
        &self,
        reports: &BTreeSet<EdgeReport>,
        hosts: &mut BTreeMap<NodeKey, Host>,
        index: &mut NodeIndex,
        vendors: &dyn VendorRepository,
        warnings: &mut BTreeSet<Warning>,
    ) -> Vec<EdgeClaim> {
        // Children first, so an address that is somebody's child is a host before
        // anyone resolves it as a parent.
        let mut children: Vec<Option<NodeKey>> = Vec::with_capacity(reports.len());
        for report in reports {
            let child: Option<NodeKey> = match index.child(&report.child) {
                ChildKey::Existing(key) => Some(key),
                ChildKey::NewHost(key) => {
                    let mut host: Host = Host::new(key.clone());
                    if let Endpoint::Ip(ip) = report.child {
                        host.ips.insert(ip);
                    }
                    self.decorate(&mut host, vendors);
                    index.add_host(&host);
                    hosts.insert(key.clone(), host);
                    Some(key)
                }
                ChildKey::Unresolved => {
                    warnings.insert(Warning::new(
                        "merge",
                        Some(report.child.to_string()),
                        format!("{} edge names an unknown device, skipped", report.source),
                    ));
                    None
                }
            };
            children.push(child);
        }

        let mut claims: Vec<EdgeClaim> = Vec::new();
        for (report, child) in reports.iter().zip(children) {
            let Some(child) = child else {
                continue;
            };
            let Some(parent) = index.parent(&report.parent) else {
                warnings.insert(Warning::new(
                    "merge",
                    None,
                    format!("{} edge with unidentified parent, skipped", report.source),
                ));
                continue;
            };
            if parent == child {
                continue;
            }
            claims.push(EdgeClaim {
                parent,
                child,
                port: report.port.clone(),
                source: report.source,
            });
        }
        claims
    }

    fn best_traces(&self) -> BTreeMap<IpAddr, TracerouteResult> {
        self.traces
            .iter()
            .filter_map(|(target, results)| {
                let best: &TracerouteResult = results
                    .iter()
                    .max_by(|a, b| a.quality().cmp(&b.quality()).then_with(|| a.cmp(b)))?;
                Some((*target, best.clone()))
            })
            .collect()
    }

    fn best_subnets(&self) -> Vec<Subnet> {
        let mut best: BTreeMap<&str, &Subnet> = BTreeMap::new();
        for subnet in &self.subnets {
            best.entry(subnet.interface.as_str())
                .and_modify(|current| {
                    if (subnet.outcome, subnet) > (current.outcome, *current) {
                        *current = subnet;
                    }
                })
                .or_insert(subnet);
        }
        best.into_values().cloned().collect()
    }
}

/// Groups claims by node pair, picks winners, and demotes lower-ranked parents.
fn settle_edges(claims: Vec<EdgeClaim>, warnings: &mut BTreeSet<Warning>) -> Vec<Edge> {
    let mut by_pair: BTreeMap<(NodeKey, NodeKey), BTreeSet<EdgeClaim>> = BTreeMap::new();
    for claim in claims {
        let (a, b) = ordered_pair(&claim.parent, &claim.child);
        by_pair
            .entry((a.clone(), b.clone()))
            .or_default()
            .insert(claim);
    }

    let mut edges: Vec<Edge> = Vec::with_capacity(by_pair.len());
    for ((a, b), claims) in by_pair {
        let mut claims: Vec<EdgeClaim> = claims.into_iter().collect();
        claims.sort_by(|x, y| x.preference().cmp(&y.preference()));
        let winner: EdgeClaim = claims.remove(0);
        let rivals: Vec<&EdgeClaim> = claims
            .iter()
            .filter(|claim| claim.source == winner.source && claim.port != winner.port)
            .collect();
        if !rivals.is_empty() {
            let ports: Vec<&str> = rivals
                .iter()
                .map(|claim| claim.port.as_deref().unwrap_or("-"))
                .collect();
            warnings.insert(Warning::new(
                "merge",
                Some(format!("{a} <-> {b}")),
                format!(
                    "conflicting {} reports, kept port {} over {}",
                    winner.source,
                    winner.port.as_deref().unwrap_or("-"),
                    ports.join(", ")
                ),
            ));
        }
        edges.push(Edge::from_claims(winner, claims));
    }

    demote_weaker_parents(edges, warnings)
}

/// A node attached to several parents keeps only its highest-ranked attachments.
///
/// A weaker edge is folded into the alternates of the strongest edge of the same
/// child, never dropped.
fn demote_weaker_parents(edges: Vec<Edge>, warnings: &mut BTreeSet<Warning>) -> Vec<Edge> {
    let mut strongest: BTreeMap<NodeKey, EdgeSource> = BTreeMap::new();
    for edge in &edges {
        strongest
            .entry(edge.child.clone())
            .and_modify(|source| *source = (*source).max(edge.source))
            .or_insert(edge.source);
    }

    let (mut kept, demoted): (Vec<Edge>, Vec<Edge>) = edges
        .into_iter()
        .partition(|edge| strongest.get(&edge.child) == Some(&edge.source));

    for edge in demoted {
        let Some(target) = kept.iter_mut().find(|kept| kept.child == edge.child) else {
            continue;
        };
        warnings.insert(Warning::new(
            "merge",
            Some(edge.child.to_string()),
            format!(
                "{} parent {} disagrees with {} parent {}, kept {}",
                edge.source, edge.parent, target.source, target.parent, target.source
            ),
        ));
        target.alternates.push(EdgeClaim {
            parent: edge.parent,
            child: edge.child,
            port: edge.port,
            source: edge.source,
        });
        target.alternates.extend(edge.alternates);
        target
            .alternates
            .sort_by(|x, y| x.preference().cmp(&y.preference()));
    }
    kept
}

/// Lookup tables for resolving collector endpoints to node keys.
struct NodeIndex {
    by_ip: BTreeMap<IpAddr, NodeKey>,
    by_name: BTreeMap<String, NodeKey>,
    macs: BTreeSet<MacAddr>,
    /// Names used for switches that are not known hosts, lowercased to canonical.
    switch_names: BTreeMap<String, String>,
}

enum ChildKey {
    Existing(NodeKey),
    NewHost(NodeKey),
    Unresolved,
}

impl NodeIndex {
    fn new(hosts: &BTreeMap<NodeKey, Host>, reports: &BTreeSet<EdgeReport>) -> Self {
        let mut index = Self {
            by_ip: BTreeMap::new(),
            by_name: BTreeMap::new(),
            macs: BTreeSet::new(),
            switch_names: BTreeMap::new(),
        };
        for host in hosts.values() {
            index.add_host(host);
        }
        for report in reports {
            let name: Option<&String> = match &report.parent {
                Endpoint::Name(name) => Some(name),
                Endpoint::Chassis {
                    name: Some(name), ..
                } => Some(name),
                _ => None,
            };
            if let Some(name) = name {
                let canonical: String = hostname::normalize(name, &[]).unwrap_or(name.clone());
                index
                    .switch_names
                    .entry(name_key(&canonical))
                    .or_insert(canonical);
            }
        }
        index
    }

    fn add_host(&mut self, host: &Host) {
        for ip in &host.ips {
            self.by_ip.entry(*ip).or_insert_with(|| host.key.clone());
        }
        if let Some(mac) = host.key.mac() {
            self.macs.insert(mac);
        }
        if let Some(name) = &host.hostname {
            self.by_name
                .entry(name_key(name))
                .or_insert_with(|| host.key.clone());
        }
    }

    fn host_by_mac(&self, mac: MacAddr) -> Option<NodeKey> {
        self.macs.contains(&mac).then_some(NodeKey::Mac(mac))
    }

    fn host_by_name(&self, name: &str) -> Option<NodeKey> {
        self.by_name.get(&name_key(name)).cloned()
    }

    fn switch_by_name(&self, name: &str) -> Option<NodeKey> {
        self.switch_names
            .get(&name_key(name))
            .map(|canonical| NodeKey::Name(canonical.clone()))
    }

    fn parent(&self, endpoint: &Endpoint) -> Option<NodeKey> {
        match endpoint {
            Endpoint::Ip(ip) => Some(self.by_ip.get(ip).cloned().unwrap_or(NodeKey::Ip(*ip))),
            Endpoint::Mac(mac) => Some(self.host_by_mac(*mac).unwrap_or(NodeKey::Mac(*mac))),
            Endpoint::Name(name) => self
                .host_by_name(name)
                .or_else(|| self.switch_by_name(name)),
            Endpoint::Chassis { mac, name } => mac
                .and_then(|mac| self.host_by_mac(mac))
                .or_else(|| name.as_deref().and_then(|name| self.host_by_name(name)))
                .or_else(|| name.as_deref().and_then(|name| self.switch_by_name(name)))
                .or_else(|| mac.map(NodeKey::Mac)),
        }
    }

    fn child(&self, endpoint: &Endpoint) -> ChildKey {
        let existing: Option<NodeKey> = match endpoint {
            Endpoint::Ip(ip) => match self.by_ip.get(ip) {
                Some(key) => Some(key.clone()),
                None => return ChildKey::NewHost(NodeKey::Ip(*ip)),
            },
            Endpoint::Mac(mac) => match self.host_by_mac(*mac) {
                Some(key) => Some(key),
                None => return ChildKey::NewHost(NodeKey::Mac(*mac)),
            },
            Endpoint::Name(_) | Endpoint::Chassis { .. } => self.parent(endpoint),
        };
        existing.map_or(ChildKey::Unresolved, ChildKey::Existing)
    }
}

fn name_key(name: &str) -> String {
    hostname::normalize(name, &[])
        .unwrap_or_else(|| name.to_string())
        .to_ascii_lowercase()
}

// ╔════════════════════════════════════════════╗
// ║ ████████╗███████╗███████╗████████╗███████╗ ║
// ║ ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝██╔════╝ ║
// ║    ██║   █████╗  ███████╗   ██║   ███████╗ ║
// ║    ██║   ██╔══╝  ╚════██║   ██║   ╚════██║ ║
// ║    ██║   ███████╗███████║   ██║   ███████║ ║
// ║    ╚═╝   ╚══════╝╚══════╝   ╚═╝   ╚══════╝ ║
// ╚════════════════════════════════════════════╝
