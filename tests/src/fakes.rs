//! In-memory stand-ins for every collector port of a discovery run.

use std::collections::BTreeMap;
use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use lantopo_common::capability::{Availability, Capability};
use lantopo_common::config::DiscoveryConfig;
use lantopo_common::error::DiscoveryError;
use lantopo_common::input::SwitchSpec;
use lantopo_common::model::{Observation, ScanOutcome, Service, Source, Subnet};
use lantopo_common::network::interface::LanInterface;
use lantopo_core::discovery::Collectors;
use lantopo_core::l2::lldp::{FetchError, NeighborSource};
use lantopo_core::l2::snmp::BridgeWalker;
use lantopo_core::prober::{self, ServiceProbe};
use lantopo_core::resolver::ReverseLookup;
use lantopo_core::scanner::passive::ArpCache;
use lantopo_core::scanner::{Enumerator, InterfaceScan};
use lantopo_core::tracer::TraceRunner;
use lantopo_core::vendors::VendorRepository;
use lantopo_protocols::bridge::{self, BridgeTables, VarValue};
use lantopo_protocols::trace::ParsedHop;
use pnet::util::MacAddr;

use crate::net;

pub fn mac(last: u8) -> MacAddr {
    MacAddr::new(0xaa, 0xbb, 0xcc, 0, 0, last)
}

pub fn ip(s: &str) -> IpAddr {
    s.parse().unwrap()
}

fn availability(available: bool, reason: &str) -> Availability {
    if available {
        Availability::Available
    } else {
        Availability::Unavailable(reason.to_string())
    }
}

/// Short limits so a test run finishes in well under a second.
pub fn fast_config() -> DiscoveryConfig {
    let mut config: DiscoveryConfig = DiscoveryConfig::default();
    config.scan_timeout = Duration::from_millis(10);
    config.deadline = Duration::from_secs(5);
    config.grace = Duration::from_millis(50);
    config.snmp_timeout = Duration::from_millis(500);
    config.trace.target_timeout = Duration::from_millis(200);
    config.trace.local_timeout = Duration::from_millis(200);
    config.probe.connect_timeout = Duration::from_millis(50);
    config
}

// ── enumeration ─────────────────────────────────────────────────────────────

/// One scripted interface.
#[derive(Debug, Clone)]
pub struct FakeLan {
    pub lan: LanInterface,
    pub hosts: Vec<(Ipv4Addr, Option<MacAddr>)>,
    pub outcome: ScanOutcome,
    /// Never answers; only the deadline ends the enumeration.
    pub hang: bool,
}

impl FakeLan {
    /// `10.0.0.0/24` on `eth0`, the local interface at `10.0.0.254`.
    pub fn home(gateway: Option<Ipv4Addr>, hosts: &[(&str, Option<MacAddr>)]) -> Self {
        Self::on("eth0", 1, Ipv4Addr::new(10, 0, 0, 254), gateway, hosts)
    }

    pub fn on(
        name: &str,
        index: u32,
        addr: Ipv4Addr,
        gateway: Option<Ipv4Addr>,
        hosts: &[(&str, Option<MacAddr>)],
    ) -> Self {
        Self {
            lan: net::lan(name, index, addr, 24, gateway),
            hosts: hosts
                .iter()
                .map(|(host, mac)| (host.parse().unwrap(), *mac))
                .collect(),
            outcome: ScanOutcome::Active,
            hang: false,
        }
    }
}

#[derive(Debug, Default)]
pub struct FakeEnumerator {
    pub lans: Vec<FakeLan>,
    pub enumerations: AtomicUsize,
}

impl FakeEnumerator {
    pub fn new(lans: Vec<FakeLan>) -> Self {
        Self {
            lans,
            enumerations: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl Enumerator for FakeEnumerator {
    fn resolve(&self, requested: &[String]) -> Result<Vec<LanInterface>, DiscoveryError> {
        if requested.is_empty() {
            return Ok(self.lans.iter().map(|fake| fake.lan.clone()).collect());
        }
        requested
            .iter()
            .map(|name| {
                self.lans
                    .iter()
                    .find(|fake| fake.lan.name() == name)
                    .map(|fake| fake.lan.clone())
                    .ok_or_else(|| DiscoveryError::InvalidInput {
                        what: "interface".into(),
                        reason: format!("interface '{name}' does not exist"),
                    })
            })
            .collect()
    }

    async fn enumerate(&self, lan: LanInterface, _timeout: Duration) -> InterfaceScan {
        self.enumerations.fetch_add(1, Ordering::SeqCst);
        let Some(fake) = self.lans.iter().find(|fake| fake.lan.name() == lan.name()) else {
            return InterfaceScan::failed(lan.name(), "unknown interface");
        };
        if fake.hang {
            std::future::pending::<()>().await;
        }
        if fake.outcome == ScanOutcome::Failed {
            return InterfaceScan::failed(lan.name(), "raw socket and ARP cache unavailable");
        }

        InterfaceScan {
            subnet: Subnet {
                interface: lan.name().to_string(),
                cidr: Some(lan.cidr()),
                gateway: lan.gateway,
                outcome: fake.outcome,
            },
            observations: fake
                .hosts
                .iter()
                .map(|(host, mac)| Observation::new(IpAddr::V4(*host), *mac, lan.name(), Source::Arp))
                .collect(),
            warnings: Vec::new(),
        }
    }
}

/// A neighbor table that only learns its entries once the subnet was nudged.
#[derive(Debug, Default)]
pub struct FakeArpCache {
    pub entries: Vec<(Ipv4Addr, MacAddr)>,
    pub nudged: AtomicUsize,
}

impl FakeArpCache {
    pub fn learning(entries: &[(&str, MacAddr)]) -> Self {
        Self {
            entries: entries
                .iter()
                .map(|(host, mac)| (host.parse().unwrap(), *mac))
                .collect(),
            nudged: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl ArpCache for FakeArpCache {
    fn read(&self, _lan: &LanInterface) -> anyhow::Result<Vec<(Ipv4Addr, MacAddr)>> {
        if self.nudged.load(Ordering::SeqCst) == 0 {
            return Ok(Vec::new());
        }
        Ok(self.entries.clone())
    }

    async fn nudge(&self, _lan: &LanInterface, targets: &[Ipv4Addr]) -> anyhow::Result<usize> {
        self.nudged.fetch_add(targets.len(), Ordering::SeqCst);
        Ok(targets.len())
    }
}

// ── DNS ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
pub struct FakeLookup {
    pub names: BTreeMap<IpAddr, String>,
}

#[async_trait]
impl ReverseLookup for FakeLookup {
    async fn lookup(&self, ip: IpAddr) -> anyhow::Result<Option<String>> {
        Ok(self.names.get(&ip).cloned())
    }
}

// ── service probing ─────────────────────────────────────────────────────────

#[derive(Debug, Default)]
pub struct FakeProbe {
    pub open: BTreeMap<IpAddr, Vec<u16>>,
}

impl Capability for FakeProbe {
    fn name(&self) -> &'static str {
        "tcp-connect"
    }

    fn availability(&self) -> Availability {
        Availability::Available
    }
}

#[async_trait]
impl ServiceProbe for FakeProbe {
    async fn probe(&self, ip: IpAddr, ports: &[u16]) -> anyhow::Result<Vec<Service>> {
        let mut open: Vec<u16> = self
            .open
            .get(&ip)
            .into_iter()
            .flatten()
            .copied()
            .filter(|port| ports.contains(port))
            .collect();
        open.sort_unstable();
        Ok(open.into_iter().map(prober::service).collect())
    }
}

// ── SNMP ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub enum SwitchScript {
    Answers(BridgeTables),
    Unreachable,
    Hangs,
}

/// Forwarding table learned `macs` on the given bridge ports.
pub fn forwarding_table(sys_name: Option<&str>, learned: &[(MacAddr, u32)]) -> BridgeTables {
    BridgeTables {
        sys_name: sys_name.map(str::to_string),
        fdb_port: learned
            .iter()
            .map(|(mac, port)| {
                let mut oid: Vec<u64> = bridge::DOT1D_TP_FDB_PORT.to_vec();
                oid.extend(mac.octets().map(u64::from));
                (oid, VarValue::Integer(i64::from(*port)))
            })
            .collect(),
        ..Default::default()
    }
}

#[derive(Debug)]
pub struct FakeWalker {
    pub available: bool,
    pub switches: BTreeMap<IpAddr, SwitchScript>,
}

impl Default for FakeWalker {
    fn default() -> Self {
        Self {
            available: true,
            switches: BTreeMap::new(),
        }
    }
}

impl Capability for FakeWalker {
    fn name(&self) -> &'static str {
        "snmp"
    }

    fn availability(&self) -> Availability {
        availability(self.available, "built without SNMP support")
    }
}

#[async_trait]
impl BridgeWalker for FakeWalker {
    async fn walk(&self, switch: &SwitchSpec) -> anyhow::Result<BridgeTables> {
        match self.switches.get(&switch.address) {
            Some(SwitchScript::Answers(tables)) => Ok(tables.clone()),
            Some(SwitchScript::Hangs) => std::future::pending().await,
            Some(SwitchScript::Unreachable) | None => anyhow::bail!("request timed out"),
        }
    }
}

// ── LLDP ────────────────────────────────────────────────────────────────────

/// `lldpctl -f json` of a host whose `eth0` is plugged into `port` of `switch`.
pub fn lldpctl_json(switch_name: &str, switch_mac: MacAddr, port: &str) -> String {
    serde_json::json!({
        "lldp": {
            "interface": {
                "eth0": {
                    "via": "LLDP",
                    "chassis": {
                        switch_name: { "id": { "type": "mac", "value": switch_mac.to_string() } }
                    },
                    "port": { "id": { "type": "ifname", "value": port } }
                }
            }
        }
    })
    .to_string()
}

#[derive(Debug, Default)]
pub struct FakeNeighbors {
    pub replies: BTreeMap<IpAddr, String>,
    pub broken: Vec<IpAddr>,
    /// Sessions that never return.
    pub hanging: Vec<IpAddr>,
}

impl Capability for FakeNeighbors {
    fn name(&self) -> &'static str {
        "lldp-ssh"
    }

    fn availability(&self) -> Availability {
        Availability::Available
    }
}

#[async_trait]
impl NeighborSource for FakeNeighbors {
    async fn fetch(&self, ip: IpAddr) -> Result<String, FetchError> {
        if self.hanging.contains(&ip) {
            std::future::pending::<()>().await;
        }
        if self.broken.contains(&ip) {
            return Err(FetchError::Failed(anyhow::anyhow!("connection reset")));
        }
        self.replies
            .get(&ip)
            .cloned()
            .ok_or_else(|| FetchError::NoData("lldpctl: command not found".into()))
    }
}

// ── tracing ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default)]
pub struct TraceScript {
    /// Responding hops in order; hop numbers are assigned from 1.
    pub hops: Vec<IpAddr>,
    /// Stop answering after the last hop instead of finishing.
    pub hang: bool,
}

impl TraceScript {
    pub fn through(hops: &[&str]) -> Self {
        Self {
            hops: hops.iter().map(|hop| ip(hop)).collect(),
            hang: false,
        }
    }

    pub fn hanging_after(hops: &[&str]) -> Self {
        Self {
            hang: true,
            ..Self::through(hops)
        }
    }
}

#[derive(Debug)]
pub struct FakeTracer {
    pub available: bool,
    pub targets: BTreeMap<IpAddr, TraceScript>,
}

impl Default for FakeTracer {
    fn default() -> Self {
        Self {
            available: true,
            targets: BTreeMap::new(),
        }
    }
}

impl Capability for FakeTracer {
    fn name(&self) -> &'static str {
        "tracer"
    }

    fn availability(&self) -> Availability {
        availability(self.available, "neither tracepath nor traceroute found in PATH")
    }
}

#[async_trait]
impl TraceRunner for FakeTracer {
    async fn trace(&self, target: IpAddr, max_hops: u8, hops: &mut Vec<ParsedHop>) -> anyhow::Result<()> {
        let script: TraceScript = self.targets.get(&target).cloned().unwrap_or_default();
        for (index, addr) in (1..=max_hops).zip(script.hops) {
            hops.push(ParsedHop {
                index,
                addr: Some(addr),
                rtt_micros: Some(u64::from(index) * 1_000),
            });
            tokio::task::yield_now().await;
        }
        if script.hang {
            std::future::pending::<()>().await;
        }
        Ok(())
    }
}

// ── vendors ─────────────────────────────────────────────────────────────────

/// Vendors by the first three octets.
#[derive(Debug, Default)]
pub struct FixedVendors {
    pub prefixes: BTreeMap<[u8; 3], String>,
}

impl VendorRepository for FixedVendors {
    fn get_vendor(&self, mac: MacAddr) -> Option<String> {
        let [a, b, c, ..] = mac.octets();
        self.prefixes.get(&[a, b, c]).cloned()
    }
}

// ── wiring ──────────────────────────────────────────────────────────────────

/// A whole scripted network; unset parts behave like an empty LAN.
#[derive(Default)]
pub struct FakeNetwork {
    pub enumerator: FakeEnumerator,
    pub lookup: FakeLookup,
    pub probe: FakeProbe,
    pub walker: FakeWalker,
    pub neighbors: FakeNeighbors,
    pub tracer: FakeTracer,
    pub vendors: FixedVendors,
}

impl FakeNetwork {
    pub fn with_lans(lans: Vec<FakeLan>) -> Self {
        Self {
            enumerator: FakeEnumerator::new(lans),
            ..Default::default()
        }
    }

    /// Splits into collector ports, keeping a handle on the enumerator.
    pub fn into_collectors(self) -> (Collectors, Arc<FakeEnumerator>) {
        let enumerator: Arc<FakeEnumerator> = Arc::new(self.enumerator);
        let collectors: Collectors = Collectors {
            enumerator: enumerator.clone(),
            lookup: Arc::new(self.lookup),
            probe: Arc::new(self.probe),
            walker: Arc::new(self.walker),
            neighbors: Arc::new(self.neighbors),
            tracer: Arc::new(self.tracer),
            vendors: Arc::new(self.vendors),
        };
        (collectors, enumerator)
    }
}
