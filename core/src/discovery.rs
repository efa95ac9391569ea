//! # Discovery Pipeline
//!
//! One run, start to finish:
//!
//! 1. **Resolve** the requested interfaces. Bad input fails here, before any probe.
//! 2. **Enumerate** every interface concurrently. This is the only stage that
//!    establishes hosts on its own; the rest of the run needs its result.
//! 3. **Fan out** to the optional collectors (DNS, services, SNMP, LLDP, traces),
//!    each isolated in its own task.
//! 4. **Reduce**: every contribution flows over one channel into a single
//!    [`Merger`] task; nothing else holds topology state.
//! 5. **Finish**: build the topology, categorize it.
//!
//! A global deadline bounds stages 2 and 3. Collectors still running at the
//! deadline get a grace period and are then cancelled; whatever they already
//! contributed is kept.

use std::collections::BTreeMap;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use lantopo_common::config::{DiscoveryConfig, LldpSource};
use lantopo_common::error::DiscoveryError;
use lantopo_common::model::{KnownHost, NetworkTopology, Subnet, Warning};
use lantopo_common::network::interface::LanInterface;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio::time::{Instant, timeout_at};
use tracing::{error, info, warn};

use crate::categorize;
use crate::l2::lldp::{self, NeighborSource, SshLldp};
use crate::l2::manual;
use crate::l2::snmp::{self, BridgeWalker, SnmpWalker};
use crate::merge::{self, Contribution, ContributionSink, Merger};
use crate::prober::{self, ServiceProbe, TcpConnectProbe};
use crate::resolver::{self, DnsResolver, ReverseLookup};
use crate::scanner::{ArpEnumerator, Enumerator, InterfaceScan};
use crate::tracer::{self, SystemTracer, TraceRunner};
use crate::vendors::{OuiTable, VendorRepository};

/// Per-query timeout of reverse lookups.
pub const DNS_TIMEOUT: Duration = Duration::from_secs(2);

/// The ports a run talks to the outside world through.
#[derive(Clone)]
pub struct Collectors {
    pub enumerator: Arc<dyn Enumerator>,
    pub lookup: Arc<dyn ReverseLookup>,
    pub probe: Arc<dyn ServiceProbe>,
    pub walker: Arc<dyn BridgeWalker>,
    pub neighbors: Arc<dyn NeighborSource>,
    pub tracer: Arc<dyn TraceRunner>,
    pub vendors: Arc<dyn VendorRepository>,
}

impl Collectors {
    /// The real implementations, configured from `config`.
    pub fn system(config: &DiscoveryConfig) -> Self {
        let save_to = match &config.lldp {
            Some(LldpSource::Live { save_to }) => save_to.clone(),
            _ => None,
        };
        let mut vendors: OuiTable = OuiTable::bundled();
        vendors.load_files(&config.oui_files);

        Self {
            enumerator: Arc::new(ArpEnumerator::system()),
            lookup: Arc::new(DnsResolver::from_system(DNS_TIMEOUT)),
            probe: Arc::new(TcpConnectProbe::new(config.probe.connect_timeout)),
            walker: Arc::new(SnmpWalker),
            neighbors: Arc::new(SshLldp::new(config.lldp_timeout, save_to)),
            tracer: Arc::new(SystemTracer::detect()),
            vendors: Arc::new(vendors),
        }
    }
}

/// Application service running discovery runs.
pub struct DiscoveryService {
    collectors: Collectors,
}

impl DiscoveryService {
    pub fn new(collectors: Collectors) -> Self {
        Self { collectors }
    }

    /// Runs one discovery and returns the categorized topology.
    ///
    /// Only invalid input, a run that found nothing, and a failed reducer are
    /// errors; everything else ends up in `topology.warnings`.
    pub async fn perform_discovery(
        &self,
        config: &DiscoveryConfig,
    ) -> Result<NetworkTopology, DiscoveryError> {
        let lans: Vec<LanInterface> = self.collectors.enumerator.resolve(&config.interfaces)?;
        info!(
            interfaces = lans.len(),
            deadline = ?config.deadline,
            "starting discovery"
        );

        let deadline: Instant = Instant::now() + config.deadline;
        let (sink, mut rx) = mpsc::unbounded_channel::<Contribution>();
        let reducer = tokio::spawn(async move {
            let mut merger: Merger = Merger::new();
            while let Some(contribution) = rx.recv().await {
                merger.fold(contribution);
            }
            merger
        });

        manual::contribute(&config.manual, &sink);

        let scans: Vec<InterfaceScan> = self.enumerate(lans, config, deadline, &sink).await;
        let subnets: Vec<Subnet> = scans.iter().map(|scan| scan.subnet.clone()).collect();
        let hosts: Vec<KnownHost> = known_hosts(&scans);
        info!(hosts = hosts.len(), "enumeration finished");

        let mut collectors: JoinSet<()> = self.fan_out(config, hosts, subnets, deadline, &sink);
        let running: usize = collectors.len();
        if !join_until(&mut collectors, deadline).await {
            warn!(
                remaining = collectors.len(),
                grace = ?config.grace,
                "deadline reached, waiting for in-flight collectors"
            );
            if !join_until(&mut collectors, deadline + config.grace).await {
                let cancelled: usize = collectors.len();
                collectors.abort_all();
                while collectors.join_next().await.is_some() {}
                merge::emit_warning(
                    &sink,
                    Warning::new(
                        "pipeline",
                        None,
                        format!("deadline reached, cancelled {cancelled} of {running} collector(s)"),
                    ),
                );
            }
        }

        drop(sink);
        let merger: Merger = reducer
            .await
            .map_err(|e| DiscoveryError::Pipeline(format!("reducer task failed: {e}")))?;
        if merger.is_empty() {
            return Err(DiscoveryError::EmptyResult);
        }

        let mut topology: NetworkTopology = merger.finish(&*self.collectors.vendors);
        categorize::categorize_topology(&mut topology);
        info!(
            hosts = topology.hosts.len(),
            switches = topology.switches.len(),
            edges = topology.edges.len(),
            traces = topology.traceroutes.len(),
            warnings = topology.warnings.len(),
            "discovery finished"
        );
        Ok(topology)
    }

    async fn enumerate(
        &self,
        lans: Vec<LanInterface>,
        config: &DiscoveryConfig,
        deadline: Instant,
        sink: &ContributionSink,
    ) -> Vec<InterfaceScan> {
        let mut tasks: JoinSet<InterfaceScan> = JoinSet::new();
        let names: Vec<String> = lans.iter().map(|lan| lan.name().to_string()).collect();
        for lan in lans {
            let enumerator: Arc<dyn Enumerator> = Arc::clone(&self.collectors.enumerator);
            let scan_timeout: Duration = config.scan_timeout;
            tasks.spawn(async move { enumerator.enumerate(lan, scan_timeout).await });
        }

        let mut scans: Vec<InterfaceScan> = Vec::new();
        loop {
            match timeout_at(deadline, tasks.join_next()).await {
                Ok(Some(Ok(scan))) => scans.push(scan),
                Ok(Some(Err(e))) => error!("enumeration task failed: {e}"),
                Ok(None) => break,
                Err(_elapsed) => {
                    tasks.abort_all();
                    break;
                }
            }
        }

        for name in &names {
            if !scans.iter().any(|scan| &scan.subnet.interface == name) {
                scans.push(InterfaceScan::failed(name, "enumeration did not finish"));
            }
        }
        scans.sort_by(|a, b| a.subnet.interface.cmp(&b.subnet.interface));

        for scan in &scans {
            merge::emit(sink, Contribution::Subnet(scan.subnet.clone()));
            for observation in &scan.observations {
                merge::emit(sink, Contribution::Observed(observation.clone()));
            }
            for warning in &scan.warnings {
                merge::emit(sink, Contribution::Warning(warning.clone()));
            }
        }
        scans
    }

    fn fan_out(
        &self,
        config: &DiscoveryConfig,
        hosts: Vec<KnownHost>,
        subnets: Vec<Subnet>,
        deadline: Instant,
        sink: &ContributionSink,
    ) -> JoinSet<()> {
        let collectors: &Collectors = &self.collectors;
        let addresses: Vec<IpAddr> = hosts.iter().map(|host| host.ip).collect();
        let mut tasks: JoinSet<()> = JoinSet::new();

        if !config.no_dns {
            tasks.spawn(resolver::resolve_hosts(
                Arc::clone(&collectors.lookup),
                addresses.clone(),
                config.pools.dns,
                sink.clone(),
            ));
        }

        if config.probe.enabled {
            let probe: Arc<dyn ServiceProbe> = Arc::clone(&collectors.probe);
            let probe_config = config.probe.clone();
            let pool_size: usize = config.pools.probe;
            let sink: ContributionSink = sink.clone();
            let addresses: Vec<IpAddr> = addresses.clone();
            tasks.spawn(async move {
                prober::probe_hosts(probe, addresses, &probe_config, pool_size, sink).await
            });
        }

        if !config.switches.is_empty() {
            tasks.spawn(snmp::collect(
                Arc::clone(&collectors.walker),
                config.switches.clone(),
                config.snmp_timeout,
                deadline,
                config.pools.snmp,
                sink.clone(),
            ));
        }

        match &config.lldp {
            Some(LldpSource::Live { .. }) => {
                tasks.spawn(lldp::collect_live(
                    Arc::clone(&collectors.neighbors),
                    hosts.clone(),
                    config.pools.lldp,
                    sink.clone(),
                ));
            }
            Some(LldpSource::Directory(dir)) => {
                let dir = dir.clone();
                let hosts: Vec<KnownHost> = hosts.clone();
                let sink: ContributionSink = sink.clone();
                tasks.spawn(async move { lldp::collect_from_directory(&dir, &hosts, sink).await });
            }
            None => {}
        }

        if !config.trace.targets.is_empty() {
            let runner: Arc<dyn TraceRunner> = Arc::clone(&collectors.tracer);
            let targets: Vec<IpAddr> = config.trace.targets.clone();
            let trace_config = config.trace.clone();
            let lookup: Option<Arc<dyn ReverseLookup>> =
                (!config.no_dns).then(|| Arc::clone(&collectors.lookup));
            let pool_size: usize = config.pools.trace;
            let sink: ContributionSink = sink.clone();
            tasks.spawn(async move {
                tracer::trace_targets(runner, targets, &trace_config, lookup, pool_size, sink).await
            });
        }

        if config.trace.local {
            let runner: Arc<dyn TraceRunner> = Arc::clone(&collectors.tracer);
            let trace_config = config.trace.clone();
            let pool_size: usize = config.pools.trace;
            let sink: ContributionSink = sink.clone();
            tasks.spawn(async move {
                tracer::trace_local(runner, hosts, subnets, &trace_config, pool_size, sink).await
            });
        }

        tasks
    }
}

/// Waits for every task until `until`. Returns whether all of them finished.
async fn join_until(tasks: &mut JoinSet<()>, until: Instant) -> bool {
    loop {
        match timeout_at(until, tasks.join_next()).await {
            Ok(Some(Ok(()))) => {}
            Ok(Some(Err(e))) => error!("collector task failed: {e}"),
            Ok(None) => return true,
            Err(_elapsed) => return false,
        }
    }
}

/// One entry per address; the smallest MAC wins when an address answered with several.
pub fn known_hosts(scans: &[InterfaceScan]) -> Vec<KnownHost> {
    let mut hosts: BTreeMap<IpAddr, KnownHost> = BTreeMap::new();
    for scan in scans {
        let gateway: Option<IpAddr> = scan.subnet.gateway.map(IpAddr::V4);
        for observation in &scan.observations {
            let entry: &mut KnownHost = hosts.entry(observation.ip).or_insert(KnownHost {
                ip: observation.ip,
                mac: None,
                is_gateway: false,
            });
            entry.is_gateway |= gateway == Some(observation.ip);
            entry.mac = match (entry.mac, observation.mac) {
                (Some(a), Some(b)) => Some(a.min(b)),
                (a, b) => a.or(b),
            };
        }
    }
    hosts.into_values().collect()
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
    use lantopo_common::model::{Observation, ScanOutcome, Source};
    use pnet::util::MacAddr;

    fn scan(interface: &str, gateway: Option<&str>, seen: &[(&str, Option<u8>)]) -> InterfaceScan {
        InterfaceScan {
            subnet: Subnet {
                interface: interface.into(),
                cidr: None,
                gateway: gateway.map(|g| g.parse().unwrap()),
                outcome: ScanOutcome::Active,
            },
            observations: seen
                .iter()
                .map(|(ip, mac)| {
                    Observation::new(
                        ip.parse().unwrap(),
                        mac.map(|last| MacAddr::new(0xaa, 0xbb, 0xcc, 0, 0, last)),
                        interface,
                        Source::Arp,
                    )
                })
                .collect(),
            warnings: Vec::new(),
        }
    }

    #[test]
    fn known_hosts_should_merge_interfaces_and_flag_gateways() {
        let scans = vec![
            scan("eth0", Some("10.0.0.1"), &[("10.0.0.1", Some(1)), ("10.0.0.10", Some(9))]),
            scan("eth1", None, &[("10.0.0.10", Some(3)), ("10.0.0.11", None)]),
        ];
        let hosts = known_hosts(&scans);
        assert_eq!(hosts.len(), 3);
        assert!(hosts[0].is_gateway);
        assert_eq!(hosts[1].mac, Some(MacAddr::new(0xaa, 0xbb, 0xcc, 0, 0, 3)));
        assert_eq!(hosts[2].mac, None);
        assert!(!hosts[2].is_gateway);
    }

    #[tokio::test]
    async fn join_until_should_report_unfinished_tasks() {
        let mut tasks: JoinSet<()> = JoinSet::new();
        tasks.spawn(async {});
        tasks.spawn(std::future::pending::<()>());
        let finished = join_until(&mut tasks, Instant::now() + Duration::from_millis(50)).await;
        assert!(!finished);
        assert_eq!(tasks.len(), 1);
        tasks.abort_all();
    }
}
