//! # Subnet/Host Enumeration
//!
//! The only collector that establishes host existence on its own. Each interface
//! is swept independently:
//!
//! 1. [`local`]: an active ARP sweep over a raw datalink channel. Needs root.
//! 2. [`passive`]: when the sweep is unavailable or fails, the kernel's ARP cache
//!    is read instead and the subnet is marked `passive-degraded`. An empty cache
//!    is refilled by nudging the subnet with unprivileged UDP first.
//!
//! If neither works the subnet is `failed`; sibling interfaces are unaffected.

use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use lantopo_common::capability::{self, Availability, Capability, Outcome};
use lantopo_common::error::DiscoveryError;
use lantopo_common::model::{Observation, ScanOutcome, Source, Subnet, Warning};
use lantopo_common::network::interface::{self, LanInterface};
use pnet::util::MacAddr;
use tracing::{info, warn};

use self::passive::{ArpCache, KernelArpCache};

pub mod local;
pub mod passive;

/// Everything one interface contributed.
#[derive(Debug, Clone)]
pub struct InterfaceScan {
    pub subnet: Subnet,
    pub observations: Vec<Observation>,
    pub warnings: Vec<Warning>,
}

impl InterfaceScan {
    fn new(lan: &LanInterface, outcome: ScanOutcome) -> Self {
        Self {
            subnet: Subnet {
                interface: lan.name().to_string(),
                cidr: Some(lan.cidr()),
                gateway: lan.gateway,
                outcome,
            },
            observations: Vec::new(),
            warnings: Vec::new(),
        }
    }

    /// A failed interface: no hosts, one warning.
    pub fn failed(interface: &str, reason: impl Into<String>) -> Self {
        let reason: String = reason.into();
        warn!(interface, "enumeration failed: {reason}");
        Self {
            subnet: Subnet {
                interface: interface.to_string(),
                cidr: None,
                gateway: None,
                outcome: ScanOutcome::Failed,
            },
            observations: Vec::new(),
            warnings: vec![Warning::new("enumerator", Some(interface.to_string()), reason)],
        }
    }

    fn warn(&mut self, message: impl Into<String>) {
        let message: String = message.into();
        warn!(interface = %self.subnet.interface, "{message}");
        self.warnings.push(Warning::new(
            "enumerator",
            Some(self.subnet.interface.clone()),
            message,
        ));
    }
}

#[async_trait]
pub trait Enumerator: Send + Sync {
    /// Turns interface names into sweepable interfaces. Runs before any probing.
    fn resolve(&self, requested: &[String]) -> Result<Vec<LanInterface>, DiscoveryError> {
        interface::resolve_interfaces(requested)
    }

    async fn enumerate(&self, lan: LanInterface, timeout: Duration) -> InterfaceScan;
}

/// Raw-socket ARP sweeping.
pub struct ArpSweep;

impl Capability for ArpSweep {
    fn name(&self) -> &'static str {
        "arp-sweep"
    }

    fn availability(&self) -> Availability {
        if is_root::is_root() {
            Availability::Available
        } else {
            Availability::Unavailable("raw datalink access requires root".into())
        }
    }
}

/// Active sweep with passive fallback.
pub struct ArpEnumerator {
    cache: Arc<dyn ArpCache>,
    active: bool,
}

impl ArpEnumerator {
    pub fn system() -> Self {
        Self {
            cache: Arc::new(KernelArpCache),
            active: true,
        }
    }

    /// Never sweeps; works from `cache` alone.
    pub fn passive(cache: Arc<dyn ArpCache>) -> Self {
        Self {
            cache,
            active: false,
        }
    }
}

#[async_trait]
impl Enumerator for ArpEnumerator {
    async fn enumerate(&self, lan: LanInterface, timeout: Duration) -> InterfaceScan {
        let mut scan: InterfaceScan = InterfaceScan::new(&lan, ScanOutcome::Active);
        if !self.active {
            scan.warn("active sweep disabled, reading ARP cache");
            return self.read_cache(scan, &lan, timeout).await;
        }

        let sweep_lan: LanInterface = lan.clone();
        let outcome = capability::invoke(&ArpSweep, || async move {
            tokio::task::spawn_blocking(move || local::sweep(&sweep_lan, timeout)).await
        })
        .await;

        match outcome {
            Outcome::Completed(Ok(Ok(replies))) => {
                info!(interface = %lan.name(), hosts = replies.len(), "ARP sweep finished");
                scan.observations = observations(&lan, replies, Source::Arp);
                return scan;
            }
            Outcome::Completed(Ok(Err(e))) => {
                scan.warn(format!("active sweep failed, reading ARP cache: {e:#}"))
            }
            Outcome::Completed(Err(e)) => {
                scan.warn(format!("sweep task aborted, reading ARP cache: {e}"))
            }
            Outcome::Unavailable { capability, reason } => {
                scan.warn(format!("{capability} unavailable ({reason}), reading ARP cache"))
            }
        }

        self.read_cache(scan, &lan, timeout).await
    }
}

impl ArpEnumerator {
    async fn read_cache(
        &self,
        mut scan: InterfaceScan,
        lan: &LanInterface,
        settle: Duration,
    ) -> InterfaceScan {
        match passive::read_or_nudge(&*self.cache, lan, settle).await {
            Ok(entries) => {
                info!(interface = %lan.name(), hosts = entries.len(), "read ARP cache");
                scan.subnet.outcome = ScanOutcome::PassiveDegraded;
                scan.observations = observations(lan, entries, Source::Arp);
            }
            Err(e) => {
                scan.subnet.outcome = ScanOutcome::Failed;
                scan.warn(format!("ARP cache unreadable: {e:#}"));
            }
        }
        scan
    }
}

/// Converts raw bindings into observations, dropping the interface's own address
/// and anything outside its network.
pub fn observations(
    lan: &LanInterface,
    bindings: Vec<(Ipv4Addr, MacAddr)>,
    source: Source,
) -> Vec<Observation> {
    bindings
        .into_iter()
        .filter(|(ip, _)| *ip != lan.address() && lan.network.contains(*ip))
        .map(|(ip, mac)| Observation::new(IpAddr::V4(ip), Some(mac), lan.name(), source))
        .collect()
}

// ╔════════════════════════════════════════════╗
// ║ ████████╗███████╗███████╗████████╗███████╗ ║
// ║ ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝██╔════╝ ║
// ║    ██║   █████╗  ███████╗   ██║   ███████╗ ║
// ║    ██║   ██╔══╝  ╚════██║   ██║   ╚════██║ ║
// ║    ██║   ███████╗███████║   ██║   ███████║ ║
// ║    ╚═╝   ╚══════╝╚══════╝   ╚═╝   ╚══════╝ ║
// ╚════════════════════════════════════════════╝
