//! # Service Prober
//!
//! Optional TCP connect probing of the most common service ports. A port counts
//! as open when the three-way handshake completes; refused and silent ports are
//! closed. The whole batch shares one time budget: hosts still being probed when
//! it runs out contribute an empty list and a warning.

use std::io::ErrorKind;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use anyhow::anyhow;
use async_trait::async_trait;
use lantopo_common::capability::{self, Availability, Capability, Outcome};
use lantopo_common::config::ProbeConfig;
use lantopo_common::model::{Service, Warning};
use tokio::net::TcpStream;
use tokio::task::JoinSet;
use tokio::time::{Instant, timeout, timeout_at};
use tracing::{debug, info};

use crate::merge::{self, Contribution, ContributionSink};
use crate::pool;

/// Ports in descending order of how often they are found open.
pub const TOP_PORTS: &[u16] = &[
    80, 443, 22, 445, 139, 53, 8080, 3389, 21, 23, 9100, 631, 515, 554, 5060, 8009, 1400, 8443,
    3306, 5432, 1883, 8123, 5900, 548, 2049, 111, 135, 25, 110, 143, 993, 995, 587, 8000, 8008,
    8081, 8888, 5000, 5001, 1433, 6379, 27017, 161, 5061, 1900, 49152, 62078, 5353, 10000, 9000,
];

const SERVICE_NAMES: &[(u16, &str)] = &[
    (21, "ftp"),
    (22, "ssh"),
    (23, "telnet"),
    (25, "smtp"),
    (53, "domain"),
    (80, "http"),
    (110, "pop3"),
    (111, "rpcbind"),
    (135, "msrpc"),
    (139, "netbios-ssn"),
    (143, "imap"),
    (161, "snmp"),
    (443, "https"),
    (445, "microsoft-ds"),
    (515, "printer"),
    (548, "afp"),
    (554, "rtsp"),
    (587, "submission"),
    (631, "ipp"),
    (993, "imaps"),
    (995, "pop3s"),
    (1400, "sonos"),
    (1433, "ms-sql-s"),
    (1883, "mqtt"),
    (1900, "upnp"),
    (2049, "nfs"),
    (3306, "mysql"),
    (3389, "ms-wbt-server"),
    (5000, "upnp"),
    (5001, "commplex-link"),
    (5060, "sip"),
    (5061, "sips"),
    (5353, "mdns"),
    (5432, "postgresql"),
    (5900, "vnc"),
    (6379, "redis"),
    (8000, "http-alt"),
    (8008, "http"),
    (8009, "ajp13"),
    (8080, "http-proxy"),
    (8081, "blackice-icecap"),
    (8123, "home-assistant"),
    (8443, "https-alt"),
    (8888, "sun-answerbook"),
    (9000, "cslistener"),
    (9100, "jetdirect"),
    (10000, "snet-sensor-mgmt"),
    (27017, "mongod"),
    (49152, "unknown"),
    (62078, "iphone-sync"),
];

/// Well-known name of a TCP port, `"unknown"` when there is none.
pub fn service_name(port: u16) -> &'static str {
    SERVICE_NAMES
        .iter()
        .find(|(known, _)| *known == port)
        .map_or("unknown", |(_, name)| *name)
}

pub fn service(port: u16) -> Service {
    Service {
        port,
        protocol: "tcp".to_string(),
        name: service_name(port).to_string(),
    }
}

#[async_trait]
pub trait ServiceProbe: Capability + Send + Sync {
    /// Open services of `ip` among `ports`, sorted by port.
    async fn probe(&self, ip: IpAddr, ports: &[u16]) -> anyhow::Result<Vec<Service>>;
}

/// Full TCP handshakes; needs no privileges.
pub struct TcpConnectProbe {
    connect_timeout: Duration,
}

impl TcpConnectProbe {
    pub fn new(connect_timeout: Duration) -> Self {
        Self { connect_timeout }
    }
}

impl Capability for TcpConnectProbe {
    fn name(&self) -> &'static str {
        "tcp-probe"
    }

    fn availability(&self) -> Availability {
        Availability::Available
    }
}

enum PortState {
    Open,
    Closed,
    Unreachable(std::io::Error),
}

async fn connect(addr: SocketAddr, connect_timeout: Duration) -> PortState {
    match timeout(connect_timeout, TcpStream::connect(addr)).await {
        Ok(Ok(_stream)) => PortState::Open,
        Ok(Err(e)) if e.kind() == ErrorKind::ConnectionRefused => PortState::Closed,
        Ok(Err(e)) => PortState::Unreachable(e),
        Err(_elapsed) => PortState::Closed,
    }
}

#[async_trait]
impl ServiceProbe for TcpConnectProbe {
    async fn probe(&self, ip: IpAddr, ports: &[u16]) -> anyhow::Result<Vec<Service>> {
        let mut connects: JoinSet<(u16, PortState)> = JoinSet::new();
        for &port in ports {
            let connect_timeout: Duration = self.connect_timeout;
            connects.spawn(async move {
                (port, connect(SocketAddr::new(ip, port), connect_timeout).await)
            });
        }

        let mut open: Vec<u16> = Vec::new();
        let mut unreachable: Option<std::io::Error> = None;
        while let Some(joined) = connects.join_next().await {
            match joined {
                Ok((port, PortState::Open)) => open.push(port),
                Ok((_, PortState::Closed)) => {}
                Ok((_, PortState::Unreachable(e))) => unreachable = Some(e),
                Err(e) => return Err(anyhow!("probe task failed: {e}")),
            }
        }

        if open.is_empty()
            && let Some(e) = unreachable
        {
            return Err(anyhow!(e).context(format!("probing {ip}")));
        }
        open.sort_unstable();
        Ok(open.into_iter().map(service).collect())
    }
}

/// Probes every host under a shared budget, contributing one `Services` per host.
pub async fn probe_hosts(
    probe: Arc<dyn ServiceProbe>,
    hosts: Vec<IpAddr>,
    config: &ProbeConfig,
    pool_size: usize,
    sink: ContributionSink,
) {
    let ports: Arc<[u16]> = TOP_PORTS.iter().copied().take(config.port_budget).collect();
    let budget_end: Instant = Instant::now() + config.budget;
    info!(hosts = hosts.len(), ports = ports.len(), "probing services");

    let outcome = capability::invoke(&*probe, || {
        pool::for_each_bounded(hosts, pool_size, |ip| {
            let probe: Arc<dyn ServiceProbe> = Arc::clone(&probe);
            let ports: Arc<[u16]> = Arc::clone(&ports);
            let sink: ContributionSink = sink.clone();
            async move {
                let services: Vec<Service> = match timeout_at(budget_end, probe.probe(ip, &ports)).await {
                    Ok(Ok(services)) => {
                        debug!(%ip, open = services.len(), "probe finished");
                        services
                    }
                    Ok(Err(e)) => {
                        merge::emit_warning(
                            &sink,
                            Warning::new("prober", Some(ip.to_string()), format!("{e:#}")),
                        );
                        Vec::new()
                    }
                    Err(_elapsed) => {
                        merge::emit_warning(
                            &sink,
                            Warning::new("prober", Some(ip.to_string()), "probe budget exhausted"),
                        );
                        Vec::new()
                    }
                };
                merge::emit(&sink, Contribution::Services { ip, services });
            }
        })
    })
    .await;

    if let Outcome::Unavailable { capability, reason } = outcome {
        merge::emit_warning(
            &sink,
            Warning::new(capability, None, format!("service probing skipped: {reason}")),
        );
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
