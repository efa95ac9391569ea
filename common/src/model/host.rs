use std::collections::BTreeSet;
use std::fmt;
use std::net::IpAddr;

use pnet::util::MacAddr;
use serde::{Deserialize, Serialize};

use crate::model::NodeKey;
use crate::network::mac;

pub const UNKNOWN_VENDOR: &str = "Unknown";

/// Which collector vouched for a host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    Arp,
    Dns,
    Snmp,
    Lldp,
    Manual,
    Trace,
}

/// An open TCP service found by the prober.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Service {
    pub port: u16,
    pub protocol: String,
    pub name: String,
}

impl fmt::Display for Service {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.name, self.port)
    }
}

/// Role assigned by the categorizer.
///
/// The declaration order doubles as the cluster order of categorized diagrams.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Category {
    Router,
    Switch,
    AccessPoint,
    Server,
    Workstation,
    Printer,
    Phone,
    Media,
    HomeAutomation,
    Iot,
    Unknown,
}

impl Category {
    pub fn label(&self) -> &'static str {
        match self {
            Category::Router => "Routers",
            Category::Switch => "Switches",
            Category::AccessPoint => "Access Points",
            Category::Server => "Servers",
            Category::Workstation => "Workstations",
            Category::Printer => "Printers",
            Category::Phone => "Phones / VoIP",
            Category::Media => "Media",
            Category::HomeAutomation => "Home Automation",
            Category::Iot => "IoT / Smart",
            Category::Unknown => "Unknown",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name: &str = match self {
            Category::Router => "router",
            Category::Switch => "switch",
            Category::AccessPoint => "access-point",
            Category::Server => "server",
            Category::Workstation => "workstation",
            Category::Printer => "printer",
            Category::Phone => "phone",
            Category::Media => "media",
            Category::HomeAutomation => "home-automation",
            Category::Iot => "iot",
            Category::Unknown => "unknown",
        };
        write!(f, "{name}")
    }
}

/// A discovered device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Host {
    pub key: NodeKey,
    #[serde(with = "mac::serde_opt")]
    pub mac: Option<MacAddr>,
    pub ips: BTreeSet<IpAddr>,
    pub hostname: Option<String>,
    pub vendor: String,
    /// `None` when the host was never probed, empty when probed and nothing answered.
    pub services: Option<Vec<Service>>,
    pub category: Option<Category>,
    pub is_gateway: bool,
    /// Forwards traffic for other hosts (edge parent or intermediate trace hop).
    pub is_infrastructure: bool,
    pub sources: BTreeSet<Source>,
}

impl Host {
    pub fn new(key: NodeKey) -> Self {
        Self {
            mac: key.mac(),
            key,
            ips: BTreeSet::new(),
            hostname: None,
            vendor: UNKNOWN_VENDOR.to_string(),
            services: None,
            category: None,
            is_gateway: false,
            is_infrastructure: false,
            sources: BTreeSet::new(),
        }
    }

    /// Lowest address, used as the display address.
    pub fn primary_ip(&self) -> Option<IpAddr> {
        self.ips.iter().next().copied()
    }

    pub fn open_ports(&self) -> BTreeSet<u16> {
        self.services
            .iter()
            .flatten()
            .map(|service| service.port)
            .collect()
    }
}

/// The enumerator's view of a host, handed to the fan-out collectors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct KnownHost {
    pub ip: IpAddr,
    pub mac: Option<MacAddr>,
    pub is_gateway: bool,
}

// ╔════════════════════════════════════════════╗
// ║ ████████╗███████╗███████╗████████╗███████╗ ║
// ║ ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝██╔════╝ ║
// ║    ██║   █████╗  ███████╗   ██║   ███████╗ ║
// ║    ██║   ██╔══╝  ╚════██║   ██║   ╚════██║ ║
// ║    ██║   ███████╗███████║   ██║   ███████║ ║
// ║    ╚═╝   ╚══════╝╚══════╝   ╚═╝   ╚══════╝ ║
// ╚════════════════════════════════════════════╝
