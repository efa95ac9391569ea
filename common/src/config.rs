//! # Run Configuration
//!
//! Plain data handed from the front-end to the pipeline. The library never reads
//! argv or the environment on its own.

use std::fmt;
use std::net::IpAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::input::{ManualEntry, SwitchSpec};

/// Parameters of a single discovery run.
#[derive(Debug, Clone)]
pub struct DiscoveryConfig {
    /// Interfaces to enumerate. Empty selects the best LAN interface automatically.
    pub interfaces: Vec<String>,
    /// How long each interface listens for address-resolution replies.
    pub scan_timeout: Duration,
    /// Wall-clock bound of the whole run.
    pub deadline: Duration,
    /// Extra time in-flight probes get once the deadline has passed.
    pub grace: Duration,
    /// Disables reverse lookups.
    ///
    /// Hostnames stay empty; nothing else changes.
    pub no_dns: bool,
    pub probe: ProbeConfig,
    pub switches: Vec<SwitchSpec>,
    pub snmp_timeout: Duration,
    pub lldp: Option<LldpSource>,
    pub lldp_timeout: Duration,
    pub manual: Vec<ManualEntry>,
    pub trace: TraceConfig,
    /// IEEE registry exports (`oui.txt`, `mam.txt`, `oui36.txt`) layered over the bundled table.
    pub oui_files: Vec<PathBuf>,
    pub pools: PoolSizes,
    pub render: RenderOptions,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            interfaces: Vec::new(),
            scan_timeout: Duration::from_secs(3),
            deadline: Duration::from_secs(120),
            grace: Duration::from_secs(2),
            no_dns: false,
            probe: ProbeConfig::default(),
            switches: Vec::new(),
            snmp_timeout: Duration::from_secs(10),
            lldp: None,
            lldp_timeout: Duration::from_secs(15),
            manual: Vec::new(),
            trace: TraceConfig::default(),
            oui_files: Vec::new(),
            pools: PoolSizes::default(),
            render: RenderOptions::default(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ProbeConfig {
    pub enabled: bool,
    /// Number of entries taken from the top-ports list.
    pub port_budget: usize,
    pub connect_timeout: Duration,
    /// Shared budget for the whole probing batch.
    pub budget: Duration,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            port_budget: 20,
            connect_timeout: Duration::from_millis(400),
            budget: Duration::from_secs(60),
        }
    }
}

#[derive(Debug, Clone)]
pub struct TraceConfig {
    pub targets: Vec<IpAddr>,
    pub max_hops: u8,
    pub target_timeout: Duration,
    /// Trace every discovered LAN host to infer intermediate switches.
    pub local: bool,
    pub local_max_hops: u8,
    pub local_timeout: Duration,
}

impl Default for TraceConfig {
    fn default() -> Self {
        Self {
            targets: Vec::new(),
            max_hops: 30,
            target_timeout: Duration::from_secs(60),
            local: false,
            local_max_hops: 5,
            local_timeout: Duration::from_secs(5),
        }
    }
}

/// Worker-pool sizes per collector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolSizes {
    pub dns: usize,
    pub probe: usize,
    pub snmp: usize,
    pub lldp: usize,
    pub trace: usize,
}

impl Default for PoolSizes {
    fn default() -> Self {
        Self {
            dns: 16,
            probe: 32,
            snmp: 8,
            lldp: 20,
            trace: 20,
        }
    }
}

/// Where LLDP neighbor data comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LldpSource {
    /// Open a remote session per host; optionally keep every raw reply in `save_to`.
    Live { save_to: Option<PathBuf> },
    /// Replay pre-collected `<ip>.json` files.
    Directory(PathBuf),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    #[default]
    Mermaid,
    Json,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DiagramStyle {
    #[default]
    Auto,
    Flat,
    Hierarchical,
    Categorized,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Direction {
    #[default]
    Auto,
    TopDown,
    LeftRight,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RenderOptions {
    pub format: OutputFormat,
    pub style: DiagramStyle,
    pub direction: Direction,
    /// Ask the diagram viewer for the ELK layout engine.
    pub elk: bool,
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "mermaid" | "mmd" => Ok(Self::Mermaid),
            "json" => Ok(Self::Json),
            _ => Err(format!("unknown output format: {s}")),
        }
    }
}

impl FromStr for DiagramStyle {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "auto" => Ok(Self::Auto),
            "flat" => Ok(Self::Flat),
            "hierarchical" | "tree" => Ok(Self::Hierarchical),
            "categorized" | "category" => Ok(Self::Categorized),
            _ => Err(format!("unknown diagram style: {s}")),
        }
    }
}

impl FromStr for Direction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "AUTO" => Ok(Self::Auto),
            "TD" | "TB" => Ok(Self::TopDown),
            "LR" => Ok(Self::LeftRight),
            _ => Err(format!("unknown direction: {s}")),
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Auto => write!(f, "auto"),
            Direction::TopDown => write!(f, "TD"),
            Direction::LeftRight => write!(f, "LR"),
        }
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
