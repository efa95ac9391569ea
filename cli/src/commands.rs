pub mod discover;

use std::net::IpAddr;
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use lantopo_common::config::{
    DiagramStyle, Direction, DiscoveryConfig, LldpSource, OutputFormat, RenderOptions,
};
use lantopo_common::error::DiscoveryError;
use lantopo_common::input::{self, ManualEntry, SwitchSpec};
use lantopo_common::network::target;

#[derive(Parser, Debug)]
#[command(name = "lantopo")]
#[command(version, about = "Discovers a LAN and draws its physical topology.")]
pub struct CommandLine {
    /// Interfaces to enumerate, comma-separated (default: best LAN interface)
    #[arg(short = 'i', long = "interfaces", value_delimiter = ',')]
    pub interfaces: Vec<String>,

    /// Hosts to traceroute: addresses, ranges or CIDR blocks, comma-separated
    #[arg(short = 't', long = "targets")]
    pub targets: Option<String>,

    /// Trace every discovered host to infer intermediate switches
    #[arg(long)]
    pub trace_local: bool,

    /// SNMP switches as ADDRESS[:COMMUNITY], comma-separated
    #[arg(long)]
    pub switches: Option<String>,

    /// Replay pre-collected LLDP files (<ip>.json) from DIR
    #[arg(long, value_name = "DIR", conflicts_with = "lldp_collect")]
    pub lldp_dir: Option<PathBuf>,

    /// Collect LLDP over SSH and keep the raw replies in DIR
    #[arg(long, value_name = "DIR")]
    pub lldp_collect: Option<PathBuf>,

    /// Manual attachments as HOST:SWITCH:PORT, comma-separated
    #[arg(long)]
    pub topology: Option<String>,

    /// Probe hosts for open TCP services
    #[arg(long)]
    pub probe: bool,

    /// Number of well-known ports to probe
    #[arg(long, value_name = "N", default_value_t = 20)]
    pub top_ports: usize,

    /// Seconds each interface waits for ARP replies
    #[arg(long, value_name = "S", default_value_t = 3.0)]
    pub timeout: f64,

    /// Wall-clock bound of the whole run in seconds
    #[arg(long, value_name = "S", default_value_t = 120.0)]
    pub deadline: f64,

    /// Hop limit for traceroutes
    #[arg(long, value_name = "N", default_value_t = 30)]
    pub max_hops: u8,

    /// Skip reverse DNS lookups
    #[arg(long)]
    pub no_dns: bool,

    /// IEEE registry exports layered over the bundled vendor table
    #[arg(long = "oui", value_name = "FILE")]
    pub oui_files: Vec<PathBuf>,

    #[arg(long, default_value = "mermaid")]
    pub format: OutputFormat,

    /// Diagram style: auto, flat, categorized or hierarchical
    #[arg(short = 'd', long = "diagram", default_value = "auto")]
    pub style: DiagramStyle,

    /// Diagram direction: auto, TD or LR
    #[arg(long, default_value = "auto")]
    pub direction: Direction,

    /// Ask the diagram viewer for the ELK layout engine
    #[arg(long)]
    pub elk: bool,

    /// Write the output to FILE instead of stdout
    #[arg(short = 'o', long = "output", value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Debug logging
    #[arg(short = 'v', long)]
    pub verbose: bool,
}

impl CommandLine {
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Validates every operator string. Nothing is probed before this succeeds.
    pub fn to_config(&self) -> Result<DiscoveryConfig, DiscoveryError> {
        let mut config: DiscoveryConfig = DiscoveryConfig::default();

        config.interfaces = self.interfaces.clone();
        config.scan_timeout = seconds("timeout", self.timeout)?;
        config.deadline = seconds("deadline", self.deadline)?;
        config.no_dns = self.no_dns;
        config.oui_files = self.oui_files.clone();

        config.probe.enabled = self.probe;
        config.probe.port_budget = self.top_ports;

        if let Some(switches) = &self.switches {
            let switches: Vec<SwitchSpec> = input::parse_switches(switches)?;
            config.switches = switches;
        }
        if let Some(topology) = &self.topology {
            let manual: Vec<ManualEntry> = input::parse_topology(topology)?;
            config.manual = manual;
        }

        config.lldp = match (&self.lldp_dir, &self.lldp_collect) {
            (Some(dir), _) => Some(LldpSource::Directory(dir.clone())),
            (None, Some(dir)) => Some(LldpSource::Live {
                save_to: Some(dir.clone()),
            }),
            (None, None) => None,
        };

        if let Some(targets) = &self.targets {
            let targets: Vec<IpAddr> = target::parse_targets(targets)?;
            config.trace.targets = targets;
        }
        if self.max_hops == 0 {
            return Err(DiscoveryError::InvalidInput {
                what: "max hops".into(),
                reason: "must be at least 1".into(),
            });
        }
        config.trace.max_hops = self.max_hops;
        config.trace.local = self.trace_local;

        config.render = RenderOptions {
            format: self.format,
            style: self.style,
            direction: self.direction,
            elk: self.elk,
        };
        Ok(config)
    }
}

fn seconds(what: &str, value: f64) -> Result<Duration, DiscoveryError> {
    Duration::try_from_secs_f64(value).map_err(|e| DiscoveryError::InvalidInput {
        what: what.to_string(),
        reason: e.to_string(),
    })
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

    fn parse(args: &[&str]) -> CommandLine {
        CommandLine::try_parse_from(std::iter::once("lantopo").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn defaults_should_produce_an_auto_mermaid_run() {
        let config = parse(&[]).to_config().unwrap();
        assert!(config.interfaces.is_empty());
        assert_eq!(config.render.format, OutputFormat::Mermaid);
        assert_eq!(config.render.style, DiagramStyle::Auto);
        assert!(config.lldp.is_none());
        assert!(!config.probe.enabled);
    }

    #[test]
    fn lists_should_be_parsed_into_config() {
        let config = parse(&[
            "-i",
            "eth0,eth1",
            "-t",
            "8.8.8.8,10.0.0.1-2",
            "--switches",
            "10.0.0.2:private",
            "--topology",
            "10.0.0.5:10.0.0.2:g3",
            "--lldp-collect",
            "/tmp/lldp",
            "-d",
            "hierarchical",
            "--direction",
            "LR",
        ])
        .to_config()
        .unwrap();

        assert_eq!(config.interfaces, vec!["eth0", "eth1"]);
        assert_eq!(config.trace.targets.len(), 3);
        assert_eq!(config.switches[0].community, "private");
        assert_eq!(config.manual[0].port, "g3");
        assert!(matches!(config.lldp, Some(LldpSource::Live { save_to: Some(_) })));
        assert_eq!(config.render.style, DiagramStyle::Hierarchical);
        assert_eq!(config.render.direction, Direction::LeftRight);
    }

    #[test]
    fn bad_topology_entry_should_be_invalid_input() {
        let err = parse(&["--topology", "10.0.0.5"]).to_config().unwrap_err();
        assert!(matches!(err, DiscoveryError::InvalidInput { .. }));
    }

    #[test]
    fn negative_deadline_should_be_invalid_input() {
        let err = parse(&["--deadline=-1"]).to_config().unwrap_err();
        assert!(matches!(err, DiscoveryError::InvalidInput { .. }));
    }

    #[test]
    fn lldp_sources_should_be_exclusive() {
        let args = ["lantopo", "--lldp-dir", "a", "--lldp-collect", "b"];
        assert!(CommandLine::try_parse_from(args).is_err());
    }
}
