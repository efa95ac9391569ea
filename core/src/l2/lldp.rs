//! # LLDP Collector
//!
//! Every host running `lldpd` knows which switch port it is plugged into. The
//! live variant asks each host over SSH; the offline variant replays files a
//! previous live run (or an operator) saved as `<dir>/<ip>.json`. Both feed the
//! same parser, so the edges do not depend on the transport.

use std::collections::BTreeMap;
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::process::Output;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, bail};
use async_trait::async_trait;
use lantopo_common::capability::{self, Availability, Capability, Outcome};
use lantopo_common::model::{EdgeReport, EdgeSource, Endpoint, KnownHost, Warning};
use lantopo_protocols::lldp::{self, LldpNeighbor};
use thiserror::Error;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::merge::{self, Contribution, ContributionSink};
use crate::pool;

/// Why a host produced no neighbor data.
#[derive(Debug, Error)]
pub enum FetchError {
    /// The session was refused or `lldpctl` is missing: an ordinary host.
    #[error("no LLDP data: {0}")]
    NoData(String),
    #[error(transparent)]
    Failed(#[from] anyhow::Error),
}

#[async_trait]
pub trait NeighborSource: Capability + Send + Sync {
    /// Raw `lldpctl -f json` output of one host.
    async fn fetch(&self, ip: IpAddr) -> Result<String, FetchError>;
}

/// `ssh root@<ip> lldpctl -f json`, non-interactively.
pub struct SshLldp {
    timeout: Duration,
    save_to: Option<PathBuf>,
}

impl SshLldp {
    pub fn new(timeout: Duration, save_to: Option<PathBuf>) -> Self {
        Self { timeout, save_to }
    }

    fn command(ip: IpAddr) -> Command {
        let mut command: Command = Command::new("ssh");
        command
            .args([
                "-o",
                "StrictHostKeyChecking=no",
                "-o",
                "ConnectTimeout=5",
                "-o",
                "BatchMode=yes",
            ])
            .arg(format!("root@{ip}"))
            .args(["lldpctl", "-f", "json"])
            .kill_on_drop(true);
        command
    }

    async fn save(&self, ip: IpAddr, raw: &str) {
        let Some(dir) = &self.save_to else {
            return;
        };
        let path: PathBuf = dir.join(format!("{ip}.json"));
        match tokio::fs::write(&path, raw).await {
            Ok(()) => debug!(%ip, path = %path.display(), "saved lldpctl output"),
            Err(e) => warn!(%ip, "could not save {}: {e}", path.display()),
        }
    }
}

impl Capability for SshLldp {
    fn name(&self) -> &'static str {
        "lldp-ssh"
    }

    fn availability(&self) -> Availability {
        match capability::find_in_path("ssh") {
            Some(_) => Availability::Available,
            None => Availability::Unavailable("ssh not found in PATH".into()),
        }
    }
}

#[async_trait]
impl NeighborSource for SshLldp {
    async fn fetch(&self, ip: IpAddr) -> Result<String, FetchError> {
        let output: Output = match timeout(self.timeout, Self::command(ip).output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => return Err(FetchError::Failed(anyhow::Error::new(e).context("running ssh"))),
            Err(_elapsed) => {
                return Err(FetchError::Failed(anyhow::anyhow!(
                    "no answer within {:?}",
                    self.timeout
                )));
            }
        };

        let stdout: String = String::from_utf8_lossy(&output.stdout).into_owned();
        if !output.status.success() || stdout.trim().is_empty() {
            let stderr: String = String::from_utf8_lossy(&output.stderr).into_owned();
            let reason: &str = stderr.lines().next().unwrap_or("no output");
            return Err(FetchError::NoData(reason.to_string()));
        }
        if let Err(e) = serde_json::from_str::<serde_json::Value>(&stdout) {
            return Err(FetchError::Failed(
                anyhow::Error::new(e).context("lldpctl output is not JSON"),
            ));
        }

        self.save(ip, &stdout).await;
        Ok(stdout)
    }
}

/// Edges from one host's neighbor list: the host hangs off each neighbor chassis.
pub fn edges_for_host(host: IpAddr, neighbors: &[LldpNeighbor]) -> Vec<Contribution> {
    let mut contributions: Vec<Contribution> = Vec::new();
    for neighbor in neighbors {
        if neighbor.chassis_mac.is_none() && neighbor.chassis_name.is_none() {
            debug!(%host, interface = %neighbor.local_interface, "neighbor without chassis identity");
            continue;
        }
        let chassis: Endpoint = Endpoint::Chassis {
            mac: neighbor.chassis_mac,
            name: neighbor.chassis_name.clone(),
        };
        if let Some(name) = &neighbor.chassis_name {
            contributions.push(Contribution::SwitchName {
                endpoint: chassis.clone(),
                name: name.clone(),
            });
        }
        contributions.push(Contribution::Edge(EdgeReport {
            parent: chassis,
            child: Endpoint::Ip(host),
            port: neighbor.port.clone(),
            source: EdgeSource::Lldp,
        }));
    }
    contributions
}

fn contribute_raw(host: IpAddr, raw: &str, origin: &str, sink: &ContributionSink) {
    match lldp::parse_neighbors(raw) {
        Ok(neighbors) => {
            debug!(%host, neighbors = neighbors.len(), "parsed lldpctl output");
            for contribution in edges_for_host(host, &neighbors) {
                merge::emit(sink, contribution);
            }
        }
        Err(e) => merge::emit_warning(
            sink,
            Warning::new("lldp", Some(origin.to_string()), format!("{e:#}")),
        ),
    }
}

/// Queries every non-gateway host, at most `pool_size` sessions at once.
pub async fn collect_live(
    source: Arc<dyn NeighborSource>,
    hosts: Vec<KnownHost>,
    pool_size: usize,
    sink: ContributionSink,
) {
    let targets: Vec<IpAddr> = hosts
        .iter()
        .filter(|host| !host.is_gateway)
        .map(|host| host.ip)
        .collect();
    info!(hosts = targets.len(), "collecting LLDP neighbors");

    let outcome = capability::invoke(&*source, || {
        pool::for_each_bounded(targets, pool_size, |ip| {
            let source: Arc<dyn NeighborSource> = Arc::clone(&source);
            let sink: ContributionSink = sink.clone();
            async move {
                match source.fetch(ip).await {
                    Ok(raw) => contribute_raw(ip, &raw, &ip.to_string(), &sink),
                    Err(e @ FetchError::NoData(_)) => debug!(%ip, "{e}"),
                    Err(FetchError::Failed(e)) => merge::emit_warning(
                        &sink,
                        Warning::new("lldp", Some(ip.to_string()), format!("{e:#}")),
                    ),
                }
            }
        })
    })
    .await;

    if let Outcome::Unavailable { capability, reason } = outcome {
        merge::emit_warning(
            &sink,
            Warning::new(capability, None, format!("LLDP collection skipped: {reason}")),
        );
    }
}

/// Replays `<ip>.json` files for the known hosts; other files are ignored.
pub async fn collect_from_directory(dir: &Path, hosts: &[KnownHost], sink: ContributionSink) {
    let files: BTreeMap<IpAddr, PathBuf> = match lldp_files(dir) {
        Ok(files) => files,
        Err(e) => {
            merge::emit_warning(
                &sink,
                Warning::new("lldp", Some(dir.display().to_string()), format!("{e:#}")),
            );
            return;
        }
    };
    if files.is_empty() {
        merge::emit_warning(
            &sink,
            Warning::new("lldp", Some(dir.display().to_string()), "no JSON files found"),
        );
        return;
    }

    let mut used: usize = 0;
    for (ip, path) in &files {
        if !hosts.iter().any(|host| host.ip == *ip) {
            debug!(%ip, "LLDP file for undiscovered host, skipping");
            continue;
        }
        match tokio::fs::read_to_string(path).await {
            Ok(raw) => {
                contribute_raw(*ip, &raw, &path.display().to_string(), &sink);
                used += 1;
            }
            Err(e) => merge::emit_warning(
                &sink,
                Warning::new("lldp", Some(path.display().to_string()), format!("unreadable: {e}")),
            ),
        }
    }
    info!(dir = %dir.display(), files = files.len(), used, "replayed LLDP files");
}

/// `*.json` files whose stem is an address.
fn lldp_files(dir: &Path) -> anyhow::Result<BTreeMap<IpAddr, PathBuf>> {
    if !dir.is_dir() {
        bail!("not a directory");
    }
    let mut files: BTreeMap<IpAddr, PathBuf> = BTreeMap::new();
    for entry in std::fs::read_dir(dir).with_context(|| format!("listing {}", dir.display()))? {
        let path: PathBuf = entry?.path();
        if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
            continue;
        }
        if let Some(ip) = path
            .file_stem()
            .and_then(|stem| stem.to_str())
            .and_then(|stem| stem.parse::<IpAddr>().ok())
        {
            files.insert(ip, path);
        }
    }
    Ok(files)
}

// ╔════════════════════════════════════════════╗
// ║ ████████╗███████╗███████╗████████╗███████╗ ║
// ║ ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝██╔════╝ ║
// ║    ██║   █████╗  ███████╗   ██║   ███████╗ ║
// ║    ██║   ██╔══╝  ╚════██║   ██║   ╚════██║ ║
// ║    ██║   ███████╗███████║   ██║   ███████║ ║
// ║    ╚═╝   ╚══════╝╚══════╝   ╚═╝   ╚══════╝ ║
// ╚════════════════════════════════════════════╝
