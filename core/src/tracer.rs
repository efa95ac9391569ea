//! # Tracer
//!
//! Runs `tracepath` (or `traceroute`) per target and keeps whatever hops were
//! printed before the per-target timeout. Output is parsed line by line, so a
//! target that stops answering after hop 4 still yields hops 1 to 4.
//!
//! Trace-local mode traces the discovered LAN hosts themselves. A host reached
//! through another LAN device hangs off the last device before it; a host with no
//! intermediate hop hangs off its subnet's gateway. Those edges carry the lowest
//! confidence and only fill gaps the other collectors leave.

use std::collections::BTreeSet;
use std::net::IpAddr;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use lantopo_common::capability::{self, Availability, Capability, Outcome};
use lantopo_common::config::TraceConfig;
use lantopo_common::model::{
    EdgeReport, EdgeSource, Endpoint, Hop, KnownHost, Subnet, TraceState, TracerouteResult,
    Warning,
};
use lantopo_common::network::hostname;
use lantopo_protocols::trace::{HopParser, ParsedHop, TraceTool};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{debug, info};

use crate::merge::{self, Contribution, ContributionSink};
use crate::pool;
use crate::resolver::ReverseLookup;

#[async_trait]
pub trait TraceRunner: Capability + Send + Sync {
    /// Traces `target`, pushing each hop onto `hops` as soon as it is known.
    ///
    /// Callers bound this with a timeout; hops pushed before cancellation stay.
    async fn trace(&self, target: IpAddr, max_hops: u8, hops: &mut Vec<ParsedHop>) -> anyhow::Result<()>;
}

/// The system's `tracepath`, falling back to `traceroute`.
pub struct SystemTracer {
    tool: Option<TraceTool>,
}

impl SystemTracer {
    pub fn detect() -> Self {
        let tool: Option<TraceTool> = [TraceTool::Tracepath, TraceTool::Traceroute]
            .into_iter()
            .find(|tool| capability::find_in_path(tool.binary()).is_some());
        match tool {
            Some(tool) => debug!(tool = tool.binary(), "route tracing tool found"),
            None => debug!("neither tracepath nor traceroute found"),
        }
        Self { tool }
    }
}

impl Capability for SystemTracer {
    fn name(&self) -> &'static str {
        "tracer"
    }

    fn availability(&self) -> Availability {
        match self.tool {
            Some(_) => Availability::Available,
            None => Availability::Unavailable("neither tracepath nor traceroute found in PATH".into()),
        }
    }
}

#[async_trait]
impl TraceRunner for SystemTracer {
    async fn trace(&self, target: IpAddr, max_hops: u8, hops: &mut Vec<ParsedHop>) -> anyhow::Result<()> {
        let tool: TraceTool = self.tool.context("no tracing tool available")?;
        let mut child = Command::new(tool.binary())
            .args(tool.args(target, max_hops))
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("spawning {}", tool.binary()))?;
        let stdout = child.stdout.take().context("child has no stdout")?;

        let mut parser: HopParser = HopParser::new(tool);
        let mut lines = BufReader::new(stdout).lines();
        while let Some(line) = lines.next_line().await? {
            if let Some(hop) = parser.feed(&line) {
                hops.push(hop);
            }
        }
        child.wait().await?;
        Ok(())
    }
}

/// Limits of one tracing batch.
#[derive(Debug, Clone, Copy)]
pub struct TraceLimits {
    pub max_hops: u8,
    pub per_target: Duration,
}

/// Traces one target. Fails only when the tool failed before printing any hop.
pub async fn trace_one(
    runner: &dyn TraceRunner,
    target: IpAddr,
    limits: TraceLimits,
) -> anyhow::Result<TracerouteResult> {
    let mut parsed: Vec<ParsedHop> = Vec::new();
    let finished = timeout(limits.per_target, runner.trace(target, limits.max_hops, &mut parsed)).await;

    let reached: bool = parsed.iter().any(|hop| hop.addr == Some(target));
    let state: TraceState = match finished {
        Err(_elapsed) => TraceState::TimedOut,
        Ok(Err(e)) if parsed.is_empty() => return Err(e),
        Ok(_) if reached => TraceState::Completed,
        Ok(_) => TraceState::MaxHopsExhausted,
    };

    let mut result: TracerouteResult = TracerouteResult {
        target,
        hops: parsed
            .into_iter()
            .map(|hop| Hop {
                index: hop.index,
                addr: hop.addr,
                hostname: None,
                rtt_micros: hop.rtt_micros,
            })
            .collect(),
        state,
    };
    result.trim_trailing_silence();
    Ok(result)
}

async fn name_hops(result: &mut TracerouteResult, lookup: &dyn ReverseLookup) {
    for hop in &mut result.hops {
        let Some(addr) = hop.addr else {
            continue;
        };
        if let Ok(Some(name)) = lookup.lookup(addr).await {
            hop.hostname = hostname::normalize(&name, lookup.suffixes());
        }
    }
}

/// Traces every target, at most `pool_size` at a time.
pub async fn trace_targets(
    runner: Arc<dyn TraceRunner>,
    targets: Vec<IpAddr>,
    config: &TraceConfig,
    lookup: Option<Arc<dyn ReverseLookup>>,
    pool_size: usize,
    sink: ContributionSink,
) {
    let limits: TraceLimits = TraceLimits {
        max_hops: config.max_hops,
        per_target: config.target_timeout,
    };
    info!(targets = targets.len(), max_hops = limits.max_hops, "tracing routes");

    let outcome = capability::invoke(&*runner, || {
        pool::for_each_bounded(targets, pool_size, |target| {
            let runner: Arc<dyn TraceRunner> = Arc::clone(&runner);
            let lookup: Option<Arc<dyn ReverseLookup>> = lookup.clone();
            let sink: ContributionSink = sink.clone();
            async move {
                let mut result: TracerouteResult = match trace_one(&*runner, target, limits).await {
                    Ok(result) => result,
                    Err(e) => {
                        merge::emit_warning(
                            &sink,
                            Warning::new("tracer", Some(target.to_string()), format!("{e:#}")),
                        );
                        return;
                    }
                };
                if let Some(lookup) = &lookup {
                    name_hops(&mut result, &**lookup).await;
                }
                let responding: usize = result.responding().count();
                info!(%target, hops = responding, state = ?result.state, "trace finished");
                if result.state == TraceState::TimedOut {
                    merge::emit_warning(
                        &sink,
                        Warning::new(
                            "tracer",
                            Some(target.to_string()),
                            format!("timed out after {responding} responding hop(s)"),
                        ),
                    );
                }
                merge::emit(&sink, Contribution::Trace(result));
            }
        })
    })
    .await;

    if let Outcome::Unavailable { capability, reason } = outcome {
        merge::emit_warning(
            &sink,
            Warning::new(capability, None, format!("route tracing skipped: {reason}")),
        );
    }
}

/// Where a LAN host hangs, inferred from a trace to it.
///
/// The last responding hop before the target is the parent; with none, the
/// gateway is. Known LAN hosts on the way (other than the gateway) forward
/// traffic for others and are reported as infrastructure.
pub fn infer_attachment(
    trace: &TracerouteResult,
    gateway: Option<IpAddr>,
    lan: &BTreeSet<IpAddr>,
) -> Vec<Contribution> {
    let upstream: Vec<IpAddr> = trace
        .responding()
        .map(|(_, addr)| addr)
        .take_while(|addr| *addr != trace.target)
        .collect();

    let mut contributions: Vec<Contribution> = upstream
        .iter()
        .filter(|addr| lan.contains(addr) && Some(**addr) != gateway)
        .map(|addr| Contribution::Infrastructure { ip: *addr })
        .collect();

    if let Some(parent) = upstream.last().copied().or(gateway)
        && parent != trace.target
    {
        contributions.push(Contribution::Edge(EdgeReport {
            parent: Endpoint::Ip(parent),
            child: Endpoint::Ip(trace.target),
            port: None,
            source: EdgeSource::Trace,
        }));
    }
    contributions
}

/// Gateway of the subnet containing `ip`.
pub fn gateway_for(subnets: &[Subnet], ip: IpAddr) -> Option<IpAddr> {
    let IpAddr::V4(v4) = ip else {
        return None;
    };
    subnets
        .iter()
        .filter_map(|subnet| Some((subnet.cidr?, subnet.gateway?)))
        .find(|(cidr, _)| cidr.contains(v4))
        .map(|(_, gateway)| IpAddr::V4(gateway))
}

/// Trace-local mode: traces every non-gateway host with tight limits and feeds
/// the inferred attachments back as edges. The traces themselves are not kept.
pub async fn trace_local(
    runner: Arc<dyn TraceRunner>,
    hosts: Vec<KnownHost>,
    subnets: Vec<Subnet>,
    config: &TraceConfig,
    pool_size: usize,
    sink: ContributionSink,
) {
    let limits: TraceLimits = TraceLimits {
        max_hops: config.local_max_hops,
        per_target: config.local_timeout,
    };
    let lan: Arc<BTreeSet<IpAddr>> = Arc::new(hosts.iter().map(|host| host.ip).collect());
    let subnets: Arc<Vec<Subnet>> = Arc::new(subnets);
    let targets: Vec<IpAddr> = hosts
        .iter()
        .filter(|host| !host.is_gateway)
        .map(|host| host.ip)
        .collect();
    info!(hosts = targets.len(), "tracing local hosts");

    let outcome = capability::invoke(&*runner, || {
        pool::for_each_bounded(targets, pool_size, |target| {
            let runner: Arc<dyn TraceRunner> = Arc::clone(&runner);
            let lan: Arc<BTreeSet<IpAddr>> = Arc::clone(&lan);
            let subnets: Arc<Vec<Subnet>> = Arc::clone(&subnets);
            let sink: ContributionSink = sink.clone();
            async move {
                match trace_one(&*runner, target, limits).await {
                    Ok(result) => {
                        debug!(%target, hops = result.responding().count(), "local trace finished");
                        let gateway: Option<IpAddr> = gateway_for(&subnets, target);
                        for contribution in infer_attachment(&result, gateway, &lan) {
                            merge::emit(&sink, contribution);
                        }
                    }
                    Err(e) => debug!(%target, "local trace failed: {e:#}"),
                }
            }
        })
    })
    .await;

    if let Outcome::Unavailable { capability, reason } = outcome {
        merge::emit_warning(
            &sink,
            Warning::new(capability, None, format!("local tracing skipped: {reason}")),
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

#[cfg(test)]
mod tests {
    use super::*;
    use lantopo_common::model::{Cidr, ScanOutcome};
    use std::net::Ipv4Addr;
    use tokio::sync::mpsc;

    /// Replays fixed hops, then either returns or hangs.
    struct ScriptedRunner {
        hops: Vec<(u8, Option<&'static str>)>,
        hang: bool,
    }

    impl Capability for ScriptedRunner {
        fn name(&self) -> &'static str {
            "tracer"
        }

        fn availability(&self) -> Availability {
            Availability::Available
        }
    }

    #[async_trait]
    impl TraceRunner for ScriptedRunner {
        async fn trace(&self, _target: IpAddr, max_hops: u8, hops: &mut Vec<ParsedHop>) -> anyhow::Result<()> {
            for (index, addr) in self.hops.iter().filter(|(index, _)| *index <= max_hops) {
                hops.push(ParsedHop {
                    index: *index,
                    addr: addr.map(|a| a.parse().unwrap()),
                    rtt_micros: addr.map(|_| 1_500),
                });
                tokio::task::yield_now().await;
            }
            if self.hang {
                std::future::pending::<()>().await;
            }
            Ok(())
        }
    }

    fn limits(max_hops: u8) -> TraceLimits {
        TraceLimits {
            max_hops,
            per_target: Duration::from_millis(100),
        }
    }

    fn ip(s: &str) -> IpAddr {
        s.parse().unwrap()
    }

    #[tokio::test]
    async fn timeout_should_keep_hops_already_seen() {
        let runner = ScriptedRunner {
            hops: vec![
                (1, Some("192.168.1.1")),
                (2, Some("100.64.0.1")),
                (3, Some("100.64.1.1")),
                (4, Some("142.250.0.1")),
                (5, None),
                (6, None),
            ],
            hang: true,
        };
        let result = trace_one(&runner, ip("8.8.8.8"), limits(30)).await.unwrap();
        assert_eq!(result.state, TraceState::TimedOut);
        assert_eq!(result.hops.len(), 4);
        assert_eq!(result.hops[3].addr, Some(ip("142.250.0.1")));
    }

    #[tokio::test]
    async fn reaching_target_should_complete() {
        let runner = ScriptedRunner {
            hops: vec![(1, Some("192.168.1.1")), (2, Some("8.8.8.8"))],
            hang: false,
        };
        let result = trace_one(&runner, ip("8.8.8.8"), limits(30)).await.unwrap();
        assert_eq!(result.state, TraceState::Completed);

        let short = trace_one(&runner, ip("8.8.8.8"), limits(1)).await.unwrap();
        assert_eq!(short.state, TraceState::MaxHopsExhausted);
    }

    #[tokio::test]
    async fn timed_out_target_should_warn_but_keep_result() {
        let runner: Arc<dyn TraceRunner> = Arc::new(ScriptedRunner {
            hops: vec![(1, Some("192.168.1.1")), (2, None)],
            hang: true,
        });
        let config = TraceConfig {
            target_timeout: Duration::from_millis(50),
            ..TraceConfig::default()
        };
        let (tx, mut rx) = mpsc::unbounded_channel();
        trace_targets(runner, vec![ip("8.8.8.8"), ip("1.1.1.1")], &config, None, 4, tx).await;

        let mut traces = 0;
        let mut warnings = 0;
        while let Ok(contribution) = rx.try_recv() {
            match contribution {
                Contribution::Trace(result) => {
                    traces += 1;
                    assert_eq!(result.hops.len(), 1);
                }
                Contribution::Warning(_) => warnings += 1,
                _ => {}
            }
        }
        assert_eq!(traces, 2);
        assert_eq!(warnings, 2);
    }

    fn trace(target: &str, hops: &[Option<&str>]) -> TracerouteResult {
        TracerouteResult {
            target: ip(target),
            hops: hops
                .iter()
                .enumerate()
                .map(|(i, addr)| Hop {
                    index: i as u8 + 1,
                    addr: addr.map(ip),
                    hostname: None,
                    rtt_micros: None,
                })
                .collect(),
            state: TraceState::Completed,
        }
    }

    #[test]
    fn direct_host_should_hang_off_gateway() {
        let lan: BTreeSet<IpAddr> = [ip("192.168.1.1"), ip("192.168.1.20")].into();
        let contributions = infer_attachment(
            &trace("192.168.1.20", &[Some("192.168.1.20")]),
            Some(ip("192.168.1.1")),
            &lan,
        );
        assert!(matches!(
            contributions.as_slice(),
            [Contribution::Edge(EdgeReport { parent: Endpoint::Ip(p), source: EdgeSource::Trace, .. })]
                if *p == ip("192.168.1.1")
        ));
    }

    #[test]
    fn multi_hop_host_should_hang_off_penultimate_hop() {
        let lan: BTreeSet<IpAddr> = [ip("192.168.1.1"), ip("192.168.1.2"), ip("192.168.1.30")].into();
        let contributions = infer_attachment(
            &trace("192.168.1.30", &[Some("192.168.1.1"), Some("192.168.1.2"), None, Some("192.168.1.30")]),
            Some(ip("192.168.1.1")),
            &lan,
        );
        assert_eq!(contributions.len(), 2);
        assert!(matches!(
            &contributions[0],
            Contribution::Infrastructure { ip: infra } if *infra == ip("192.168.1.2")
        ));
        assert!(matches!(
            &contributions[1],
            Contribution::Edge(EdgeReport { parent: Endpoint::Ip(p), .. }) if *p == ip("192.168.1.2")
        ));
    }

    #[test]
    fn silent_trace_without_gateway_infers_nothing() {
        let contributions = infer_attachment(&trace("192.168.1.30", &[]), None, &BTreeSet::new());
        assert!(contributions.is_empty());
    }

    #[test]
    fn gateway_for_should_match_subnet() {
        let subnets = vec![Subnet {
            interface: "eth0".into(),
            cidr: Some(Cidr::new(Ipv4Addr::new(192, 168, 1, 0), 24)),
            gateway: Some(Ipv4Addr::new(192, 168, 1, 1)),
            outcome: ScanOutcome::Active,
        }];
        assert_eq!(gateway_for(&subnets, ip("192.168.1.77")), Some(ip("192.168.1.1")));
        assert_eq!(gateway_for(&subnets, ip("10.0.0.5")), None);
    }

    #[tokio::test]
    async fn unavailable_tracer_should_warn() {
        let runner: Arc<dyn TraceRunner> = Arc::new(SystemTracer { tool: None });
        let (tx, mut rx) = mpsc::unbounded_channel();
        trace_targets(runner, vec![ip("8.8.8.8")], &TraceConfig::default(), None, 1, tx).await;
        assert!(matches!(rx.try_recv(), Ok(Contribution::Warning(w)) if w.component == "tracer"));
        assert!(rx.try_recv().is_err());
    }
}
