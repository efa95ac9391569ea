//! # SNMP Bridge Walker
//!
//! Reads `sysName`, `ifDescr`, the bridge-port map and the forwarding table of
//! every configured switch (SNMP v2c), then attaches each known host to the one
//! switch port it is most directly behind.
//!
//! A MAC is learned on every switch between the querier and the host, so the raw
//! tables over-report. Two facts pick the right switch:
//!
//! * a switch whose port toward the gateway learned the MAC is *below* the host,
//!   never its parent;
//! * among the remaining candidates, the port through which the fewest other
//!   walked switches are reachable is the most specific (an access port sees none).
//!
//! Walked switches are hosts too, so switch-to-switch uplinks fall out of the
//! same rule.

use std::collections::BTreeMap;
use std::net::IpAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use lantopo_common::capability::{self, Availability, Capability, Outcome};
use lantopo_common::input::SwitchSpec;
use lantopo_common::model::{EdgeReport, EdgeSource, Endpoint, KnownHost, Warning};
use lantopo_protocols::bridge::{self, BridgeTables, PortMapping};
use pnet::util::MacAddr;
use tokio::time::{Instant, timeout_at};
use tracing::{debug, info};

use crate::merge::{self, Contribution, ContributionSink};
use crate::pool;

/// The resolved forwarding table of one switch.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct SwitchTable {
    pub switch: IpAddr,
    pub sys_name: Option<String>,
    pub ports: BTreeMap<MacAddr, PortMapping>,
}

impl SwitchTable {
    pub fn from_tables(switch: IpAddr, tables: &BridgeTables) -> Self {
        Self {
            switch,
            sys_name: tables.sys_name.clone().filter(|name| !name.trim().is_empty()),
            ports: bridge::resolve_ports(tables),
        }
    }
}

#[async_trait]
pub trait BridgeWalker: Capability + Send + Sync {
    async fn walk(&self, switch: &SwitchSpec) -> anyhow::Result<BridgeTables>;
}

pub struct SnmpWalker;

impl Capability for SnmpWalker {
    fn name(&self) -> &'static str {
        "snmp"
    }

    fn availability(&self) -> Availability {
        if cfg!(feature = "snmp") {
            Availability::Available
        } else {
            Availability::Unavailable("built without SNMP support".into())
        }
    }
}

#[async_trait]
impl BridgeWalker for SnmpWalker {
    async fn walk(&self, switch: &SwitchSpec) -> anyhow::Result<BridgeTables> {
        session::walk(switch).await
    }
}

#[cfg(feature = "snmp")]
mod session {
    use std::net::SocketAddr;

    use anyhow::{Context, anyhow};
    use lantopo_common::input::SwitchSpec;
    use lantopo_protocols::bridge::{self, BridgeTables, Row, VarValue};
    use snmp2::{AsyncSession, Oid, Value};

    const SNMP_PORT: u16 = 161;
    const MAX_REPETITIONS: u32 = 25;

    pub async fn walk(switch: &SwitchSpec) -> anyhow::Result<BridgeTables> {
        let addr: SocketAddr = SocketAddr::new(switch.address, SNMP_PORT);
        let mut session: AsyncSession =
            AsyncSession::new_v2c(addr, switch.community.as_bytes(), 0)
                .await
                .with_context(|| format!("opening SNMP session to {addr}"))?;

        let sys_name: Option<String> = get_text(&mut session, bridge::SYS_NAME).await?;
        let if_descr: Vec<Row> = walk_subtree(&mut session, bridge::IF_DESCR).await?;
        let base_port_if_index: Vec<Row> =
            walk_subtree(&mut session, bridge::DOT1D_BASE_PORT_IF_INDEX).await?;
        let q_fdb_port: Vec<Row> = walk_subtree(&mut session, bridge::DOT1Q_TP_FDB_PORT).await?;
        let fdb_port: Vec<Row> = if q_fdb_port.is_empty() {
            walk_subtree(&mut session, bridge::DOT1D_TP_FDB_PORT).await?
        } else {
            Vec::new()
        };

        Ok(BridgeTables {
            sys_name,
            if_descr,
            base_port_if_index,
            q_fdb_port,
            fdb_port,
        })
    }

    fn to_oid(components: &[u64]) -> anyhow::Result<Oid<'static>> {
        Oid::from(components).map_err(|_| anyhow!("invalid OID {components:?}"))
    }

    fn var_value(value: &Value<'_>) -> VarValue {
        match value {
            Value::Integer(i) => VarValue::Integer(*i),
            Value::Unsigned32(u) => VarValue::Integer(i64::from(*u)),
            Value::OctetString(bytes) => VarValue::Text(String::from_utf8_lossy(bytes).into_owned()),
            _ => VarValue::Other,
        }
    }

    async fn get_text(session: &mut AsyncSession, oid: &[u64]) -> anyhow::Result<Option<String>> {
        let oid: Oid<'static> = to_oid(oid)?;
        let pdu = session.get(&oid).await.map_err(|e| anyhow!("GET failed: {e:?}"))?;
        Ok(pdu
            .varbinds
            .map(|(_, value)| var_value(&value))
            .find_map(|value| value.as_text().map(str::to_string)))
    }

    /// GETBULK walk of everything below `root`, in OID order.
    async fn walk_subtree(session: &mut AsyncSession, root: &[u64]) -> anyhow::Result<Vec<Row>> {
        let mut rows: Vec<Row> = Vec::new();
        let mut cursor: Vec<u64> = root.to_vec();

        loop {
            let cursor_oid: Oid<'static> = to_oid(&cursor)?;
            let pdu = session
                .getbulk(&[&cursor_oid], 0, MAX_REPETITIONS)
                .await
                .map_err(|e| anyhow!("GETBULK failed: {e:?}"))?;

            let mut advanced: bool = false;
            for (oid, value) in pdu.varbinds {
                let Some(components) = oid.iter() else {
                    return Ok(rows);
                };
                let components: Vec<u64> = components.collect();
                if !components.starts_with(root)
                    || components <= cursor
                    || matches!(value, Value::EndOfMibView)
                {
                    return Ok(rows);
                }
                rows.push((components.clone(), var_value(&value)));
                cursor = components;
                advanced = true;
            }
            if !advanced {
                return Ok(rows);
            }
        }
    }
}

#[cfg(not(feature = "snmp"))]
mod session {
    use lantopo_common::input::SwitchSpec;
    use lantopo_protocols::bridge::BridgeTables;

    pub async fn walk(_switch: &SwitchSpec) -> anyhow::Result<BridgeTables> {
        anyhow::bail!("built without SNMP support")
    }
}

/// Walks every switch (at most `pool_size` at once) and contributes each table
/// the moment its walk completes. Attachment edges are derived from the tables
/// when the topology is finished, so a switch cut off by `deadline` costs only
/// its own table.
pub async fn collect(
    walker: Arc<dyn BridgeWalker>,
    switches: Vec<SwitchSpec>,
    switch_timeout: Duration,
    deadline: Instant,
    pool_size: usize,
    sink: ContributionSink,
) {
    let walked = Arc::new(AtomicUsize::new(0));
    let outcome = capability::invoke(&*walker, || {
        pool::for_each_bounded(switches, pool_size, |spec| {
            let walker: Arc<dyn BridgeWalker> = Arc::clone(&walker);
            let sink: ContributionSink = sink.clone();
            let walked: Arc<AtomicUsize> = Arc::clone(&walked);
            async move {
                if walk_one(&*walker, &spec, switch_timeout, deadline, &sink).await {
                    walked.fetch_add(1, Ordering::Relaxed);
                }
            }
        })
    })
    .await;

    match outcome {
        Outcome::Completed(()) => {
            info!(switches = walked.load(Ordering::Relaxed), "SNMP walks finished");
        }
        Outcome::Unavailable { capability, reason } => merge::emit_warning(
            &sink,
            Warning::new(capability, None, format!("switch walks skipped: {reason}")),
        ),
    }
}

/// Walks one switch, bounded by its own timeout and the run deadline.
/// Returns whether a table was contributed.
async fn walk_one(
    walker: &dyn BridgeWalker,
    spec: &SwitchSpec,
    switch_timeout: Duration,
    deadline: Instant,
    sink: &ContributionSink,
) -> bool {
    let subject: Option<String> = Some(spec.to_string());
    let own_limit: Instant = Instant::now() + switch_timeout;
    let cut_by_deadline: bool = deadline < own_limit;

    match timeout_at(own_limit.min(deadline), walker.walk(spec)).await {
        Ok(Ok(tables)) => {
            let table: SwitchTable = SwitchTable::from_tables(spec.address, &tables);
            debug!(switch = %spec, macs = table.ports.len(), "walked forwarding table");
            if let Some(name) = &table.sys_name {
                merge::emit(
                    sink,
                    Contribution::SwitchName {
                        endpoint: Endpoint::Ip(spec.address),
                        name: name.clone(),
                    },
                );
            }
            merge::emit(sink, Contribution::SwitchTable(table));
            true
        }
        Ok(Err(e)) => {
            merge::emit_warning(
                sink,
                Warning::new("snmp", subject, format!("switch unreachable: {e:#}")),
            );
            false
        }
        Err(_elapsed) if cut_by_deadline => {
            merge::emit_warning(
                sink,
                Warning::new("snmp", subject, "switch walk cancelled: run deadline reached"),
            );
            false
        }
        Err(_elapsed) => {
            merge::emit_warning(
                sink,
                Warning::new(
                    "snmp",
                    subject,
                    format!("switch unreachable: no answer within {switch_timeout:?}"),
                ),
            );
            false
        }
    }
}

/// Keeps one table per switch; of two different tables for the same switch the
/// greater one wins, so the choice does not depend on arrival order.
pub fn latest_tables<'a, I>(tables: I) -> Vec<SwitchTable>
where
    I: IntoIterator<Item = &'a SwitchTable>,
{
    let mut by_switch: BTreeMap<IpAddr, &SwitchTable> = BTreeMap::new();
    for table in tables {
        by_switch
            .entry(table.switch)
            .and_modify(|current| {
                if table > *current {
                    *current = table;
                }
            })
            .or_insert(table);
    }
    by_switch.into_values().cloned().collect()
}

/// Attaches every non-gateway host with a MAC to its most direct switch port.
pub fn build_edges(tables: &[SwitchTable], hosts: &[KnownHost]) -> Vec<EdgeReport> {
    let switch_macs: BTreeMap<IpAddr, MacAddr> = tables
        .iter()
        .filter_map(|table| {
            let host: &KnownHost = hosts.iter().find(|host| host.ip == table.switch)?;
            Some((table.switch, host.mac?))
        })
        .collect();
    let gateway_mac: Option<MacAddr> = hosts
        .iter()
        .find(|host| host.is_gateway)
        .and_then(|host| host.mac);

    // Walked switches reachable through each (switch, ifIndex).
    let mut switches_behind: BTreeMap<(IpAddr, u32), Vec<MacAddr>> = BTreeMap::new();
    for table in tables {
        for (owner, mac) in &switch_macs {
            if *owner == table.switch {
                continue;
            }
            if let Some(mapping) = table.ports.get(mac) {
                switches_behind
                    .entry((table.switch, mapping.if_index))
                    .or_default()
                    .push(*mac);
            }
        }
    }

    let mut edges: Vec<EdgeReport> = Vec::new();
    for host in hosts {
        let Some(mac) = host.mac else {
            continue;
        };
        if host.is_gateway && !switch_macs.contains_key(&host.ip) {
            continue;
        }

        let best: Option<(&SwitchTable, &PortMapping)> = tables
            .iter()
            .filter(|table| table.switch != host.ip)
            .filter_map(|table| Some((table, table.ports.get(&mac)?)))
            .filter(|(table, mapping)| {
                let upstream: Option<u32> = gateway_mac
                    .filter(|gateway| *gateway != mac)
                    .and_then(|gateway| table.ports.get(&gateway))
                    .map(|port| port.if_index);
                upstream != Some(mapping.if_index)
            })
            .min_by_key(|(table, mapping)| {
                let others: usize = switches_behind
                    .get(&(table.switch, mapping.if_index))
                    .map_or(0, |macs| macs.iter().filter(|m| **m != mac).count());
                (others, table.switch)
            });

        if let Some((table, mapping)) = best {
            edges.push(EdgeReport {
                parent: Endpoint::Ip(table.switch),
                child: Endpoint::Mac(mac),
                port: Some(mapping.port_name.clone()),
                source: EdgeSource::Snmp,
            });
        }
    }
    edges
}

// ╔════════════════════════════════════════════╗
// ║ ████████╗███████╗███████╗████████╗███████╗ ║
// ║ ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝██╔════╝ ║
// ║    ██║   █████╗  ███████╗   ██║   ███████╗ ║
// ║    ██║   ██╔══╝  ╚════██║   ██║   ╚════██║ ║
// ║    ██║   ███████╗███████║   ██║   ███████║ ║
// ║    ╚═╝   ╚══════╝╚══════╝   ╚═╝   ╚══════╝ ║
// ╚════════════════════════════════════════════╝
