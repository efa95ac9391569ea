//! Passive enumeration from the kernel ARP cache.
//!
//! ```text
//! IP address       HW type     Flags       HW address            Mask     Device
//! 192.168.1.1      0x1         0x2         aa:bb:cc:00:00:01     *        eth0
//! ```
//!
//! An empty cache is not trusted. Every address of the subnet is sent one empty
//! UDP datagram, which makes the kernel resolve it, and the cache is read again
//! after the scan timeout.

use std::fs;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use lantopo_common::network::interface::LanInterface;
use lantopo_common::network::mac;
use pnet::util::MacAddr;
use tokio::net::UdpSocket;
use tracing::{debug, info, warn};

use super::local;

const ARP_CACHE: &str = "/proc/net/arp";
const ATF_COM: u16 = 0x02;
/// The discard service; nothing is expected to answer.
const DISCARD_PORT: u16 = 9;
/// At most this many addresses are nudged per interface.
pub const NUDGE_LIMIT: usize = 1024;

/// The kernel's neighbor table, plus a way to make it learn more.
#[async_trait]
pub trait ArpCache: Send + Sync {
    fn read(&self, lan: &LanInterface) -> anyhow::Result<Vec<(Ipv4Addr, MacAddr)>>;

    /// Provokes address resolution of `targets` without raw sockets.
    /// Returns how many were sent.
    async fn nudge(&self, lan: &LanInterface, targets: &[Ipv4Addr]) -> anyhow::Result<usize>;
}

pub struct KernelArpCache;

#[async_trait]
impl ArpCache for KernelArpCache {
    fn read(&self, lan: &LanInterface) -> anyhow::Result<Vec<(Ipv4Addr, MacAddr)>> {
        read_arp_cache(lan)
    }

    async fn nudge(&self, lan: &LanInterface, targets: &[Ipv4Addr]) -> anyhow::Result<usize> {
        let local: SocketAddr = SocketAddr::new(IpAddr::V4(lan.address()), 0);
        let socket: UdpSocket = UdpSocket::bind(local)
            .await
            .with_context(|| format!("binding UDP socket on {local}"))?;

        let mut sent: usize = 0;
        for target in targets {
            let remote: SocketAddr = SocketAddr::new(IpAddr::V4(*target), DISCARD_PORT);
            match socket.send_to(&[], remote).await {
                Ok(_) => sent += 1,
                Err(e) => debug!(%target, "nudge not sent: {e}"),
            }
        }
        Ok(sent)
    }
}

pub fn read_arp_cache(lan: &LanInterface) -> anyhow::Result<Vec<(Ipv4Addr, MacAddr)>> {
    let table: String =
        fs::read_to_string(ARP_CACHE).with_context(|| format!("reading {ARP_CACHE}"))?;
    Ok(parse_arp_cache(&table, lan.name()))
}

/// Host addresses of `lan` worth nudging, its own address excluded.
pub fn nudge_targets(lan: &LanInterface) -> Vec<Ipv4Addr> {
    local::sweep_targets(lan.network)
        .into_iter()
        .filter(|ip| *ip != lan.address())
        .take(NUDGE_LIMIT)
        .collect()
}

/// Reads the cache; when it has nothing for `lan`, nudges the subnet, waits
/// `settle` and reads again. A failed nudge leaves the empty result standing.
pub async fn read_or_nudge(
    cache: &dyn ArpCache,
    lan: &LanInterface,
    settle: Duration,
) -> anyhow::Result<Vec<(Ipv4Addr, MacAddr)>> {
    let entries: Vec<(Ipv4Addr, MacAddr)> = cache.read(lan)?;
    if !entries.is_empty() {
        return Ok(entries);
    }

    let targets: Vec<Ipv4Addr> = nudge_targets(lan);
    info!(interface = %lan.name(), targets = targets.len(), "ARP cache empty, nudging subnet");
    match cache.nudge(lan, &targets).await {
        Ok(sent) => debug!(interface = %lan.name(), sent, "nudged"),
        Err(e) => {
            warn!(interface = %lan.name(), "nudge failed: {e:#}");
            return Ok(entries);
        }
    }
    tokio::time::sleep(settle).await;
    cache.read(lan)
}

/// Complete entries learned on `device`. Incomplete rows carry an all-zero MAC.
pub fn parse_arp_cache(table: &str, device: &str) -> Vec<(Ipv4Addr, MacAddr)> {
    table
        .lines()
        .skip(1)
        .filter_map(|line| {
            let fields: Vec<&str> = line.split_whitespace().collect();
            let [ip, _hw_type, flags, hw_addr, _mask, dev] = fields.as_slice() else {
                return None;
            };
            if *dev != device {
                return None;
            }
            let flags: u16 = u16::from_str_radix(flags.trim_start_matches("0x"), 16).ok()?;
            if flags & ATF_COM == 0 {
                return None;
            }
            let mac: MacAddr = mac::parse_mac(hw_addr).filter(mac::is_usable)?;
            Some((ip.parse().ok()?, mac))
        })
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
