//! A **local area network (LAN)** ARP sweep.
//!
//! One broadcast ARP request per usable address, then the channel is drained until
//! the scan timeout. Runs on a blocking thread; `pnet` channels are synchronous.
//!
//! Requires **root privileges** to open a raw Layer 2 channel.

use std::collections::BTreeMap;
use std::net::{IpAddr, Ipv4Addr};
use std::time::{Duration, Instant};

use anyhow::{Context, bail};
use lantopo_common::network::interface::LanInterface;
use lantopo_common::network::mac;
use lantopo_common::network::range;
use lantopo_protocols::arp::{self, ArpReply};
use pnet::datalink::{self, Channel, Config, DataLinkReceiver, DataLinkSender, NetworkInterface};
use pnet::ipnetwork::Ipv4Network;
use pnet::util::MacAddr;
use tracing::debug;

/// Widest block swept; larger networks are cut to the /20 around our address.
pub const MIN_SWEEP_PREFIX: u8 = 20;

pub fn sweep(lan: &LanInterface, timeout: Duration) -> anyhow::Result<Vec<(Ipv4Addr, MacAddr)>> {
    sweep_with(lan, timeout, datalink::channel)
}

pub fn sweep_with<F>(
    lan: &LanInterface,
    timeout: Duration,
    channel_opener: F,
) -> anyhow::Result<Vec<(Ipv4Addr, MacAddr)>>
where
    F: FnOnce(&NetworkInterface, Config) -> std::io::Result<Channel>,
{
    let src_mac: MacAddr = lan
        .mac()
        .with_context(|| format!("{} has no MAC address", lan.name()))?;
    let (mut tx, rx) = open_eth_channel(&lan.device, &get_config(), channel_opener)?;

    let targets: Vec<Ipv4Addr> = sweep_targets(lan.network);
    debug!(interface = %lan.name(), targets = targets.len(), "sending ARP requests");
    for target in targets {
        let frame: Vec<u8> = arp::request_frame(src_mac, lan.address(), target)?;
        if let Some(Err(e)) = tx.send_to(&frame, None) {
            debug!(interface = %lan.name(), %target, "send failed: {e}");
        }
    }

    Ok(listen_for_replies(rx, Instant::now() + timeout, lan))
}

pub fn open_eth_channel<F>(
    intf: &NetworkInterface,
    cfg: &Config,
    channel_opener: F,
) -> anyhow::Result<(Box<dyn DataLinkSender>, Box<dyn DataLinkReceiver>)>
where
    F: FnOnce(&NetworkInterface, Config) -> std::io::Result<Channel>,
{
    let ch: Channel =
        channel_opener(intf, *cfg).with_context(|| format!("opening on {}", intf.name))?;
    match ch {
        Channel::Ethernet(tx, rx) => Ok((tx, rx)),
        _ => bail!("non-ethernet channel for {}", intf.name),
    }
}

/// Addresses to probe: the host range of `network`, cut to a /20 around the
/// interface address when the network is wider.
pub fn sweep_targets(network: Ipv4Network) -> Vec<Ipv4Addr> {
    let network: Ipv4Network = if network.prefix() < MIN_SWEEP_PREFIX {
        Ipv4Network::new(network.ip(), MIN_SWEEP_PREFIX).unwrap_or(network)
    } else {
        network
    };
    range::host_range(network)
        .to_iter()
        .filter_map(|ip| match ip {
            IpAddr::V4(v4) if v4 != network.ip() => Some(v4),
            _ => None,
        })
        .collect()
}

fn listen_for_replies(
    mut rx: Box<dyn DataLinkReceiver>,
    deadline: Instant,
    lan: &LanInterface,
) -> Vec<(Ipv4Addr, MacAddr)> {
    let mut found: BTreeMap<Ipv4Addr, MacAddr> = BTreeMap::new();
    while Instant::now() < deadline {
        let Ok(frame) = rx.next() else {
            continue;
        };
        let Some(ArpReply {
            sender_ip,
            sender_mac,
        }) = arp::parse_reply(frame)
        else {
            continue;
        };
        if sender_ip == lan.address()
            || !lan.network.contains(sender_ip)
            || !mac::is_usable(&sender_mac)
        {
            continue;
        }
        found.entry(sender_ip).or_insert(sender_mac);
    }
    found.into_iter().collect()
}

fn get_config() -> Config {
    Config {
        read_timeout: Some(Duration::from_millis(50)),
        ..Default::default()
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
