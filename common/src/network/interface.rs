//! # LAN Interface Resolution
//!
//! Turns the operator's interface names into [`LanInterface`]s: the datalink
//! device, its private IPv4 network and, when the routing table knows it, the
//! default gateway reached through it. With no names given the best viable
//! interface is selected automatically (wired before wireless).

use std::fs;
use std::net::Ipv4Addr;

use pnet::datalink::{self, NetworkInterface};
use pnet::ipnetwork::{IpNetwork, Ipv4Network};
use pnet::util::MacAddr;
use tracing::debug;

#[cfg(target_os = "linux")]
use linux_impl::{is_physical, is_wireless};
#[cfg(not(target_os = "linux"))]
use fallback_impl::{is_physical, is_wireless};

use crate::error::{DiscoveryError, InputError};
use crate::model::Cidr;

const ROUTE_TABLE: &str = "/proc/net/route";
const RTF_GATEWAY: u16 = 0x0002;

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum ViabilityError {
    /// The interface is operationally down.
    IsDown,
    /// The interface was filtered out as "not physical" by the provided logic.
    NotPhysical,
    /// The interface does not have a MAC address.
    NoMacAddress,
    /// The interface does not support broadcast (required for ARP).
    NotBroadcast,
    /// The interface is a point-to-point link (e.g., a VPN).
    IsPointToPoint,
    /// The interface has no private IPv4 address to sweep from.
    NoValidLanIp,
}

/// An interface ready for enumeration.
#[derive(Debug, Clone)]
pub struct LanInterface {
    pub device: NetworkInterface,
    pub network: Ipv4Network,
    pub gateway: Option<Ipv4Addr>,
}

impl LanInterface {
    pub fn name(&self) -> &str {
        &self.device.name
    }

    pub fn mac(&self) -> Option<MacAddr> {
        self.device.mac
    }

    /// The interface's own address inside its network.
    pub fn address(&self) -> Ipv4Addr {
        self.network.ip()
    }

    pub fn cidr(&self) -> Cidr {
        Cidr::new(self.network.network(), self.network.prefix())
    }
}

pub trait NetworkInterfaceExtension {
    fn get_ipv4_nets(&self) -> Vec<Ipv4Network>;
    fn get_ipv4_range(&self) -> Option<Ipv4Network>;
}

impl NetworkInterfaceExtension for NetworkInterface {
    fn get_ipv4_nets(&self) -> Vec<Ipv4Network> {
        self.ips
            .iter()
            .filter_map(|ip| match ip {
                IpNetwork::V4(ipv4) => Some(*ipv4),
                IpNetwork::V6(_) => None,
            })
            .collect()
    }

    fn get_ipv4_range(&self) -> Option<Ipv4Network> {
        let nets: Vec<Ipv4Network> = self.get_ipv4_nets();
        nets.iter()
            .find(|net| net.ip().is_private())
            .or_else(|| nets.iter().find(|net| !net.ip().is_loopback()))
            .copied()
    }
}

/// Resolves the requested interface names, or picks one when none are given.
///
/// A requested interface that is missing or carries no IPv4 address is invalid
/// input; the run must not start probing with it.
pub fn resolve_interfaces(requested: &[String]) -> Result<Vec<LanInterface>, DiscoveryError> {
    for name in requested {
        validate_name(name)?;
    }

    let all: Vec<NetworkInterface> = datalink::interfaces();
    let routes: String = fs::read_to_string(ROUTE_TABLE).unwrap_or_default();

    if requested.is_empty() {
        let viable: Vec<NetworkInterface> = all
            .into_iter()
            .filter(|interface| match is_viable_lan_interface(interface, is_physical) {
                Ok(()) => true,
                Err(reason) => {
                    debug!(interface = %interface.name, ?reason, "Interface not viable");
                    false
                }
            })
            .collect();

        let best: NetworkInterface = select_best_lan_interface(viable, is_wired)
            .ok_or_else(|| DiscoveryError::NoUsableInterface("no viable LAN interface found".into()))?;
        let lan: LanInterface = to_lan_interface(best, &routes).ok_or_else(|| {
            DiscoveryError::NoUsableInterface("selected interface has no IPv4 network".into())
        })?;
        return Ok(vec![lan]);
    }

    let mut resolved: Vec<LanInterface> = Vec::new();
    for name in requested {
        let device: NetworkInterface = all
            .iter()
            .find(|interface| &interface.name == name)
            .cloned()
            .ok_or_else(|| DiscoveryError::InvalidInput {
                what: "interface".into(),
                reason: format!("interface '{name}' does not exist"),
            })?;
        let lan: LanInterface =
            to_lan_interface(device, &routes).ok_or_else(|| DiscoveryError::InvalidInput {
                what: "interface".into(),
                reason: format!("interface '{name}' has no IPv4 address"),
            })?;
        if !resolved.iter().any(|known| known.name() == lan.name()) {
            resolved.push(lan);
        }
    }

    if resolved.is_empty() {
        return Err(DiscoveryError::NoUsableInterface("no interface requested".into()));
    }
    Ok(resolved)
}

fn validate_name(name: &str) -> Result<(), InputError> {
    let valid: bool = !name.is_empty()
        && name.len() <= 64
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | ':' | '@'));
    if valid {
        Ok(())
    } else {
        Err(InputError::InvalidInterface(name.to_string()))
    }
}

fn to_lan_interface(device: NetworkInterface, routes: &str) -> Option<LanInterface> {
    let network: Ipv4Network = device.get_ipv4_range()?;
    let gateway: Option<Ipv4Addr> = parse_default_gateway(routes, &device.name);
    Some(LanInterface {
        device,
        network,
        gateway,
    })
}

/// Extracts the default gateway of `interface` from `/proc/net/route` text.
pub fn parse_default_gateway(route_table: &str, interface: &str) -> Option<Ipv4Addr> {
    route_table.lines().skip(1).find_map(|line| {
        let fields: Vec<&str> = line.split_whitespace().collect();
        let [iface, destination, gateway, flags, ..] = fields.as_slice() else {
            return None;
        };
        if *iface != interface || *destination != "00000000" {
            return None;
        }
        let flags: u16 = u16::from_str_radix(flags, 16).ok()?;
        if flags & RTF_GATEWAY == 0 {
            return None;
        }
        let raw: u32 = u32::from_str_radix(gateway, 16).ok()?;
        Some(Ipv4Addr::from(raw.to_ne_bytes()))
    })
}

fn is_viable_lan_interface(
    interface: &NetworkInterface,
    is_physical: impl Fn(&NetworkInterface) -> bool,
) -> Result<(), ViabilityError> {
    if !interface.is_up() {
        return Err(ViabilityError::IsDown);
    }
    if !is_physical(interface) || interface.is_loopback() {
        return Err(ViabilityError::NotPhysical);
    }
    if interface.mac.is_none() {
        return Err(ViabilityError::NoMacAddress);
    }
    if !interface.is_broadcast() {
        return Err(ViabilityError::NotBroadcast);
    }
    if interface.is_point_to_point() {
        return Err(ViabilityError::IsPointToPoint);
    }
    let has_private_v4: bool = interface.ips.iter().any(|net| match net {
        IpNetwork::V4(ipv4) => ipv4.ip().is_private(),
        IpNetwork::V6(_) => false,
    });
    if !has_private_v4 {
        return Err(ViabilityError::NoValidLanIp);
    }

    Ok(())
}

fn select_best_lan_interface(
    interfaces: Vec<NetworkInterface>,
    is_wired: impl Fn(&NetworkInterface) -> bool,
) -> Option<NetworkInterface> {
    let wired: Option<NetworkInterface> = interfaces.iter().find(|&i| is_wired(i)).cloned();
    wired.or_else(|| interfaces.into_iter().next())
}

fn is_wired(interface: &NetworkInterface) -> bool {
    is_physical(interface) && !is_wireless(interface)
}

#[cfg(target_os = "linux")]
mod linux_impl {
    use super::*;
    use std::path::Path;

    pub fn is_physical(interface: &NetworkInterface) -> bool {
        Path::new(&format!("/sys/class/net/{}/device", interface.name)).exists()
    }

    pub fn is_wireless(interface: &NetworkInterface) -> bool {
        Path::new(&format!("/sys/class/net/{}/wireless", interface.name)).exists()
    }
}

#[cfg(not(target_os = "linux"))]
mod fallback_impl {
    use super::*;

    pub fn is_physical(interface: &NetworkInterface) -> bool {
        !interface.is_loopback()
    }

    pub fn is_wireless(interface: &NetworkInterface) -> bool {
        interface.name.starts_with("wl")
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
