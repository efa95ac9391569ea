use std::net::Ipv4Addr;

use lantopo_common::network::interface::LanInterface;
use pnet::datalink::{MacAddr, NetworkInterface};
use pnet::ipnetwork::{IpNetwork, Ipv4Network};

const IFF_UP: u32 = 1;
const IFF_BROADCAST: u32 = 1 << 1;
const IFF_RUNNING: u32 = 1 << 6;

pub fn ni(name: &str, index: u32, mac: Option<MacAddr>, ips: &[IpNetwork], flags: u32) -> NetworkInterface {
    NetworkInterface {
        name: name.into(),
        description: "".into(),
        index,
        mac,
        ips: ips.to_vec(),
        flags,
    }
}

pub fn v4(addr: Ipv4Addr, prefix: u8) -> Ipv4Network {
    Ipv4Network::new(addr, prefix).unwrap()
}

/// A wired interface holding `addr/prefix`, with an optional default gateway.
pub fn lan(name: &str, index: u32, addr: Ipv4Addr, prefix: u8, gateway: Option<Ipv4Addr>) -> LanInterface {
    let address: Ipv4Network = v4(addr, prefix);
    let device: NetworkInterface = ni(
        name,
        index,
        Some(MacAddr::new(0x02, 0, 0, 0, 0, index as u8)),
        &[IpNetwork::V4(address)],
        IFF_UP | IFF_BROADCAST | IFF_RUNNING,
    );
    LanInterface {
        device,
        network: address,
        gateway,
    }
}
