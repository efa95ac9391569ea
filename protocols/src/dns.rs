//! # Reverse DNS
//!
//! PTR queries are built with `pnet`'s DNS packet types; responses are decoded with
//! `dns-parser`, which follows name compression pointers.

use std::fmt::Write;
use std::net::IpAddr;

use anyhow::Context;
use pnet::packet::dns::{DnsClass, DnsQuery, DnsTypes, MutableDnsPacket, Opcode, Retcode};

pub const DNS_HDR_LEN: usize = 12;

/// The `in-addr.arpa` / `ip6.arpa` name queried for `ip`.
pub fn reverse_address_to_ptr(ip: &IpAddr) -> String {
    match ip {
        IpAddr::V4(v4) => {
            let [a, b, c, d] = v4.octets();
            format!("{d}.{c}.{b}.{a}.in-addr.arpa")
        }
        IpAddr::V6(v6) => {
            let mut name: String = String::with_capacity(72);
            for byte in v6.octets().iter().rev() {
                let _ = write!(name, "{:x}.{:x}.", byte & 0x0f, byte >> 4);
            }
            name.push_str("ip6.arpa");
            name
        }
    }
}

pub fn create_ptr_packet(ip_addr: &IpAddr, id: u16) -> anyhow::Result<Vec<u8>> {
    let query: DnsQuery = create_ptr_query(ip_addr);
    let q_fixed_len: usize = 4;
    let qlen: usize = query.qname.len() + q_fixed_len;
    let mut buffer: Vec<u8> = vec![0u8; DNS_HDR_LEN + qlen];

    {
        let mut dns: MutableDnsPacket =
            MutableDnsPacket::new(&mut buffer).context("creating dns header")?;
        dns.set_id(id);
        dns.set_is_response(0);
        dns.set_opcode(Opcode::StandardQuery);
        dns.set_is_truncated(0);
        dns.set_is_recursion_desirable(1);
        dns.set_rcode(Retcode::NoError);
        dns.set_query_count(1);
        dns.set_response_count(0);
        dns.set_authority_rr_count(0);
        dns.set_additional_rr_count(0);
    }

    let mut cursor: usize = DNS_HDR_LEN;
    buffer[cursor..cursor + query.qname.len()].copy_from_slice(&query.qname);
    cursor += query.qname.len();
    buffer[cursor..cursor + 2].copy_from_slice(&query.qtype.0.to_be_bytes());
    cursor += 2;
    buffer[cursor..cursor + 2].copy_from_slice(&query.qclass.0.to_be_bytes());

    Ok(buffer)
}

/// Decodes a PTR response into `(transaction id, hostname)`.
///
/// Returns `Ok((id, None))` for a well-formed answer without a PTR record
/// (NXDOMAIN and friends), so the caller can still match the transaction.
pub fn parse_ptr_response(payload: &[u8]) -> anyhow::Result<(u16, Option<String>)> {
    let packet: dns_parser::Packet =
        dns_parser::Packet::parse(payload).map_err(|e| anyhow::anyhow!("{e}"))?;
    let hostname: Option<String> = packet.answers.iter().find_map(|answer| match &answer.data {
        dns_parser::RData::PTR(ptr) => Some(ptr.0.to_string()),
        _ => None,
    });
    Ok((packet.header.id, hostname.filter(|name| !name.is_empty())))
}

fn create_ptr_query(ip_addr: &IpAddr) -> DnsQuery {
    DnsQuery {
        qname: encode_dns_name(&reverse_address_to_ptr(ip_addr)),
        qtype: DnsTypes::PTR,
        qclass: DnsClass(1),
        payload: Vec::new(),
    }
}

fn encode_dns_name(name: &str) -> Vec<u8> {
    let mut encoded: Vec<u8> = Vec::new();
    for label in name.split('.').filter(|label| !label.is_empty()) {
        encoded.push(label.len() as u8);
        encoded.extend_from_slice(label.as_bytes());
    }
    encoded.push(0);
    encoded
}

// ╔════════════════════════════════════════════╗
// ║ ████████╗███████╗███████╗████████╗███████╗ ║
// ║ ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝██╔════╝ ║
// ║    ██║   █████╗  ███████╗   ██║   ███████╗ ║
// ║    ██║   ██╔══╝  ╚════██║   ██║   ╚════██║ ║
// ║    ██║   ███████╗███████║   ██║   ███████║ ║
// ║    ╚═╝   ╚══════╝╚══════╝   ╚═╝   ╚══════╝ ║
// ╚════════════════════════════════════════════╝
