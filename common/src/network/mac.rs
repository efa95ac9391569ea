//! MAC address normalization.
//!
//! Host identity is the lowercase, colon-separated MAC form produced by
//! [`MacAddr`]'s `Display`. Everything that reads a MAC from the outside world
//! goes through [`parse_mac`] first.

use pnet::util::MacAddr;

/// Parses `aa:bb:cc:dd:ee:ff`, `AA-BB-CC-DD-EE-FF`, `aabb.ccdd.eeff` and `aabbccddeeff`.
pub fn parse_mac(s: &str) -> Option<MacAddr> {
    let hex: String = s
        .trim()
        .chars()
        .filter(|c| !matches!(c, ':' | '-' | '.'))
        .collect();
    if hex.len() != 12 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }

    let mut octets: [u8; 6] = [0; 6];
    for (idx, octet) in octets.iter_mut().enumerate() {
        *octet = u8::from_str_radix(&hex[idx * 2..idx * 2 + 2], 16).ok()?;
    }
    Some(from_octets(octets))
}

fn from_octets(o: [u8; 6]) -> MacAddr {
    MacAddr::new(o[0], o[1], o[2], o[3], o[4], o[5])
}

/// Builds a MAC from exactly six raw bytes (SNMP octet strings, table indexes).
pub fn from_bytes(bytes: &[u8]) -> Option<MacAddr> {
    let octets: [u8; 6] = bytes.try_into().ok()?;
    Some(from_octets(octets))
}

/// All-zero and broadcast addresses never identify a host.
pub fn is_usable(mac: &MacAddr) -> bool {
    let MacAddr(a, b, c, d, e, f) = *mac;
    let octets: [u8; 6] = [a, b, c, d, e, f];
    octets != [0x00; 6] && octets != [0xff; 6]
}

/// The 48-bit value of `mac`, used for prefix matching.
pub fn to_u64(mac: &MacAddr) -> u64 {
    let MacAddr(a, b, c, d, e, f) = *mac;
    [a, b, c, d, e, f]
        .iter()
        .fold(0u64, |acc, octet| (acc << 8) | u64::from(*octet))
}

/// `serde` adapter for `Option<MacAddr>` fields, written as the normalized string.
pub mod serde_opt {
    use pnet::util::MacAddr;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(mac: &Option<MacAddr>, serializer: S) -> Result<S::Ok, S::Error> {
        match mac {
            Some(mac) => serializer.serialize_some(&mac.to_string()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<MacAddr>, D::Error> {
        let raw: Option<String> = Option::deserialize(deserializer)?;
        raw.map(|s| {
            super::parse_mac(&s).ok_or_else(|| serde::de::Error::custom(format!("invalid MAC '{s}'")))
        })
        .transpose()
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
