//! # Operator Input Grammars
//!
//! * SNMP switches: `address[:community]`, comma-separated, community defaults to `public`.
//!   IPv6 switches are written in brackets: `[2001:db8::2]:private`.
//! * Manual topology: `host:switch:port`, comma-separated. Host and switch are an
//!   IP address or a hostname; everything after the second colon is the port label.

use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;

use crate::error::InputError;
use crate::model::Endpoint;

pub const DEFAULT_COMMUNITY: &str = "public";

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SwitchSpec {
    pub address: IpAddr,
    pub community: String,
}

impl FromStr for SwitchSpec {
    type Err = InputError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s: &str = s.trim();
        let invalid = |reason: &str| InputError::InvalidSwitch {
            input: s.to_string(),
            reason: reason.to_string(),
        };

        let (address, community): (&str, Option<&str>) = if let Some(rest) = s.strip_prefix('[') {
            let (address, tail) = rest.split_once(']').ok_or_else(|| invalid("unclosed '['"))?;
            match tail {
                "" => (address, None),
                _ => {
                    let community = tail
                        .strip_prefix(':')
                        .ok_or_else(|| invalid("expected ':' after ']'"))?;
                    (address, Some(community))
                }
            }
        } else {
            match s.split_once(':') {
                Some((address, community)) => (address, Some(community)),
                None => (s, None),
            }
        };

        let address: IpAddr = address
            .parse()
            .map_err(|_| invalid("switch address must be an IP address"))?;
        let community: String = match community {
            Some("") => return Err(invalid("empty community string")),
            Some(community) => community.to_string(),
            None => DEFAULT_COMMUNITY.to_string(),
        };

        Ok(Self { address, community })
    }
}

impl fmt::Display for SwitchSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.address {
            IpAddr::V4(v4) => write!(f, "{v4}"),
            IpAddr::V6(v6) => write!(f, "[{v6}]"),
        }
    }
}

/// One operator-declared attachment: `host` hangs off `switch` at `port`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ManualEntry {
    pub host: Endpoint,
    pub switch: Endpoint,
    pub port: String,
}

impl FromStr for ManualEntry {
    type Err = InputError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s: &str = s.trim();
        let invalid = || InputError::InvalidTopologyEntry {
            input: s.to_string(),
        };

        let mut parts = s.splitn(3, ':').map(str::trim);
        let (Some(host), Some(switch), Some(port)) = (parts.next(), parts.next(), parts.next()) else {
            return Err(invalid());
        };
        if host.is_empty() || switch.is_empty() || port.is_empty() {
            return Err(invalid());
        }

        Ok(Self {
            host: Endpoint::from_identifier(host),
            switch: Endpoint::from_identifier(switch),
            port: port.to_string(),
        })
    }
}

pub fn parse_switches(s: &str) -> Result<Vec<SwitchSpec>, InputError> {
    parse_list(s)
}

pub fn parse_topology(s: &str) -> Result<Vec<ManualEntry>, InputError> {
    parse_list(s)
}

fn parse_list<T: FromStr<Err = InputError> + Ord>(s: &str) -> Result<Vec<T>, InputError> {
    let mut items: Vec<T> = s
        .split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(T::from_str)
        .collect::<Result<Vec<T>, InputError>>()?;
    items.sort();
    items.dedup();
    Ok(items)
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

    #[test]
    fn switch_spec_should_default_community() {
        let spec: SwitchSpec = "10.0.0.1".parse().unwrap();
        assert_eq!(spec.address, "10.0.0.1".parse::<IpAddr>().unwrap());
        assert_eq!(spec.community, "public");
    }

    #[test]
    fn switch_spec_should_accept_community_and_ipv6() {
        let spec: SwitchSpec = "10.0.0.2:s3cret".parse().unwrap();
        assert_eq!(spec.community, "s3cret");

        let spec: SwitchSpec = "[2001:db8::2]:private".parse().unwrap();
        assert_eq!(spec.address, "2001:db8::2".parse::<IpAddr>().unwrap());
        assert_eq!(spec.community, "private");
    }

    #[test]
    fn switch_spec_should_reject_malformed_input() {
        assert!("switch01".parse::<SwitchSpec>().is_err());
        assert!("10.0.0.1:".parse::<SwitchSpec>().is_err());
        assert!("[2001:db8::2".parse::<SwitchSpec>().is_err());
    }

    #[test]
    fn parse_switches_should_split_commas() {
        let specs: Vec<SwitchSpec> = parse_switches("10.0.0.2:priv, 10.0.0.1,").unwrap();
        assert_eq!(specs.len(), 2);
        assert_eq!(specs[0].to_string(), "10.0.0.1");
    }

    #[test]
    fn manual_entry_should_parse_triples() {
        let entry: ManualEntry = "10.0.0.10:10.0.0.1:g3".parse().unwrap();
        assert_eq!(entry.host, Endpoint::Ip("10.0.0.10".parse().unwrap()));
        assert_eq!(entry.switch, Endpoint::Ip("10.0.0.1".parse().unwrap()));
        assert_eq!(entry.port, "g3");
    }

    #[test]
    fn manual_entry_should_keep_colons_in_port() {
        let entry: ManualEntry = "nas:core-sw:Slot: 1 Port: 4".parse().unwrap();
        assert_eq!(entry.host, Endpoint::Name("nas".into()));
        assert_eq!(entry.port, "Slot: 1 Port: 4");
    }

    #[test]
    fn manual_entry_should_reject_missing_parts() {
        assert!(parse_topology("10.0.0.10:10.0.0.1").is_err());
        assert!(parse_topology("10.0.0.10::g3").is_err());
        assert_eq!(
            parse_topology("a:b:c,broken").unwrap_err(),
            InputError::InvalidTopologyEntry {
                input: "broken".into()
            }
        );
    }
}
