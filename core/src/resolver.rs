//! # Host Resolver
//!
//! Reverse-DNS lookups for every enumerated address. Queries go straight to the
//! nameservers listed in `/etc/resolv.conf` over UDP, one socket per lookup, so a
//! slow or silent server only ever costs its own timeout.
//!
//! Answers are stripped of the local domain (`domain`/`search` entries plus the
//! usual home-router suffixes) before they are contributed. A lookup that fails
//! for any reason contributes `hostname = None`; it is never a warning.

use std::fs;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, anyhow};
use async_trait::async_trait;
use lantopo_common::network::hostname;
use lantopo_protocols::dns;
use tokio::net::UdpSocket;
use tokio::time::timeout;
use tracing::debug;

use crate::merge::{self, Contribution, ContributionSink};
use crate::pool;

pub const DNS_PORT: u16 = 53;
const RESOLV_CONF: &str = "/etc/resolv.conf";
const MAX_DNS_PAYLOAD: usize = 1500;

/// The parts of `/etc/resolv.conf` the resolver cares about.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolverConfig {
    pub nameservers: Vec<IpAddr>,
    /// Local domain suffixes, `domain` first, then `search` entries.
    pub suffixes: Vec<String>,
}

impl ResolverConfig {
    /// Reads the system configuration; a missing file yields an empty config.
    pub fn from_system() -> Self {
        match fs::read_to_string(RESOLV_CONF) {
            Ok(text) => parse_resolv_conf(&text),
            Err(e) => {
                debug!("{RESOLV_CONF} unreadable: {e}");
                Self::default()
            }
        }
    }
}

pub fn parse_resolv_conf(text: &str) -> ResolverConfig {
    let mut config: ResolverConfig = ResolverConfig::default();
    for line in text.lines() {
        let line: &str = line.split(['#', ';']).next().unwrap_or_default();
        let mut fields = line.split_whitespace();
        match fields.next() {
            Some("nameserver") => {
                // Scoped IPv6 servers (`fe80::1%eth0`) are not reachable without the zone.
                if let Some(ip) = fields.next().and_then(|addr| addr.parse::<IpAddr>().ok()) {
                    config.nameservers.push(ip);
                }
            }
            Some("domain") | Some("search") => {
                for suffix in fields {
                    let suffix: String = suffix.trim_matches('.').to_string();
                    if !suffix.is_empty() && !config.suffixes.contains(&suffix) {
                        config.suffixes.push(suffix);
                    }
                }
            }
            _ => {}
        }
    }
    config
}

#[async_trait]
pub trait ReverseLookup: Send + Sync {
    /// PTR name of `ip`, `None` when the server has no record.
    async fn lookup(&self, ip: IpAddr) -> anyhow::Result<Option<String>>;

    /// Domain suffixes to strip from answers, on top of the built-in ones.
    fn suffixes(&self) -> &[String] {
        &[]
    }
}

pub struct DnsResolver {
    config: ResolverConfig,
    timeout: Duration,
}

impl DnsResolver {
    pub fn new(config: ResolverConfig, timeout: Duration) -> Self {
        Self { config, timeout }
    }

    pub fn from_system(timeout: Duration) -> Self {
        Self::new(ResolverConfig::from_system(), timeout)
    }

    async fn query(&self, server: IpAddr, ip: IpAddr) -> anyhow::Result<Option<String>> {
        let local: SocketAddr = match server {
            IpAddr::V4(_) => SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 0),
            IpAddr::V6(_) => SocketAddr::new(IpAddr::V6(Ipv6Addr::UNSPECIFIED), 0),
        };
        let socket: UdpSocket = UdpSocket::bind(local).await.context("binding DNS socket")?;
        socket
            .connect(SocketAddr::new(server, DNS_PORT))
            .await
            .with_context(|| format!("connecting to {server}"))?;

        let id: u16 = rand::random();
        let query: Vec<u8> = dns::create_ptr_packet(&ip, id)?;
        socket.send(&query).await.context("sending PTR query")?;

        let mut buf: [u8; MAX_DNS_PAYLOAD] = [0u8; MAX_DNS_PAYLOAD];
        let answer = async {
            loop {
                let len: usize = socket.recv(&mut buf).await?;
                match dns::parse_ptr_response(&buf[..len]) {
                    Ok((response_id, name)) if response_id == id => return anyhow::Ok(name),
                    Ok(_) => continue,
                    Err(e) => debug!(%server, "discarding malformed DNS reply: {e:#}"),
                }
            }
        };
        timeout(self.timeout, answer)
            .await
            .map_err(|_| anyhow!("{server} did not answer within {:?}", self.timeout))?
    }
}

#[async_trait]
impl ReverseLookup for DnsResolver {
    async fn lookup(&self, ip: IpAddr) -> anyhow::Result<Option<String>> {
        let mut last_error: anyhow::Error = anyhow!("no nameserver configured");
        for server in &self.config.nameservers {
            match self.query(*server, ip).await {
                Ok(name) => return Ok(name),
                Err(e) => last_error = e,
            }
        }
        Err(last_error)
    }

    fn suffixes(&self) -> &[String] {
        &self.config.suffixes
    }
}

/// Looks up every address with at most `pool_size` queries outstanding and
/// contributes one `Hostname` per address.
pub async fn resolve_hosts(
    lookup: Arc<dyn ReverseLookup>,
    addresses: Vec<IpAddr>,
    pool_size: usize,
    sink: ContributionSink,
) {
    debug!(hosts = addresses.len(), pool_size, "resolving hostnames");
    pool::for_each_bounded(addresses, pool_size, |ip| {
        let lookup: Arc<dyn ReverseLookup> = Arc::clone(&lookup);
        let sink: ContributionSink = sink.clone();
        async move {
            let hostname: Option<String> = match lookup.lookup(ip).await {
                Ok(name) => name.and_then(|name| hostname::normalize(&name, lookup.suffixes())),
                Err(e) => {
                    debug!(%ip, "reverse lookup failed: {e:#}");
                    None
                }
            };
            merge::emit(&sink, Contribution::Hostname { ip, hostname });
        }
    })
    .await;
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
    use std::collections::HashMap;
    use tokio::sync::mpsc;

    struct FixedLookup {
        names: HashMap<IpAddr, String>,
        suffixes: Vec<String>,
    }

    #[async_trait]
    impl ReverseLookup for FixedLookup {
        async fn lookup(&self, ip: IpAddr) -> anyhow::Result<Option<String>> {
            if ip.is_loopback() {
                anyhow::bail!("server failure");
            }
            Ok(self.names.get(&ip).cloned())
        }

        fn suffixes(&self) -> &[String] {
            &self.suffixes
        }
    }

    #[test]
    fn resolv_conf_should_collect_servers_and_suffixes() {
        let config = parse_resolv_conf(
            "# generated\n\
             nameserver 192.168.178.1\n\
             nameserver fe80::1%eth0\n\
             nameserver 2001:db8::53\n\
             domain office.example.com.\n\
             search office.example.com lab.example.com ; trailing\n",
        );
        assert_eq!(
            config.nameservers,
            vec![
                "192.168.178.1".parse::<IpAddr>().unwrap(),
                "2001:db8::53".parse::<IpAddr>().unwrap()
            ]
        );
        assert_eq!(config.suffixes, vec!["office.example.com", "lab.example.com"]);
    }

    #[tokio::test]
    async fn resolve_hosts_should_strip_suffix_and_absorb_failures() {
        let named: IpAddr = "10.0.0.10".parse().unwrap();
        let unnamed: IpAddr = "10.0.0.11".parse().unwrap();
        let failing: IpAddr = "127.0.0.1".parse().unwrap();
        let lookup = FixedLookup {
            names: HashMap::from([(named, "ws12.office.example.com.".to_string())]),
            suffixes: vec!["office.example.com".into()],
        };
        let (tx, mut rx) = mpsc::unbounded_channel();

        resolve_hosts(Arc::new(lookup), vec![named, unnamed, failing], 2, tx).await;

        let mut results: HashMap<IpAddr, Option<String>> = HashMap::new();
        while let Some(contribution) = rx.recv().await {
            if let Contribution::Hostname { ip, hostname } = contribution {
                results.insert(ip, hostname);
            }
        }
        assert_eq!(results.len(), 3);
        assert_eq!(results[&named].as_deref(), Some("ws12"));
        assert_eq!(results[&unnamed], None);
        assert_eq!(results[&failing], None);
    }

    #[tokio::test]
    async fn resolver_without_nameservers_should_fail() {
        let resolver = DnsResolver::new(ResolverConfig::default(), Duration::from_millis(10));
        assert!(resolver.lookup("10.0.0.1".parse().unwrap()).await.is_err());
    }

    #[tokio::test]
    #[ignore]
    async fn system_resolver_should_answer_for_public_address() {
        let resolver = DnsResolver::from_system(Duration::from_secs(2));
        let name = resolver.lookup("1.1.1.1".parse().unwrap()).await.unwrap();
        assert!(name.is_some());
    }
}
