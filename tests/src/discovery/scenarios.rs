use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use lantopo_common::config::{DiagramStyle, DiscoveryConfig, LldpSource, RenderOptions};
use lantopo_common::error::DiscoveryError;
use lantopo_common::input;
use lantopo_common::model::{
    Category, EdgeSource, NetworkTopology, NodeKey, ScanOutcome, TraceState, UNKNOWN_VENDOR,
};
use lantopo_core::discovery::DiscoveryService;
use lantopo_core::render::{self, mermaid};
use lantopo_core::scanner::{ArpEnumerator, Enumerator};

use crate::fakes::{
    FakeArpCache, FakeLan, FakeNetwork, SwitchScript, TraceScript, fast_config,
    forwarding_table, ip, lldpctl_json, mac,
};
use crate::net;

async fn run(network: FakeNetwork, config: &DiscoveryConfig) -> Result<NetworkTopology, DiscoveryError> {
    let (collectors, _) = network.into_collectors();
    DiscoveryService::new(collectors).perform_discovery(config).await
}

fn two_hosts() -> FakeNetwork {
    FakeNetwork::with_lans(vec![FakeLan::home(
        None,
        &[("10.0.0.10", Some(mac(1))), ("10.0.0.11", Some(mac(2)))],
    )])
}

#[tokio::test]
async fn manual_entry_should_attach_host_to_declared_switch() {
    let mut config = fast_config();
    config.manual = input::parse_topology("10.0.0.10:10.0.0.1:g3").unwrap();

    let topology = run(two_hosts(), &config).await.unwrap();

    let switch = NodeKey::Ip(ip("10.0.0.1"));
    assert!(topology.switches.contains_key(&switch));
    assert_eq!(topology.edges.len(), 1);
    let edge = &topology.edges[0];
    assert_eq!(edge.parent, switch);
    assert_eq!(edge.child, NodeKey::Mac(mac(1)));
    assert_eq!(edge.port.as_deref(), Some("g3"));
    assert_eq!(edge.source, EdgeSource::Manual);

    let lonely = NodeKey::Mac(mac(2));
    assert!(topology.hosts.contains_key(&lonely));
    assert!(topology.edges.iter().all(|e| e.parent != lonely && e.child != lonely));
}

#[tokio::test]
async fn manual_entry_should_win_over_snmp_and_keep_it_as_alternate() {
    let mut network = two_hosts();
    network.walker.switches.insert(
        ip("10.0.0.1"),
        SwitchScript::Answers(forwarding_table(None, &[(mac(1), 5)])),
    );
    let mut config = fast_config();
    config.manual = input::parse_topology("10.0.0.10:10.0.0.1:g3").unwrap();
    config.switches = input::parse_switches("10.0.0.1").unwrap();

    let topology = run(network, &config).await.unwrap();

    assert_eq!(topology.edges.len(), 1);
    let edge = &topology.edges[0];
    assert_eq!(edge.port.as_deref(), Some("g3"));
    assert_eq!(edge.source, EdgeSource::Manual);
    assert_eq!(edge.alternates.len(), 1);
    assert_eq!(edge.alternates[0].source, EdgeSource::Snmp);
    assert_eq!(edge.alternates[0].port.as_deref(), Some("port5"));
}

#[tokio::test]
async fn silent_trace_should_keep_hops_and_time_out_alone() {
    let mut network = two_hosts();
    network.tracer.targets.insert(
        ip("8.8.8.8"),
        TraceScript::hanging_after(&["10.0.0.1", "100.64.0.1", "100.64.1.1", "142.250.0.1"]),
    );
    network
        .tracer
        .targets
        .insert(ip("1.1.1.1"), TraceScript::through(&["10.0.0.1", "1.1.1.1"]));
    let mut config = fast_config();
    config.trace.targets = vec![ip("8.8.8.8"), ip("1.1.1.1")];
    config.trace.max_hops = 30;

    let topology = run(network, &config).await.unwrap();

    let silent = &topology.traceroutes[&ip("8.8.8.8")];
    assert_eq!(silent.state, TraceState::TimedOut);
    assert_eq!(silent.hops.len(), 4);
    assert_eq!(
        silent.hops.iter().map(|hop| hop.index).collect::<Vec<_>>(),
        vec![1, 2, 3, 4]
    );
    assert_eq!(topology.traceroutes[&ip("1.1.1.1")].state, TraceState::Completed);
    assert_eq!(topology.hosts.len(), 2);
    assert!(
        topology
            .warnings
            .iter()
            .any(|w| w.subject.as_deref() == Some("8.8.8.8"))
    );
}

#[tokio::test]
async fn auto_style_should_follow_edges_and_size() {
    let small = run(two_hosts(), &fast_config()).await.unwrap();
    assert!(small.edges.is_empty());
    assert_eq!(mermaid::resolve_style(&small, DiagramStyle::Auto), DiagramStyle::Flat);

    let hosts: Vec<(String, u8)> = (1..=50u8).map(|i| (format!("10.0.0.{}", i + 10), i)).collect();
    let seen: Vec<(&str, Option<_>)> = hosts
        .iter()
        .map(|(host, last)| (host.as_str(), Some(mac(*last))))
        .collect();
    let dir = tempfile::tempdir().unwrap();
    for (host, last) in &hosts {
        let reply = lldpctl_json("core-sw", mac(0xfe), &format!("g{last}"));
        std::fs::write(dir.path().join(format!("{host}.json")), reply).unwrap();
    }
    let network = FakeNetwork::with_lans(vec![FakeLan::home(None, &seen)]);
    let mut config = fast_config();
    config.lldp = Some(LldpSource::Directory(dir.path().to_path_buf()));

    let large = run(network, &config).await.unwrap();
    assert_eq!(large.hosts.len(), 50);
    assert_eq!(large.edges.len(), 50);
    assert!(large.edges.iter().all(|edge| edge.source == EdgeSource::Lldp));
    assert_eq!(
        mermaid::resolve_style(&large, DiagramStyle::Auto),
        DiagramStyle::Hierarchical
    );

    let rendered = mermaid::render(&large, &RenderOptions::default());
    assert!(rendered.contains("subgraph"));
}

#[tokio::test]
async fn anonymous_host_should_fall_through_to_unknown() {
    let network = FakeNetwork::with_lans(vec![FakeLan::home(
        None,
        &[("10.0.0.42", Some(pnet::util::MacAddr::new(0x0e, 0x12, 0x34, 0, 0, 1)))],
    )]);

    let topology = run(network, &fast_config()).await.unwrap();

    let host = topology.host_by_ip(ip("10.0.0.42")).unwrap();
    assert_eq!(host.hostname, None);
    assert_eq!(host.vendor, UNKNOWN_VENDOR);
    assert_eq!(host.category, Some(Category::Unknown));
}

#[tokio::test]
async fn gateway_should_be_router_and_named_by_dns() {
    let mut network = FakeNetwork::with_lans(vec![FakeLan::home(
        Some(Ipv4Addr::new(10, 0, 0, 1)),
        &[("10.0.0.1", Some(mac(1))), ("10.0.0.20", Some(mac(20)))],
    )]);
    network
        .lookup
        .names
        .insert(ip("10.0.0.20"), "printer.fritz.box.".into());
    network.probe.open.insert(ip("10.0.0.20"), vec![9100, 80]);
    network
        .vendors
        .prefixes
        .insert([0xaa, 0xbb, 0xcc], "Brother Industries".into());
    let mut config = fast_config();
    config.probe.enabled = true;

    let topology = run(network, &config).await.unwrap();

    let gateway = topology.host_by_ip(ip("10.0.0.1")).unwrap();
    assert!(gateway.is_gateway);
    assert_eq!(gateway.category, Some(Category::Router));

    let printer = topology.host_by_ip(ip("10.0.0.20")).unwrap();
    assert_eq!(printer.hostname.as_deref(), Some("printer"));
    assert_eq!(printer.category, Some(Category::Printer));
    let ports: Vec<u16> = printer.services.iter().flatten().map(|s| s.port).collect();
    assert_eq!(ports, vec![80, 9100]);
}

#[tokio::test]
async fn unknown_interface_should_abort_before_probing() {
    let (collectors, enumerator) = two_hosts().into_collectors();
    let mut config = fast_config();
    config.interfaces = vec!["wlan7".into()];

    let err = DiscoveryService::new(collectors)
        .perform_discovery(&config)
        .await
        .unwrap_err();

    assert!(matches!(err, DiscoveryError::InvalidInput { .. }));
    assert_eq!(enumerator.enumerations.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn empty_network_should_be_an_empty_result() {
    let network = FakeNetwork::with_lans(vec![FakeLan::home(None, &[])]);
    let err = run(network, &fast_config()).await.unwrap_err();
    assert!(matches!(err, DiscoveryError::EmptyResult));
}

#[tokio::test]
async fn manual_data_alone_should_not_be_empty() {
    let network = FakeNetwork::with_lans(vec![FakeLan::home(None, &[])]);
    let mut config = fast_config();
    config.manual = input::parse_topology("10.0.0.5:core-sw:g1").unwrap();

    let topology = run(network, &config).await.unwrap();
    assert_eq!(topology.edges.len(), 1);
    assert!(topology.host_by_ip(ip("10.0.0.5")).is_some());
    assert!(topology.switches.contains_key(&NodeKey::Name("core-sw".into())));
}

#[tokio::test]
async fn deadline_should_cancel_stragglers_and_keep_the_rest() {
    let mut network = two_hosts();
    network.neighbors.hanging.push(ip("10.0.0.11"));
    let mut config = fast_config();
    config.deadline = Duration::from_millis(300);
    config.grace = Duration::from_millis(50);
    config.lldp = Some(LldpSource::Live { save_to: None });
    config.manual = input::parse_topology("10.0.0.10:10.0.0.1:g3").unwrap();

    let topology = run(network, &config).await.unwrap();

    assert_eq!(topology.hosts.len(), 2);
    assert_eq!(topology.edges.len(), 1);
    assert!(
        topology
            .warnings
            .iter()
            .any(|w| w.component == "pipeline" && w.message.contains("deadline reached"))
    );
}

#[tokio::test]
async fn hung_interface_should_fail_without_hiding_its_sibling() {
    let mut hung = FakeLan::on("eth1", 2, Ipv4Addr::new(192, 168, 1, 254), None, &[("192.168.1.5", None)]);
    hung.hang = true;
    let network = FakeNetwork::with_lans(vec![
        FakeLan::home(None, &[("10.0.0.10", Some(mac(1)))]),
        hung,
    ]);
    let mut config = fast_config();
    config.deadline = Duration::from_millis(300);

    let topology = run(network, &config).await.unwrap();

    assert_eq!(topology.hosts.len(), 1);
    let outcomes: Vec<(&str, ScanOutcome)> = topology
        .subnets
        .iter()
        .map(|subnet| (subnet.interface.as_str(), subnet.outcome))
        .collect();
    assert_eq!(
        outcomes,
        vec![("eth0", ScanOutcome::Active), ("eth1", ScanOutcome::Failed)]
    );
}

#[tokio::test]
async fn hung_switch_should_not_cost_the_answering_one_its_edges() {
    let mut network = two_hosts();
    network.walker.switches.insert(
        ip("10.0.0.2"),
        SwitchScript::Answers(forwarding_table(None, &[(mac(1), 5)])),
    );
    network
        .walker
        .switches
        .insert(ip("10.0.0.3"), SwitchScript::Hangs);
    let mut config = fast_config();
    config.deadline = Duration::from_millis(300);
    config.snmp_timeout = Duration::from_secs(60);
    config.switches = input::parse_switches("10.0.0.2,10.0.0.3").unwrap();

    let topology = run(network, &config).await.unwrap();

    assert_eq!(topology.edges.len(), 1);
    let edge = &topology.edges[0];
    assert_eq!(edge.parent, NodeKey::Ip(ip("10.0.0.2")));
    assert_eq!(edge.child, NodeKey::Mac(mac(1)));
    assert_eq!(edge.source, EdgeSource::Snmp);
    assert!(
        topology
            .warnings
            .iter()
            .any(|w| w.subject.as_deref() == Some("10.0.0.3") && w.message.contains("cancelled"))
    );
}

#[tokio::test]
async fn address_shaped_chassis_name_should_survive_the_document() {
    let dir = tempfile::tempdir().unwrap();
    let reply = lldpctl_json("10.0.0.99", pnet::util::MacAddr::new(0x02, 0, 0, 0, 0, 0x99), "g1");
    std::fs::write(dir.path().join("10.0.0.10.json"), reply).unwrap();
    let mut config = fast_config();
    config.lldp = Some(LldpSource::Directory(dir.path().to_path_buf()));

    let topology = run(two_hosts(), &config).await.unwrap();

    let chassis = NodeKey::Name("10.0.0.99".into());
    assert!(topology.switches.contains_key(&chassis));
    let json = render::document::to_json(&topology).unwrap();
    let reparsed = render::document::from_json(&json).unwrap();
    assert!(reparsed.switches.contains_key(&chassis));
    assert_eq!(reparsed, topology);
}

#[tokio::test]
async fn empty_arp_cache_should_be_refilled_before_giving_up() {
    let cache = Arc::new(FakeArpCache::learning(&[("10.0.0.10", mac(1)), ("10.0.0.11", mac(2))]));
    let enumerator = ArpEnumerator::passive(cache.clone());
    let lan = net::lan("eth0", 1, Ipv4Addr::new(10, 0, 0, 254), 24, None);

    let scan = enumerator.enumerate(lan, Duration::from_millis(10)).await;

    assert_eq!(scan.subnet.outcome, ScanOutcome::PassiveDegraded);
    let seen: Vec<IpAddr> = scan.observations.iter().map(|o| o.ip).collect();
    assert_eq!(seen, vec![ip("10.0.0.10"), ip("10.0.0.11")]);
    assert_eq!(cache.nudged.load(Ordering::SeqCst), 253);
}
