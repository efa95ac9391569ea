use std::collections::BTreeMap;

use lantopo_common::config::{DiagramStyle, OutputFormat, RenderOptions};
use lantopo_common::input;
use lantopo_common::model::{
    Category, EdgeReport, EdgeSource, Endpoint, Hop, NetworkTopology, NodeKey, Observation,
    ScanOutcome, Source, Subnet, TraceState, TracerouteResult, Warning,
};
use lantopo_core::categorize;
use lantopo_core::merge::{Contribution, Merger};
use lantopo_core::prober;
use lantopo_core::render;
use lantopo_core::vendors::VendorRepository;

use crate::fakes::{
    FakeLan, FakeNetwork, FixedVendors, SwitchScript, fast_config, forwarding_table, ip, mac,
};

fn vendors() -> FixedVendors {
    FixedVendors {
        prefixes: BTreeMap::from([([0xaa, 0xbb, 0xcc], "NETGEAR".to_string())]),
    }
}

fn report(parent: Endpoint, child: Endpoint, port: &str, source: EdgeSource) -> Contribution {
    Contribution::Edge(EdgeReport {
        parent,
        child,
        port: Some(port.to_string()),
        source,
    })
}

fn trace(target: &str, hops: &[&str], state: TraceState) -> Contribution {
    Contribution::Trace(TracerouteResult {
        target: ip(target),
        hops: hops
            .iter()
            .enumerate()
            .map(|(i, hop)| Hop {
                index: i as u8 + 1,
                addr: Some(ip(hop)),
                hostname: None,
                rtt_micros: Some(1_000),
            })
            .collect(),
        state,
    })
}

/// A run's worth of contributions from every kind of collector, including
/// conflicting and repeated ones.
fn contributions() -> Vec<Contribution> {
    let seen = |host: &str, last: Option<u8>| {
        Contribution::Observed(Observation::new(ip(host), last.map(mac), "eth0", Source::Arp))
    };
    vec![
        Contribution::Subnet(Subnet {
            interface: "eth0".into(),
            cidr: None,
            gateway: Some("10.0.0.1".parse().unwrap()),
            outcome: ScanOutcome::Active,
        }),
        seen("10.0.0.1", Some(1)),
        seen("10.0.0.10", Some(10)),
        seen("10.0.0.11", Some(11)),
        seen("10.0.0.12", None),
        seen("10.0.0.10", Some(10)),
        Contribution::Hostname {
            ip: ip("10.0.0.10"),
            hostname: Some("nas".into()),
        },
        Contribution::Hostname {
            ip: ip("10.0.0.12"),
            hostname: None,
        },
        Contribution::Services {
            ip: ip("10.0.0.11"),
            services: vec![prober::service(22), prober::service(631)],
        },
        report(
            Endpoint::Ip(ip("10.0.0.2")),
            Endpoint::Mac(mac(10)),
            "port5",
            EdgeSource::Snmp,
        ),
        report(
            Endpoint::Ip(ip("10.0.0.2")),
            Endpoint::Ip(ip("10.0.0.10")),
            "g3",
            EdgeSource::Manual,
        ),
        report(
            Endpoint::Chassis {
                mac: Some(mac(0xfe)),
                name: Some("core-sw".into()),
            },
            Endpoint::Ip(ip("10.0.0.11")),
            "g7",
            EdgeSource::Lldp,
        ),
        report(
            Endpoint::Ip(ip("10.0.0.1")),
            Endpoint::Ip(ip("10.0.0.11")),
            "-",
            EdgeSource::Trace,
        ),
        Contribution::SwitchName {
            endpoint: Endpoint::Ip(ip("10.0.0.2")),
            name: "GS108".into(),
        },
        trace("8.8.8.8", &["10.0.0.1", "100.64.0.1"], TraceState::TimedOut),
        trace("8.8.8.8", &["10.0.0.1", "100.64.0.1", "8.8.8.8"], TraceState::Completed),
        Contribution::Warning(Warning::new("snmp", Some("10.0.0.3".into()), "switch unreachable")),
    ]
}

fn merge(contributions: impl IntoIterator<Item = Contribution>) -> NetworkTopology {
    let mut merger: Merger = Merger::new();
    merger.fold_all(contributions);
    let mut topology: NetworkTopology = merger.finish(&vendors());
    categorize::categorize_topology(&mut topology);
    topology
}

/// Deterministic reorderings: reversed, rotations, and the even/odd interleave.
fn permutations(items: &[Contribution]) -> Vec<Vec<Contribution>> {
    let mut orders: Vec<Vec<Contribution>> = vec![items.iter().rev().cloned().collect()];
    for shift in [1, 3, 7, items.len() - 1] {
        let mut rotated: Vec<Contribution> = items.to_vec();
        rotated.rotate_left(shift % items.len());
        orders.push(rotated);
    }
    let (even, odd): (Vec<_>, Vec<_>) = items.iter().cloned().enumerate().partition(|(i, _)| i % 2 == 0);
    orders.push(odd.into_iter().chain(even).map(|(_, c)| c).collect());
    orders
}

#[test]
fn merge_should_not_depend_on_arrival_order() {
    let items = contributions();
    let expected = merge(items.clone());
    for order in permutations(&items) {
        assert_eq!(merge(order), expected);
    }
}

#[test]
fn refolding_the_same_inputs_should_change_nothing() {
    let items = contributions();
    let once = merge(items.clone());
    let twice = merge(items.iter().cloned().chain(items.iter().cloned()));
    assert_eq!(once, twice);

    let mut merger = Merger::new();
    merger.fold_all(items.clone());
    let before = merger.clone();
    merger.fold_all(items);
    assert_eq!(merger, before);
}

#[test]
fn rendering_twice_should_be_byte_identical() {
    let topology = merge(contributions());
    for style in [
        DiagramStyle::Auto,
        DiagramStyle::Flat,
        DiagramStyle::Hierarchical,
        DiagramStyle::Categorized,
    ] {
        let options = RenderOptions {
            style,
            elk: true,
            ..Default::default()
        };
        assert_eq!(
            render::render(&topology, &options).unwrap(),
            render::render(&topology, &options).unwrap()
        );
    }
    let json = RenderOptions {
        format: OutputFormat::Json,
        ..Default::default()
    };
    let first = render::render(&topology, &json).unwrap();
    assert_eq!(first, render::render(&topology, &json).unwrap());
    assert_eq!(render::document::from_json(&first).unwrap(), topology);
}

#[test]
fn higher_ranked_source_should_always_win() {
    let ranked = [
        EdgeSource::Manual,
        EdgeSource::Lldp,
        EdgeSource::Snmp,
        EdgeSource::Trace,
    ];
    for (i, high) in ranked.iter().enumerate() {
        for low in &ranked[i + 1..] {
            let topology = merge([
                Contribution::Observed(Observation::new(ip("10.0.0.10"), Some(mac(10)), "eth0", Source::Arp)),
                report(Endpoint::Ip(ip("10.0.0.2")), Endpoint::Mac(mac(10)), "low", *low),
                report(Endpoint::Ip(ip("10.0.0.2")), Endpoint::Ip(ip("10.0.0.10")), "high", *high),
            ]);
            assert_eq!(topology.edges.len(), 1, "{high} vs {low}");
            let edge = &topology.edges[0];
            assert_eq!(edge.source, *high);
            assert_eq!(edge.port.as_deref(), Some("high"));
            assert_eq!(edge.alternates.len(), 1);
            assert_eq!(edge.alternates[0].source, *low);
            assert_eq!(edge.alternates[0].port.as_deref(), Some("low"));
        }
    }
}

#[test]
fn categories_should_not_depend_on_merge_order() {
    let items = contributions();
    let categories = |topology: &NetworkTopology| -> BTreeMap<NodeKey, Option<Category>> {
        topology
            .hosts
            .iter()
            .map(|(key, host)| (key.clone(), host.category))
            .collect()
    };
    let expected = categories(&merge(items.clone()));
    assert_eq!(expected[&NodeKey::Mac(mac(1))], Some(Category::Router));
    for order in permutations(&items) {
        assert_eq!(categories(&merge(order)), expected);
    }
}

#[test]
fn vendor_repository_should_default_to_unknown() {
    assert_eq!(vendors().vendor_or_unknown(None), "Unknown");
    assert_eq!(vendors().vendor_or_unknown(Some(mac(3))), "NETGEAR");
}

#[tokio::test]
async fn failing_sources_should_not_disturb_the_others() {
    let hosts: Vec<(&str, Option<pnet::util::MacAddr>)> = vec![
        ("10.0.0.10", Some(mac(10))),
        ("10.0.0.11", Some(mac(11))),
        ("10.0.0.12", Some(mac(12))),
    ];
    let mut network = FakeNetwork::with_lans(vec![FakeLan::home(None, &hosts)]);
    network.walker.switches.insert(
        ip("10.0.0.2"),
        SwitchScript::Answers(forwarding_table(Some("GS108"), &[(mac(10), 1), (mac(11), 2)])),
    );
    network
        .walker
        .switches
        .insert(ip("10.0.0.3"), SwitchScript::Unreachable);
    network.neighbors.broken.push(ip("10.0.0.12"));
    let mut config = fast_config();
    config.switches = input::parse_switches("10.0.0.2,10.0.0.3").unwrap();
    config.lldp = Some(lantopo_common::config::LldpSource::Live { save_to: None });

    let (collectors, _) = network.into_collectors();
    let topology = lantopo_core::discovery::DiscoveryService::new(collectors)
        .perform_discovery(&config)
        .await
        .unwrap();

    assert_eq!(topology.hosts.len(), 3);
    let children: Vec<&NodeKey> = topology.edges.iter().map(|edge| &edge.child).collect();
    assert_eq!(children, vec![&NodeKey::Mac(mac(10)), &NodeKey::Mac(mac(11))]);
    assert!(
        topology
            .edges
            .iter()
            .all(|edge| edge.parent == NodeKey::Ip(ip("10.0.0.2")))
    );
    assert_eq!(topology.switches[&NodeKey::Ip(ip("10.0.0.2"))].name.as_deref(), Some("GS108"));

    let subjects: Vec<Option<&str>> = topology.warnings.iter().map(|w| w.subject.as_deref()).collect();
    assert!(subjects.contains(&Some("10.0.0.3")));
    assert!(subjects.contains(&Some("10.0.0.12")));
}
