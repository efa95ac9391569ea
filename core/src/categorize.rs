//! # Categorizer
//!
//! An ordered rule table; the first rule that matches a host decides its
//! category. Rules only look at the host's own attributes and the edges it is
//! the parent of, so the result never depends on evaluation order.
//!
//! 1. the subnet gateway is a router
//! 2. vendor substring
//! 3. open-port signature
//! 4. hostname pattern
//! 5. fan-out: parent of at least [`FAN_OUT_MIN_CHILDREN`] hosts, each on its own port

use std::collections::BTreeSet;

use lantopo_common::model::{Category, Edge, Host, NetworkTopology, NodeKey};
use rayon::prelude::*;
use tracing::debug;

pub const FAN_OUT_MIN_CHILDREN: usize = 3;

/// Case-insensitive vendor substrings, first match wins.
const VENDOR_RULES: &[(Category, &[&str])] = &[
    (Category::Switch, &["netgear", "tp-link", "cisco", "zyxel", "d-link", "mikrotik"]),
    (Category::AccessPoint, &["ubiquiti", "ruckus", "aruba"]),
    (
        Category::Server,
        &["raspberry pi", "super micro", "supermicro", "ugreen", "synology", "qnap"],
    ),
    (
        Category::Iot,
        &["espressif", "broadlink", "nuki", "climax", "ogemray", "tuya", "shelly"],
    ),
    (Category::Phone, &["grandstream", "snom", "yealink", "polycom"]),
    (
        Category::Media,
        &[
            "google",
            "nvidia",
            "samsung",
            "humax",
            "slim devices",
            "denon",
            "d&m holdings",
            "streamunlimited",
            "sonos",
            "roku",
        ],
    ),
    (
        Category::HomeAutomation,
        &["philips lighting", "signify", "nabu casa", "weinzierl", "gira", "irobot"],
    ),
    (Category::Printer, &["brother", "canon", "seiko epson", "kyocera", "lexmark"]),
    (
        Category::Workstation,
        &["hp inc", "intel corporate", "part ii research", "realtek", "dell", "lenovo"],
    ),
];

/// A host with any of these ports open gets the category.
const PORT_RULES: &[(Category, &[u16])] = &[
    (Category::Printer, &[9100, 631, 515]),
    (Category::Phone, &[5060, 5061]),
    (Category::Media, &[8009, 1400, 7000]),
    (Category::HomeAutomation, &[8123, 1883]),
    (Category::Server, &[445, 2049, 548, 3306, 5432, 32400]),
    (Category::Workstation, &[3389, 5900]),
];

/// Case-insensitive hostname substrings.
const HOSTNAME_RULES: &[(Category, &[&str])] = &[
    (Category::Router, &["router", "fritz", "gateway"]),
    (
        Category::Switch,
        &["switch", "gs108", "gs305", "gs116", "efh24", "sw-"],
    ),
    (Category::AccessPoint, &["unifi", "accesspoint", "repeater", "ap-"]),
    (Category::Workstation, &["laptop", "desktop", "macbook", "workstation"]),
    (
        Category::Server,
        &["nas", "node", "server", "srv", "rpi", "raspi", "supermicro", "thinkcentre", "revo"],
    ),
    (Category::Iot, &["tasmota", "nous", "shelly", "plug", "sensor", "esp-"]),
    (Category::Phone, &["wp820", "gxp", "phone", "sip"]),
    (
        Category::Media,
        &["chromecast", "shield", "denon", "humax", "squeezebox", "sonos", "tv"],
    ),
    (
        Category::HomeAutomation,
        &["homeassistant", "home-assistant", "hue", "knx", "roomba"],
    ),
    (Category::Printer, &["printer", "brother"]),
];

/// Classifies one host given the edges it is the parent of.
pub fn categorize(host: &Host, child_edges: &[&Edge]) -> Category {
    if host.is_gateway {
        return Category::Router;
    }

    let vendor: String = host.vendor.to_ascii_lowercase();
    if let Some(category) = first_substring_match(VENDOR_RULES, &vendor) {
        return category;
    }

    let ports: BTreeSet<u16> = host.open_ports();
    if let Some((category, _)) = PORT_RULES
        .iter()
        .find(|(_, signature)| signature.iter().any(|port| ports.contains(port)))
    {
        return *category;
    }

    if let Some(name) = &host.hostname
        && let Some(category) = first_substring_match(HOSTNAME_RULES, &name.to_ascii_lowercase())
    {
        return category;
    }

    if has_switch_fan_out(child_edges) {
        return Category::Switch;
    }

    Category::Unknown
}

fn first_substring_match(rules: &[(Category, &[&str])], haystack: &str) -> Option<Category> {
    if haystack.is_empty() {
        return None;
    }
    rules
        .iter()
        .find(|(_, needles)| needles.iter().any(|needle| haystack.contains(needle)))
        .map(|(category, _)| *category)
}

/// Enough children, every one on its own labeled port.
fn has_switch_fan_out(child_edges: &[&Edge]) -> bool {
    if child_edges.len() < FAN_OUT_MIN_CHILDREN {
        return false;
    }
    let mut ports: BTreeSet<&str> = BTreeSet::new();
    child_edges
        .iter()
        .all(|edge| edge.port.as_deref().is_some_and(|port| ports.insert(port)))
}

/// Assigns a category to every host of a finished topology.
pub fn categorize_topology(topology: &mut NetworkTopology) {
    let assigned: Vec<(NodeKey, Category)> = topology
        .hosts
        .par_iter()
        .map(|(key, host)| {
            let children: Vec<&Edge> = topology.child_edges(key).collect();
            (key.clone(), categorize(host, &children))
        })
        .collect();

    for (key, category) in assigned {
        if let Some(host) = topology.hosts.get_mut(&key) {
            debug!(host = %key, %category, "categorized");
            host.category = Some(category);
        }
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
