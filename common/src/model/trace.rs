use std::net::IpAddr;

use serde::{Deserialize, Serialize};

/// How a trace ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TraceState {
    TimedOut,
    MaxHopsExhausted,
    Completed,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Hop {
    pub index: u8,
    /// `None` for an unresponsive hop.
    pub addr: Option<IpAddr>,
    pub hostname: Option<String>,
    pub rtt_micros: Option<u64>,
}

impl Hop {
    pub fn unresponsive(index: u8) -> Self {
        Self {
            index,
            addr: None,
            hostname: None,
            rtt_micros: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TracerouteResult {
    pub target: IpAddr,
    pub hops: Vec<Hop>,
    pub state: TraceState,
}

impl TracerouteResult {
    /// Hops that answered, in order.
    pub fn responding(&self) -> impl Iterator<Item = (&Hop, IpAddr)> {
        self.hops
            .iter()
            .filter_map(|hop| hop.addr.map(|addr| (hop, addr)))
    }

    /// Drops unresponsive hops trailing the last hop that answered.
    pub fn trim_trailing_silence(&mut self) {
        let keep: usize = self
            .hops
            .iter()
            .rposition(|hop| hop.addr.is_some())
            .map_or(0, |idx| idx + 1);
        self.hops.truncate(keep);
    }

    /// Ordering used to pick one result when a target was traced more than once:
    /// completed traces first, then the longer hop list.
    pub fn quality(&self) -> (TraceState, usize) {
        (self.state, self.responding().count())
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
