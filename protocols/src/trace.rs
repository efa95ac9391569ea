//! # tracepath / traceroute output
//!
//! Both tools print one hop per line as they go, so parsing is incremental: the
//! tracer feeds lines as they arrive and keeps whatever was parsed when it stops.
//!
//! ```text
//! tracepath -n:   " 1?: [LOCALHOST]                      pmtu 1500"
//!                 " 1:  192.168.1.1                         0.710ms"
//!                 " 2:  no reply"
//! traceroute -n:  " 1  10.0.0.1  1.234 ms  1.456 ms  1.789 ms"
//!                 " 2  * * *"
//! ```

use std::collections::BTreeSet;
use std::net::IpAddr;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TraceTool {
    Tracepath,
    Traceroute,
}

impl TraceTool {
    pub fn binary(&self) -> &'static str {
        match self {
            TraceTool::Tracepath => "tracepath",
            TraceTool::Traceroute => "traceroute",
        }
    }

    /// Command-line arguments for one trace.
    pub fn args(&self, target: IpAddr, max_hops: u8) -> Vec<String> {
        let mut args: Vec<String> = vec!["-n".into(), "-m".into(), max_hops.to_string()];
        if *self == TraceTool::Traceroute {
            args.extend(["-w".into(), "2".into()]);
        }
        args.push(target.to_string());
        args
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParsedHop {
    pub index: u8,
    pub addr: Option<IpAddr>,
    pub rtt_micros: Option<u64>,
}

/// Accumulates hops from output lines, first report per hop number wins.
#[derive(Debug)]
pub struct HopParser {
    tool: TraceTool,
    seen: BTreeSet<u8>,
    hops: Vec<ParsedHop>,
}

impl HopParser {
    pub fn new(tool: TraceTool) -> Self {
        Self {
            tool,
            seen: BTreeSet::new(),
            hops: Vec::new(),
        }
    }

    /// Feeds one line; returns the hop if the line added one.
    pub fn feed(&mut self, line: &str) -> Option<ParsedHop> {
        let hop: ParsedHop = match self.tool {
            TraceTool::Tracepath => parse_tracepath_line(line)?,
            TraceTool::Traceroute => parse_traceroute_line(line)?,
        };
        if !self.seen.insert(hop.index) {
            return None;
        }
        self.hops.push(hop);
        Some(hop)
    }

    pub fn hops(&self) -> &[ParsedHop] {
        &self.hops
    }

    pub fn into_hops(self) -> Vec<ParsedHop> {
        self.hops
    }

    pub fn reached(&self, target: IpAddr) -> bool {
        self.hops.iter().any(|hop| hop.addr == Some(target))
    }
}

pub fn parse_output(tool: TraceTool, output: &str) -> Vec<ParsedHop> {
    let mut parser: HopParser = HopParser::new(tool);
    for line in output.lines() {
        parser.feed(line);
    }
    parser.into_hops()
}

pub fn parse_tracepath_line(line: &str) -> Option<ParsedHop> {
    let (head, rest) = line.trim_start().split_once(':')?;
    let index: u8 = head.strip_suffix('?').unwrap_or(head).parse().ok()?;
    let rest: &str = rest.trim();
    if rest.is_empty() || rest.contains("[LOCALHOST]") || rest.starts_with("Resume:") {
        return None;
    }
    if rest.starts_with("no reply") {
        return Some(unresponsive(index));
    }

    let mut tokens = rest.split_whitespace();
    let addr: IpAddr = tokens.next()?.parse().ok()?;
    let rtt_micros: Option<u64> = tokens
        .next()
        .and_then(|token| token.strip_suffix("ms"))
        .and_then(millis_to_micros);
    Some(ParsedHop {
        index,
        addr: Some(addr),
        rtt_micros,
    })
}

pub fn parse_traceroute_line(line: &str) -> Option<ParsedHop> {
    let mut tokens = line.split_whitespace();
    let index: u8 = tokens.next()?.parse().ok()?;
    let rest: Vec<&str> = tokens.collect();
    if rest.is_empty() {
        return None;
    }

    let Some(pos) = rest.iter().position(|token| token.parse::<IpAddr>().is_ok()) else {
        return Some(unresponsive(index));
    };
    let addr: Option<IpAddr> = rest[pos].parse().ok();
    let rtt_micros: Option<u64> = rest[pos + 1..].windows(2).find_map(|pair| match pair {
        [value, "ms"] => millis_to_micros(value),
        _ => None,
    });
    Some(ParsedHop {
        index,
        addr,
        rtt_micros,
    })
}

fn unresponsive(index: u8) -> ParsedHop {
    ParsedHop {
        index,
        addr: None,
        rtt_micros: None,
    }
}

fn millis_to_micros(value: &str) -> Option<u64> {
    let millis: f64 = value.parse().ok()?;
    (millis.is_finite() && millis >= 0.0).then(|| (millis * 1000.0).round() as u64)
}

// ╔════════════════════════════════════════════╗
// ║ ████████╗███████╗███████╗████████╗███████╗ ║
// ║ ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝██╔════╝ ║
// ║    ██║   █████╗  ███████╗   ██║   ███████╗ ║
// ║    ██║   ██╔══╝  ╚════██║   ██║   ╚════██║ ║
// ║    ██║   ███████╗███████║   ██║   ███████║ ║
// ║    ╚═╝   ╚══════╝╚══════╝   ╚═╝   ╚══════╝ ║
// ╚════════════════════════════════════════════╝
