use std::time::Duration;

use colored::*;
use lantopo_common::model::{NetworkTopology, Warning};

pub const TOTAL_WIDTH: usize = 64;

pub fn header(msg: &str) {
    let formatted: String = format!("⟦ {} ⟧", msg);
    let msg_len: usize = formatted.chars().count();

    let dash_count: usize = TOTAL_WIDTH.saturating_sub(msg_len);
    let left: usize = dash_count / 2;
    let right: usize = dash_count - left;

    let line: ColoredString = format!(
        "{}{}{}",
        "─".repeat(left),
        formatted.to_uppercase().bright_green(),
        "─".repeat(right)
    )
    .bright_black();

    eprintln!("{}", line);
}

/// Every non-fatal problem of the run, one line each.
pub fn warnings(warnings: &[Warning]) {
    if warnings.is_empty() {
        return;
    }

    header(&format!("{} warning(s)", warnings.len()));
    for (i, warning) in warnings.iter().enumerate() {
        let last: bool = i + 1 == warnings.len();
        let branch: ColoredString = if !last {
            "├─".bright_black()
        } else {
            "└─".bright_black()
        };
        let subject: String = match &warning.subject {
            Some(subject) => format!(" {}", subject.bold()),
            None => String::new(),
        };
        eprintln!(
            " {} {}{}{} {}",
            branch,
            warning.component.yellow(),
            subject,
            ":".bright_black(),
            warning.message
        );
    }
}

pub fn summary(topology: &NetworkTopology, total_time: Duration) {
    let hosts: ColoredString = format!("{} hosts", topology.hosts.len()).bold().green();
    let switches: ColoredString = format!("{} switches", topology.switches.len()).bold().green();
    let links: ColoredString = format!("{} links", topology.edges.len()).bold().green();
    let total_time: ColoredString = format!("{:.2}s", total_time.as_secs_f64()).bold().yellow();

    eprintln!("{}", "═".repeat(TOTAL_WIDTH).bright_black());
    eprintln!("Discovery complete: {hosts}, {switches}, {links} in {total_time}");
}
