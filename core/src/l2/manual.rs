//! Operator-declared attachments.

use lantopo_common::input::ManualEntry;
use lantopo_common::model::{EdgeReport, EdgeSource};

use crate::merge::{self, Contribution, ContributionSink};

pub fn edges(entries: &[ManualEntry]) -> Vec<EdgeReport> {
    entries
        .iter()
        .map(|entry| EdgeReport {
            parent: entry.switch.clone(),
            child: entry.host.clone(),
            port: Some(entry.port.clone()),
            source: EdgeSource::Manual,
        })
        .collect()
}

pub fn contribute(entries: &[ManualEntry], sink: &ContributionSink) {
    for report in edges(entries) {
        merge::emit(sink, Contribution::Edge(report));
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
