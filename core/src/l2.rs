//! # L2 Topology Collectors
//!
//! Three independent sources of host-to-switch-port attachments, all emitting the
//! same [`EdgeReport`](lantopo_common::model::EdgeReport) shape:
//!
//! | source | confidence | transport |
//! |--------|------------|-----------|
//! | [`manual`] | highest | operator input |
//! | [`lldp`]   | high    | `lldpctl` over SSH, or replayed files |
//! | [`snmp`]   | medium  | BRIDGE-MIB forwarding tables |
//!
//! Conflicts between them are settled by the merger, not here.

pub mod lldp;
pub mod manual;
pub mod snmp;
