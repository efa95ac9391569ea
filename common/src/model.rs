//! # Topology Data Model
//!
//! Everything the collectors produce and the renderers consume. All collections
//! are ordered so that two merges of the same contributions serialize to the
//! same bytes.

pub mod edge;
pub mod host;
pub mod key;
pub mod subnet;
pub mod topology;
pub mod trace;

pub use edge::{Edge, EdgeClaim, EdgeReport, EdgeSource, Endpoint, ordered_pair};
pub use host::{Category, Host, KnownHost, Service, Source, UNKNOWN_VENDOR};
pub use key::NodeKey;
pub use subnet::{Cidr, Observation, ScanOutcome, Subnet};
pub use topology::{NetworkTopology, SwitchNode, Warning};
pub use trace::{Hop, TraceState, TracerouteResult};
