//! # lantopo-core
//!
//! The discovery engine: collectors, the merger that reduces their
//! contributions into one topology, the categorizer and the renderers.
//! [`discovery::DiscoveryService`] wires them into a run.

pub mod categorize;
pub mod discovery;
pub mod l2;
pub mod merge;
pub mod pool;
pub mod prober;
pub mod render;
pub mod resolver;
pub mod scanner;
pub mod tracer;
pub mod vendors;
