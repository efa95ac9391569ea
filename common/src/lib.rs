//! # lantopo-common
//!
//! Shared vocabulary of the topology pipeline: the data model every collector
//! contributes to, input grammars, run configuration and error types.

pub mod capability;
pub mod config;
pub mod error;
pub mod input;
pub mod model;
pub mod network;
