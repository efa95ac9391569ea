//! # Error Types
//!
//! Only three conditions abort a discovery run: malformed operator input, the
//! absence of any usable interface, and a run that produced nothing at all.
//! Every other failure is recorded as a warning inside the topology.

use std::io;

use thiserror::Error;

/// Fatal outcomes of a discovery run.
#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("invalid {what}: {reason}")]
    InvalidInput { what: String, reason: String },

    #[error("no usable LAN interface ({0})")]
    NoUsableInterface(String),

    #[error("discovery produced no hosts and no manual or LLDP data")]
    EmptyResult,

    #[error("discovery pipeline failed: {0}")]
    Pipeline(String),

    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Grammar failures of the operator-facing input strings.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InputError {
    #[error("invalid trace target '{input}': {reason}")]
    InvalidTarget { input: String, reason: String },

    #[error("invalid switch '{input}': {reason}")]
    InvalidSwitch { input: String, reason: String },

    #[error("invalid topology entry '{input}': expected HOST:SWITCH:PORT")]
    InvalidTopologyEntry { input: String },

    #[error("invalid interface name '{0}'")]
    InvalidInterface(String),
}

impl From<InputError> for DiscoveryError {
    fn from(err: InputError) -> Self {
        let what: &str = match &err {
            InputError::InvalidTarget { .. } => "trace target",
            InputError::InvalidSwitch { .. } => "switch",
            InputError::InvalidTopologyEntry { .. } => "topology entry",
            InputError::InvalidInterface(_) => "interface",
        };
        DiscoveryError::InvalidInput {
            what: what.to_string(),
            reason: err.to_string(),
        }
    }
}
