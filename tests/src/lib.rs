//! # lantopo-integration-tests
//!
//! Whole-pipeline tests. Every collector is replaced by an in-memory fake from
//! [`fakes`], so runs are deterministic and need no privileges or network.

pub mod fakes;
pub mod net;

#[cfg(test)]
mod discovery;
