//! # lantopo-protocols
//!
//! Pure codecs and parsers. Nothing in here touches a socket or spawns a process;
//! the collectors in `lantopo-core` feed bytes and text in and get typed records out.

pub mod arp;
pub mod bridge;
pub mod dns;
pub mod lldp;
pub mod trace;
