//! localscan-discover: concurrent host discovery for a local IPv4 subnet.
//!
//! Every usable address goes through a probe cascade (ping, TCP connect
//! sweep, UDP discovery datagrams) on a bounded pool of tokio tasks. Hosts
//! that stayed silent but left an entry in the ARP cache are recovered
//! afterwards. Results can be diffed against the previous run's baseline.

pub mod arp;
pub mod config;
pub mod diff;
pub mod enrich;
pub mod error;
pub mod network;
pub mod payloads;
pub mod persist;
pub mod pipeline;
pub mod probe;
pub mod render;
pub mod scanner;
