//! Error types for the localscan-discover crate.
//!
//! Only configuration and output setup produce these as fatal errors. Probe
//! failures never surface here; they degrade to "no signal" inside the cascade.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DiscoverError {
    #[error("Invalid target {target}: {reason}")]
    InvalidTarget { target: String, reason: String },

    #[error("No hosts in network {cidr}")]
    NoHosts { cidr: String },

    #[error("Network {cidr} has {count} hosts, more than the limit of {max}")]
    TooManyHosts { cidr: String, count: u64, max: u64 },

    #[error("Interface {name:?} not found or has no IPv4 address")]
    InterfaceNotFound { name: String },

    #[error("No active network interface found")]
    NoActiveInterface,

    #[error("Unknown format {0:?} (use table, json, or csv)")]
    UnknownFormat(String),

    #[error("ARP table unavailable: {0}")]
    ArpTable(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, DiscoverError>;
