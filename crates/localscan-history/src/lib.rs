//! localscan-history: the baseline used for scan diffing.
//!
//! Each scan run in diff mode writes its live results as a JSON array of
//! [`HistoryRecord`]s. The next run loads that array as the "previous" set.
//! Diff status is never persisted.

pub mod store;

use std::net::Ipv4Addr;

use localscan_core::{DetectionMethod, DetectionResult};
use serde::{Deserialize, Serialize};

pub use store::{default_history_path, HistoryStore, JsonHistoryStore, StoreError};

// ── Core Types ───────────────────────────────────────────────────

/// Persisted form of one discovered device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryRecord {
    pub ip: Ipv4Addr,
    #[serde(default)]
    pub hostname: Option<String>,
    #[serde(default)]
    pub mac: Option<String>,
    #[serde(default)]
    pub vendor: Option<String>,
    pub method: DetectionMethod,
    /// Always written, as `[]` when no port was open.
    #[serde(default)]
    pub open_ports: Vec<u16>,
}

impl From<&DetectionResult> for HistoryRecord {
    fn from(result: &DetectionResult) -> Self {
        Self {
            ip: result.address,
            hostname: result.hostname.clone(),
            mac: result.mac.clone(),
            vendor: result.vendor.clone(),
            method: result.method,
            open_ports: result.open_ports.clone(),
        }
    }
}

impl From<HistoryRecord> for DetectionResult {
    fn from(record: HistoryRecord) -> Self {
        let mut result = DetectionResult::new(record.ip, record.method)
            .with_open_ports(record.open_ports);
        result.hostname = record.hostname;
        result.mac = record.mac;
        result.vendor = record.vendor;
        result
    }
}
