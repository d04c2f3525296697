//! Core domain types for localscan.
//!
//! A `DetectionResult` is created the first time an address produces a
//! signal (active probe or ARP fallback). Its address never changes; the
//! enrichment and diff fields are filled in once, after discovery.

use std::fmt;
use std::net::Ipv4Addr;

use serde::{Deserialize, Serialize};

// ── Detection ─────────────────────────────────────────────────────

/// How a host was first detected.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "UPPERCASE")]
pub enum DetectionMethod {
    /// Answered a platform `ping`.
    Icmp,
    /// Accepted or refused a TCP connection.
    Tcp,
    /// Replied to a UDP discovery datagram.
    Udp,
    /// Only present in the OS address-resolution cache.
    Arp,
}

impl DetectionMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Icmp => "ICMP",
            Self::Tcp => "TCP",
            Self::Udp => "UDP",
            Self::Arp => "ARP",
        }
    }
}

impl fmt::Display for DetectionMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Diff ──────────────────────────────────────────────────────────

/// Classification against the previous scan. Continuing hosts carry no status.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "UPPERCASE")]
pub enum DiffStatus {
    New,
    Gone,
}

impl DiffStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::New => "NEW",
            Self::Gone => "GONE",
        }
    }
}

impl fmt::Display for DiffStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Result ────────────────────────────────────────────────────────

/// One discovered device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetectionResult {
    pub address: Ipv4Addr,
    pub method: DetectionMethod,
    /// Open TCP ports, ascending and without duplicates.
    pub open_ports: Vec<u16>,
    pub hostname: Option<String>,
    pub mac: Option<String>,
    pub vendor: Option<String>,
    pub status: Option<DiffStatus>,
}

impl DetectionResult {
    pub fn new(address: Ipv4Addr, method: DetectionMethod) -> Self {
        Self {
            address,
            method,
            open_ports: Vec::new(),
            hostname: None,
            mac: None,
            vendor: None,
            status: None,
        }
    }

    /// Attach open-port evidence, normalized to ascending order.
    pub fn with_open_ports(mut self, mut ports: Vec<u16>) -> Self {
        ports.sort_unstable();
        ports.dedup();
        self.open_ports = ports;
        self
    }

    /// Whether this entry is a synthetic record for a host that disappeared.
    pub fn is_gone(&self) -> bool {
        self.status == Some(DiffStatus::Gone)
    }
}

/// Sort results by ascending numeric address.
pub fn sort_by_address(results: &mut [DetectionResult]) {
    results.sort_by_key(|r| u32::from(r.address));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn method_serializes_uppercase() {
        let json = serde_json::to_string(&DetectionMethod::Icmp).unwrap();
        assert_eq!(json, "\"ICMP\"");
        let back: DetectionMethod = serde_json::from_str("\"ARP\"").unwrap();
        assert_eq!(back, DetectionMethod::Arp);
    }

    #[test]
    fn open_ports_are_sorted_and_deduplicated() {
        let r = DetectionResult::new(Ipv4Addr::new(10, 0, 0, 1), DetectionMethod::Tcp)
            .with_open_ports(vec![443, 22, 80, 22]);
        assert_eq!(r.open_ports, vec![22, 80, 443]);
    }

    #[test]
    fn sort_is_numeric_not_lexical() {
        let mut results = vec![
            DetectionResult::new(Ipv4Addr::new(10, 0, 0, 10), DetectionMethod::Icmp),
            DetectionResult::new(Ipv4Addr::new(10, 0, 0, 9), DetectionMethod::Icmp),
            DetectionResult::new(Ipv4Addr::new(9, 255, 255, 255), DetectionMethod::Icmp),
        ];
        sort_by_address(&mut results);
        let order: Vec<String> = results.iter().map(|r| r.address.to_string()).collect();
        assert_eq!(order, vec!["9.255.255.255", "10.0.0.9", "10.0.0.10"]);
    }

    #[test]
    fn gone_flag() {
        let mut r = DetectionResult::new(Ipv4Addr::new(10, 0, 0, 1), DetectionMethod::Udp);
        assert!(!r.is_gone());
        r.status = Some(DiffStatus::Gone);
        assert!(r.is_gone());
        assert_eq!(r.status.map(|s| s.to_string()).as_deref(), Some("GONE"));
    }
}
