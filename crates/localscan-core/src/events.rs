//! Event types streamed from a running scan to its consumer.
//!
//! Events arrive in whichever order workers finish. The `completed` count on
//! individual events is not monotonic across workers; consumers that render
//! progress should feed events through a [`ProgressTracker`].

use std::net::Ipv4Addr;

use serde::{Deserialize, Serialize};

use crate::types::DetectionResult;

/// One probed address. Exactly one is emitted per enumerated address.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressEvent {
    /// Running count of probed addresses at the time this one finished.
    pub completed: usize,
    pub total: usize,
    pub address: Ipv4Addr,
    /// Set when this address was discovered for the first time.
    pub found: Option<DetectionResult>,
}

/// Everything a scan reports while running, tagged by kind.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event_type")]
pub enum ScanEvent {
    // ── Active probing ────────────────────────────────────────
    /// An address went through the probe cascade.
    Probed(ProgressEvent),

    // ── Fallback phase ────────────────────────────────────────
    /// An address recovered from the ARP cache after probing finished.
    Recovered(DetectionResult),

    // ── Lifecycle ─────────────────────────────────────────────
    /// Sent once, after the last data event. The channel closes right after.
    Finished { probed: usize, discovered: usize },
}

/// Tracks the running maximum of `completed` across out-of-order events.
#[derive(Debug, Default, Clone, Copy)]
pub struct ProgressTracker {
    max_completed: usize,
}

impl ProgressTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold in one event and return the value to display.
    pub fn observe(&mut self, event: &ProgressEvent) -> usize {
        self.max_completed = self.max_completed.max(event.completed);
        self.max_completed
    }

    pub fn current(&self) -> usize {
        self.max_completed
    }
}
