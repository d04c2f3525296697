//! Concurrent host scanner.
//!
//! A fixed pool of worker tasks drains a job queue that is filled with every
//! address before the first worker starts. Each worker runs the probe cascade
//! for one address at a time and reports one [`ScanEvent::Probed`] per
//! address. Once the pool has fully joined, the ARP fallback phase runs and a
//! single [`ScanEvent::Finished`] closes the stream.

use std::collections::HashSet;
use std::net::Ipv4Addr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use localscan_core::types::sort_by_address;
use localscan_core::{DetectionResult, ProgressEvent, ScanEvent};
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::arp::{self, ArpTable, NeighborSource};
use crate::probe::Prober;

/// Result of a full scan: both phases, sorted by address.
#[derive(Debug)]
pub struct ScanOutcome {
    /// Unique ID for this scan run.
    pub scan_id: Uuid,
    /// Every discovered host, ascending by address.
    pub results: Vec<DetectionResult>,
    /// Addresses that went through the cascade.
    pub probed: usize,
    /// How many results came from the ARP fallback.
    pub recovered: usize,
    /// ARP cache snapshot taken after probing, reused for enrichment.
    pub arp_table: ArpTable,
    /// Wall-clock duration of both phases.
    pub duration: Duration,
}

/// Discoveries shared between workers. One lock covers the membership check
/// and the append.
#[derive(Default)]
struct Discoveries {
    seen: HashSet<Ipv4Addr>,
    results: Vec<DetectionResult>,
}

impl Discoveries {
    /// Record a result; returns a copy for the progress event when it is new.
    fn insert(&mut self, result: DetectionResult) -> Option<DetectionResult> {
        if !self.seen.insert(result.address) {
            return None;
        }
        self.results.push(result.clone());
        Some(result)
    }
}

/// Drives a [`Prober`] over many addresses with bounded concurrency.
pub struct HostScanner<P> {
    prober: Arc<P>,
    workers: usize,
}

impl<P: Prober> HostScanner<P> {
    pub fn new(prober: P, workers: usize) -> Self {
        Self {
            prober: Arc::new(prober),
            workers: workers.max(1),
        }
    }

    /// Probe every address, then recover silent ones from the ARP cache.
    ///
    /// `events` receives one `Probed` per address (in completion order), one
    /// `Recovered` per fallback discovery, then `Finished`. The sender is
    /// dropped on return, which closes the channel.
    pub async fn scan<N: NeighborSource>(
        &self,
        addresses: Vec<Ipv4Addr>,
        neighbors: &N,
        events: mpsc::Sender<ScanEvent>,
    ) -> ScanOutcome {
        let scan_id = Uuid::new_v4();
        let start = Instant::now();
        let probed = addresses.len();

        tracing::info!(
            scan_id = %scan_id,
            hosts = probed,
            workers = self.workers.min(probed.max(1)),
            "Starting active probing"
        );

        let jobs: Arc<[Ipv4Addr]> = addresses.into();
        let mut results = self.probe_all(jobs.clone(), &events).await;
        let active = results.len();

        tracing::info!(scan_id = %scan_id, discovered = active, "Active probing complete");

        // The probes above populated the ARP cache, so read it only now.
        let arp_table = match neighbors.snapshot().await {
            Ok(table) => table,
            Err(e) => {
                tracing::warn!(error = %e, "ARP table unavailable, skipping fallback phase");
                ArpTable::new()
            }
        };

        let seen: HashSet<Ipv4Addr> = results.iter().map(|r| r.address).collect();
        let fallback = arp::recover_silent_hosts(&jobs, &seen, &arp_table);
        let recovered = fallback.len();
        for result in fallback {
            let _ = events.send(ScanEvent::Recovered(result.clone())).await;
            results.push(result);
        }

        sort_by_address(&mut results);

        let _ = events
            .send(ScanEvent::Finished {
                probed,
                discovered: results.len(),
            })
            .await;
        drop(events);

        let duration = start.elapsed();
        tracing::info!(
            scan_id = %scan_id,
            probed,
            discovered = results.len(),
            recovered,
            duration_ms = duration.as_millis(),
            "Scan complete"
        );

        ScanOutcome {
            scan_id,
            results,
            probed,
            recovered,
            arp_table,
            duration,
        }
    }

    /// Active phase only: run the cascade on every job and return unsorted
    /// discoveries once all workers have joined.
    async fn probe_all(
        &self,
        jobs: Arc<[Ipv4Addr]>,
        events: &mpsc::Sender<ScanEvent>,
    ) -> Vec<DetectionResult> {
        let total = jobs.len();
        let next_job = Arc::new(AtomicUsize::new(0));
        let completed = Arc::new(AtomicUsize::new(0));
        let discoveries = Arc::new(Mutex::new(Discoveries::default()));

        let mut handles = Vec::with_capacity(self.workers);
        for _ in 0..self.workers.min(total) {
            let prober = self.prober.clone();
            let jobs = jobs.clone();
            let next_job = next_job.clone();
            let completed = completed.clone();
            let discoveries = discoveries.clone();
            let events = events.clone();

            let handle = tokio::spawn(async move {
                while let Some(&address) = jobs.get(next_job.fetch_add(1, Ordering::Relaxed)) {
                    let outcome = prober.probe(address).await;
                    let done = completed.fetch_add(1, Ordering::Relaxed) + 1;

                    let found = outcome.into_parts().and_then(|(method, ports)| {
                        let result = DetectionResult::new(address, method).with_open_ports(ports);
                        discoveries
                            .lock()
                            .unwrap_or_else(PoisonError::into_inner)
                            .insert(result)
                    });

                    if let Some(result) = &found {
                        tracing::debug!(%address, method = %result.method, "Host found");
                    }

                    let event = ProgressEvent {
                        completed: done,
                        total,
                        address,
                        found,
                    };
                    if events.send(ScanEvent::Probed(event)).await.is_err() {
                        tracing::trace!(%address, "Progress consumer gone");
                    }
                }
            });
            handles.push(handle);
        }

        for handle in handles {
            if let Err(e) = handle.await {
                tracing::error!(error = %e, "Probe worker panicked");
            }
        }

        let mut discoveries = discoveries.lock().unwrap_or_else(PoisonError::into_inner);
        std::mem::take(&mut discoveries.results)
    }
}
