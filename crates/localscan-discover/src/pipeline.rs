//! One complete scan run.
//!
//! enumerate → probe + ARP fallback → enrich → diff (optional) → save baseline.

use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use localscan_core::{DetectionResult, ScanEvent};
use localscan_history::HistoryStore;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::arp::NeighborSource;
use crate::diff::{self, DiffSummary};
use crate::enrich::{self, ArpEnricher, HostnameResolver, OuiVendorEnricher, ReverseDnsEnricher};
use crate::error::{DiscoverError, Result};
use crate::network::NetworkDescriptor;
use crate::persist;
use crate::probe::Prober;
use crate::scanner::HostScanner;

/// Everything a caller needs after a scan.
#[derive(Debug)]
pub struct ScanReport {
    pub scan_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub target: String,
    /// Final, address-sorted results (with GONE entries in diff mode).
    pub results: Vec<DetectionResult>,
    pub probed: usize,
    pub recovered: usize,
    /// Present in diff mode.
    pub diff: Option<DiffSummary>,
    /// Whether the baseline was written this run.
    pub baseline_saved: bool,
    /// Wall time from the first probe until the report is ready, enrichment
    /// and history included.
    pub duration: Duration,
}

/// Validated address list for one scan.
#[derive(Debug, Clone)]
pub struct ScanPlan {
    /// Masked CIDR of the scanned network.
    pub target: String,
    /// Usable host addresses, ascending.
    pub addresses: Vec<Ipv4Addr>,
}

impl ScanPlan {
    /// Usable addresses of `network`, refusing empty and oversized ranges.
    pub fn new(network: &NetworkDescriptor, max_hosts: u64) -> Result<Self> {
        let count = network.usable_host_count();
        if count == 0 {
            return Err(DiscoverError::NoHosts {
                cidr: network.cidr(),
            });
        }
        if count > max_hosts {
            return Err(DiscoverError::TooManyHosts {
                cidr: network.cidr(),
                count,
                max: max_hosts,
            });
        }
        Ok(Self {
            target: network.cidr(),
            addresses: network.hosts().collect(),
        })
    }

    pub fn len(&self) -> usize {
        self.addresses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.addresses.is_empty()
    }
}

/// Execute a single scan.
///
/// With `history`, results are classified against the stored baseline and
/// the live subset replaces it. Nothing here fails: probe, ARP and history
/// problems only reduce what gets reported.
pub async fn run_scan<P: Prober, N: NeighborSource, R: HostnameResolver>(
    scanner: &HostScanner<P>,
    neighbors: &N,
    resolver: Arc<R>,
    history: Option<&dyn HistoryStore>,
    plan: ScanPlan,
    events: mpsc::Sender<ScanEvent>,
) -> ScanReport {
    let started_at = Utc::now();
    let clock = Instant::now();
    let ScanPlan { target, addresses } = plan;

    tracing::info!(target = %target, hosts = addresses.len(), diff = history.is_some(), "Scan triggered");

    let outcome = scanner.scan(addresses, neighbors, events).await;
    let mut results = outcome.results;

    let hostnames = ReverseDnsEnricher::resolve(resolver, &results).await;
    enrich::enrich_all(
        &mut results,
        &[
            &ArpEnricher::new(&outcome.arp_table),
            &hostnames,
            &OuiVendorEnricher,
        ],
    );

    let (results, diff, baseline_saved) = match history {
        Some(store) => {
            let previous = persist::load_baseline(store);
            let diffed = diff::compute_diff(&results, &previous);
            let summary = diff::summarize(&diffed);
            let saved = persist::persist_baseline(store, &diffed);

            tracing::info!(
                scan_id = %outcome.scan_id,
                new = summary.new_count,
                gone = summary.gone_count,
                continuing = summary.continuing_count,
                "Diff complete"
            );
            (diffed, Some(summary), saved)
        }
        None => (results, None, false),
    };

    ScanReport {
        scan_id: outcome.scan_id,
        started_at,
        target,
        results,
        probed: outcome.probed,
        recovered: outcome.recovered,
        diff,
        baseline_saved,
        duration: clock.elapsed(),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::{HashMap, HashSet};

    use localscan_core::{DetectionMethod, DiffStatus};
    use localscan_history::{JsonHistoryStore, StoreError};

    use super::*;
    use crate::arp::ArpTable;
    use crate::probe::ProbeOutcome;

    struct Responders(HashSet<Ipv4Addr>);

    impl Prober for Responders {
        async fn probe(&self, address: Ipv4Addr) -> ProbeOutcome {
            if self.0.contains(&address) {
                ProbeOutcome::Tcp(vec![80])
            } else {
                ProbeOutcome::Silent
            }
        }
    }

    struct Neighbors(ArpTable);

    impl NeighborSource for Neighbors {
        async fn snapshot(&self) -> Result<ArpTable> {
            Ok(self.0.clone())
        }
    }

    struct Names(HashMap<Ipv4Addr, String>);

    impl HostnameResolver for Names {
        fn reverse(&self, address: Ipv4Addr) -> Option<String> {
            self.0.get(&address).cloned()
        }
    }

    fn no_names() -> Arc<Names> {
        Arc::new(Names(HashMap::new()))
    }

    /// Empty baseline that takes a while to read.
    struct SlowHistory(Duration);

    impl HistoryStore for SlowHistory {
        fn load(&self) -> std::result::Result<Option<Vec<DetectionResult>>, StoreError> {
            std::thread::sleep(self.0);
            Ok(None)
        }

        fn save(&self, _results: &[DetectionResult]) -> std::result::Result<(), StoreError> {
            Ok(())
        }
    }

    fn responders(lasts: &[u8]) -> HostScanner<Responders> {
        let set = lasts.iter().map(|l| Ipv4Addr::new(10, 9, 0, *l)).collect();
        HostScanner::new(Responders(set), 8)
    }

    fn plan() -> ScanPlan {
        let net: NetworkDescriptor = "10.9.0.0/28".parse().unwrap();
        ScanPlan::new(&net, 65_534).unwrap()
    }

    fn sink() -> mpsc::Sender<ScanEvent> {
        let (tx, mut rx) = mpsc::channel(8);
        tokio::spawn(async move { while rx.recv().await.is_some() {} });
        tx
    }

    #[test]
    fn test_plan_rejects_empty_and_huge_ranges() {
        let single: NetworkDescriptor = "10.0.0.1/32".parse().unwrap();
        assert!(matches!(
            ScanPlan::new(&single, 65_534),
            Err(DiscoverError::NoHosts { .. })
        ));

        let huge: NetworkDescriptor = "10.0.0.0/8".parse().unwrap();
        assert!(matches!(
            ScanPlan::new(&huge, 65_534),
            Err(DiscoverError::TooManyHosts { count: 16_777_214, .. })
        ));

        let slash16: NetworkDescriptor = "10.1.0.0/16".parse().unwrap();
        let plan = ScanPlan::new(&slash16, 65_534).unwrap();
        assert_eq!(plan.len(), 65_534);
        assert_eq!(plan.target, "10.1.0.0/16");
    }

    #[tokio::test]
    async fn test_plain_scan_has_no_status() {
        let report = run_scan(
            &responders(&[1, 3]),
            &Neighbors(HashMap::new()),
            no_names(),
            None,
            plan(),
            sink(),
        )
        .await;

        assert_eq!(report.target, "10.9.0.0/28");
        assert_eq!(report.probed, 14);
        assert_eq!(report.results.len(), 2);
        assert!(report.results.iter().all(|r| r.status.is_none()));
        assert!(report.diff.is_none());
        assert!(!report.baseline_saved);
    }

    #[tokio::test]
    async fn test_arp_mac_attached_to_active_results() {
        let mut table = ArpTable::new();
        table.insert(Ipv4Addr::new(10, 9, 0, 1), "02:00:00:00:00:01".to_string());
        table.insert(Ipv4Addr::new(10, 9, 0, 7), "02:00:00:00:00:07".to_string());

        let report = run_scan(&responders(&[1]), &Neighbors(table), no_names(), None, plan(), sink()).await;

        assert_eq!(report.recovered, 1);
        assert_eq!(report.results[0].mac.as_deref(), Some("02:00:00:00:00:01"));
        assert_eq!(report.results[1].method, DetectionMethod::Arp);
        assert_eq!(report.results[1].mac.as_deref(), Some("02:00:00:00:00:07"));
    }

    #[tokio::test]
    async fn test_diff_across_two_runs() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonHistoryStore::new(dir.path().join("last.json"));
        let history: &dyn HistoryStore = &store;
        let empty = Neighbors(HashMap::new());

        let first = run_scan(&responders(&[1, 2]), &empty, no_names(), Some(history), plan(), sink()).await;
        assert!(first
            .results
            .iter()
            .all(|r| r.status == Some(DiffStatus::New)));
        assert!(first.baseline_saved);

        let second = run_scan(&responders(&[2, 3]), &empty, no_names(), Some(history), plan(), sink()).await;
        let classified: Vec<(u8, Option<DiffStatus>)> = second
            .results
            .iter()
            .map(|r| (r.address.octets()[3], r.status))
            .collect();
        assert_eq!(
            classified,
            vec![
                (1, Some(DiffStatus::Gone)),
                (2, None),
                (3, Some(DiffStatus::New)),
            ]
        );
        assert_eq!(
            second.diff,
            Some(DiffSummary {
                total: 3,
                new_count: 1,
                gone_count: 1,
                continuing_count: 1,
            })
        );

        let saved: Vec<u8> = store
            .load()
            .unwrap()
            .unwrap()
            .iter()
            .map(|r| r.address.octets()[3])
            .collect();
        assert_eq!(saved, vec![2, 3]);
    }

    #[tokio::test]
    async fn test_hostnames_resolved_for_live_hosts() {
        let mut known = HashMap::new();
        known.insert(Ipv4Addr::new(10, 9, 0, 3), "printer.lan".to_string());

        let report = run_scan(
            &responders(&[1, 3]),
            &Neighbors(HashMap::new()),
            Arc::new(Names(known)),
            None,
            plan(),
            sink(),
        )
        .await;

        assert!(report.results[0].hostname.is_none());
        assert_eq!(report.results[1].hostname.as_deref(), Some("printer.lan"));
    }

    #[tokio::test]
    async fn test_duration_covers_history_work() {
        let slow = SlowHistory(Duration::from_millis(60));
        let report = run_scan(
            &responders(&[1]),
            &Neighbors(HashMap::new()),
            no_names(),
            Some(&slow as &dyn HistoryStore),
            plan(),
            sink(),
        )
        .await;

        assert!(report.duration >= Duration::from_millis(60));
    }
}
