//! Change detection against the previous scan.
//!
//! The current results are classified by address only: hosts absent from the
//! baseline become NEW, baseline hosts absent from the current scan come back
//! as synthetic GONE entries carrying their last-known data, and everything
//! else is continuing (no status).

use std::collections::HashSet;
use std::net::Ipv4Addr;

use localscan_core::types::sort_by_address;
use localscan_core::{DetectionResult, DiffStatus};

/// Counts per classification.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DiffSummary {
    pub total: usize,
    pub new_count: usize,
    pub gone_count: usize,
    pub continuing_count: usize,
}

/// Classify `current` against `previous`.
///
/// Pure: the output depends only on the two inputs and is sorted by address.
/// Live entries are reclassified whatever status they carry. GONE entries in
/// `current` pass through unchanged unless the host is live again, so feeding
/// the output back in with the same baseline yields the same result.
pub fn compute_diff(current: &[DetectionResult], previous: &[DetectionResult]) -> Vec<DetectionResult> {
    let previous_addrs: HashSet<Ipv4Addr> = previous
        .iter()
        .filter(|r| !r.is_gone())
        .map(|r| r.address)
        .collect();
    let (departed, live): (Vec<&DetectionResult>, Vec<&DetectionResult>) =
        current.iter().partition(|r| r.is_gone());
    let live_addrs: HashSet<Ipv4Addr> = live.iter().map(|r| r.address).collect();

    let mut merged: Vec<DetectionResult> = live
        .into_iter()
        .map(|r| {
            let mut r = r.clone();
            r.status = if previous_addrs.contains(&r.address) {
                None
            } else {
                Some(DiffStatus::New)
            };
            r
        })
        .collect();

    let mut gone_seen = HashSet::new();
    for gone in departed {
        if live_addrs.contains(&gone.address) || !gone_seen.insert(gone.address) {
            continue;
        }
        merged.push(gone.clone());
    }

    for prev in previous.iter().filter(|r| !r.is_gone()) {
        if live_addrs.contains(&prev.address) || !gone_seen.insert(prev.address) {
            continue;
        }
        let mut gone = prev.clone();
        gone.status = Some(DiffStatus::Gone);
        merged.push(gone);
    }

    sort_by_address(&mut merged);
    merged
}

pub fn summarize(diffed: &[DetectionResult]) -> DiffSummary {
    diffed.iter().fold(
        DiffSummary {
            total: diffed.len(),
            ..DiffSummary::default()
        },
        |mut summary, r| {
            match r.status {
                Some(DiffStatus::New) => summary.new_count += 1,
                Some(DiffStatus::Gone) => summary.gone_count += 1,
                None => summary.continuing_count += 1,
            }
            summary
        },
    )
}

#[cfg(test)]
mod tests {
    use localscan_core::DetectionMethod;

    use super::*;

    fn host(last: u8, method: DetectionMethod, ports: Vec<u16>) -> DetectionResult {
        DetectionResult::new(Ipv4Addr::new(10, 0, 0, last), method).with_open_ports(ports)
    }

    fn statuses(diffed: &[DetectionResult]) -> Vec<(u8, Option<DiffStatus>)> {
        diffed
            .iter()
            .map(|r| (r.address.octets()[3], r.status))
            .collect()
    }

    #[test]
    fn test_new_gone_and_continuing() {
        let previous = vec![
            host(1, DetectionMethod::Tcp, vec![]),
            host(2, DetectionMethod::Tcp, vec![]),
        ];
        let current = vec![
            host(3, DetectionMethod::Icmp, vec![]),
            host(2, DetectionMethod::Icmp, vec![]),
        ];

        let diffed = compute_diff(&current, &previous);
        assert_eq!(
            statuses(&diffed),
            vec![
                (1, Some(DiffStatus::Gone)),
                (2, None),
                (3, Some(DiffStatus::New)),
            ]
        );
    }

    #[test]
    fn test_continuing_host_keeps_current_data() {
        let mut old = host(5, DetectionMethod::Tcp, vec![22]);
        old.hostname = Some("nas".to_string());
        let previous = vec![old];
        let current = vec![
            host(5, DetectionMethod::Icmp, vec![]),
            host(9, DetectionMethod::Udp, vec![]),
        ];

        let diffed = compute_diff(&current, &previous);
        assert_eq!(diffed.len(), 2);

        assert_eq!(diffed[0].address, Ipv4Addr::new(10, 0, 0, 5));
        assert_eq!(diffed[0].status, None);
        assert_eq!(diffed[0].method, DetectionMethod::Icmp);
        assert!(diffed[0].open_ports.is_empty());
        assert!(diffed[0].hostname.is_none());

        assert_eq!(diffed[1].address, Ipv4Addr::new(10, 0, 0, 9));
        assert_eq!(diffed[1].status, Some(DiffStatus::New));
        assert_eq!(diffed[1].method, DetectionMethod::Udp);
    }

    #[test]
    fn test_gone_entry_carries_last_known_data() {
        let mut old = host(7, DetectionMethod::Tcp, vec![80, 443]);
        old.mac = Some("aa:bb:cc:dd:ee:ff".to_string());

        let diffed = compute_diff(&[], &[old.clone()]);
        assert_eq!(diffed.len(), 1);
        assert!(diffed[0].is_gone());
        assert_eq!(diffed[0].open_ports, old.open_ports);
        assert_eq!(diffed[0].mac, old.mac);
    }

    #[test]
    fn test_empty_baseline_marks_everything_new() {
        let current = vec![
            host(2, DetectionMethod::Arp, vec![]),
            host(1, DetectionMethod::Tcp, vec![22]),
        ];
        let diffed = compute_diff(&current, &[]);
        assert!(diffed.iter().all(|r| r.status == Some(DiffStatus::New)));
        assert_eq!(diffed[0].address, Ipv4Addr::new(10, 0, 0, 1));
    }

    #[test]
    fn test_diff_is_idempotent() {
        let previous = vec![
            host(1, DetectionMethod::Tcp, vec![]),
            host(4, DetectionMethod::Icmp, vec![53]),
        ];
        let current = vec![
            host(4, DetectionMethod::Icmp, vec![53]),
            host(8, DetectionMethod::Udp, vec![]),
        ];
        assert_eq!(
            compute_diff(&current, &previous),
            compute_diff(&current, &previous)
        );
    }

    #[test]
    fn test_stale_new_status_on_live_input_is_reclassified() {
        let mut current = host(3, DetectionMethod::Tcp, vec![]);
        current.status = Some(DiffStatus::New);
        let previous = vec![host(3, DetectionMethod::Tcp, vec![])];

        let diffed = compute_diff(&[current], &previous);
        assert_eq!(statuses(&diffed), vec![(3, None)]);
    }

    #[test]
    fn test_rediffing_output_keeps_gone_hosts_gone() {
        let previous = vec![
            host(1, DetectionMethod::Tcp, vec![]),
            host(2, DetectionMethod::Tcp, vec![]),
        ];
        let current = vec![
            host(2, DetectionMethod::Tcp, vec![]),
            host(3, DetectionMethod::Tcp, vec![]),
        ];

        let once = compute_diff(&current, &previous);
        let twice = compute_diff(&once, &previous);
        assert_eq!(once, twice);
        assert_eq!(
            statuses(&twice),
            vec![
                (1, Some(DiffStatus::Gone)),
                (2, None),
                (3, Some(DiffStatus::New)),
            ]
        );
    }

    #[test]
    fn test_gone_input_dropped_when_host_is_live() {
        let mut departed = host(6, DetectionMethod::Tcp, vec![]);
        departed.status = Some(DiffStatus::Gone);
        let current = vec![departed, host(6, DetectionMethod::Icmp, vec![])];

        let diffed = compute_diff(&current, &[host(6, DetectionMethod::Tcp, vec![])]);
        assert_eq!(statuses(&diffed), vec![(6, None)]);
        assert_eq!(diffed[0].method, DetectionMethod::Icmp);
    }

    #[test]
    fn test_summary_counts() {
        let previous = vec![
            host(1, DetectionMethod::Tcp, vec![]),
            host(2, DetectionMethod::Tcp, vec![]),
        ];
        let current = vec![
            host(2, DetectionMethod::Tcp, vec![]),
            host(3, DetectionMethod::Tcp, vec![]),
            host(4, DetectionMethod::Tcp, vec![]),
        ];
        let summary = summarize(&compute_diff(&current, &previous));
        assert_eq!(
            summary,
            DiffSummary {
                total: 4,
                new_count: 2,
                gone_count: 1,
                continuing_count: 1,
            }
        );
    }
}
