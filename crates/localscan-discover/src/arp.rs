//! Link-layer fallback: the operating system's ARP cache.
//!
//! Hosts that ignored every probe often still answered the ARP request the
//! kernel sent on our behalf. After active probing, any enumerated address
//! with a resolved hardware address in the cache counts as discovered.

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::net::Ipv4Addr;

use localscan_core::{DetectionMethod, DetectionResult};
use tokio::process::Command;

use crate::error::{DiscoverError, Result};

/// Address to normalized (`aa:bb:cc:dd:ee:ff`) hardware address.
pub type ArpTable = HashMap<Ipv4Addr, String>;

const PROC_NET_ARP: &str = "/proc/net/arp";

/// Source of the neighbour table.
pub trait NeighborSource: Send + Sync {
    fn snapshot(&self) -> impl Future<Output = Result<ArpTable>> + Send;
}

/// Reads the host's ARP cache: `/proc/net/arp` on Linux, `arp -a` elsewhere.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemNeighbors;

impl NeighborSource for SystemNeighbors {
    async fn snapshot(&self) -> Result<ArpTable> {
        if cfg!(target_os = "linux") {
            match tokio::fs::read_to_string(PROC_NET_ARP).await {
                Ok(contents) => return Ok(parse_proc_net_arp(&contents)),
                Err(e) => {
                    tracing::debug!(error = %e, path = PROC_NET_ARP, "Falling back to `arp -a`");
                }
            }
        }

        let output = Command::new("arp")
            .arg("-a")
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| DiscoverError::ArpTable(format!("failed to run arp: {e}")))?;

        if !output.status.success() {
            return Err(DiscoverError::ArpTable(format!(
                "arp -a exited with {}",
                output.status
            )));
        }

        Ok(parse_arp_a(&String::from_utf8_lossy(&output.stdout)))
    }
}

/// Parse the Linux `/proc/net/arp` table.
///
/// ```text
/// IP address       HW type     Flags       HW address            Mask     Device
/// 192.168.1.1      0x1         0x2         aa:bb:cc:dd:ee:ff     *        eth0
/// ```
pub fn parse_proc_net_arp(contents: &str) -> ArpTable {
    contents
        .lines()
        .skip(1)
        .filter_map(|line| {
            let fields: Vec<&str> = line.split_whitespace().collect();
            let address = fields.first()?.parse().ok()?;
            let mac = normalize_mac(fields.get(3)?)?;
            Some((address, mac))
        })
        .collect()
}

/// Parse `arp -a` output in either of its common shapes.
///
/// BSD, macOS and net-tools: `? (192.168.1.1) at aa:bb:cc:dd:ee:ff on en0 ...`
/// Windows: `  192.168.1.1           aa-bb-cc-dd-ee-ff     dynamic`
pub fn parse_arp_a(output: &str) -> ArpTable {
    output.lines().filter_map(parse_arp_a_line).collect()
}

fn parse_arp_a_line(line: &str) -> Option<(Ipv4Addr, String)> {
    let fields: Vec<&str> = line.split_whitespace().collect();

    if let Some(at) = fields.iter().position(|f| *f == "at") {
        let address = fields
            .get(at.checked_sub(1)?)?
            .trim_start_matches('(')
            .trim_end_matches(')')
            .parse()
            .ok()?;
        let mac = normalize_mac(fields.get(at + 1)?)?;
        return Some((address, mac));
    }

    let address = fields.first()?.parse().ok()?;
    let mac = normalize_mac(fields.get(1)?)?;
    Some((address, mac))
}

/// Lowercase colon-separated form with two digits per octet.
///
/// Returns `None` for anything that is not six hex octets, and for the
/// all-zero (incomplete) and broadcast addresses.
pub fn normalize_mac(raw: &str) -> Option<String> {
    let octets: Vec<u8> = raw
        .split([':', '-'])
        .map(|part| {
            if part.is_empty() || part.len() > 2 {
                return None;
            }
            u8::from_str_radix(part, 16).ok()
        })
        .collect::<Option<_>>()?;

    if octets.len() != 6 || octets.iter().all(|o| *o == 0) || octets.iter().all(|o| *o == 0xff) {
        return None;
    }

    Some(
        octets
            .iter()
            .map(|o| format!("{o:02x}"))
            .collect::<Vec<_>>()
            .join(":"),
    )
}

/// ARP-method results for enumerated addresses the active phase missed.
///
/// Order follows `addresses`. Entries with an empty hardware address are
/// ignored.
pub fn recover_silent_hosts(
    addresses: &[Ipv4Addr],
    discovered: &HashSet<Ipv4Addr>,
    table: &ArpTable,
) -> Vec<DetectionResult> {
    addresses
        .iter()
        .filter(|addr| !discovered.contains(addr))
        .filter(|addr| table.get(addr).is_some_and(|mac| !mac.is_empty()))
        .map(|addr| DetectionResult::new(*addr, DetectionMethod::Arp))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_proc_net_arp() {
        let contents = "\
IP address       HW type     Flags       HW address            Mask     Device
192.168.1.1      0x1         0x2         AA:BB:CC:DD:EE:01     *        eth0
192.168.1.20     0x1         0x0         00:00:00:00:00:00     *        eth0
192.168.1.30     0x1         0x2         10:20:30:40:50:60     *        wlan0
";
        let table = parse_proc_net_arp(contents);
        assert_eq!(table.len(), 2);
        assert_eq!(
            table.get(&Ipv4Addr::new(192, 168, 1, 1)).map(String::as_str),
            Some("aa:bb:cc:dd:ee:01")
        );
        assert!(!table.contains_key(&Ipv4Addr::new(192, 168, 1, 20)));
    }

    #[test]
    fn test_parse_bsd_arp_a() {
        let output = "\
? (192.168.1.1) at 0:11:22:a:b:c on en0 ifscope [ethernet]
? (192.168.1.9) at (incomplete) on en0 ifscope [ethernet]
router.lan (192.168.1.254) at de:ad:be:ef:00:01 [ether] on eth0
";
        let table = parse_arp_a(output);
        assert_eq!(table.len(), 2);
        assert_eq!(
            table.get(&Ipv4Addr::new(192, 168, 1, 1)).map(String::as_str),
            Some("00:11:22:0a:0b:0c")
        );
        assert_eq!(
            table.get(&Ipv4Addr::new(192, 168, 1, 254)).map(String::as_str),
            Some("de:ad:be:ef:00:01")
        );
    }

    #[test]
    fn test_parse_windows_arp_a() {
        let output = "
Interface: 192.168.1.50 --- 0xb
  Internet Address      Physical Address      Type
  192.168.1.1           a0-b1-c2-d3-e4-f5     dynamic
  192.168.1.255         ff-ff-ff-ff-ff-ff     static
  224.0.0.22            01-00-5e-00-00-16     static
";
        let table = parse_arp_a(output);
        assert_eq!(
            table.get(&Ipv4Addr::new(192, 168, 1, 1)).map(String::as_str),
            Some("a0:b1:c2:d3:e4:f5")
        );
        assert!(!table.contains_key(&Ipv4Addr::new(192, 168, 1, 255)));
        assert!(!table.contains_key(&Ipv4Addr::new(192, 168, 1, 50)));
    }

    #[test]
    fn test_normalize_mac_rejects_garbage() {
        assert_eq!(normalize_mac("(incomplete)"), None);
        assert_eq!(normalize_mac("aa:bb:cc:dd:ee"), None);
        assert_eq!(normalize_mac("aa:bb:cc:dd:ee:ff:00"), None);
        assert_eq!(normalize_mac("aaa:bb:cc:dd:ee:ff"), None);
        assert_eq!(normalize_mac("00-00-00-00-00-00"), None);
        assert_eq!(normalize_mac("AA-BB-CC-DD-EE-FF").as_deref(), Some("aa:bb:cc:dd:ee:ff"));
    }

    #[test]
    fn test_recover_skips_discovered_and_unlisted() {
        let addresses: Vec<Ipv4Addr> = (1..=6).map(|i| Ipv4Addr::new(10, 0, 0, i)).collect();
        let discovered: HashSet<Ipv4Addr> = [Ipv4Addr::new(10, 0, 0, 1)].into_iter().collect();

        let mut table = ArpTable::new();
        table.insert(Ipv4Addr::new(10, 0, 0, 1), "aa:00:00:00:00:01".to_string());
        table.insert(Ipv4Addr::new(10, 0, 0, 4), "aa:00:00:00:00:04".to_string());
        table.insert(Ipv4Addr::new(10, 0, 0, 5), String::new());
        table.insert(Ipv4Addr::new(10, 0, 0, 99), "aa:00:00:00:00:63".to_string());

        let recovered = recover_silent_hosts(&addresses, &discovered, &table);
        assert_eq!(recovered.len(), 1);
        assert_eq!(recovered[0].address, Ipv4Addr::new(10, 0, 0, 4));
        assert_eq!(recovered[0].method, DetectionMethod::Arp);
        assert!(recovered[0].open_ports.is_empty());
    }

    #[tokio::test]
    #[ignore = "reads the host ARP cache"]
    async fn test_system_snapshot() {
        let table = SystemNeighbors.snapshot().await.unwrap();
        for mac in table.values() {
            assert_eq!(mac.len(), 17);
        }
    }
}
