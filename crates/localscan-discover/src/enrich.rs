//! Post-discovery enrichment.
//!
//! Enrichers only fill fields that are still empty, so the order in which
//! they run decides precedence.

use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr};
use std::sync::{Arc, OnceLock};

use localscan_core::DetectionResult;
use mac_oui::Oui;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::arp::ArpTable;

/// Fills optional fields of a discovered device.
pub trait Enricher {
    fn enrich(&self, result: &mut DetectionResult);
}

/// Hardware address from the ARP snapshot taken after probing.
pub struct ArpEnricher<'a> {
    table: &'a ArpTable,
}

impl<'a> ArpEnricher<'a> {
    pub fn new(table: &'a ArpTable) -> Self {
        Self { table }
    }
}

impl Enricher for ArpEnricher<'_> {
    fn enrich(&self, result: &mut DetectionResult) {
        if result.mac.is_some() {
            return;
        }
        result.mac = self
            .table
            .get(&result.address)
            .filter(|mac| !mac.is_empty())
            .cloned();
    }
}

/// Lookups in flight at once; each one holds a blocking-pool thread.
const RESOLVE_CONCURRENCY: usize = 32;

/// Reverse name lookup for one address.
///
/// Implementations may block; callers run them on the blocking pool.
pub trait HostnameResolver: Send + Sync + 'static {
    fn reverse(&self, address: Ipv4Addr) -> Option<String>;
}

/// PTR lookup through the system resolver (`getnameinfo`).
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemResolver;

impl HostnameResolver for SystemResolver {
    fn reverse(&self, address: Ipv4Addr) -> Option<String> {
        let name = dns_lookup::lookup_addr(&IpAddr::V4(address)).ok()?;
        clean_hostname(&name)
    }
}

/// Strip the trailing root dot; a numeric answer means no name was found.
fn clean_hostname(name: &str) -> Option<String> {
    let name = name.trim_end_matches('.');
    if name.is_empty() || name.parse::<IpAddr>().is_ok() {
        return None;
    }
    Some(name.to_string())
}

/// Hostnames resolved up front, applied like any other enricher.
#[derive(Debug, Default)]
pub struct ReverseDnsEnricher {
    names: HashMap<Ipv4Addr, String>,
}

impl ReverseDnsEnricher {
    /// Resolve every result that has no hostname yet, a bounded number at a time.
    pub async fn resolve<R: HostnameResolver>(resolver: Arc<R>, results: &[DetectionResult]) -> Self {
        let permits = Arc::new(Semaphore::new(RESOLVE_CONCURRENCY));
        let mut lookups = JoinSet::new();

        for address in results
            .iter()
            .filter(|r| r.hostname.is_none())
            .map(|r| r.address)
        {
            let Ok(permit) = Arc::clone(&permits).acquire_owned().await else {
                break;
            };
            let resolver = Arc::clone(&resolver);
            lookups.spawn_blocking(move || {
                let _permit = permit;
                (address, resolver.reverse(address))
            });
        }

        let mut names = HashMap::new();
        while let Some(joined) = lookups.join_next().await {
            match joined {
                Ok((address, Some(name))) => {
                    names.insert(address, name);
                }
                Ok((_, None)) => {}
                Err(e) => tracing::warn!(error = %e, "Hostname lookup task failed"),
            }
        }

        tracing::debug!(resolved = names.len(), "Reverse lookups complete");
        Self { names }
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

impl Enricher for ReverseDnsEnricher {
    fn enrich(&self, result: &mut DetectionResult) {
        if result.hostname.is_some() {
            return;
        }
        result.hostname = self.names.get(&result.address).cloned();
    }
}

static OUI_DB: OnceLock<Option<Oui>> = OnceLock::new();

fn oui_db() -> Option<&'static Oui> {
    OUI_DB
        .get_or_init(|| match Oui::default() {
            Ok(db) => Some(db),
            Err(e) => {
                tracing::warn!(error = %e, "OUI database unavailable, vendors will be blank");
                None
            }
        })
        .as_ref()
}

/// Manufacturer name from the IEEE OUI registry, keyed on the MAC prefix.
#[derive(Debug, Default)]
pub struct OuiVendorEnricher;

impl OuiVendorEnricher {
    pub fn lookup(mac: &str) -> Option<String> {
        match oui_db()?.lookup_by_mac(mac) {
            Ok(Some(entry)) => Some(entry.company_name.clone()),
            _ => None,
        }
    }
}

impl Enricher for OuiVendorEnricher {
    fn enrich(&self, result: &mut DetectionResult) {
        if result.vendor.is_some() {
            return;
        }
        if let Some(mac) = &result.mac {
            result.vendor = Self::lookup(mac);
        }
    }
}

/// Run every enricher over every result, in order.
pub fn enrich_all(results: &mut [DetectionResult], enrichers: &[&dyn Enricher]) {
    for result in results.iter_mut() {
        for enricher in enrichers {
            enricher.enrich(result);
        }
    }

    let with_mac = results.iter().filter(|r| r.mac.is_some()).count();
    let with_hostname = results.iter().filter(|r| r.hostname.is_some()).count();
    let with_vendor = results.iter().filter(|r| r.vendor.is_some()).count();
    tracing::debug!(
        hosts = results.len(),
        with_mac,
        with_hostname,
        with_vendor,
        "Enrichment complete"
    );
}
