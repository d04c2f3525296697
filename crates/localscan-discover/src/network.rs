//! Subnet description and host enumeration.
//!
//! A [`NetworkDescriptor`] comes either from a CIDR on the command line or
//! from the first active interface. Its usable hosts exclude the network and
//! broadcast addresses, so /0, /31 and /32 enumerate nothing.

use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;

use ipnet::Ipv4Net;
use pnet::datalink;
use pnet::ipnetwork::IpNetwork;

use crate::error::{DiscoverError, Result};

/// An IPv4 subnet: base address plus prefix length.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NetworkDescriptor {
    net: Ipv4Net,
}

impl NetworkDescriptor {
    pub fn new(address: Ipv4Addr, prefix_len: u8) -> Result<Self> {
        let net = Ipv4Net::new(address, prefix_len).map_err(|e| DiscoverError::InvalidTarget {
            target: format!("{address}/{prefix_len}"),
            reason: e.to_string(),
        })?;
        Ok(Self { net })
    }

    pub fn prefix_len(&self) -> u8 {
        self.net.prefix_len()
    }

    pub fn network(&self) -> Ipv4Addr {
        self.net.network()
    }

    /// CIDR notation with host bits cleared, e.g. `192.168.1.0/24`.
    pub fn cidr(&self) -> String {
        self.net.trunc().to_string()
    }

    /// 2^(32 − prefix) − 2, or zero for /0 and /32.
    pub fn usable_host_count(&self) -> u64 {
        match self.prefix_len() {
            0 | 32 => 0,
            prefix => (1u64 << (32 - prefix)) - 2,
        }
    }

    /// Usable host addresses in ascending order.
    pub fn hosts(&self) -> impl Iterator<Item = Ipv4Addr> {
        let first = u32::from(self.network()).wrapping_add(1);
        let count = self.usable_host_count();
        (0..count).map(move |offset| Ipv4Addr::from(first + offset as u32))
    }
}

impl fmt::Display for NetworkDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.cidr())
    }
}

impl FromStr for NetworkDescriptor {
    type Err = DiscoverError;

    fn from_str(s: &str) -> Result<Self> {
        let net: Ipv4Net = s.trim().parse().map_err(|e: ipnet::AddrParseError| {
            DiscoverError::InvalidTarget {
                target: s.to_string(),
                reason: e.to_string(),
            }
        })?;
        Ok(Self { net })
    }
}

/// The interface chosen for a scan.
#[derive(Debug, Clone)]
pub struct DetectedInterface {
    pub name: String,
    pub address: Ipv4Addr,
    pub network: NetworkDescriptor,
}

/// Find an up, non-loopback interface with an IPv4 address.
///
/// With `name`, only that interface is considered.
pub fn detect_interface(name: Option<&str>) -> Result<DetectedInterface> {
    for iface in datalink::interfaces() {
        if iface.is_loopback() || !iface.is_up() {
            continue;
        }
        if name.is_some_and(|wanted| wanted != iface.name) {
            continue;
        }

        let v4 = iface.ips.iter().find_map(|ip| match ip {
            IpNetwork::V4(net) => Some(*net),
            IpNetwork::V6(_) => None,
        });

        if let Some(net) = v4 {
            tracing::debug!(interface = %iface.name, address = %net.ip(), prefix = net.prefix(), "Interface selected");
            return Ok(DetectedInterface {
                name: iface.name.clone(),
                address: net.ip(),
                network: NetworkDescriptor::new(net.ip(), net.prefix())?,
            });
        }
    }

    match name {
        Some(name) => Err(DiscoverError::InterfaceNotFound {
            name: name.to_string(),
        }),
        None => Err(DiscoverError::NoActiveInterface),
    }
}
