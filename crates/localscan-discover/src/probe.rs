//! The per-address probe cascade.
//!
//! Detection methods are tried in a fixed order: platform ping, a TCP connect
//! sweep over common service ports, then UDP discovery datagrams. The TCP
//! sweep always runs so its open-port evidence is kept even for hosts that
//! answered ping. Nothing in here returns an error: a failed step is simply
//! "no signal" and the cascade moves on.

use std::future::Future;
use std::io;
use std::net::{Ipv4Addr, SocketAddrV4};
use std::process::Stdio;
use std::time::Duration;

use localscan_core::DetectionMethod;
use tokio::net::{TcpStream, UdpSocket};
use tokio::process::Command;
use tokio::time::timeout;

use crate::payloads;

/// TCP ports swept on every address: remote admin, file sharing, media
/// casting, printers, IoT brokers, cameras, NAS and dashboards.
pub const TCP_PORTS: [u16; 26] = [
    22, 23, 53, 80, 443, 445, 139, 548, // SSH, Telnet, DNS, HTTP(S), SMB, AFP
    3389, 5900, // RDP, VNC
    8080, 8443, 8008, 8009, // HTTP alt, Chromecast
    5353, // mDNS
    7000, 7100, // AirPlay
    9100, // raw printing
    62078, // Apple lockdown
    1883, 8883, // MQTT
    554,  // RTSP
    5000, 5001, // Synology, UPnP
    9090, 3000, // Prometheus, Grafana
];

/// UDP ports tried, in order, when ping and TCP stay silent.
pub const UDP_PORTS: [u16; 6] = [
    payloads::MDNS_PORT,
    payloads::SSDP_PORT,
    payloads::NETBIOS_PORT,
    payloads::SNMP_PORT,
    53,  // DNS
    123, // NTP
];

/// Extra time granted to the ping child beyond its own timeout argument.
const PING_GRACE: Duration = Duration::from_secs(1);

const UDP_RECV_BUFFER: usize = 512;

/// What one TCP connect attempt told us.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TcpSignal {
    /// Connection accepted: host alive, port open.
    Open,
    /// Actively refused: host alive, port closed.
    Refused,
    /// Timeout or any other failure.
    Silent,
}

/// Outcome of the cascade for one address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeOutcome {
    /// Ping succeeded. Carries whatever ports the TCP sweep found open.
    Icmp(Vec<u16>),
    /// Ping failed but at least one TCP port accepted or refused.
    Tcp(Vec<u16>),
    /// Only a UDP discovery service replied.
    Udp,
    /// Nothing answered. The ARP fallback may still recover the address.
    Silent,
}

impl ProbeOutcome {
    pub fn method(&self) -> Option<DetectionMethod> {
        match self {
            Self::Icmp(_) => Some(DetectionMethod::Icmp),
            Self::Tcp(_) => Some(DetectionMethod::Tcp),
            Self::Udp => Some(DetectionMethod::Udp),
            Self::Silent => None,
        }
    }

    pub fn open_ports(&self) -> &[u16] {
        match self {
            Self::Icmp(ports) | Self::Tcp(ports) => ports,
            Self::Udp | Self::Silent => &[],
        }
    }

    pub fn into_parts(self) -> Option<(DetectionMethod, Vec<u16>)> {
        match self {
            Self::Icmp(ports) => Some((DetectionMethod::Icmp, ports)),
            Self::Tcp(ports) => Some((DetectionMethod::Tcp, ports)),
            Self::Udp => Some((DetectionMethod::Udp, Vec::new())),
            Self::Silent => None,
        }
    }
}

/// Anything that can decide whether an address is alive.
///
/// The scanner only depends on this; the real cascade and test doubles both
/// implement it.
pub trait Prober: Send + Sync + 'static {
    fn probe(&self, address: Ipv4Addr) -> impl Future<Output = ProbeOutcome> + Send;
}

/// The network primitives the cascade is built from.
pub trait ProbeTransport: Send + Sync + 'static {
    /// One echo request via the platform ping; true on zero exit status.
    fn ping(&self, address: Ipv4Addr, timeout: Duration) -> impl Future<Output = bool> + Send;

    /// One bounded TCP connect attempt.
    fn connect(
        &self,
        target: SocketAddrV4,
        timeout: Duration,
    ) -> impl Future<Output = TcpSignal> + Send;

    /// Send `payload` and wait for any non-empty reply.
    fn exchange(
        &self,
        target: SocketAddrV4,
        payload: &[u8],
        timeout: Duration,
    ) -> impl Future<Output = bool> + Send;
}

/// Ping → TCP sweep → UDP probes, each step bounded by `timeout`.
pub struct ProbeCascade<T> {
    transport: T,
    timeout: Duration,
}

impl<T: ProbeTransport> ProbeCascade<T> {
    pub fn new(transport: T, timeout: Duration) -> Self {
        Self { transport, timeout }
    }

    /// Returns (any signal, open ports).
    async fn tcp_sweep(&self, address: Ipv4Addr) -> (bool, Vec<u16>) {
        let mut alive = false;
        let mut open = Vec::new();

        for port in TCP_PORTS {
            match self
                .transport
                .connect(SocketAddrV4::new(address, port), self.timeout)
                .await
            {
                TcpSignal::Open => {
                    alive = true;
                    open.push(port);
                }
                TcpSignal::Refused => alive = true,
                TcpSignal::Silent => {}
            }
        }

        open.sort_unstable();
        (alive, open)
    }

    async fn udp_sweep(&self, address: Ipv4Addr) -> bool {
        for port in UDP_PORTS {
            let payload = payloads::payload_for(port);
            if self
                .transport
                .exchange(SocketAddrV4::new(address, port), &payload, self.timeout)
                .await
            {
                tracing::trace!(%address, port, "UDP reply");
                return true;
            }
        }
        false
    }
}

impl<T: ProbeTransport> Prober for ProbeCascade<T> {
    async fn probe(&self, address: Ipv4Addr) -> ProbeOutcome {
        let icmp_alive = self.transport.ping(address, self.timeout).await;
        let (tcp_alive, open_ports) = self.tcp_sweep(address).await;

        if icmp_alive {
            return ProbeOutcome::Icmp(open_ports);
        }
        if tcp_alive {
            return ProbeOutcome::Tcp(open_ports);
        }
        if self.udp_sweep(address).await {
            return ProbeOutcome::Udp;
        }
        ProbeOutcome::Silent
    }
}

/// Real sockets and the platform `ping` binary.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemTransport;

impl ProbeTransport for SystemTransport {
    async fn ping(&self, address: Ipv4Addr, timeout_after: Duration) -> bool {
        let mut cmd = Command::new("ping");
        cmd.args(ping_args(std::env::consts::OS, address, timeout_after))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true);

        // Not every ping honours its timeout flag; bound the child as well.
        match timeout(timeout_after + PING_GRACE, cmd.status()).await {
            Ok(Ok(status)) => status.success(),
            Ok(Err(e)) => {
                tracing::trace!(%address, error = %e, "ping could not be started");
                false
            }
            Err(_) => {
                tracing::trace!(%address, "ping overran its timeout");
                false
            }
        }
    }

    async fn connect(&self, target: SocketAddrV4, timeout_after: Duration) -> TcpSignal {
        match timeout(timeout_after, TcpStream::connect(target)).await {
            Ok(Ok(_stream)) => TcpSignal::Open,
            Ok(Err(e)) if e.kind() == io::ErrorKind::ConnectionRefused => TcpSignal::Refused,
            Ok(Err(_)) | Err(_) => TcpSignal::Silent,
        }
    }

    async fn exchange(&self, target: SocketAddrV4, payload: &[u8], timeout_after: Duration) -> bool {
        let attempt = async {
            let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0)).await?;
            socket.connect(target).await?;
            socket.send(payload).await?;

            let mut buf = [0u8; UDP_RECV_BUFFER];
            let n = socket.recv(&mut buf).await?;
            Ok::<usize, io::Error>(n)
        };

        matches!(timeout(timeout_after, attempt).await, Ok(Ok(n)) if n > 0)
    }
}

/// Arguments for a single ping, following each platform's timeout convention.
///
/// Linux takes whole seconds, macOS milliseconds via `-W`, Windows
/// milliseconds via `-w`.
pub fn ping_args(os: &str, address: Ipv4Addr, timeout: Duration) -> Vec<String> {
    let millis = timeout.as_millis().max(1);
    let (count_flag, wait_flag, wait) = match os {
        "windows" => ("-n", "-w", millis),
        "macos" => ("-c", "-W", millis),
        _ => ("-c", "-W", (millis / 1000).max(1)),
    };

    vec![
        count_flag.to_string(),
        "1".to_string(),
        wait_flag.to_string(),
        wait.to_string(),
        address.to_string(),
    ]
}
