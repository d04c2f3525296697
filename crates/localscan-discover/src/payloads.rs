//! Datagrams sent by the UDP step of the probe cascade.
//!
//! Each discovery port gets a request its service actually answers: an mDNS
//! service-enumeration query, an SSDP M-SEARCH, a NetBIOS node-status query
//! and an SNMPv1 GetRequest. Anything else gets a single zero byte.

pub const MDNS_PORT: u16 = 5353;
pub const SSDP_PORT: u16 = 1900;
pub const NETBIOS_PORT: u16 = 137;
pub const SNMP_PORT: u16 = 161;

const DNS_TYPE_PTR: u16 = 0x000c;
const DNS_TYPE_NBSTAT: u16 = 0x0021;
const DNS_CLASS_IN: u16 = 0x0001;

/// DNS-SD meta-query name listing every advertised service type.
const MDNS_SERVICES: [&[u8]; 4] = [b"_services", b"_dns-sd", b"_udp", b"local"];

const SSDP_SEARCH: &[u8] = b"M-SEARCH * HTTP/1.1\r\n\
HOST: 239.255.255.250:1900\r\n\
MAN: \"ssdp:discover\"\r\n\
MX: 1\r\n\
ST: ssdp:all\r\n\
\r\n";

/// `*` padded with NULs: the NetBIOS wildcard name.
const NETBIOS_WILDCARD: [u8; 16] = [b'*', 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0];

const SNMP_COMMUNITY: &[u8] = b"public";
/// 1.3.6.1.2.1, the MIB-2 "system" subtree.
const SNMP_SYSTEM_OID: [u32; 6] = [1, 3, 6, 1, 2, 1];

// BER tags.
const BER_INTEGER: u8 = 0x02;
const BER_OCTET_STRING: u8 = 0x04;
const BER_NULL: u8 = 0x05;
const BER_OID: u8 = 0x06;
const BER_SEQUENCE: u8 = 0x30;
const SNMP_GET_REQUEST: u8 = 0xa0;

/// The probe datagram for a UDP port.
pub fn payload_for(port: u16) -> Vec<u8> {
    match port {
        MDNS_PORT => mdns_services_query(),
        SSDP_PORT => SSDP_SEARCH.to_vec(),
        NETBIOS_PORT => netbios_status_query(),
        SNMP_PORT => snmp_get_request(SNMP_COMMUNITY, &SNMP_SYSTEM_OID, 1),
        _ => vec![0],
    }
}

/// PTR query for `_services._dns-sd._udp.local`.
pub fn mdns_services_query() -> Vec<u8> {
    dns_query(0, 0, &MDNS_SERVICES, DNS_TYPE_PTR)
}

/// NBSTAT query for the wildcard name, broadcast flag set.
pub fn netbios_status_query() -> Vec<u8> {
    let name = encode_netbios_name(&NETBIOS_WILDCARD);
    dns_query(0x8001, 0x0010, &[name.as_slice()], DNS_TYPE_NBSTAT)
}

/// SNMPv1 GetRequest for one OID with a NULL value.
pub fn snmp_get_request(community: &[u8], oid: &[u32], request_id: u32) -> Vec<u8> {
    let varbind = ber_tlv(
        BER_SEQUENCE,
        &[ber_tlv(BER_OID, &encode_oid(oid)), ber_tlv(BER_NULL, &[])].concat(),
    );
    let varbinds = ber_tlv(BER_SEQUENCE, &varbind);

    let pdu = ber_tlv(
        SNMP_GET_REQUEST,
        &[
            ber_tlv(BER_INTEGER, &request_id.to_be_bytes()),
            ber_tlv(BER_INTEGER, &[0]), // error-status
            ber_tlv(BER_INTEGER, &[0]), // error-index
            varbinds,
        ]
        .concat(),
    );

    ber_tlv(
        BER_SEQUENCE,
        &[
            ber_tlv(BER_INTEGER, &[0]), // version-1
            ber_tlv(BER_OCTET_STRING, community),
            pdu,
        ]
        .concat(),
    )
}

/// One-question DNS message with no answer, authority or additional records.
fn dns_query(id: u16, flags: u16, labels: &[&[u8]], qtype: u16) -> Vec<u8> {
    let mut packet = Vec::with_capacity(64);
    packet.extend_from_slice(&id.to_be_bytes());
    packet.extend_from_slice(&flags.to_be_bytes());
    packet.extend_from_slice(&1u16.to_be_bytes()); // QDCOUNT
    packet.extend_from_slice(&[0; 6]); // ANCOUNT, NSCOUNT, ARCOUNT

    for label in labels {
        packet.push(label.len() as u8);
        packet.extend_from_slice(label);
    }
    packet.push(0);

    packet.extend_from_slice(&qtype.to_be_bytes());
    packet.extend_from_slice(&DNS_CLASS_IN.to_be_bytes());
    packet
}

/// RFC 1001 first-level encoding: each nibble becomes `'A' + nibble`.
fn encode_netbios_name(name: &[u8; 16]) -> Vec<u8> {
    name.iter()
        .flat_map(|b| [b'A' + (b >> 4), b'A' + (b & 0x0f)])
        .collect()
}

fn encode_oid(arcs: &[u32]) -> Vec<u8> {
    let mut out = Vec::new();
    let (first, rest) = match arcs {
        [a, b, rest @ ..] => (a * 40 + b, rest),
        [a] => (a * 40, &[][..]),
        [] => return out,
    };

    for arc in std::iter::once(first).chain(rest.iter().copied()) {
        encode_base128(arc, &mut out);
    }
    out
}

fn encode_base128(mut value: u32, out: &mut Vec<u8>) {
    let mut groups = vec![(value & 0x7f) as u8];
    value >>= 7;
    while value > 0 {
        groups.push((value & 0x7f) as u8 | 0x80);
        value >>= 7;
    }
    out.extend(groups.into_iter().rev());
}

fn ber_tlv(tag: u8, content: &[u8]) -> Vec<u8> {
    let mut out = vec![tag];
    let len = content.len();
    if len < 0x80 {
        out.push(len as u8);
    } else {
        let bytes: Vec<u8> = len
            .to_be_bytes()
            .into_iter()
            .skip_while(|b| *b == 0)
            .collect();
        out.push(0x80 | bytes.len() as u8);
        out.extend(bytes);
    }
    out.extend_from_slice(content);
    out
}
