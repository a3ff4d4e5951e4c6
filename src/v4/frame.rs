//! Ethernet / IPv4 / UDP framing for DHCP payloads.

use bytes::{BufMut as _, Bytes, BytesMut};
use std::net::Ipv4Addr;

pub type MacAddr = [u8; 6];

pub const BROADCAST_MAC: MacAddr = [0xff; 6];
pub const DHCP_SERVER_PORT: u16 = 67;
pub const DHCP_CLIENT_PORT: u16 = 68;

pub const ETHERTYPE_IPV4: u16 = 0x0800;
pub const ETHERTYPE_ARP: u16 = 0x0806;

const ETHERNET_HEADER_LEN: usize = 14;
const IPV4_HEADER_LEN: usize = 20;
const UDP_HEADER_LEN: usize = 8;
const IPPROTO_UDP: u8 = 17;
const DEFAULT_TTL: u8 = 64;

/// Link, network and transport addressing for one UDP frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Addressing {
    pub src_mac: MacAddr,
    pub dst_mac: MacAddr,
    pub src_ip: Ipv4Addr,
    pub dst_ip: Ipv4Addr,
    pub src_port: u16,
    pub dst_port: u16,
}

impl Addressing {
    /// A client with no address yet broadcasting to every DHCP server on the segment.
    pub fn client_broadcast(src_mac: MacAddr) -> Self {
        Self {
            src_mac,
            dst_mac: BROADCAST_MAC,
            src_ip: Ipv4Addr::UNSPECIFIED,
            dst_ip: Ipv4Addr::BROADCAST,
            src_port: DHCP_CLIENT_PORT,
            dst_port: DHCP_SERVER_PORT,
        }
    }
}

/// A decoded UDP datagram borrowed from a captured frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UdpDatagram<'a> {
    pub addressing: Addressing,
    pub payload: &'a [u8],
}

pub fn write_ethernet_header(buf: &mut BytesMut, dst: MacAddr, src: MacAddr, ethertype: u16) {
    buf.extend_from_slice(&dst);
    buf.extend_from_slice(&src);
    buf.put_u16(ethertype);
}

/// Wraps `payload` in UDP, IPv4 and Ethernet headers.
///
/// The UDP checksum is left at zero, which IPv4 permits.
pub fn encode_udp(addressing: &Addressing, payload: &[u8]) -> Bytes {
    let udp_len = UDP_HEADER_LEN + payload.len();
    let ip_len = IPV4_HEADER_LEN + udp_len;
    let mut buf = BytesMut::with_capacity(ETHERNET_HEADER_LEN + ip_len);

    write_ethernet_header(&mut buf, addressing.dst_mac, addressing.src_mac, ETHERTYPE_IPV4);

    let ip_start = buf.len();
    buf.put_u8(0x45); // version 4, IHL 5
    buf.put_u8(0);
    buf.put_u16(ip_len as u16);
    buf.put_u16(0); // identification
    buf.put_u16(0); // flags / fragment offset
    buf.put_u8(DEFAULT_TTL);
    buf.put_u8(IPPROTO_UDP);
    buf.put_u16(0); // checksum, patched below
    buf.extend_from_slice(&addressing.src_ip.octets());
    buf.extend_from_slice(&addressing.dst_ip.octets());
    let checksum = ipv4_checksum(&buf[ip_start..ip_start + IPV4_HEADER_LEN]);
    buf[ip_start + 10..ip_start + 12].copy_from_slice(&checksum.to_be_bytes());

    buf.put_u16(addressing.src_port);
    buf.put_u16(addressing.dst_port);
    buf.put_u16(udp_len as u16);
    buf.put_u16(0);
    buf.extend_from_slice(payload);

    buf.freeze()
}

/// Extracts the UDP datagram from an Ethernet/IPv4 frame, or `None` for anything else.
pub fn decode_udp(frame: &[u8]) -> Option<UdpDatagram<'_>> {
    if frame.len() < ETHERNET_HEADER_LEN + IPV4_HEADER_LEN + UDP_HEADER_LEN {
        return None;
    }
    if read_u16(frame, 12) != ETHERTYPE_IPV4 {
        return None;
    }

    let ip = &frame[ETHERNET_HEADER_LEN..];
    if ip[0] >> 4 != 4 || ip[9] != IPPROTO_UDP {
        return None;
    }
    let ihl = usize::from(ip[0] & 0x0f) * 4;
    let total_len = usize::from(read_u16(ip, 2));
    if ihl < IPV4_HEADER_LEN || total_len < ihl + UDP_HEADER_LEN || total_len > ip.len() {
        return None;
    }

    let udp = &ip[ihl..total_len];
    let udp_len = usize::from(read_u16(udp, 4));
    if udp_len < UDP_HEADER_LEN || udp_len > udp.len() {
        return None;
    }

    Some(UdpDatagram {
        addressing: Addressing {
            dst_mac: mac_at(frame, 0),
            src_mac: mac_at(frame, 6),
            src_ip: Ipv4Addr::new(ip[12], ip[13], ip[14], ip[15]),
            dst_ip: Ipv4Addr::new(ip[16], ip[17], ip[18], ip[19]),
            src_port: read_u16(udp, 0),
            dst_port: read_u16(udp, 2),
        },
        payload: &udp[UDP_HEADER_LEN..udp_len],
    })
}

/// Formats a hardware address as `aa:bb:cc:dd:ee:ff`.
pub fn format_mac(mac: &MacAddr) -> String {
    mac.iter()
        .map(|byte| format!("{byte:02x}"))
        .collect::<Vec<_>>()
        .join(":")
}

pub(crate) fn mac_at(buf: &[u8], offset: usize) -> MacAddr {
    let mut mac = [0u8; 6];
    mac.copy_from_slice(&buf[offset..offset + 6]);
    mac
}

pub(crate) fn read_u16(buf: &[u8], offset: usize) -> u16 {
    u16::from_be_bytes([buf[offset], buf[offset + 1]])
}

fn ipv4_checksum(header: &[u8]) -> u16 {
    let mut sum: u32 = header
        .chunks_exact(2)
        .map(|word| u32::from(u16::from_be_bytes([word[0], word[1]])))
        .sum();
    while sum >> 16 != 0 {
        sum = (sum & 0xffff) + (sum >> 16);
    }
    !(sum as u16)
}
