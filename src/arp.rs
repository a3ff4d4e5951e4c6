//! Gratuitous ARP "is-at" announcements.

use crate::transport::Transport;
use crate::v4::frame::{
    format_mac, mac_at, read_u16, write_ethernet_header, MacAddr, ETHERTYPE_ARP, ETHERTYPE_IPV4,
};
use bytes::{BufMut as _, Bytes, BytesMut};
use std::net::Ipv4Addr;

const HTYPE_ETHERNET: u16 = 1;
pub const OPCODE_REPLY: u16 = 2;
const ARP_PACKET_LEN: usize = 28;

/// One Ethernet/IPv4 ARP packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArpPacket {
    pub operation: u16,
    pub sender_mac: MacAddr,
    pub sender_ip: Ipv4Addr,
    pub target_mac: MacAddr,
    pub target_ip: Ipv4Addr,
}

impl ArpPacket {
    /// An unsolicited reply telling `target` that `sender_ip` is at `sender_mac`.
    pub fn is_at(
        sender_mac: MacAddr,
        sender_ip: Ipv4Addr,
        target_mac: MacAddr,
        target_ip: Ipv4Addr,
    ) -> Self {
        Self {
            operation: OPCODE_REPLY,
            sender_mac,
            sender_ip,
            target_mac,
            target_ip,
        }
    }

    /// Encodes the packet in an Ethernet frame addressed to the target hardware address.
    pub fn to_frame(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(14 + ARP_PACKET_LEN);
        write_ethernet_header(&mut buf, self.target_mac, self.sender_mac, ETHERTYPE_ARP);
        buf.put_u16(HTYPE_ETHERNET);
        buf.put_u16(ETHERTYPE_IPV4);
        buf.put_u8(6);
        buf.put_u8(4);
        buf.put_u16(self.operation);
        buf.extend_from_slice(&self.sender_mac);
        buf.extend_from_slice(&self.sender_ip.octets());
        buf.extend_from_slice(&self.target_mac);
        buf.extend_from_slice(&self.target_ip.octets());
        buf.freeze()
    }

    pub fn from_frame(frame: &[u8]) -> Option<Self> {
        if frame.len() < 14 + ARP_PACKET_LEN || read_u16(frame, 12) != ETHERTYPE_ARP {
            return None;
        }
        let arp = &frame[14..];
        if read_u16(arp, 0) != HTYPE_ETHERNET
            || read_u16(arp, 2) != ETHERTYPE_IPV4
            || arp[4] != 6
            || arp[5] != 4
        {
            return None;
        }
        Some(Self {
            operation: read_u16(arp, 6),
            sender_mac: mac_at(arp, 8),
            sender_ip: Ipv4Addr::new(arp[14], arp[15], arp[16], arp[17]),
            target_mac: mac_at(arp, 18),
            target_ip: Ipv4Addr::new(arp[24], arp[25], arp[26], arp[27]),
        })
    }
}

/// Sends `packet` without waiting for any answer. Send failures are only logged.
pub async fn announce<T: Transport + ?Sized>(transport: &T, packet: &ArpPacket) {
    tracing::debug!(
        "ARP {} is-at {} -> {} ({})",
        packet.sender_ip,
        format_mac(&packet.sender_mac),
        packet.target_ip,
        format_mac(&packet.target_mac)
    );
    if let Err(e) = transport.send_frame(packet.to_frame()).await {
        tracing::warn!("Failed to send ARP announcement for {}: {}", packet.sender_ip, e);
    }
}
