//! Correlation and classification of server replies.
//!
//! [`matches`] is the capture filter: it takes every piece of context as an
//! argument so it can be evaluated against frames from any source.

use super::frame::{decode_udp, MacAddr, DHCP_SERVER_PORT};
use bytes::Bytes;
use dhcproto::{v4, Decodable, Decoder};
use std::net::Ipv4Addr;

/// Lease time value meaning the address never expires.
pub const INFINITE_LEASE: u32 = u32::MAX;

/// What the server said about one pending transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    Offer(Reply),
    Ack(Reply),
    /// The server refused. A live frame arrived, but no lease was granted.
    Nak,
    /// Nothing matching arrived within the response timeout.
    Timeout,
}

/// The fields of an OFFER or ACK the lease engine acts on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub your_ip: Ipv4Addr,
    pub lease_time: Option<u32>,
    pub server_identifier: Option<Ipv4Addr>,
    pub server_mac: MacAddr,
}

fn decode_dhcp(frame: &[u8]) -> Option<(MacAddr, v4::Message)> {
    let datagram = decode_udp(frame)?;
    if datagram.addressing.src_port != DHCP_SERVER_PORT {
        return None;
    }
    let msg = v4::Message::decode(&mut Decoder::new(datagram.payload)).ok()?;
    Some((datagram.addressing.src_mac, msg))
}

fn message_type(msg: &v4::Message) -> Option<v4::MessageType> {
    match msg.opts().get(v4::OptionCode::MessageType) {
        Some(v4::DhcpOption::MessageType(msg_type)) => Some(*msg_type),
        _ => None,
    }
}

/// Whether `frame` is a server reply to transaction `xid` carrying one of `expected`.
pub fn matches(frame: &[u8], xid: u32, expected: &[v4::MessageType]) -> bool {
    let Some((_, msg)) = decode_dhcp(frame) else {
        return false;
    };
    msg.xid() == xid
        && message_type(&msg).is_some_and(|msg_type| expected.contains(&msg_type))
}

/// Classifies the outcome of one capture for transaction `xid`.
pub fn classify(captured: Option<&Bytes>, xid: u32) -> Response {
    let Some((server_mac, msg)) = captured.and_then(|frame| decode_dhcp(frame)) else {
        return Response::Timeout;
    };
    if msg.xid() != xid {
        return Response::Timeout;
    }

    match message_type(&msg) {
        Some(v4::MessageType::Offer) => Response::Offer(extract_reply(&msg, server_mac)),
        Some(v4::MessageType::Ack) => Response::Ack(extract_reply(&msg, server_mac)),
        Some(v4::MessageType::Nak) => Response::Nak,
        other => {
            tracing::debug!("Ignoring unexpected message type {:?}", other);
            Response::Timeout
        }
    }
}

fn extract_reply(msg: &v4::Message, server_mac: MacAddr) -> Reply {
    let lease_time = msg
        .opts()
        .get(v4::OptionCode::AddressLeaseTime)
        .and_then(|opt| {
            if let v4::DhcpOption::AddressLeaseTime(secs) = opt {
                Some(*secs)
            } else {
                None
            }
        });

    let server_identifier = msg
        .opts()
        .get(v4::OptionCode::ServerIdentifier)
        .and_then(|opt| {
            if let v4::DhcpOption::ServerIdentifier(ip) = opt {
                Some(*ip)
            } else {
                None
            }
        });

    Reply {
        your_ip: msg.yiaddr(),
        lease_time,
        server_identifier,
        server_mac,
    }
}
