use super::frame::MacAddr;
use crate::error::SwarmError;
use dhcproto::{v4, Encodable as _, Encoder};
use std::net::Ipv4Addr;

fn boot_request(mac_addr: &MacAddr, xid: u32) -> v4::Message {
    let mut msg = v4::Message::default();
    msg.set_opcode(v4::Opcode::BootRequest)
        .set_chaddr(mac_addr)
        .set_htype(v4::HType::Eth) // Ethernet
        .set_hops(0)
        .set_xid(xid) // Transaction ID
        .set_secs(0)
        .set_flags(v4::Flags::default().set_broadcast())
        .set_ciaddr(Ipv4Addr::UNSPECIFIED);

    // Client Identifier (Option 61): htype Ethernet followed by the MAC address
    let mut client_id = Vec::with_capacity(1 + mac_addr.len());
    client_id.push(1);
    client_id.extend_from_slice(mac_addr);
    msg.opts_mut()
        .insert(v4::DhcpOption::ClientIdentifier(client_id));

    msg
}

fn encode(msg: &v4::Message) -> Result<Vec<u8>, SwarmError> {
    let mut buffer = Vec::new();
    let mut encoder = Encoder::new(&mut buffer);
    msg.encode(&mut encoder)?;
    Ok(buffer)
}

/// Constructs a DHCP Discover payload.
pub fn build_dhcp_discover(mac_addr: &MacAddr, xid: u32) -> Result<Vec<u8>, SwarmError> {
    let mut msg = boot_request(mac_addr, xid);

    // DHCP Message Type (Option 53) - DHCPDISCOVER
    msg.opts_mut()
        .insert(v4::DhcpOption::MessageType(v4::MessageType::Discover));

    encode(&msg)
}

/// Constructs a DHCP Request payload, used both for selecting an offer and for renewal.
pub fn build_dhcp_request(
    mac_addr: &MacAddr,
    xid: u32,
    requested_ip: Ipv4Addr,
    server_ip: Ipv4Addr,
) -> Result<Vec<u8>, SwarmError> {
    let mut msg = boot_request(mac_addr, xid);

    // DHCP Message Type (Option 53) - DHCPREQUEST
    msg.opts_mut()
        .insert(v4::DhcpOption::MessageType(v4::MessageType::Request));

    // Server Identifier (Option 54)
    msg.opts_mut()
        .insert(v4::DhcpOption::ServerIdentifier(server_ip));

    // Requested IP Address (Option 50)
    msg.opts_mut()
        .insert(v4::DhcpOption::RequestedIpAddress(requested_ip));

    encode(&msg)
}
