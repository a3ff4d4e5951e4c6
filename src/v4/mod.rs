//! DHCPv4 wire handling
//!
//! This module contains the DHCPv4-specific pieces used by the lease engine:
//! - Ethernet/IPv4/UDP framing
//! - Message construction
//! - Reply correlation and classification

pub mod classify;
pub mod frame;
pub mod message;

pub use classify::{classify, matches, Reply, Response};
pub use frame::{format_mac, MacAddr};
pub use message::{build_dhcp_discover, build_dhcp_request};
