//! # dhcpswarm - A DHCPv4 Client Simulator
//!
//! dhcpswarm runs many independent simulated DHCPv4 clients against a live
//! server to load-test it or validate its behaviour. Each client performs the
//! complete DORA (Discover, Offer, Request, Acknowledge) exchange with a random
//! identity, then renews its lease indefinitely at the RFC 2131 T1/T2 points.
//!
//! ## Features
//!
//! - Per-client lease state machine with T1 (50%) renewal and one T2 (88.5%) retry
//! - Cross-client cooldown gate that stops retry storms against an unresponsive server
//! - Gratuitous ARP announcement after every successful renewal
//! - Asynchronous operation using Tokio, one task per client
//! - Pluggable link layer through the [`Transport`] trait
//!
//! ## Example
//!
//! ```rust,no_run
//! use dhcpswarm::{RawTransport, Simulation, SimulationConfig};
//! use std::net::Ipv4Addr;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = SimulationConfig::new("eth0".to_string(), Ipv4Addr::new(192, 168, 1, 1))
//!         .with_clients(50)
//!         .with_persist(true);
//!     let simulation = Simulation::new(config);
//!     let summary = simulation
//!         .run(|_| Ok(RawTransport::open("eth0")?))
//!         .await?;
//!     println!("{}", summary);
//!     Ok(())
//! }
//! ```

pub mod arp;
pub mod client;
pub mod config;
pub mod error;
pub mod gate;
pub mod network;
pub mod simulation;
pub mod transport;
pub mod v4;

pub use client::{ClientIdentity, ClientState, Lease, LeaseEngine, Termination};
pub use config::{Args, SimulationConfig};
pub use error::{SocketError, SwarmError};
pub use gate::{CoordinationGate, GateOutcome};
pub use network::RawTransport;
pub use simulation::{Simulation, Summary};
pub use transport::Transport;
