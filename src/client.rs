//! Simulated DHCP client
//!
//! This module contains the per-client lease engine:
//! - Identity generation
//! - The DORA exchange and the renewal cycle
//! - Failure routing through the coordination gate

use crate::{
    arp::{self, ArpPacket},
    config::SimulationConfig,
    error::SwarmError,
    gate::{CoordinationGate, GateOutcome},
    transport::Transport,
    v4::{
        self,
        classify::INFINITE_LEASE,
        frame::{encode_udp, Addressing, BROADCAST_MAC},
        format_mac, MacAddr, Reply, Response,
    },
};
use dhcproto::v4::MessageType;
use std::{net::Ipv4Addr, sync::Arc, time::Duration};
use tokio::{
    sync::watch,
    time::{self, Instant},
};

/// Fraction of the lease after which renewal starts (T1).
pub const RENEWAL_FRACTION: f64 = 0.5;
/// Fraction of the lease after which the single renewal retry is sent (T2).
pub const REBINDING_FRACTION: f64 = 0.885;

/// Synthetic hardware address and transaction ID, fixed for the engine's lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientIdentity {
    pub mac: MacAddr,
    pub xid: u32,
}

impl ClientIdentity {
    pub fn new(mac: MacAddr, xid: u32) -> Self {
        Self { mac, xid }
    }

    /// Random locally-administered unicast MAC and random transaction ID.
    pub fn random() -> Self {
        let mut mac: MacAddr = rand::random();
        mac[0] = (mac[0] & 0xfe) | 0x02;
        Self {
            mac,
            xid: rand::random(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientState {
    Init,
    Selecting,
    Requesting,
    Bound,
    Renewing,
    Terminated,
}

/// Lease held by one engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lease {
    pub ip: Option<Ipv4Addr>,
    pub lease_time: Option<u32>,
    pub server_identifier: Ipv4Addr,
    pub server_mac: Option<MacAddr>,
    pub state: ClientState,
}

/// Why an engine stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// Nothing answered the DISCOVER.
    NoOffer,
    /// The initial REQUEST went unanswered and this client sat out a cooldown.
    Declined,
    /// Another client was already cooling down.
    CooldownObserved,
    /// The renewal retry went unanswered.
    LeaseLost,
    /// Persistence is off and the server is unresponsive: everything must stop.
    GlobalStop,
    /// Stopped by the supervisor.
    Halted,
}

pub struct LeaseEngine<T> {
    config: Arc<SimulationConfig>,
    gate: Arc<CoordinationGate>,
    transport: T,
    identity: ClientIdentity,
    lease: Lease,
    status: watch::Sender<Lease>,
}

impl<T: Transport> LeaseEngine<T> {
    pub fn new(config: Arc<SimulationConfig>, gate: Arc<CoordinationGate>, transport: T) -> Self {
        Self::with_identity(config, gate, transport, ClientIdentity::random())
    }

    pub fn with_identity(
        config: Arc<SimulationConfig>,
        gate: Arc<CoordinationGate>,
        transport: T,
        identity: ClientIdentity,
    ) -> Self {
        let lease = Lease {
            ip: None,
            lease_time: None,
            server_identifier: config.server,
            server_mac: None,
            state: ClientState::Init,
        };
        let (status, _) = watch::channel(lease.clone());
        Self {
            config,
            gate,
            transport,
            identity,
            lease,
            status,
        }
    }

    pub fn identity(&self) -> ClientIdentity {
        self.identity
    }

    /// Watches the engine's lease as it changes.
    pub fn subscribe(&self) -> watch::Receiver<Lease> {
        self.status.subscribe()
    }

    fn set_state(&mut self, state: ClientState) {
        tracing::debug!("State: {:?} -> {:?}", self.lease.state, state);
        self.lease.state = state;
        self.status.send_replace(self.lease.clone());
    }

    fn terminate(&mut self, termination: Termination) -> Result<Termination, SwarmError> {
        self.set_state(ClientState::Terminated);
        tracing::info!("Client terminated: {:?}", termination);
        Ok(termination)
    }

    async fn discover(&self) -> Result<(), SwarmError> {
        tracing::info!("D: {:#010x}", self.identity.xid);
        let payload = v4::build_dhcp_discover(&self.identity.mac, self.identity.xid)?;
        let frame = encode_udp(&Addressing::client_broadcast(self.identity.mac), &payload);
        self.transport.send_frame(frame).await
    }

    async fn request(&self, requested_ip: Ipv4Addr) -> Result<(), SwarmError> {
        tracing::info!("R: {:#010x}", self.identity.xid);
        let payload = v4::build_dhcp_request(
            &self.identity.mac,
            self.identity.xid,
            requested_ip,
            self.lease.server_identifier,
        )?;
        let frame = encode_udp(&Addressing::client_broadcast(self.identity.mac), &payload);
        self.transport.send_frame(frame).await
    }

    /// Waits for the reply to the pending transaction. A NAK is always accepted.
    async fn await_reply(&self, wanted: MessageType) -> Result<Response, SwarmError> {
        let xid = self.identity.xid;
        let expected = [wanted, MessageType::Nak];
        let filter = move |frame: &[u8]| v4::matches(frame, xid, &expected);
        let captured = self
            .transport
            .capture_one(&filter, self.config.response_timeout)
            .await?;
        let response = v4::classify(captured.as_ref(), xid);
        if response == Response::Nak {
            tracing::warn!("Received DHCP NAK");
        }
        Ok(response)
    }

    async fn request_lease(&self, requested_ip: Ipv4Addr) -> Result<Response, SwarmError> {
        self.request(requested_ip).await?;
        self.await_reply(MessageType::Ack).await
    }

    /// Stores an ACK and returns the lease duration, or `None` for an infinite lease.
    fn bind(&mut self, ack: Reply) -> Result<Option<Duration>, SwarmError> {
        let lease_time = ack
            .lease_time
            .or(self.lease.lease_time)
            .ok_or_else(|| SwarmError::Protocol("ACK carries no lease time".to_string()))?;
        if lease_time == 0 {
            return Err(SwarmError::Protocol("ACK grants a zero lease time".to_string()));
        }
        if self.lease.ip.is_some_and(|ip| ip != ack.your_ip) {
            tracing::info!("Server moved lease to {}", ack.your_ip);
        }
        tracing::info!(
            "DHCP ACK from {}: bound to {} for {}s",
            format_mac(&ack.server_mac),
            ack.your_ip,
            lease_time
        );

        self.lease.ip = Some(ack.your_ip);
        self.lease.lease_time = Some(lease_time);
        self.lease.server_mac = Some(ack.server_mac);
        self.set_state(ClientState::Bound);

        Ok((lease_time != INFINITE_LEASE).then(|| Duration::from_secs(u64::from(lease_time))))
    }

    /// Binds a renewal ACK and announces the (possibly new) address.
    async fn renewed(&mut self, ack: Reply) -> Result<Option<Duration>, SwarmError> {
        let lease_time = self.bind(ack)?;
        let packet = ArpPacket::is_at(
            self.identity.mac,
            self.current_ip()?,
            self.lease.server_mac.unwrap_or(BROADCAST_MAC),
            self.lease.server_identifier,
        );
        arp::announce(&self.transport, &packet).await;
        Ok(lease_time)
    }

    /// Drives the client from INIT until it terminates.
    ///
    /// Returns `Err` only for local failures such as an unusable transport;
    /// an unresponsive server is reported as a [`Termination`].
    pub async fn run(mut self) -> Result<Termination, SwarmError> {
        self.set_state(ClientState::Selecting);
        self.discover().await?;
        let offer = match self.await_reply(MessageType::Offer).await? {
            Response::Offer(offer) => offer,
            _ => return self.terminate(Termination::NoOffer),
        };

        tracing::info!("Received DHCP OFFER of {}", offer.your_ip);
        self.lease.ip = Some(offer.your_ip);
        if let Some(server_id) = offer.server_identifier {
            self.lease.server_identifier = server_id;
        }
        self.set_state(ClientState::Requesting);

        let ack = match self.request_lease(offer.your_ip).await? {
            Response::Ack(ack) => ack,
            _ => {
                let termination = match self.gate.try_enter_cooldown().await {
                    GateOutcome::Stop => Termination::GlobalStop,
                    GateOutcome::CooldownObserved => Termination::CooldownObserved,
                    GateOutcome::ProceedAfterWait => Termination::Declined,
                };
                return self.terminate(termination);
            }
        };
        let mut lease_time = self.bind(ack)?;

        loop {
            let Some(duration) = lease_time else {
                tracing::info!("Lease is infinite, no renewal scheduled");
                return std::future::pending().await;
            };

            let acked_at = Instant::now();
            let renew_at = acked_at + duration.mul_f64(RENEWAL_FRACTION);
            let rebind_at = acked_at + duration.mul_f64(REBINDING_FRACTION);
            time::sleep_until(renew_at).await;

            self.set_state(ClientState::Renewing);
            let ip = self.current_ip()?;
            if let Response::Ack(ack) = self.request_lease(ip).await? {
                lease_time = self.renewed(ack).await?;
                continue;
            }

            match self.gate.try_enter_cooldown().await {
                GateOutcome::Stop => return self.terminate(Termination::GlobalStop),
                GateOutcome::CooldownObserved => {
                    return self.terminate(Termination::CooldownObserved)
                }
                GateOutcome::ProceedAfterWait => {}
            }

            // A cooldown longer than the gap to T2 pushes the retry past it.
            time::sleep_until(rebind_at).await;
            if let Response::Ack(ack) = self.request_lease(ip).await? {
                lease_time = self.renewed(ack).await?;
                continue;
            }

            let termination = match self.gate.try_enter_cooldown().await {
                GateOutcome::Stop => Termination::GlobalStop,
                _ => Termination::LeaseLost,
            };
            return self.terminate(termination);
        }
    }

    fn current_ip(&self) -> Result<Ipv4Addr, SwarmError> {
        self.lease
            .ip
            .ok_or_else(|| SwarmError::Critical("bound without an address".to_string()))
    }
}
