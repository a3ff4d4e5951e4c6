#![allow(dead_code)]

use async_trait::async_trait;
use bytes::Bytes;
use dhcproto::{v4, Decodable, Decoder, Encodable, Encoder};
use dhcpswarm::{
    arp::ArpPacket,
    transport::{FrameFilter, Transport},
    v4::frame::{decode_udp, encode_udp, Addressing, MacAddr, DHCP_CLIENT_PORT, DHCP_SERVER_PORT},
    CoordinationGate, SimulationConfig, SwarmError,
};
use std::{
    collections::VecDeque,
    net::Ipv4Addr,
    sync::{Arc, Mutex},
    time::Duration,
};
use tokio::time::Instant;

pub const SERVER_IP: Ipv4Addr = Ipv4Addr::new(10, 0, 0, 1);
pub const SERVER_MAC: MacAddr = [0x00, 0x50, 0x56, 0x00, 0x00, 0x01];
pub const CLIENT_MAC: MacAddr = [0x02, 0x0c, 0x29, 0xa8, 0x92, 0xf4];
pub const TIMEOUT: Duration = Duration::from_millis(100);

/// How the scripted server answers one DHCPREQUEST.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Ack { lease_time: u32, ip: Option<Ipv4Addr> },
    /// An ACK without the lease time option.
    BareAck,
    Nak,
    Silent,
}

impl Verdict {
    pub fn ack(lease_time: u32) -> Self {
        Verdict::Ack {
            lease_time,
            ip: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ServerScript {
    /// Address offered in reply to DISCOVER; `None` ignores DISCOVERs.
    pub offer: Option<Ipv4Addr>,
    /// Answers to successive REQUESTs.
    pub requests: Vec<Verdict>,
    /// Answer once `requests` is exhausted.
    pub then: Verdict,
    /// Also emit a reply for a different transaction before each real one.
    pub noise: bool,
}

impl ServerScript {
    pub fn healthy(offer: Ipv4Addr, lease_time: u32) -> Self {
        Self {
            offer: Some(offer),
            requests: Vec::new(),
            then: Verdict::ack(lease_time),
            noise: false,
        }
    }

    pub fn absent() -> Self {
        Self {
            offer: None,
            requests: Vec::new(),
            then: Verdict::Silent,
            noise: false,
        }
    }

    pub fn answering(offer: Ipv4Addr, requests: Vec<Verdict>, then: Verdict) -> Self {
        Self {
            offer: Some(offer),
            requests,
            then,
            noise: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sent {
    Discover { xid: u32 },
    Request { xid: u32, requested: Option<Ipv4Addr>, server: Option<Ipv4Addr> },
    Arp(ArpPacket),
}

#[derive(Debug, Clone)]
pub struct SentFrame {
    pub at: Instant,
    pub sent: Sent,
}

struct State {
    pending: VecDeque<Bytes>,
    sent: Vec<SentFrame>,
    requests_seen: usize,
}

/// A transport wired straight to a scripted DHCP server.
#[derive(Clone)]
pub struct MockTransport {
    script: Arc<ServerScript>,
    state: Arc<Mutex<State>>,
}

impl MockTransport {
    pub fn new(script: ServerScript) -> Self {
        Self {
            script: Arc::new(script),
            state: Arc::new(Mutex::new(State {
                pending: VecDeque::new(),
                sent: Vec::new(),
                requests_seen: 0,
            })),
        }
    }

    pub fn sent(&self) -> Vec<SentFrame> {
        self.state.lock().unwrap().sent.clone()
    }

    pub fn requests(&self) -> Vec<SentFrame> {
        self.sent()
            .into_iter()
            .filter(|frame| matches!(frame.sent, Sent::Request { .. }))
            .collect()
    }

    fn respond(&self, state: &mut State, request: &v4::Message, msg_type: v4::MessageType) {
        let reply = match msg_type {
            v4::MessageType::Discover => match self.script.offer {
                Some(ip) => Some((v4::MessageType::Offer, ip, None)),
                None => None,
            },
            v4::MessageType::Request => {
                let verdict = self
                    .script
                    .requests
                    .get(state.requests_seen)
                    .copied()
                    .unwrap_or(self.script.then);
                state.requests_seen += 1;
                let requested = match request.opts().get(v4::OptionCode::RequestedIpAddress) {
                    Some(v4::DhcpOption::RequestedIpAddress(ip)) => *ip,
                    _ => Ipv4Addr::UNSPECIFIED,
                };
                match verdict {
                    Verdict::Ack { lease_time, ip } => Some((
                        v4::MessageType::Ack,
                        ip.unwrap_or(requested),
                        Some(lease_time),
                    )),
                    Verdict::BareAck => Some((v4::MessageType::Ack, requested, None)),
                    Verdict::Nak => Some((v4::MessageType::Nak, Ipv4Addr::UNSPECIFIED, None)),
                    Verdict::Silent => None,
                }
            }
            _ => None,
        };

        if let Some((reply_type, ip, lease_time)) = reply {
            if self.script.noise {
                state.pending.push_back(server_frame(
                    request.xid().wrapping_add(1),
                    reply_type,
                    ip,
                    lease_time,
                ));
            }
            state
                .pending
                .push_back(server_frame(request.xid(), reply_type, ip, lease_time));
        }
    }
}

pub fn server_frame(
    xid: u32,
    msg_type: v4::MessageType,
    your_ip: Ipv4Addr,
    lease_time: Option<u32>,
) -> Bytes {
    let mut msg = v4::Message::default();
    msg.set_opcode(v4::Opcode::BootReply)
        .set_xid(xid)
        .set_yiaddr(your_ip);
    msg.opts_mut().insert(v4::DhcpOption::MessageType(msg_type));
    msg.opts_mut()
        .insert(v4::DhcpOption::ServerIdentifier(SERVER_IP));
    if let Some(secs) = lease_time {
        msg.opts_mut().insert(v4::DhcpOption::AddressLeaseTime(secs));
    }

    let mut payload = Vec::new();
    msg.encode(&mut Encoder::new(&mut payload)).unwrap();

    let addressing = Addressing {
        src_mac: SERVER_MAC,
        dst_mac: [0xff; 6],
        src_ip: SERVER_IP,
        dst_ip: Ipv4Addr::BROADCAST,
        src_port: DHCP_SERVER_PORT,
        dst_port: DHCP_CLIENT_PORT,
    };
    encode_udp(&addressing, &payload)
}

#[async_trait]
impl Transport for MockTransport {
    async fn send_frame(&self, frame: Bytes) -> Result<(), SwarmError> {
        let mut state = self.state.lock().unwrap();
        let at = Instant::now();
        state.pending.clear();

        if let Some(packet) = ArpPacket::from_frame(&frame) {
            state.sent.push(SentFrame {
                at,
                sent: Sent::Arp(packet),
            });
            return Ok(());
        }

        let datagram = decode_udp(&frame).expect("client sent a non-UDP frame");
        assert_eq!(datagram.addressing.dst_port, DHCP_SERVER_PORT);
        let msg = v4::Message::decode(&mut Decoder::new(datagram.payload))
            .expect("client sent an undecodable DHCP message");
        let msg_type = match msg.opts().get(v4::OptionCode::MessageType) {
            Some(v4::DhcpOption::MessageType(msg_type)) => *msg_type,
            other => panic!("client message without a type: {:?}", other),
        };

        let sent = match msg_type {
            v4::MessageType::Discover => Sent::Discover { xid: msg.xid() },
            v4::MessageType::Request => Sent::Request {
                xid: msg.xid(),
                requested: match msg.opts().get(v4::OptionCode::RequestedIpAddress) {
                    Some(v4::DhcpOption::RequestedIpAddress(ip)) => Some(*ip),
                    _ => None,
                },
                server: match msg.opts().get(v4::OptionCode::ServerIdentifier) {
                    Some(v4::DhcpOption::ServerIdentifier(ip)) => Some(*ip),
                    _ => None,
                },
            },
            other => panic!("unexpected client message {:?}", other),
        };
        state.sent.push(SentFrame { at, sent });
        self.respond(&mut state, &msg, msg_type);
        Ok(())
    }

    async fn capture_one(
        &self,
        filter: FrameFilter<'_>,
        timeout: Duration,
    ) -> Result<Option<Bytes>, SwarmError> {
        {
            let mut state = self.state.lock().unwrap();
            if let Some(position) = state.pending.iter().position(|frame| filter(&frame[..])) {
                let frame = state.pending.remove(position);
                state.pending.clear();
                return Ok(frame);
            }
            state.pending.clear();
        }
        tokio::time::sleep(timeout).await;
        Ok(None)
    }
}

pub fn config(persist: bool) -> Arc<SimulationConfig> {
    Arc::new(
        SimulationConfig::new("lo".to_string(), SERVER_IP)
            .with_persist(persist)
            .with_response_timeout(TIMEOUT),
    )
}

pub fn gate(config: &SimulationConfig) -> Arc<CoordinationGate> {
    Arc::new(CoordinationGate::from_config(config))
}

/// Seconds elapsed between `start` and `at`.
pub fn offset(start: Instant, at: Instant) -> f64 {
    (at - start).as_secs_f64()
}

pub fn assert_near(actual: f64, expected: f64) {
    assert!(
        (actual - expected).abs() < 0.01,
        "expected t={expected}s, got t={actual}s"
    );
}
