use crate::error::SwarmError;
use clap::Parser;
use std::{net::Ipv4Addr, time::Duration};

/// Multiplier applied to the response timeout to obtain the gate's cooldown window.
pub const COOLDOWN_FACTOR: u32 = 100;

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Args {
    /// The network interface to send and capture frames on (e.g., 'eth0')
    #[arg(short, long)]
    pub interface: String,

    /// The DHCP server to target; defaults to the interface's default gateway
    #[arg(short, long)]
    pub server: Option<Ipv4Addr>,

    /// Number of clients to simulate concurrently
    #[arg(short = 'n', long, default_value_t = 1)]
    pub clients: usize,

    /// Keep simulating after an unanswered exchange, backing off with a cooldown
    #[arg(short, long)]
    pub persist: bool,

    /// Response timeout in seconds (fractions allowed)
    #[arg(short, long, default_value = "0.1", value_parser = parse_seconds)]
    pub timeout: Duration,

    /// Delay in seconds between launching consecutive clients
    #[arg(long, default_value = "0", value_parser = parse_seconds)]
    pub stagger: Duration,
}

fn parse_seconds(value: &str) -> Result<Duration, String> {
    let secs: f64 = value
        .parse()
        .map_err(|e| format!("'{value}' is not a number of seconds: {e}"))?;
    Duration::try_from_secs_f64(secs).map_err(|e| format!("'{value}' is not a valid duration: {e}"))
}

/// Settings shared by every simulated client. Built once, never mutated.
#[derive(Debug, Clone)]
pub struct SimulationConfig {
    pub interface: String,
    pub server: Ipv4Addr,
    pub persist: bool,
    pub response_timeout: Duration,
    pub clients: usize,
    pub stagger: Duration,
}

impl SimulationConfig {
    pub fn new(interface: String, server: Ipv4Addr) -> Self {
        Self {
            interface,
            server,
            persist: false,
            response_timeout: Duration::from_millis(100),
            clients: 1,
            stagger: Duration::ZERO,
        }
    }

    pub fn from_args(args: Args, server: Ipv4Addr) -> Result<Self, SwarmError> {
        let config = Self::new(args.interface, server)
            .with_persist(args.persist)
            .with_response_timeout(args.timeout)
            .with_clients(args.clients)
            .with_stagger(args.stagger);
        config.validate()?;
        Ok(config)
    }

    pub fn with_persist(mut self, persist: bool) -> Self {
        self.persist = persist;
        self
    }

    pub fn with_response_timeout(mut self, timeout: Duration) -> Self {
        self.response_timeout = timeout;
        self
    }

    pub fn with_clients(mut self, clients: usize) -> Self {
        self.clients = clients;
        self
    }

    pub fn with_stagger(mut self, stagger: Duration) -> Self {
        self.stagger = stagger;
        self
    }

    /// How long the gate holder sleeps before releasing the floor.
    pub fn cooldown(&self) -> Duration {
        self.response_timeout * COOLDOWN_FACTOR
    }

    pub fn validate(&self) -> Result<(), SwarmError> {
        if self.interface.is_empty() {
            return Err(SwarmError::InvalidConfig(
                "interface must not be empty".to_string(),
            ));
        }
        if self.clients == 0 {
            return Err(SwarmError::InvalidConfig(
                "at least one client must be simulated".to_string(),
            ));
        }
        if self.response_timeout.is_zero() {
            return Err(SwarmError::InvalidConfig(
                "response timeout must be greater than zero".to_string(),
            ));
        }
        if self.server.is_unspecified() || self.server.is_broadcast() {
            return Err(SwarmError::InvalidConfig(format!(
                "{} is not a usable server address",
                self.server
            )));
        }
        Ok(())
    }
}
