use std::io;
use thiserror::Error;

/// Defines all possible errors for raw socket operations.
#[derive(Error, Debug)]
pub enum SocketError {
    #[error("Failed to create a new packet socket")]
    CreateSocket(#[source] io::Error),

    #[error("Interface '{0}' does not exist")]
    UnknownInterface(String),

    #[error("Failed to bind packet socket to interface '{interface}'")]
    BindToInterface {
        interface: String,
        #[source]
        source: io::Error,
    },

    #[error("Failed to set socket to non-blocking mode")]
    SetNonBlocking(#[source] io::Error),

    #[error("Failed to register socket with the tokio reactor")]
    Register(#[source] io::Error),

    #[allow(dead_code)]
    #[error("Packet sockets are not implemented on this platform")]
    NotImplemented,
}

#[derive(Error, Debug)]
pub enum SwarmError {
    #[error("Socket operation failed")]
    Socket(#[from] SocketError),

    #[error("I/O error")]
    Io(#[from] io::Error),

    #[error("Failed to encode DHCP message")]
    Encode(#[from] dhcproto::error::EncodeError),

    #[error("Interface '{0}' not found or has no default route")]
    InterfaceInvalid(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("DHCP protocol error: {0}")]
    Protocol(String),

    #[error("Simulation reached a critical failure: {0}")]
    Critical(String),
}
