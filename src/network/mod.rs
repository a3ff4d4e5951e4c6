//! Link-layer access to a real network interface.

use crate::{
    error::{SocketError, SwarmError},
    transport::{FrameFilter, Transport},
};
use async_trait::async_trait;
use bytes::Bytes;
use std::{net::Ipv4Addr, time::Duration};

const ROUTE_TABLE_PATH: &str = "/proc/net/route";
#[cfg(target_os = "linux")]
const RECV_BUFFER_SIZE: usize = 1518;

/// Sends and captures whole Ethernet frames through an `AF_PACKET` socket.
pub struct RawTransport {
    #[cfg(target_os = "linux")]
    fd: tokio::io::unix::AsyncFd<socket2::Socket>,
    #[cfg(not(target_os = "linux"))]
    never: std::convert::Infallible,
}

impl RawTransport {
    /// Opens a packet socket that sees every frame on `interface`.
    ///
    /// Must be called from within a tokio runtime.
    #[cfg(target_os = "linux")]
    pub fn open(interface: &str) -> Result<Self, SocketError> {
        use socket2::{Domain, Protocol, Socket, Type};
        use std::{ffi::CString, io, os::fd::AsRawFd};

        let name =
            CString::new(interface).map_err(|_| SocketError::UnknownInterface(interface.to_string()))?;
        // SAFETY: `name` is a valid NUL-terminated string for the duration of the call.
        let ifindex = unsafe { libc::if_nametoindex(name.as_ptr()) };
        if ifindex == 0 {
            return Err(SocketError::UnknownInterface(interface.to_string()));
        }

        let protocol = (libc::ETH_P_ALL as u16).to_be();
        let socket = Socket::new(
            Domain::PACKET,
            Type::RAW,
            Some(Protocol::from(i32::from(protocol))),
        )
        .map_err(SocketError::CreateSocket)?;

        // SAFETY: an all-zero sockaddr_ll is a valid value; the fields that
        // matter are filled in below.
        let mut addr: libc::sockaddr_ll = unsafe { std::mem::zeroed() };
        addr.sll_family = libc::AF_PACKET as u16;
        addr.sll_protocol = protocol;
        addr.sll_ifindex = ifindex as i32;

        // SAFETY: the pointer and length describe `addr`, which outlives the call.
        let ret = unsafe {
            libc::bind(
                socket.as_raw_fd(),
                &addr as *const libc::sockaddr_ll as *const libc::sockaddr,
                std::mem::size_of::<libc::sockaddr_ll>() as libc::socklen_t,
            )
        };
        if ret < 0 {
            return Err(SocketError::BindToInterface {
                interface: interface.to_string(),
                source: io::Error::last_os_error(),
            });
        }

        socket
            .set_nonblocking(true)
            .map_err(SocketError::SetNonBlocking)?;
        let fd = tokio::io::unix::AsyncFd::new(socket).map_err(SocketError::Register)?;
        Ok(Self { fd })
    }

    /// Fallback for non-Linux systems where `AF_PACKET` is not available.
    #[cfg(not(target_os = "linux"))]
    pub fn open(_interface: &str) -> Result<Self, SocketError> {
        Err(SocketError::NotImplemented)
    }
}

#[cfg(target_os = "linux")]
impl RawTransport {
    /// Reads and drops every frame already queued on the socket.
    fn discard_queued(&self) -> std::io::Result<usize> {
        use std::io::{ErrorKind, Read as _};

        let mut socket = self.fd.get_ref();
        let mut buf = [0u8; RECV_BUFFER_SIZE];
        let mut discarded = 0;
        loop {
            match socket.read(&mut buf) {
                Ok(_) => discarded += 1,
                Err(e) if e.kind() == ErrorKind::WouldBlock => return Ok(discarded),
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
    }
}

#[cfg(target_os = "linux")]
#[async_trait]
impl Transport for RawTransport {
    async fn send_frame(&self, frame: Bytes) -> Result<(), SwarmError> {
        // Nothing received before this send can answer it.
        let discarded = self.discard_queued()?;
        if discarded > 0 {
            tracing::trace!("Discarded {} queued frames", discarded);
        }
        self.fd
            .async_io(tokio::io::Interest::WRITABLE, |socket| socket.send(&frame))
            .await?;
        Ok(())
    }

    async fn capture_one(
        &self,
        filter: FrameFilter<'_>,
        timeout: Duration,
    ) -> Result<Option<Bytes>, SwarmError> {
        use std::io::Read as _;

        let deadline = tokio::time::Instant::now() + timeout;
        let mut buf = vec![0u8; RECV_BUFFER_SIZE];
        loop {
            let read = self
                .fd
                .async_io(tokio::io::Interest::READABLE, |mut socket| socket.read(&mut buf));
            let len = match tokio::time::timeout_at(deadline, read).await {
                Ok(result) => result?,
                Err(_) => return Ok(None),
            };
            if filter(&buf[..len]) {
                return Ok(Some(Bytes::copy_from_slice(&buf[..len])));
            }
        }
    }
}

#[cfg(not(target_os = "linux"))]
#[async_trait]
impl Transport for RawTransport {
    async fn send_frame(&self, _frame: Bytes) -> Result<(), SwarmError> {
        match self.never {}
    }

    async fn capture_one(
        &self,
        _filter: FrameFilter<'_>,
        _timeout: Duration,
    ) -> Result<Option<Bytes>, SwarmError> {
        match self.never {}
    }
}

/// Finds the default-route gateway of `interface` in a `/proc/net/route` table.
pub fn parse_default_gateway(route_table: &str, interface: &str) -> Option<Ipv4Addr> {
    route_table.lines().skip(1).find_map(|line| {
        let mut fields = line.split_whitespace();
        let iface = fields.next()?;
        let destination = fields.next()?;
        let gateway = fields.next()?;
        if iface != interface || destination != "00000000" {
            return None;
        }
        // The kernel prints addresses as host-endian hex of the network-order bytes.
        let raw = u32::from_str_radix(gateway, 16).ok()?;
        Some(Ipv4Addr::from(raw.to_le_bytes()))
    })
}

/// Looks up the default gateway of `interface`, the usual home of its DHCP server.
pub async fn default_gateway(interface: &str) -> Result<Ipv4Addr, SwarmError> {
    let table = tokio::fs::read_to_string(ROUTE_TABLE_PATH).await?;
    parse_default_gateway(&table, interface)
        .ok_or_else(|| SwarmError::InterfaceInvalid(interface.to_string()))
}
