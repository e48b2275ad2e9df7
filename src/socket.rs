//! Async UDP socket abstraction.
//!
//! [`Socket`] is a thin wrapper around `tokio::net::UdpSocket` that speaks
//! [`crate::packet::Segment`] instead of raw bytes.  All protocol logic lives
//! elsewhere; this module owns only datagram I/O.

use std::io;
use std::net::SocketAddr;

use thiserror::Error;
use tokio::net::UdpSocket;

use crate::packet::{PacketError, Segment};

/// Receive buffer size.  Larger than any datagram a peer should send, so an
/// oversized one is seen whole and rejected by the length check.
const RECV_BUFFER: usize = 65_535;

/// Errors that can arise from socket operations.
#[derive(Debug, Error)]
pub enum SocketError {
    /// Underlying I/O error from the OS.
    #[error("socket I/O error: {0}")]
    Io(#[from] io::Error),
    /// The received datagram could not be decoded as a valid segment.
    #[error("segment decode error: {0}")]
    Packet(#[from] PacketError),
}

impl SocketError {
    /// `true` for errors that say nothing about the local socket and are
    /// handled like a lost datagram: decode failures, and the ICMP-driven
    /// resets some platforms report after sending to a closed port.
    pub fn is_transient(&self) -> bool {
        match self {
            SocketError::Packet(_) => true,
            SocketError::Io(e) => matches!(
                e.kind(),
                io::ErrorKind::ConnectionReset | io::ErrorKind::ConnectionRefused
            ),
        }
    }
}

/// An async, segment-oriented UDP socket.
///
/// All methods are `&self` so the socket can be shared across tasks if needed.
#[derive(Debug)]
pub struct Socket {
    /// Address this socket is bound to (filled in after OS assigns ephemeral port).
    pub local_addr: SocketAddr,
    inner: UdpSocket,
}

impl Socket {
    /// Bind a new socket to `local_addr`.
    ///
    /// Passing `0.0.0.0:0` lets the OS choose an ephemeral port.
    pub async fn bind(local_addr: SocketAddr) -> Result<Self, SocketError> {
        let inner = UdpSocket::bind(local_addr).await?;
        let local_addr = inner.local_addr()?;
        Ok(Self { local_addr, inner })
    }

    /// Bind an ephemeral port in the same address family as `peer`.
    pub async fn bind_for(peer: SocketAddr) -> Result<Self, SocketError> {
        let any: SocketAddr = if peer.is_ipv4() {
            ([0, 0, 0, 0], 0).into()
        } else {
            ([0u16; 8], 0).into()
        };
        Self::bind(any).await
    }

    /// Encode `segment` and send it as a single UDP datagram to `dest`.
    pub async fn send_segment(
        &self,
        segment: &Segment,
        dest: SocketAddr,
    ) -> Result<(), SocketError> {
        self.send_raw(&segment.encode(), dest).await
    }

    /// Send already-serialised segment bytes (used for retransmissions).
    pub async fn send_raw(&self, bytes: &[u8], dest: SocketAddr) -> Result<(), SocketError> {
        self.inner.send_to(bytes, dest).await?;
        Ok(())
    }

    /// Receive the next datagram and decode it into a [`Segment`].
    ///
    /// Returns `(segment, sender_address)`.  Datagrams that fail to decode are
    /// returned as `Err` — the caller decides whether to retry.  Cancel-safe:
    /// no datagram is consumed unless this future completes.
    pub async fn recv_from(&self) -> Result<(Segment, SocketAddr), SocketError> {
        let mut buf = vec![0u8; RECV_BUFFER];
        let (n, addr) = self.inner.recv_from(&mut buf).await?;
        let segment = Segment::decode(&buf[..n])?;
        Ok((segment, addr))
    }
}
