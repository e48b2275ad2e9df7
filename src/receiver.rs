//! Receiving endpoint: validates datagrams and reassembles the byte stream.
//!
//! [`Receiver`] listens passively on a bound socket.  Each datagram that
//! decodes and verifies is fed to [`ReceiveWindow`]; the resulting
//! [`Reaction`](crate::recv_window::Reaction) says which payloads to write to
//! the output and which cumulative ACK to send back to the datagram's source.
//! Datagrams that fail to decode are dropped without a reply, exactly as if
//! the network had lost them.

use std::net::SocketAddr;

use log::{debug, info, trace};
use tokio::io::{AsyncWrite, AsyncWriteExt};

use crate::config::TransferConfig;
use crate::error::TransferError;
use crate::packet::Segment;
use crate::recv_window::{Disposition, Reaction, ReceiveWindow};
use crate::socket::{Socket, SocketError};
use crate::state::ReceiverState;

/// Counters for one received stream.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ReceiveStats {
    pub bytes_delivered: u64,
    /// DATA payloads written to the output.
    pub segments_delivered: u64,
    /// Out-of-order DATA held for later delivery.
    pub buffered: u64,
    /// DATA that had already been delivered.
    pub duplicates: u64,
    /// DATA or CLOSE beyond the receive window.
    pub out_of_window: u64,
    /// Datagrams dropped for failing to decode or verify.
    pub corrupt: u64,
}

/// The receiving endpoint.
#[derive(Debug)]
pub struct Receiver {
    socket: Socket,
    window: ReceiveWindow,
    /// Source of the accepted CONNECT; other addresses are ignored while connected.
    peer: Option<SocketAddr>,
    stats: ReceiveStats,
}

impl Receiver {
    pub fn new(socket: Socket, config: &TransferConfig) -> Result<Self, TransferError> {
        config.validate()?;
        Ok(Self {
            socket,
            window: ReceiveWindow::new(config.window_size),
            peer: None,
            stats: ReceiveStats::default(),
        })
    }

    /// Bind `addr` and wait there for a sender.
    pub async fn bind(addr: SocketAddr, config: &TransferConfig) -> Result<Self, TransferError> {
        let socket = Socket::bind(addr).await?;
        Self::new(socket, config)
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.socket.local_addr
    }

    /// Receive one stream into `output`.
    ///
    /// Every delivered payload is written and flushed before the next one.
    /// Returns after the in-order CLOSE has been acknowledged and `output`
    /// shut down.
    pub async fn run<W>(mut self, output: &mut W) -> Result<ReceiveStats, TransferError>
    where
        W: AsyncWrite + Unpin,
    {
        info!("[recv] listening on {}", self.socket.local_addr);
        loop {
            let (segment, from) = match self.socket.recv_from().await {
                Ok(v) => v,
                Err(SocketError::Packet(e)) => {
                    self.stats.corrupt += 1;
                    trace!("[recv] dropping datagram: {e}");
                    continue;
                }
                Err(e) if e.is_transient() => {
                    trace!("[recv] ignoring socket error: {e}");
                    continue;
                }
                Err(e) => return Err(e.into()),
            };

            let stranger = self.peer.is_some_and(|p| p != from);
            if self.window.state == ReceiverState::Connected && stranger {
                trace!("[recv] ignoring stranger {from}");
                continue;
            }

            let kind = segment.kind();
            let seq = segment.seq();
            let reaction = self.window.on_segment(segment);
            self.account(&reaction);

            if reaction.disposition == Disposition::Opened {
                self.peer = Some(from);
                info!("[recv] connection opened by {from}");
            }

            for chunk in &reaction.delivered {
                output.write_all(chunk).await.map_err(TransferError::Output)?;
                output.flush().await.map_err(TransferError::Output)?;
            }

            match reaction.ack {
                Some(ack) => {
                    self.reply(ack, from).await?;
                    debug!(
                        "[recv] ← {} seq={} {:?}; → ACK {}",
                        kind, seq, reaction.disposition, ack
                    );
                }
                None => trace!("[recv] ← {} seq={} {:?}", kind, seq, reaction.disposition),
            }

            if reaction.end_of_stream {
                output.shutdown().await.map_err(TransferError::Output)?;
                info!(
                    "[recv] connection closed: {} bytes in {} segment(s)",
                    self.stats.bytes_delivered, self.stats.segments_delivered
                );
                return Ok(self.stats);
            }
        }
    }

    async fn reply(&self, ack: u32, to: SocketAddr) -> Result<(), TransferError> {
        match self.socket.send_segment(&Segment::ack(ack), to).await {
            Ok(()) => Ok(()),
            Err(e) if e.is_transient() => {
                trace!("[recv] ACK {ack} lost locally: {e}");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    fn account(&mut self, reaction: &Reaction) {
        match reaction.disposition {
            Disposition::Buffered => self.stats.buffered += 1,
            Disposition::Duplicate => self.stats.duplicates += 1,
            Disposition::OutOfWindow => self.stats.out_of_window += 1,
            _ => {}
        }
        for chunk in &reaction.delivered {
            self.stats.segments_delivered += 1;
            self.stats.bytes_delivered += chunk.len() as u64;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn pair() -> (Receiver, Socket) {
        let config = TransferConfig::with_window(4);
        let receiver = Receiver::bind("127.0.0.1:0".parse().unwrap(), &config)
            .await
            .unwrap();
        let peer = Socket::bind("127.0.0.1:0".parse().unwrap()).await.unwrap();
        (receiver, peer)
    }

    async fn expect_ack(peer: &Socket, seq: u32) {
        let (segment, _) = peer.recv_from().await.unwrap();
        assert_eq!(segment, Segment::ack(seq));
    }

    #[tokio::test]
    async fn reorders_and_acks_over_loopback() {
        let (receiver, peer) = pair().await;
        let addr = receiver.local_addr();
        let task = tokio::spawn(async move {
            let mut out = Vec::new();
            let stats = receiver.run(&mut out).await.unwrap();
            (out, stats)
        });

        peer.send_segment(&Segment::connect(), addr).await.unwrap();
        expect_ack(&peer, 1).await;
        peer.send_segment(&Segment::data(2, b"world".to_vec()), addr).await.unwrap();
        expect_ack(&peer, 1).await;
        peer.send_segment(&Segment::data(1, b"hello ".to_vec()), addr).await.unwrap();
        expect_ack(&peer, 3).await;
        peer.send_segment(&Segment::data(1, b"hello ".to_vec()), addr).await.unwrap();
        expect_ack(&peer, 3).await;
        peer.send_segment(&Segment::close(3), addr).await.unwrap();
        expect_ack(&peer, 4).await;

        let (out, stats) = task.await.unwrap();
        assert_eq!(out, b"hello world");
        assert_eq!(stats.segments_delivered, 2);
        assert_eq!(stats.buffered, 1);
        assert_eq!(stats.duplicates, 1);
    }

    #[tokio::test]
    async fn corrupt_datagram_gets_no_reply() {
        let (receiver, peer) = pair().await;
        let addr = receiver.local_addr();
        let task = tokio::spawn(async move {
            let mut out = Vec::new();
            let stats = receiver.run(&mut out).await.unwrap();
            (out, stats)
        });

        peer.send_segment(&Segment::connect(), addr).await.unwrap();
        expect_ack(&peer, 1).await;

        let mut bytes = Segment::data(1, b"flipped".to_vec()).encode();
        bytes[20] ^= 0x01;
        peer.send_raw(&bytes, addr).await.unwrap();
        // The next reply must belong to the clean copy, not the corrupt one.
        peer.send_segment(&Segment::data(1, b"intact!".to_vec()), addr).await.unwrap();
        expect_ack(&peer, 2).await;
        peer.send_segment(&Segment::close(2), addr).await.unwrap();
        expect_ack(&peer, 3).await;

        let (out, stats) = task.await.unwrap();
        assert_eq!(out, b"intact!");
        assert_eq!(stats.corrupt, 1);
    }

    #[tokio::test]
    async fn stranger_ignored_while_connected() {
        let (receiver, peer) = pair().await;
        let stranger = Socket::bind("127.0.0.1:0".parse().unwrap()).await.unwrap();
        let addr = receiver.local_addr();
        let task = tokio::spawn(async move {
            let mut out = Vec::new();
            let stats = receiver.run(&mut out).await.unwrap();
            (out, stats)
        });

        peer.send_segment(&Segment::connect(), addr).await.unwrap();
        expect_ack(&peer, 1).await;

        stranger
            .send_segment(&Segment::data(1, b"evil".to_vec()), addr)
            .await
            .unwrap();
        peer.send_segment(&Segment::data(1, b"good".to_vec()), addr).await.unwrap();
        expect_ack(&peer, 2).await;
        peer.send_segment(&Segment::close(2), addr).await.unwrap();
        expect_ack(&peer, 3).await;

        let (out, stats) = task.await.unwrap();
        assert_eq!(out, b"good");
        assert_eq!(stats.segments_delivered, 1);

        let reply =
            tokio::time::timeout(std::time::Duration::from_millis(100), stranger.recv_from()).await;
        assert!(reply.is_err(), "stranger got a reply: {reply:?}");
    }
}

