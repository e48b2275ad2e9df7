//! Sending endpoint: fragments a byte stream and drives it through the window.
//!
//! # Event loop
//!
//! ```text
//!            ┌──────────────────────────────────────────────┐
//!            ▼                                              │
//!   deadline elapsed? ──yes──▶ resend [base, next) ──┐      │
//!            │ no                                    │      │
//!            ▼◀──────────────────────────────────────┘      │
//!   fill window with new DATA / CLOSE                       │
//!            │                                              │
//!            ▼                                              │
//!   select! { ACK arrives    → slide base, re-arm timer  ───┤
//!             deadline fires → (handled at loop top)     ───┘
//!   }
//! ```
//!
//! The loop has exactly two suspension points, raced in one `tokio::select!`:
//! waiting for an inbound datagram and waiting for the retransmission
//! deadline.  Neither can starve the other, and there is no shared state to
//! lock: the window and timer are locals owned by this task.

use std::net::SocketAddr;

use log::{debug, info, trace, warn};

use crate::config::TransferConfig;
use crate::error::TransferError;
use crate::packet::{Segment, SegmentKind};
use crate::send_window::SendWindow;
use crate::socket::{Socket, SocketError};
use crate::state::SenderState;
use crate::timer::RetransmitTimer;

/// Split `data` into consecutive chunks of at most `max_payload` bytes.
///
/// Empty input yields no chunks: the transfer is then just CONNECT + CLOSE.
pub fn fragment(data: &[u8], max_payload: usize) -> Vec<Vec<u8>> {
    data.chunks(max_payload).map(<[u8]>::to_vec).collect()
}

/// Summary of one completed transfer.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TransferStats {
    /// Input bytes carried by DATA segments.
    pub bytes: usize,
    /// Segments in the transfer, CONNECT and CLOSE included.
    pub segments: u32,
    /// Datagrams handed to the socket, retransmissions included.
    pub datagrams_sent: u64,
    /// Datagrams resent because the window timed out.
    pub retransmissions: u64,
    /// Expiries of the shared retransmission timer.
    pub timeouts: u64,
}

/// The sending endpoint of one transfer.
///
/// A `Sender` is consumed by [`transfer`](Sender::transfer); its socket is
/// released when the transfer ends.
#[derive(Debug)]
pub struct Sender {
    state: SenderState,
    socket: Socket,
    peer: SocketAddr,
    config: TransferConfig,
}

impl Sender {
    pub fn new(
        socket: Socket,
        peer: SocketAddr,
        config: TransferConfig,
    ) -> Result<Self, TransferError> {
        config.validate()?;
        Ok(Self {
            state: SenderState::Idle,
            socket,
            peer,
            config,
        })
    }

    /// Bind an ephemeral local port and prepare to send to `peer`.
    pub async fn connect(peer: SocketAddr, config: TransferConfig) -> Result<Self, TransferError> {
        let socket = Socket::bind_for(peer).await?;
        Self::new(socket, peer, config)
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.socket.local_addr
    }

    /// Deliver `data` to the receiver and return once it has acknowledged
    /// the CLOSE segment.
    ///
    /// Fails only on local socket errors, oversized input, or when the
    /// configured retry budget runs out against an unresponsive receiver.
    pub async fn transfer(mut self, data: &[u8]) -> Result<TransferStats, TransferError> {
        let chunks = fragment(data, self.config.max_payload);
        let segments = chunks.len() + 2;
        let total = u32::try_from(segments).map_err(|_| TransferError::InputTooLarge { segments })?;

        let mut window = SendWindow::new(total, self.config.window_size);
        let mut timer =
            RetransmitTimer::new(self.config.retransmit_interval, self.config.max_retries);
        let mut stats = TransferStats {
            bytes: data.len(),
            segments: total,
            ..TransferStats::default()
        };

        info!(
            "[send] {} bytes in {} DATA segment(s) to {} (window={})",
            data.len(),
            chunks.len(),
            self.peer,
            self.config.window_size
        );

        self.transmit_next(&mut window, &chunks, &mut stats).await?;
        self.set_state(SenderState::Sending);
        timer.rearm();

        while !window.is_complete() {
            if timer.is_expired() {
                if let Err(exhausted) = timer.on_expiry() {
                    if self.state == SenderState::Closing && window.base == total - 1 {
                        // Every DATA segment is acknowledged, so the receiver
                        // has the whole stream and has most likely exited
                        // after acking CLOSE; that final ACK was lost.
                        warn!(
                            "[send] CLOSE not acknowledged after {} retries; closing anyway",
                            exhausted.retries
                        );
                        break;
                    }
                    return Err(TransferError::MaxRetriesExceeded {
                        seq: window.base,
                        retries: exhausted.retries,
                    });
                }
                self.retransmit(&window, &mut stats).await?;
            }

            while window.can_send() {
                self.transmit_next(&mut window, &chunks, &mut stats).await?;
            }

            tokio::select! {
                result = self.socket.recv_from() => {
                    self.on_datagram(result, &mut window, &mut timer)?;
                }
                _ = tokio::time::sleep_until(timer.deadline()) => {}
            }
        }

        self.set_state(SenderState::Done);
        stats.timeouts = timer.total_expiries();
        info!(
            "[send] transfer complete: {} datagrams sent, {} retransmitted",
            stats.datagrams_sent, stats.retransmissions
        );
        Ok(stats)
    }

    /// Build, send, and record the segment numbered `window.next`.
    async fn transmit_next(
        &mut self,
        window: &mut SendWindow,
        chunks: &[Vec<u8>],
        stats: &mut TransferStats,
    ) -> Result<(), TransferError> {
        let seq = window.next;
        let segment = if seq == 0 {
            Segment::connect()
        } else if seq == window.total() - 1 {
            Segment::close(seq)
        } else {
            Segment::data(seq, chunks[(seq - 1) as usize].clone())
        };

        let bytes = segment.encode();
        self.emit(&bytes).await?;
        window.record_sent(bytes);
        stats.datagrams_sent += 1;
        debug!(
            "[send] → {} seq={} len={} in_flight={}",
            segment.kind(),
            seq,
            segment.payload.len(),
            window.in_flight()
        );

        if segment.kind() == SegmentKind::Close {
            self.set_state(SenderState::Closing);
        }
        Ok(())
    }

    /// Resend every in-flight segment of the current window.
    async fn retransmit(
        &self,
        window: &SendWindow,
        stats: &mut TransferStats,
    ) -> Result<(), TransferError> {
        let mut count = 0u64;
        for (_seq, bytes) in window.unacked() {
            self.emit(bytes).await?;
            count += 1;
        }
        debug!(
            "[send] timeout: retransmitted {} segment(s) from base={}",
            count, window.base
        );
        stats.retransmissions += count;
        stats.datagrams_sent += count;
        Ok(())
    }

    /// Handle the outcome of one receive attempt.
    fn on_datagram(
        &self,
        result: Result<(Segment, SocketAddr), SocketError>,
        window: &mut SendWindow,
        timer: &mut RetransmitTimer,
    ) -> Result<(), TransferError> {
        let (segment, from) = match result {
            Ok(v) => v,
            Err(e) if e.is_transient() => {
                trace!("[send] dropping datagram: {e}");
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        };

        if from != self.peer {
            trace!("[send] ignoring datagram from stranger {from}");
            return Ok(());
        }
        if segment.kind() != SegmentKind::Ack {
            trace!("[send] ignoring {} seq={}", segment.kind(), segment.seq());
            return Ok(());
        }

        let ack = segment.seq();
        let slid = window.on_ack(ack);
        if slid > 0 {
            timer.on_progress();
            debug!(
                "[send] ← ACK {} (slid {} seg) in_flight={}",
                ack,
                slid,
                window.in_flight()
            );
        } else {
            trace!("[send] ← stale ACK {} (base={})", ack, window.base);
        }
        Ok(())
    }

    /// Send raw segment bytes, treating ICMP-driven errors as loss.
    async fn emit(&self, bytes: &[u8]) -> Result<(), TransferError> {
        match self.socket.send_raw(bytes, self.peer).await {
            Ok(()) => Ok(()),
            Err(e) if e.is_transient() => {
                trace!("[send] send failed, treating as loss: {e}");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    fn set_state(&mut self, next: SenderState) {
        debug!("[send] {} → {}", self.state, next);
        self.state = next;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fragment_5000_bytes_at_1456() {
        let data = vec![7u8; 5000];
        let chunks = fragment(&data, 1456);
        let sizes: Vec<usize> = chunks.iter().map(Vec::len).collect();
        assert_eq!(sizes, vec![1456, 1456, 1456, 632]);
        assert_eq!(chunks.concat(), data);
    }

    #[test]
    fn fragment_exact_multiple() {
        let chunks = fragment(&[1u8; 20], 10);
        assert_eq!(chunks.len(), 2);
        assert!(chunks.iter().all(|c| c.len() == 10));
    }

    #[test]
    fn fragment_empty_input() {
        assert!(fragment(&[], 1456).is_empty());
    }

    #[tokio::test]
    async fn invalid_config_rejected() {
        let socket = Socket::bind("127.0.0.1:0".parse().unwrap()).await.unwrap();
        let peer = "127.0.0.1:9".parse().unwrap();
        let result = Sender::new(socket, peer, TransferConfig::with_window(0));
        assert!(matches!(result, Err(TransferError::Config(_))));
    }

    #[tokio::test]
    async fn ack_from_stranger_does_not_slide_window() {
        let socket = Socket::bind("127.0.0.1:0".parse().unwrap()).await.unwrap();
        let peer: SocketAddr = "127.0.0.1:9".parse().unwrap();
        let stranger: SocketAddr = "127.0.0.1:10".parse().unwrap();
        let sender = Sender::new(socket, peer, TransferConfig::with_window(4)).unwrap();

        let mut window = SendWindow::new(3, 4);
        window.record_sent(Segment::connect().encode());
        let mut timer = RetransmitTimer::new(std::time::Duration::from_secs(1), None);

        sender
            .on_datagram(Ok((Segment::ack(1), stranger)), &mut window, &mut timer)
            .unwrap();
        assert_eq!(window.base, 0);
        assert_eq!(window.in_flight(), 1);

        sender
            .on_datagram(Ok((Segment::ack(1), peer)), &mut window, &mut timer)
            .unwrap();
        assert_eq!(window.base, 1);
        assert_eq!(window.in_flight(), 0);
    }
}
