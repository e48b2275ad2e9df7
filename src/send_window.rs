//! Sliding-window send-side bookkeeping.
//!
//! [`SendWindow`] tracks which segments of one transfer are in flight and
//! which have been acknowledged.  Segments are numbered, not bytes: CONNECT is
//! 0, DATA chunks are `1..=n`, CLOSE is `n + 1`, and the transfer is complete
//! once the receiver acknowledges `n + 2`.
//!
//! # Protocol contract
//!
//! - At most `window_size` segments are outstanding: `next - base ≤ window_size`.
//! - ACKs are **cumulative**: `ACK(K)` confirms every segment below `K`.
//! - On timeout the caller resends every in-flight segment from `base`.
//!
//! This module only manages state; all socket I/O is the caller's responsibility.

use std::collections::BTreeMap;

/// Send-side window state for one transfer.
///
/// ```text
///   base              next           base + window_size
///    │                  │                   │
///  ──┼──────────────────┼───────────────────┼──────▶ seq space
///    │ <── in flight ──▶│ <──── sendable ──▶│
/// ```
#[derive(Debug)]
pub struct SendWindow {
    /// Lowest unacknowledged sequence number (left window edge).
    pub base: u32,

    /// Sequence number to assign to the next new segment.
    pub next: u32,

    /// Maximum number of segments outstanding at once.
    window_size: u32,

    /// Number of segments in the whole transfer, CONNECT and CLOSE included.
    total: u32,

    /// Serialised bytes of every in-flight segment, keyed by sequence number.
    in_flight: BTreeMap<u32, Vec<u8>>,
}

impl SendWindow {
    /// Create a window for a transfer of `total` segments.
    ///
    /// # Panics
    ///
    /// Panics if `window_size` is zero.
    pub fn new(total: u32, window_size: u32) -> Self {
        assert!(window_size >= 1, "window_size must be at least 1");
        Self {
            base: 0,
            next: 0,
            window_size,
            total,
            in_flight: BTreeMap::new(),
        }
    }

    /// `true` when the next segment exists and fits in the window.
    pub fn can_send(&self) -> bool {
        self.next < self.total && self.next - self.base < self.window_size
    }

    /// Number of segments currently awaiting acknowledgement.
    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    pub fn total(&self) -> u32 {
        self.total
    }

    /// `true` once the terminal acknowledgement has been observed.
    pub fn is_complete(&self) -> bool {
        self.base >= self.total
    }

    /// Record the serialised segment just transmitted as `next` and advance.
    ///
    /// # Panics
    ///
    /// Panics in debug mode if the window is already full.  Check
    /// [`can_send`](Self::can_send) before calling.
    pub fn record_sent(&mut self, bytes: Vec<u8>) -> u32 {
        debug_assert!(
            self.can_send(),
            "record_sent called on a full window (base={} next={} size={})",
            self.base,
            self.next,
            self.window_size
        );
        let seq = self.next;
        self.in_flight.insert(seq, bytes);
        self.next += 1;
        seq
    }

    /// Process a cumulative ACK.
    ///
    /// Drops every in-flight record below `ack`, advances `base`, and returns
    /// the number of newly acknowledged segments.  Returns `0` for a stale
    /// or duplicate ACK (`ack ≤ base`) and for an ACK beyond `next`, which a
    /// correct receiver can never produce.
    pub fn on_ack(&mut self, ack: u32) -> u32 {
        if ack <= self.base || ack > self.next {
            return 0;
        }
        let acked = ack - self.base;
        self.in_flight = self.in_flight.split_off(&ack);
        self.base = ack;
        acked
    }

    /// In-flight segments in `[base, min(next, base + window_size))`, oldest
    /// first.  Used to retransmit the whole window on timeout.
    pub fn unacked(&self) -> impl Iterator<Item = (u32, &[u8])> {
        let end = self.next.min(self.base.saturating_add(self.window_size));
        self.in_flight
            .range(self.base..end)
            .map(|(seq, bytes)| (*seq, bytes.as_slice()))
    }
}
