//! Receive-side state machine.
//!
//! [`ReceiveWindow`] consumes validated segments and decides, for each one,
//! which payloads become deliverable and which cumulative ACK to send back:
//!
//! - In-order DATA (`seq == expected`) is delivered immediately, followed by
//!   any buffered successors that have become contiguous.
//! - DATA ahead of `expected` but inside the window is buffered.
//! - DATA at or beyond `expected + window_size` is dropped without a reply.
//! - Old DATA is re-acknowledged but never delivered twice.
//!
//! Every reply is `ACK(expected)`: the receiver never acknowledges data it
//! has not yet delivered in order.
//!
//! This module only manages state; all socket I/O is the caller's
//! responsibility (see [`crate::receiver::Receiver`]).

use std::collections::BTreeMap;

use crate::packet::{Segment, SegmentKind};
use crate::state::ReceiverState;

/// What the caller must do after feeding one segment to [`ReceiveWindow`].
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Reaction {
    /// Sequence number to acknowledge, if a reply is due.
    pub ack: Option<u32>,
    /// Payloads to hand to the output stream, in order.
    pub delivered: Vec<Vec<u8>>,
    /// `true` when the connection closed and the stream has ended.
    pub end_of_stream: bool,
    /// How the segment was classified.
    pub disposition: Disposition,
}

/// Classification of one inbound segment, mainly for logging and stats.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Not applicable in the current state; no reply.
    #[default]
    Ignored,
    /// CONNECT accepted; connection opened.
    Opened,
    /// CONNECT while already connected; re-acknowledged only.
    Reopened,
    /// CLOSE accepted; connection closed.
    Closed,
    /// In-order DATA delivered (possibly along with buffered successors).
    Delivered,
    /// Out-of-order DATA held until the gap fills.
    Buffered,
    /// CLOSE arrived while DATA before it is still missing; re-acknowledged only.
    Premature,
    /// DATA below `expected`; already delivered.
    Duplicate,
    /// DATA or CLOSE at or beyond `expected + window_size`; dropped.
    OutOfWindow,
}

impl Reaction {
    fn ignored() -> Self {
        Self::default()
    }

    fn ignored_with(disposition: Disposition) -> Self {
        Self {
            disposition,
            ..Self::default()
        }
    }

    fn ack(seq: u32, disposition: Disposition) -> Self {
        Self {
            ack: Some(seq),
            disposition,
            ..Self::default()
        }
    }
}

/// Receive-side state for one endpoint.
#[derive(Debug)]
pub struct ReceiveWindow {
    pub state: ReceiverState,

    /// Next sequence number the output stream is waiting for.
    pub expected: u32,

    /// Number of sequence numbers, starting at `expected`, that may be held.
    window_size: u32,

    /// Out-of-order payloads; every key is strictly greater than `expected`.
    buffer: BTreeMap<u32, Vec<u8>>,
}

impl ReceiveWindow {
    /// # Panics
    ///
    /// Panics if `window_size` is zero.
    pub fn new(window_size: u32) -> Self {
        assert!(window_size >= 1, "window_size must be at least 1");
        Self {
            state: ReceiverState::Idle,
            expected: 0,
            window_size,
            buffer: BTreeMap::new(),
        }
    }

    /// Number of out-of-order payloads currently held.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Apply one checksum-verified segment.
    pub fn on_segment(&mut self, segment: Segment) -> Reaction {
        let seq = segment.seq();
        match (self.state, segment.kind()) {
            (ReceiverState::Idle, SegmentKind::Connect) => {
                self.expected = 1;
                self.buffer.clear();
                self.state = ReceiverState::Connected;
                Reaction::ack(self.expected, Disposition::Opened)
            }
            (ReceiverState::Connected, SegmentKind::Connect) => {
                Reaction::ack(self.expected, Disposition::Reopened)
            }
            (ReceiverState::Connected, SegmentKind::Close) => self.on_close(seq),
            (ReceiverState::Connected, SegmentKind::Data) => self.on_data(seq, segment.payload),
            _ => Reaction::ignored(),
        }
    }

    fn on_close(&mut self, seq: u32) -> Reaction {
        if !self.in_window(seq) {
            return Reaction::ignored_with(Disposition::OutOfWindow);
        }
        if seq != self.expected {
            // DATA still missing ahead of CLOSE; keep waiting for it.
            return Reaction::ack(self.expected, Disposition::Premature);
        }
        self.state = ReceiverState::Idle;
        self.buffer.clear();
        Reaction {
            end_of_stream: true,
            ..Reaction::ack(seq.wrapping_add(1), Disposition::Closed)
        }
    }

    fn on_data(&mut self, seq: u32, payload: Vec<u8>) -> Reaction {
        if !self.in_window(seq) {
            return Reaction::ignored_with(Disposition::OutOfWindow);
        }
        if seq < self.expected {
            return Reaction::ack(self.expected, Disposition::Duplicate);
        }
        if seq > self.expected {
            self.buffer.insert(seq, payload);
            return Reaction::ack(self.expected, Disposition::Buffered);
        }

        let mut delivered = vec![payload];
        self.expected += 1;
        while let Some(next) = self.buffer.remove(&self.expected) {
            delivered.push(next);
            self.expected += 1;
        }
        Reaction {
            delivered,
            ..Reaction::ack(self.expected, Disposition::Delivered)
        }
    }

    /// `false` for anything at or beyond `expected + window_size`.
    fn in_window(&self, seq: u32) -> bool {
        u64::from(seq) < u64::from(self.expected) + u64::from(self.window_size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn connected(window: u32) -> ReceiveWindow {
        let mut r = ReceiveWindow::new(window);
        r.on_segment(Segment::connect());
        r
    }

    fn data(seq: u32, payload: &[u8]) -> Segment {
        Segment::data(seq, payload.to_vec())
    }

    #[test]
    fn connect_opens_and_acks_one() {
        let mut r = ReceiveWindow::new(4);
        let reaction = r.on_segment(Segment::connect());
        assert_eq!(reaction.ack, Some(1));
        assert_eq!(reaction.disposition, Disposition::Opened);
        assert_eq!(r.state, ReceiverState::Connected);
        assert_eq!(r.expected, 1);
    }

    #[test]
    fn data_and_close_ignored_while_idle() {
        let mut r = ReceiveWindow::new(4);
        assert_eq!(r.on_segment(data(1, b"x")), Reaction::ignored());
        assert_eq!(r.on_segment(Segment::close(1)), Reaction::ignored());
        assert_eq!(r.state, ReceiverState::Idle);
    }

    #[test]
    fn ack_segments_are_ignored() {
        let mut r = connected(4);
        assert_eq!(r.on_segment(Segment::ack(3)).ack, None);
        assert_eq!(r.expected, 1);
    }

    #[test]
    fn repeated_connect_does_not_reset() {
        let mut r = connected(4);
        r.on_segment(data(1, b"a"));
        r.on_segment(data(3, b"c"));
        let reaction = r.on_segment(Segment::connect());
        assert_eq!(reaction.ack, Some(2));
        assert_eq!(reaction.disposition, Disposition::Reopened);
        assert!(reaction.delivered.is_empty());
        assert_eq!(r.expected, 2);
        assert_eq!(r.buffered(), 1);
    }

    #[test]
    fn in_order_data_delivered() {
        let mut r = connected(4);
        let reaction = r.on_segment(data(1, b"hello"));
        assert_eq!(reaction.delivered, vec![b"hello".to_vec()]);
        assert_eq!(reaction.ack, Some(2));
        assert_eq!(r.expected, 2);
    }

    #[test]
    fn gap_fill_drains_buffer_with_one_ack() {
        let mut r = connected(4);
        assert_eq!(r.on_segment(data(3, b"c")).ack, Some(1));
        assert_eq!(r.on_segment(data(2, b"b")).ack, Some(1));
        assert_eq!(r.buffered(), 2);

        let reaction = r.on_segment(data(1, b"a"));
        assert_eq!(
            reaction.delivered,
            vec![b"a".to_vec(), b"b".to_vec(), b"c".to_vec()]
        );
        assert_eq!(reaction.ack, Some(4));
        assert_eq!(r.buffered(), 0);
    }

    #[test]
    fn out_of_window_data_dropped_without_reply() {
        let mut r = connected(3);
        // expected = 1, window = 3: sequence 4 is the first one outside.
        let reaction = r.on_segment(data(4, b"far"));
        assert_eq!(reaction.ack, None);
        assert_eq!(reaction.disposition, Disposition::OutOfWindow);
        assert_eq!(r.buffered(), 0);

        assert_eq!(r.on_segment(data(3, b"near")).ack, Some(1));
        assert_eq!(r.buffered(), 1);
    }

    #[test]
    fn out_of_window_close_dropped_without_reply() {
        let mut r = connected(2);
        // expected = 1, window = 2: CLOSE(3) lies just outside.
        let reaction = r.on_segment(Segment::close(3));
        assert_eq!(reaction.ack, None);
        assert_eq!(reaction.disposition, Disposition::OutOfWindow);
        assert!(!reaction.end_of_stream);
        assert_eq!(r.state, ReceiverState::Connected);

        let far = r.on_segment(Segment::close(u32::MAX));
        assert_eq!(far.disposition, Disposition::OutOfWindow);
        assert_eq!(r.on_segment(data(1, b"a")).ack, Some(2));
    }

    #[test]
    fn duplicate_data_reacked_not_redelivered() {
        let mut r = connected(4);
        r.on_segment(data(1, b"a"));
        let reaction = r.on_segment(data(1, b"a"));
        assert!(reaction.delivered.is_empty());
        assert_eq!(reaction.ack, Some(2));
        assert_eq!(reaction.disposition, Disposition::Duplicate);
    }

    #[test]
    fn duplicate_buffered_data_overwrites() {
        let mut r = connected(4);
        r.on_segment(data(2, b"stale"));
        r.on_segment(data(2, b"fresh"));
        assert_eq!(r.buffered(), 1);
        let reaction = r.on_segment(data(1, b"a"));
        assert_eq!(reaction.delivered[1], b"fresh".to_vec());
    }

    #[test]
    fn buffer_keys_stay_above_expected() {
        let mut r = connected(8);
        for seq in [5, 3, 7, 2, 1, 6, 4] {
            r.on_segment(data(seq, &[seq as u8]));
            assert!(r.buffer.keys().all(|&k| k > r.expected));
        }
        assert_eq!(r.expected, 8);
    }

    #[test]
    fn close_in_order_ends_stream() {
        let mut r = connected(4);
        r.on_segment(data(1, b"a"));
        let reaction = r.on_segment(Segment::close(2));
        assert_eq!(reaction.ack, Some(3));
        assert!(reaction.end_of_stream);
        assert_eq!(reaction.disposition, Disposition::Closed);
        assert_eq!(r.state, ReceiverState::Idle);
    }

    #[test]
    fn early_close_waits_for_missing_data() {
        let mut r = connected(4);
        r.on_segment(data(2, b"b"));
        let reaction = r.on_segment(Segment::close(3));
        assert_eq!(reaction.ack, Some(1));
        assert_eq!(reaction.disposition, Disposition::Premature);
        assert!(!reaction.end_of_stream);
        assert_eq!(r.state, ReceiverState::Connected);
        assert_eq!(r.buffered(), 1);

        assert_eq!(r.on_segment(data(1, b"a")).ack, Some(3));
        assert!(r.on_segment(Segment::close(3)).end_of_stream);
    }

    #[test]
    fn close_for_empty_stream() {
        let mut r = connected(1);
        let reaction = r.on_segment(Segment::close(1));
        assert_eq!(reaction.ack, Some(2));
        assert!(reaction.end_of_stream);
    }

    #[test]
    fn reconnect_after_close_resets_state() {
        let mut r = connected(4);
        r.on_segment(data(1, b"a"));
        r.on_segment(Segment::close(2));
        assert_eq!(r.on_segment(Segment::connect()).ack, Some(1));
        assert_eq!(r.expected, 1);
    }

    #[test]
    fn any_permutation_yields_same_stream() {
        let chunks: Vec<Vec<u8>> = (1..=6u8).map(|i| vec![i; i as usize]).collect();
        let expected: Vec<u8> = chunks.concat();
        let orders: [[u32; 6]; 4] = [
            [1, 2, 3, 4, 5, 6],
            [6, 5, 4, 3, 2, 1],
            [2, 4, 6, 1, 3, 5],
            [3, 1, 2, 6, 4, 5],
        ];
        for order in orders {
            let mut r = connected(6);
            let mut out = Vec::new();
            for seq in order {
                let reaction = r.on_segment(Segment::data(seq, chunks[seq as usize - 1].clone()));
                out.extend(reaction.delivered.concat());
            }
            assert_eq!(out, expected, "order {order:?}");
        }
    }
}
