//! Retransmission timer for the sender's window.
//!
//! One deadline covers the whole in-flight set rather than one per segment.
//! It is re-armed after every retransmission and whenever an ACK advances
//! the window; an advancing ACK also clears the count of consecutive
//! timeouts.  The interval is fixed: there is no RTT estimation or back-off.
//!
//! Deadlines are `tokio::time::Instant`s so the event loop can wait on them
//! with `sleep_until` and tests can drive them with a paused clock.

use std::time::Duration;

use tokio::time::Instant;

/// Returned by [`RetransmitTimer::on_expiry`] once the retry budget is spent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetriesExhausted {
    pub retries: u32,
}

/// The single shared retransmission deadline of one transfer.
#[derive(Debug)]
pub struct RetransmitTimer {
    interval: Duration,
    deadline: Instant,
    /// Consecutive expiries since the last advancing ACK.
    retries: u32,
    max_retries: Option<u32>,
    /// Expiries over the whole transfer.
    total_expiries: u64,
}

impl RetransmitTimer {
    /// Create a timer armed to fire one `interval` from now.
    pub fn new(interval: Duration, max_retries: Option<u32>) -> Self {
        Self {
            interval,
            deadline: Instant::now() + interval,
            retries: 0,
            max_retries,
            total_expiries: 0,
        }
    }

    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    pub fn is_expired(&self) -> bool {
        Instant::now() >= self.deadline
    }

    pub fn retries(&self) -> u32 {
        self.retries
    }

    pub fn total_expiries(&self) -> u64 {
        self.total_expiries
    }

    /// Push the deadline one interval into the future.
    pub fn rearm(&mut self) {
        self.deadline = Instant::now() + self.interval;
    }

    /// An ACK advanced the window: the path is alive.
    pub fn on_progress(&mut self) {
        self.retries = 0;
        self.rearm();
    }

    /// Account for one expiry and re-arm.
    ///
    /// Returns [`Err`] once more than `max_retries` consecutive expiries have
    /// occurred without progress; the deadline is still re-armed so a caller
    /// that chooses to keep going can.
    pub fn on_expiry(&mut self) -> Result<(), RetriesExhausted> {
        self.retries += 1;
        self.total_expiries += 1;
        self.rearm();
        match self.max_retries {
            Some(max) if self.retries > max => Err(RetriesExhausted {
                retries: self.retries,
            }),
            _ => Ok(()),
        }
    }
}
