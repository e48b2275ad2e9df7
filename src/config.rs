//! Transfer parameters shared by both endpoints.
//!
//! A [`TransferConfig`] is built once at startup (from CLI flags in
//! `main.rs`, or directly in tests) and never changes during a transfer.

use std::time::Duration;

use thiserror::Error;

use crate::packet::MAX_PAYLOAD;

/// Fixed retransmission interval of the shared window timer.
pub const DEFAULT_RETRANSMIT_INTERVAL: Duration = Duration::from_millis(500);

/// Consecutive timeouts without progress before the sender gives up.
pub const DEFAULT_MAX_RETRIES: u32 = 10;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferConfig {
    /// Segments that may be outstanding (sender) or held (receiver) at once.
    pub window_size: u32,
    /// Largest DATA payload; input is fragmented into chunks of this size.
    pub max_payload: usize,
    /// How long the in-flight window may go without an advancing ACK.
    pub retransmit_interval: Duration,
    /// Retry budget for an unresponsive peer; `None` retries forever.
    pub max_retries: Option<u32>,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            window_size: 8,
            max_payload: MAX_PAYLOAD,
            retransmit_interval: DEFAULT_RETRANSMIT_INTERVAL,
            max_retries: Some(DEFAULT_MAX_RETRIES),
        }
    }
}

impl TransferConfig {
    /// Default parameters with the given window size.
    pub fn with_window(window_size: u32) -> Self {
        Self {
            window_size,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.window_size == 0 {
            return Err(ConfigError::ZeroWindow);
        }
        if self.max_payload == 0 || self.max_payload > MAX_PAYLOAD {
            return Err(ConfigError::PayloadSize(self.max_payload));
        }
        if self.retransmit_interval.is_zero() {
            return Err(ConfigError::ZeroInterval);
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("window size must be at least 1")]
    ZeroWindow,
    #[error("max payload {0} outside the datagram budget (1..=1456)")]
    PayloadSize(usize),
    #[error("retransmit interval must be non-zero")]
    ZeroInterval,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let cfg = TransferConfig::default();
        assert_eq!(cfg.max_payload, 1456);
        assert_eq!(cfg.retransmit_interval, Duration::from_millis(500));
        assert_eq!(cfg.validate(), Ok(()));
    }

    #[test]
    fn zero_window_rejected() {
        assert_eq!(
            TransferConfig::with_window(0).validate(),
            Err(ConfigError::ZeroWindow)
        );
    }

    #[test]
    fn oversized_payload_rejected() {
        let cfg = TransferConfig {
            max_payload: MAX_PAYLOAD + 1,
            ..TransferConfig::default()
        };
        assert_eq!(cfg.validate(), Err(ConfigError::PayloadSize(MAX_PAYLOAD + 1)));
    }

    #[test]
    fn zero_interval_rejected() {
        let cfg = TransferConfig {
            retransmit_interval: Duration::ZERO,
            ..TransferConfig::default()
        };
        assert_eq!(cfg.validate(), Err(ConfigError::ZeroInterval));
    }
}
