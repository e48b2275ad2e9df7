//! Errors surfaced by the sender and receiver drivers.
//!
//! Protocol-level trouble (loss, corruption, duplicates, reordering) never
//! shows up here; it is absorbed by retransmission and deduplication.  What
//! remains are local failures and, optionally, an unresponsive peer.

use thiserror::Error;

use crate::config::ConfigError;
use crate::socket::SocketError;

#[derive(Debug, Error)]
pub enum TransferError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Socket(#[from] SocketError),

    /// Writing to the output collaborator failed.
    #[error("output stream error: {0}")]
    Output(#[source] std::io::Error),

    #[error("peer unresponsive: segment {seq} unacknowledged after {retries} retransmissions")]
    MaxRetriesExceeded { seq: u32, retries: u32 },

    #[error("input needs {segments} segments, more than the sequence space holds")]
    InputTooLarge { segments: usize },
}
