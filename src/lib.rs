//! `rtp-over-udp` — a minimal reliable byte-stream transfer over UDP.
//!
//! # Architecture
//!
//! ```text
//!  stdin                                                   stdout
//!    │                                                        ▲
//!  ┌─▼────────┐   CONNECT / DATA / CLOSE   ┌──────────┐       │
//!  │  Sender  │───────────────────────────▶│ Receiver │───────┘
//!  └────┬─────┘                            └─────┬────┘
//!       │◀──────────── cumulative ACKs ──────────┘
//!       │
//!  ┌────▼───────────────┐            ┌──────────────────┐
//!  │ SendWindow + Timer │            │  ReceiveWindow   │
//!  │ (pure state)       │            │  (pure state)    │
//!  └────────────────────┘            └──────────────────┘
//!       │ raw UDP datagrams                 │
//!  ┌────▼──────────────────────────────────▼─┐
//!  │   Socket (thin async wrapper over tokio) │
//!  └──────────────────────────────────────────┘
//! ```
//!
//! Each module has a single responsibility:
//! - [`packet`]       — wire format (serialise / parse / checksum)
//! - [`send_window`]  — sliding-window bookkeeping for the sender
//! - [`recv_window`]  — in-order delivery state machine for the receiver
//! - [`timer`]        — the shared retransmission deadline
//! - [`sender`]       — async sending endpoint (fragment, transmit, retransmit)
//! - [`receiver`]     — async receiving endpoint (validate, reorder, deliver)
//! - [`state`]        — finite-state-machine types
//! - [`socket`]       — async UDP socket abstraction
//! - [`simulator`]    — lossy/reordering relay for testing
//! - [`config`]       — transfer parameters
//! - [`error`]        — driver-level error type

pub mod config;
pub mod error;
pub mod packet;
pub mod receiver;
pub mod recv_window;
pub mod send_window;
pub mod sender;
pub mod simulator;
pub mod socket;
pub mod state;
pub mod timer;

pub use config::TransferConfig;
pub use error::TransferError;
pub use receiver::{ReceiveStats, Receiver};
pub use sender::{Sender, TransferStats};
