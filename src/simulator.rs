//! Fault-injecting UDP relay for exercising the protocol's recovery paths.
//!
//! Real networks drop, reorder, duplicate, and corrupt datagrams.  To test
//! the reliability mechanisms without depending on actual network
//! conditions, [`Simulator`] sits between a sender and a receiver:
//!
//! ```text
//!  Sender ──▶ Simulator ──upstream──▶ Receiver
//!         ◀──           ◀─downstream─
//! ```
//!
//! The sender is pointed at the simulator's address; the first datagram that
//! does not come from the upstream address fixes the client, and everything
//! the upstream sends back is relayed to it.  Each direction applies its own
//! [`FaultModel`]:
//!
//! | Fault        | Description                                          |
//! |--------------|------------------------------------------------------|
//! | Loss         | Drop a datagram with probability `loss_rate`.        |
//! | Duplication  | Deliver a datagram twice.                            |
//! | Reordering   | Hold a datagram for `reorder_delay` so later ones    |
//! |              | overtake it.                                         |
//! | Corruption   | Flip one random bit.                                 |
//! | Scripted     | Drop the datagrams at the listed indices.            |
//!
//! All randomness comes from one seeded `StdRng`, so a failing test replays
//! identically from its seed.

use std::collections::HashSet;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use log::{debug, trace};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::net::UdpSocket;
use tokio::task::JoinHandle;

use crate::socket::SocketError;

/// Faults applied to one direction of traffic.
///
/// All probabilities are in the range `[0.0, 1.0]`.
#[derive(Debug, Clone, Default)]
pub struct FaultModel {
    pub loss_rate: f64,
    pub duplicate_rate: f64,
    pub reorder_rate: f64,
    pub reorder_delay: Duration,
    pub corrupt_rate: f64,
    /// Zero-based indices (per direction) of datagrams to drop unconditionally.
    pub drop_indices: HashSet<u64>,
}

impl FaultModel {
    /// Drop exactly the datagrams at `indices`, nothing else.
    pub fn drop_only(indices: impl IntoIterator<Item = u64>) -> Self {
        Self {
            drop_indices: indices.into_iter().collect(),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct SimulatorConfig {
    /// Applied to datagrams travelling towards the upstream (receiver).
    pub upstream: FaultModel,
    /// Applied to datagrams travelling back to the client (sender).
    pub downstream: FaultModel,
    pub seed: u64,
}

/// A fault-injecting relay between one client and one upstream address.
#[derive(Debug)]
pub struct Simulator {
    socket: Arc<UdpSocket>,
    upstream: SocketAddr,
    config: SimulatorConfig,
}

/// What happens to one relayed datagram.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Fate {
    Drop,
    Deliver { copies: u8, delay: Option<Duration>, flip_bit: Option<usize> },
}

impl Simulator {
    /// Bind the relay on `local` (use port 0 for an ephemeral port).
    pub async fn bind(
        local: SocketAddr,
        upstream: SocketAddr,
        config: SimulatorConfig,
    ) -> Result<Self, SocketError> {
        let socket = UdpSocket::bind(local).await?;
        Ok(Self {
            socket: Arc::new(socket),
            upstream,
            config,
        })
    }

    /// Address the client should send to.
    pub fn local_addr(&self) -> Result<SocketAddr, SocketError> {
        Ok(self.socket.local_addr()?)
    }

    /// Run the relay in a background task until the handle is aborted.
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.relay())
    }

    async fn relay(self) {
        let mut rng = StdRng::seed_from_u64(self.config.seed);
        let mut client: Option<SocketAddr> = None;
        let mut sent_up = 0u64;
        let mut sent_down = 0u64;
        let mut buf = vec![0u8; 65_535];

        loop {
            let (n, from) = match self.socket.recv_from(&mut buf).await {
                Ok(v) => v,
                Err(e) => {
                    trace!("[sim] recv error: {e}");
                    continue;
                }
            };

            let (dest, model, index) = if from == self.upstream {
                let Some(dest) = client else {
                    trace!("[sim] upstream spoke before any client; dropping");
                    continue;
                };
                sent_down += 1;
                (dest, &self.config.downstream, sent_down - 1)
            } else {
                client = Some(from);
                sent_up += 1;
                (self.upstream, &self.config.upstream, sent_up - 1)
            };

            let fate = decide(&mut rng, model, index, n);
            let mut datagram = buf[..n].to_vec();
            match fate {
                Fate::Drop => debug!("[sim] drop #{index} → {dest} ({n} bytes)"),
                Fate::Deliver { copies, delay, flip_bit } => {
                    if let Some(bit) = flip_bit {
                        datagram[bit / 8] ^= 1 << (bit % 8);
                        debug!("[sim] corrupt #{index} → {dest} (bit {bit})");
                    }
                    if copies > 1 {
                        debug!("[sim] duplicate #{index} → {dest}");
                    }
                    for _ in 0..copies {
                        self.forward(datagram.clone(), dest, delay).await;
                    }
                }
            }
        }
    }

    /// Send now, or after `delay` from a detached task.
    ///
    /// Undelayed datagrams are sent inline so they leave in arrival order.
    async fn forward(&self, datagram: Vec<u8>, dest: SocketAddr, delay: Option<Duration>) {
        let Some(delay) = delay else {
            if let Err(e) = self.socket.send_to(&datagram, dest).await {
                trace!("[sim] forward to {dest} failed: {e}");
            }
            return;
        };
        let socket = Arc::clone(&self.socket);
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Err(e) = socket.send_to(&datagram, dest).await {
                trace!("[sim] delayed forward to {dest} failed: {e}");
            }
        });
    }
}

fn decide(rng: &mut StdRng, model: &FaultModel, index: u64, len: usize) -> Fate {
    if model.drop_indices.contains(&index) || chance(rng, model.loss_rate) {
        return Fate::Drop;
    }
    let copies = if chance(rng, model.duplicate_rate) { 2 } else { 1 };
    let delay = chance(rng, model.reorder_rate).then_some(model.reorder_delay);
    let flip_bit = (len > 0 && chance(rng, model.corrupt_rate)).then(|| rng.gen_range(0..len * 8));
    Fate::Deliver { copies, delay, flip_bit }
}

/// Draw from `rng` only when the fault is enabled, so a zero-rate fault does
/// not shift the random sequence of the others.
fn chance(rng: &mut StdRng, p: f64) -> bool {
    p > 0.0 && rng.gen_bool(p.min(1.0))
}
