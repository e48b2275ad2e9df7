//! Entry point for `rtp`.
//!
//! Parses CLI arguments and dispatches into either **send** or **recv** mode.
//! All protocol work is delegated to the library; `main.rs` owns only process
//! setup (logging, argument parsing, stdin/stdout plumbing).

use std::net::SocketAddr;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use tokio::io::AsyncReadExt;

use rtp_over_udp::config::{DEFAULT_MAX_RETRIES, TransferConfig};
use rtp_over_udp::packet::MAX_PAYLOAD;
use rtp_over_udp::{Receiver, Sender};

/// Reliable byte-stream transfer over UDP.
#[derive(Parser)]
#[command(author, version, about)]
struct Cli {
    #[command(subcommand)]
    mode: Mode,
}

#[derive(Subcommand)]
enum Mode {
    /// Read stdin to completion and deliver it to a receiver.
    Send {
        #[command(flatten)]
        endpoint: Endpoint,
        #[command(flatten)]
        tuning: Tuning,
    },
    /// Receive one stream and write it to stdout.
    Recv {
        #[command(flatten)]
        endpoint: Endpoint,
    },
}

#[derive(Args)]
struct Endpoint {
    /// Address of the host the receiver runs on.
    receiver_ip: String,
    /// Port the receiver listens on.
    receiver_port: u16,
    /// Maximum number of outstanding segments.
    window_size: u32,
}

#[derive(Args)]
struct Tuning {
    /// Retransmission timeout of the in-flight window, in milliseconds.
    #[arg(long, default_value_t = 500)]
    retransmit_ms: u64,
    /// Consecutive timeouts without progress before giving up.
    #[arg(long, default_value_t = DEFAULT_MAX_RETRIES, conflicts_with = "retry_forever")]
    max_retries: u32,
    /// Never give up on an unresponsive receiver.
    #[arg(long)]
    retry_forever: bool,
    /// Largest DATA payload in bytes.
    #[arg(long, default_value_t = MAX_PAYLOAD)]
    max_payload: usize,
}

impl Endpoint {
    async fn resolve(&self) -> Result<SocketAddr> {
        let mut addrs = tokio::net::lookup_host((self.receiver_ip.as_str(), self.receiver_port))
            .await
            .with_context(|| format!("resolving {}", self.receiver_ip))?;
        match addrs.next() {
            Some(addr) => Ok(addr),
            None => bail!("{} did not resolve to any address", self.receiver_ip),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr; RUST_LOG controls verbosity.
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = Cli::parse();

    match cli.mode {
        Mode::Send { endpoint, tuning } => {
            let peer = endpoint.resolve().await?;
            let config = TransferConfig {
                window_size: endpoint.window_size,
                max_payload: tuning.max_payload,
                retransmit_interval: Duration::from_millis(tuning.retransmit_ms),
                max_retries: (!tuning.retry_forever).then_some(tuning.max_retries),
            };

            let mut input = Vec::new();
            tokio::io::stdin()
                .read_to_end(&mut input)
                .await
                .context("reading stdin")?;

            let sender = Sender::connect(peer, config).await.context("opening socket")?;
            let stats = sender.transfer(&input).await?;
            log::info!("sent {} bytes: {stats:?}", stats.bytes);
        }
        Mode::Recv { endpoint } => {
            let addr = endpoint.resolve().await?;
            let config = TransferConfig::with_window(endpoint.window_size);
            let receiver = Receiver::bind(addr, &config)
                .await
                .with_context(|| format!("binding {addr}"))?;

            let mut stdout = tokio::io::stdout();
            let stats = receiver.run(&mut stdout).await?;
            log::info!("received {} bytes: {stats:?}", stats.bytes_delivered);
        }
    }

    Ok(())
}
