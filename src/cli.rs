//! Command line interface for the `streamwire` probe binary.
//!
//! The binary sends payloads to a broker over one multiplexed connection and
//! prints each reply. This module is also compiled by the build script to
//! render the man page, so it depends on `clap` and `std` only.

use std::net::SocketAddr;

use clap::Parser;

/// Command line arguments for the `streamwire` binary.
#[derive(Debug, Parser)]
#[command(
    name = "streamwire",
    version,
    about = "Send requests to a broker over a multiplexed connection"
)]
pub struct Cli {
    /// Broker address as `host:port`.
    #[arg(short, long, default_value = "127.0.0.1:9092")]
    pub addr: String,
    /// Request payload sent as UTF-8 bytes.
    #[arg(short, long, default_value = "ping")]
    pub payload: String,
    /// Number of requests to pipeline on the connection.
    #[arg(short = 'n', long, default_value_t = 1)]
    pub count: usize,
    /// Total attempts per request, including the first.
    #[arg(long, default_value_t = 3)]
    pub attempts: u32,
    /// Admission budget for in-flight request bytes.
    #[arg(long)]
    pub max_queued_bytes: Option<usize>,
    /// Connect timeout in milliseconds.
    #[arg(long, default_value_t = 10_000)]
    pub connect_timeout_ms: u64,
    /// Serve Prometheus metrics on this address while running.
    #[arg(long)]
    pub metrics_listen: Option<SocketAddr>,
}
