//! Probe binary sending requests to a broker through `streamwire`.
//!
//! Pipelines `--count` copies of the payload on one connection and prints
//! each reply, or the error that ended its retries.

mod cli;

use std::{error::Error, sync::Arc, time::Duration};

use bytes::Bytes;
use clap::Parser;
use futures::future::join_all;
use log::info;
use streamwire::{ConnectionConfig, CountingProbe, Probe, RpcClient, retry::RetryPolicy};

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    // Applications embedding the library should install their own subscriber.
    tracing_subscriber::fmt::init();

    let cli = cli::Cli::parse();
    let counters = Arc::new(CountingProbe::default());
    let published = metrics_probe(&cli)?;
    let summarize = published.is_none();
    let probe = published.unwrap_or_else(|| Arc::clone(&counters) as Arc<dyn Probe>);
    let mut config = ConnectionConfig::new(cli.addr)
        .connect_timeout(Some(Duration::from_millis(cli.connect_timeout_ms)));
    if let Some(bytes) = cli.max_queued_bytes {
        config = config.max_queued_bytes(bytes);
    }
    let client = RpcClient::builder(config)
        .retry_policy(RetryPolicy {
            attempts: cli.attempts,
            ..RetryPolicy::default()
        })
        .probe(probe)
        .build();

    client.connect().await?;
    let payload = Bytes::from(cli.payload.into_bytes());
    let replies = join_all((0..cli.count).map(|_| client.call_raw(payload.clone()))).await;
    client.stop().await;
    if summarize {
        info!("client probes: {}", counters.snapshot());
    }

    for (index, reply) in replies.into_iter().enumerate() {
        match reply {
            Ok(bytes) => println!("{index}: {}", String::from_utf8_lossy(&bytes)),
            Err(error) => eprintln!("{index}: {error}"),
        }
    }
    Ok(())
}

/// Probe publishing to Prometheus when `--metrics-listen` is given.
#[cfg(feature = "metrics")]
fn metrics_probe(cli: &cli::Cli) -> Result<Option<Arc<dyn Probe>>, Box<dyn Error>> {
    use metrics_exporter_prometheus::PrometheusBuilder;
    use streamwire::MetricsProbe;

    let Some(listen) = cli.metrics_listen else {
        return Ok(None);
    };
    PrometheusBuilder::new()
        .with_http_listener(listen)
        .install()?;
    Ok(Some(Arc::new(MetricsProbe)))
}

#[cfg(not(feature = "metrics"))]
fn metrics_probe(cli: &cli::Cli) -> Result<Option<Arc<dyn Probe>>, Box<dyn Error>> {
    if cli.metrics_listen.is_some() {
        log::warn!("--metrics-listen ignored: built without the `metrics` feature");
    }
    Ok(None)
}
