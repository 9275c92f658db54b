// SPDX-License-Identifier: MIT

//! Telemetry report collection daemon.
//!
//! Connects to a packet gateway, reassembles fragmented reports from field
//! devices and appends them to a CSV log, acknowledging senders along the
//! way.
//!
//! # Usage
//!
//! ```bash
//! # Collect reports from the gateway at 10.0.0.7:9002
//! telelogd 10.0.0.7:9002
//!
//! # Custom output file, local address and packet group
//! telelogd 10.0.0.7:9002 -o field-reports.txt -a 00FE -g 31
//!
//! # Raise verbosity (repeat for trace)
//! telelogd 10.0.0.7:9002 -D
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use clap::{ArgAction, Parser};
use tracing::info;
use tracing_subscriber::EnvFilter;

use telelog::{
    Address, Collector, CollectorConfig, Group, ReportFileWriter, UdpGateway, AMID_REPORTS,
};

/// Telemetry report collection daemon.
#[derive(Parser, Debug)]
#[command(name = "telelogd")]
#[command(about = "Collects fragmented telemetry reports into a CSV log")]
#[command(version)]
struct Args {
    /// Gateway address HOST:PORT
    gateway: String,

    /// Reports output file
    #[arg(short, long, default_value = "reports.txt")]
    output: PathBuf,

    /// Local address (hex)
    #[arg(short, long, default_value = "0001")]
    address: Address,

    /// Packet group (hex)
    #[arg(short, long, default_value = "22")]
    group: Group,

    /// Debug mode (repeat for trace)
    #[arg(short = 'D', long = "debug", action = ArgAction::Count)]
    debug: u8,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let level = match args.debug {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)))
        .with_target(false)
        .init();

    let config = CollectorConfig::default()
        .local(args.address)
        .group(args.group);

    let gateway = Arc::new(UdpGateway::connect(&args.gateway, args.address, args.group)?);
    let writer = Arc::new(ReportFileWriter::new(&args.output));

    let collector = Collector::new(config, gateway.clone(), writer);
    gateway.register_receiver(AMID_REPORTS, collector.mailbox());

    let link = gateway.clone().start();
    let handle = collector.start();
    info!(
        gateway = %args.gateway,
        address = %args.address,
        group = %args.group,
        output = %args.output.display(),
        "collecting reports"
    );

    tokio::signal::ctrl_c().await?;
    info!("shutting down");
    handle.shutdown().await;
    gateway.stop();
    let _ = link.join();

    Ok(())
}
