// SPDX-License-Identifier: MIT

//! # telelog - telemetry report collection over lossy low-bandwidth links
//!
//! Remote field devices emit telemetry reports too large for a single
//! transmission unit; each report travels as fixed-size fragments that arrive
//! out of order or not at all. This crate is the receiving side: it tracks
//! one in-flight report per source, merges fragments into complete payloads,
//! acknowledges senders (fully, or with the list of missing pieces), detects
//! resets and report-number advances, and runs background resenders that
//! re-acknowledge stalled senders.
//!
//! ## Architecture
//!
//! ```text
//! +--------------------------------------------------------------+
//! |                        tools/telelogd                        |
//! |        CLI wiring: transport + writer + collector            |
//! +--------------------------------------------------------------+
//! |                         Collector                            |
//! |  inbound loop | stalled-reset resender | missing resender    |
//! |              (one mutex-guarded session table)               |
//! +--------------------------------------------------------------+
//! |  wire codec  |  session tracking  |  writer  |  transport    |
//! +--------------------------------------------------------------+
//! ```
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use telelog::{Collector, CollectorConfig, ReportFileWriter, UdpGateway, AMID_REPORTS};
//!
//! # #[tokio::main] async fn main() -> std::io::Result<()> {
//! let config = CollectorConfig::default();
//! let gateway = Arc::new(UdpGateway::connect("127.0.0.1:9002", config.local, config.group)?);
//! let writer = Arc::new(ReportFileWriter::new("reports.txt"));
//!
//! let collector = Collector::new(config, gateway.clone(), writer);
//! gateway.register_receiver(AMID_REPORTS, collector.mailbox());
//!
//! let link = gateway.clone().start();
//! let handle = collector.start();
//!
//! tokio::signal::ctrl_c().await?;
//! handle.shutdown().await;
//! gateway.stop();
//! let _ = link.join();
//! # Ok(())
//! # }
//! ```

/// Reassembly engine and background resend loops.
pub mod collector;
/// Startup configuration.
pub mod config;
/// Assembled report record and log formatting.
pub mod report;
/// Resend scheduler scan decisions.
pub mod resend;
/// Per-source in-flight report tracking.
pub mod session;
/// Addressing, envelope framing and the outbound transport capability.
pub mod transport;
/// UDP gateway transport adapter.
pub mod udp;
/// Wire codec for fragments, acks and report bodies.
pub mod wire;
/// Persistent report log output.
pub mod writer;

pub use collector::{Collector, CollectorHandle};
pub use config::CollectorConfig;
pub use report::Report;
pub use session::{AssembleError, PartialReport, SessionTable};
pub use transport::{
    Address, Envelope, Group, Inbound, SendError, Transport, AMID_REPORTS, BROADCAST,
    DEFAULT_GROUP,
};
pub use udp::UdpGateway;
pub use wire::{Ack, DecodeError, Fragment, ReportBody, MSG_REPORT, MSG_REPORT_ACK};
pub use writer::{ReportFileWriter, ReportWriter, WriteError};
