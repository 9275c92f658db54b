// SPDX-License-Identifier: MIT

//! Per-source report reassembly and acknowledgement engine.
//!
//! Three loops run against one session table:
//!
//! - the inbound loop, draining the mailbox, decoding fragments and applying
//!   the per-source state machine (the only writer of sessions),
//! - the stalled-reset resender, periodically re-acking one sender stuck
//!   before fragmentation info is known,
//! - the missing-fragment resender, periodically sending missing-list acks
//!   to every incomplete sender, paced to avoid bursts.
//!
//! The table is guarded by a single mutex; every read-modify sequence happens
//! under it and all I/O (ack sends, report appends) happens after it is
//! released. Acks are fire-and-forget: a failed send is logged and the
//! session is left unchanged, the sender's own retransmission recovers.
//!
//! # Acknowledgement policy
//!
//! A fragment that leaves a report still incomplete is not acknowledged on
//! the immediate path; missing-list acks are exclusively the periodic
//! resender's job ("ack deferred"). A reset (report number 0) clears the
//! session and is deliberately not acknowledged at all.
//!
//! # State machine
//!
//! ```text
//!                 fragment (new source, report != 0)
//!   ┌───────┐ ───────────────────────────────────────▶ ┌────────────┐
//!   │ Empty │                                          │ Collecting │
//!   └───────┘ ◀─────────────────────────────────────── └────────────┘
//!       ▲                report 0 (reset)                    │ last
//!       │                                                    │ fragment
//!       │                report 0 (reset)              ┌──────────┐
//!       └───────────────────────────────────────────── │ Complete │
//!                                                      └──────────┘
//! ```
//!
//! A newer report number replaces the session in place (old partial data is
//! lost, no partial delivery); an older one only draws a full ack telling
//! the sender to stop.

use std::collections::hash_map::Entry;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use crate::config::CollectorConfig;
use crate::report::Report;
use crate::resend;
use crate::session::{PartialReport, SessionTable};
use crate::transport::{Address, Inbound, Transport, AMID_REPORTS};
use crate::wire::{Ack, Fragment};
use crate::writer::ReportWriter;

/// Report reassembly and acknowledgement engine.
pub struct Collector {
    inner: Arc<Inner>,
    mailbox: mpsc::Sender<Inbound>,
    // Taken by `start`.
    inbox: mpsc::Receiver<Inbound>,
}

struct Inner {
    config: CollectorConfig,
    sessions: Mutex<SessionTable>,
    transport: Arc<dyn Transport>,
    writer: Arc<dyn ReportWriter>,
}

/// Control handle for a started collector.
pub struct CollectorHandle {
    shutdown: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
}

impl CollectorHandle {
    /// Signal all loops to stop and wait for them to finish.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        for task in self.tasks {
            let _ = task.await;
        }
    }
}

impl Collector {
    /// Create a collector wired to the given transport and report writer.
    pub fn new(
        config: CollectorConfig,
        transport: Arc<dyn Transport>,
        writer: Arc<dyn ReportWriter>,
    ) -> Self {
        let (mailbox, inbox) = mpsc::channel(config.mailbox_capacity);
        Self {
            inner: Arc::new(Inner {
                config,
                sessions: Mutex::new(SessionTable::new()),
                transport,
                writer,
            }),
            mailbox,
            inbox,
        }
    }

    /// Mailbox for the envelope layer to deliver report-type payloads into.
    pub fn mailbox(&self) -> mpsc::Sender<Inbound> {
        self.mailbox.clone()
    }

    /// Number of sources currently tracked.
    pub fn session_count(&self) -> usize {
        self.inner.sessions.lock().len()
    }

    /// Whether a session exists for `source`, and if so whether it is
    /// complete.
    pub fn session_state(&self, source: Address) -> Option<bool> {
        self.inner
            .sessions
            .lock()
            .get(&source)
            .map(PartialReport::is_complete)
    }

    /// Apply one inbound payload from `source` to the engine.
    ///
    /// This is the synchronous dispatch path the inbound loop runs; it is
    /// public so the engine can be driven directly without a runtime.
    pub fn handle_payload(&self, source: Address, payload: &[u8]) {
        self.inner.on_payload(source, payload);
    }

    /// Acks the stalled-reset resender would send this cycle.
    pub fn stalled_scan(&self) -> Option<(Address, Ack)> {
        resend::stalled_ack(&self.inner.sessions.lock())
    }

    /// Acks the missing-fragment resender would send this cycle.
    pub fn missing_scan(&self) -> Vec<(Address, Ack)> {
        resend::missing_acks(&self.inner.sessions.lock())
    }

    /// Spawn the inbound loop and both resend loops. Must be called from
    /// within a tokio runtime.
    pub fn start(self) -> CollectorHandle {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let mut tasks = Vec::with_capacity(3);

        // Inbound reassembly loop.
        let inner = Arc::clone(&self.inner);
        let mut inbox = self.inbox;
        let mut shutdown = shutdown_rx.clone();
        tasks.push(tokio::spawn(async move {
            debug!("collector main loop running");
            loop {
                tokio::select! {
                    _ = shutdown.changed() => break,
                    inbound = inbox.recv() => match inbound {
                        Some(Inbound { source, payload }) => inner.on_payload(source, &payload),
                        None => {
                            debug!("inbound mailbox closed");
                            break;
                        }
                    },
                }
            }
        }));

        // Stalled-reset resender.
        let inner = Arc::clone(&self.inner);
        let mut shutdown = shutdown_rx.clone();
        tasks.push(tokio::spawn(async move {
            debug!("stalled-reset resender running");
            loop {
                tokio::select! {
                    _ = shutdown.changed() => break,
                    _ = sleep(inner.config.reset_resend_interval) => inner.stalled_sweep(),
                }
            }
        }));

        // Missing-fragment resender.
        let inner = Arc::clone(&self.inner);
        let mut shutdown = shutdown_rx;
        tasks.push(tokio::spawn(async move {
            debug!("missing-fragment resender running");
            'outer: loop {
                tokio::select! {
                    _ = shutdown.changed() => break 'outer,
                    _ = sleep(inner.config.missing_resend_interval) => {},
                }
                for (destination, ack) in inner.missing_scan() {
                    debug!(%destination, report = ack.report, "re-requesting missing fragments");
                    inner.send_ack(destination, &ack);
                    tokio::select! {
                        _ = shutdown.changed() => break 'outer,
                        _ = sleep(inner.config.missing_resend_spacing) => {},
                    }
                }
            }
        }));

        CollectorHandle {
            shutdown: shutdown_tx,
            tasks,
        }
    }
}

impl Inner {
    fn on_payload(&self, source: Address, payload: &[u8]) {
        let fragment = match Fragment::decode(payload) {
            Ok(fragment) => fragment,
            Err(err) => {
                // One malformed packet; accepted fragments are unaffected.
                warn!(%source, %err, "dropping undecodable packet");
                return;
            }
        };

        let (ack, completed) = {
            let mut sessions = self.sessions.lock();
            self.apply(&mut sessions, source, fragment)
        };

        if let Some(report) = completed {
            info!(%report, "report complete");
            if let Err(err) = self.writer.append(&report) {
                // The report is lost from storage but stays acknowledged;
                // re-requesting it would not make the log recover.
                error!(%source, %err, "failed to persist report");
            }
        }

        if let Some(ack) = ack {
            self.send_ack(source, &ack);
        }
    }

    /// Run the state machine for one fragment. Called with the table lock
    /// held; returns the ack to send and the completed report, if any, so
    /// all I/O happens after the lock is released.
    fn apply(
        &self,
        sessions: &mut SessionTable,
        source: Address,
        fragment: Fragment,
    ) -> (Option<Ack>, Option<Report>) {
        // Report number 0 is the reset signal: forget the source entirely.
        // Deliberately not acknowledged.
        if fragment.report == 0 {
            info!(%source, "reset");
            sessions.remove(&source);
            return (None, None);
        }

        let session = match sessions.entry(source) {
            Entry::Vacant(vacant) => {
                debug!(%source, report = fragment.report, "new session");
                vacant.insert(PartialReport::new(source, fragment.report))
            }
            Entry::Occupied(occupied) => occupied.into_mut(),
        };

        if fragment.report > session.report_no() {
            // The source moved on; the old report's partial data is lost.
            debug!(
                %source,
                old = session.report_no(),
                new = fragment.report,
                complete = session.is_complete(),
                "report number advanced"
            );
            *session = PartialReport::new(source, fragment.report);
        } else if fragment.report < session.report_no() {
            // Retransmission of a superseded report: full ack makes the
            // sender stop, no state change.
            debug!(%source, report = fragment.report, "superseded report, acking to stop");
            return (Some(Ack::full(fragment.report)), None);
        } else if session.is_complete() {
            // Duplicate send of a finished report; confirm so a sender stuck
            // in a retransmit loop can progress.
            debug!(%source, report = fragment.report, "repeat of completed report");
            return (Some(Ack::full(fragment.report)), None);
        }

        let report_no = fragment.report;
        session.add_fragment(fragment);
        debug!(session = %session, "fragment stored");

        if !session.is_complete() {
            // Ack deferred: the missing-fragment resender handles incomplete
            // sessions on its own schedule.
            return (None, None);
        }

        match session.assemble() {
            Ok(report) => (Some(Ack::full(report_no)), Some(report)),
            Err(err) => {
                // Complete but undecodable: drop the report and send no ack.
                error!(%source, report = report_no, %err, "assembled report failed to decode");
                (None, None)
            }
        }
    }

    fn stalled_sweep(&self) {
        let picked = resend::stalled_ack(&self.sessions.lock());
        if let Some((destination, ack)) = picked {
            debug!(%destination, report = ack.report, "re-acking stalled sender");
            self.send_ack(destination, &ack);
        }
    }

    fn missing_scan(&self) -> Vec<(Address, Ack)> {
        resend::missing_acks(&self.sessions.lock())
    }

    fn send_ack(&self, destination: Address, ack: &Ack) {
        if let Err(err) = self
            .transport
            .send(destination, AMID_REPORTS, &ack.encode())
        {
            warn!(%destination, report = ack.report, %err, "ack transmission failed");
        }
    }
}
