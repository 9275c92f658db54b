// SPDX-License-Identifier: MIT

//! Persistent report log output.
//!
//! One CSV line per report, appended to a single file. The first write to a
//! not-yet-existing file emits a column header line; every later write only
//! appends data lines. Concurrent appends are serialized so lines never
//! interleave.

use std::fs::OpenOptions;
use std::io::{ErrorKind, Write};
use std::path::PathBuf;

use parking_lot::Mutex;
use thiserror::Error;

use crate::report::Report;

/// Output collaborator errors. A failed append loses the report from
/// persistent storage, but the report stays acknowledged to the sender.
#[derive(Debug, Error)]
pub enum WriteError {
    #[error("report log I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Destination for completed reports.
pub trait ReportWriter: Send + Sync {
    /// Append one report to the log.
    fn append(&self, report: &Report) -> Result<(), WriteError>;
}

/// Line-oriented report log on the local filesystem.
pub struct ReportFileWriter {
    path: PathBuf,
    // Serializes the open-check-write sequence across threads.
    lock: Mutex<()>,
}

impl ReportFileWriter {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &std::path::Path {
        &self.path
    }
}

impl ReportWriter for ReportFileWriter {
    fn append(&self, report: &Report) -> Result<(), WriteError> {
        let _guard = self.lock.lock();

        // create_new distinguishes first-ever write: only that one gets the
        // header line.
        let mut file = match OpenOptions::new()
            .create_new(true)
            .append(true)
            .open(&self.path)
        {
            Ok(mut file) => {
                writeln!(file, "######,{}", Report::storage_header())?;
                file
            }
            Err(err) if err.kind() == ErrorKind::AlreadyExists => {
                OpenOptions::new().append(true).open(&self.path)?
            }
            Err(err) => return Err(err.into()),
        };

        writeln!(file, "REPORT,{}", report.storage_line())?;
        Ok(())
    }
}
