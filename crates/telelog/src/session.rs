// SPDX-License-Identifier: MIT

//! Per-source tracking of the one in-flight report.
//!
//! Each remote source has at most one [`PartialReport`]: the most recent
//! report number seen from it, complete or not. The collector creates one on
//! the first fragment from a source or when the source advances to a newer
//! report number, replaces it wholesale on such an advance, and deletes it
//! when the source signals a reset (report number 0).
//!
//! Completeness invariant: a partial report is complete iff fragment index 0
//! is present and the number of distinct indices held equals the `total`
//! declared by fragment 0.

use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::report::Report;
use crate::transport::Address;
use crate::wire::{DecodeError, Fragment, ReportBody};

/// The collector's sole persistent state: one entry per source.
pub type SessionTable = HashMap<Address, PartialReport>;

/// Errors from [`PartialReport::assemble`].
#[derive(Debug, Error)]
pub enum AssembleError {
    /// Called before all fragments arrived.
    #[error("report is not complete")]
    NotComplete,

    /// All fragments arrived but the concatenated body does not decode.
    #[error("assembled body decode failed: {0}")]
    Body(#[from] DecodeError),
}

/// An in-progress report: fragments received so far, keyed by index.
#[derive(Debug, Clone)]
pub struct PartialReport {
    source: Address,
    report_no: u32,
    /// Fragment count as last declared by the sender; 0 while unknown.
    total: u8,
    fragments: HashMap<u8, Fragment>,
    first_received: DateTime<Utc>,
    last_received: DateTime<Utc>,
    /// Insert attempts, duplicates included; not a distinct-fragment count.
    fragments_received: u32,
}

impl PartialReport {
    /// Start tracking a report from `source`. The caller adds the fragment
    /// that prompted creation via [`add_fragment`](Self::add_fragment).
    pub fn new(source: Address, report_no: u32) -> Self {
        let now = Utc::now();
        Self {
            source,
            report_no,
            total: 0,
            fragments: HashMap::new(),
            first_received: now,
            last_received: now,
            fragments_received: 0,
        }
    }

    pub fn source(&self) -> Address {
        self.source
    }

    pub fn report_no(&self) -> u32 {
        self.report_no
    }

    /// Declared fragment count, 0 while unknown.
    pub fn total(&self) -> u8 {
        self.total
    }

    pub fn first_received(&self) -> DateTime<Utc> {
        self.first_received
    }

    pub fn last_received(&self) -> DateTime<Utc> {
        self.last_received
    }

    /// Insert attempts so far, duplicates included.
    pub fn fragments_received(&self) -> u32 {
        self.fragments_received
    }

    /// Store a fragment, overwriting any prior fragment at the same index.
    ///
    /// Duplicates are idempotent for completeness and `missing()`, but still
    /// bump `last_received` and the received counter.
    pub fn add_fragment(&mut self, fragment: Fragment) {
        self.total = fragment.total;
        self.fragments_received += 1;
        self.last_received = Utc::now();
        self.fragments.insert(fragment.index, fragment);
    }

    /// True iff fragment 0 is present and the distinct-index count matches
    /// the total it declared.
    pub fn is_complete(&self) -> bool {
        match self.fragments.get(&0) {
            Some(first) => self.fragments.len() == usize::from(first.total),
            None => false,
        }
    }

    /// Indices in `[0, total)` not yet held, ascending. Empty while the
    /// total is still unknown.
    pub fn missing(&self) -> Vec<u8> {
        (0..self.total)
            .filter(|index| !self.fragments.contains_key(index))
            .collect()
    }

    /// Concatenate all fragments in ascending index order, decode the body
    /// and merge in the tracking metadata.
    pub fn assemble(&self) -> Result<Report, AssembleError> {
        if !self.is_complete() {
            return Err(AssembleError::NotComplete);
        }

        let mut buf = Vec::new();
        for index in 0..self.total {
            // A rogue sender can satisfy the count check with out-of-range
            // indices; an index hole inside [0, total) is still incomplete.
            let fragment = self.fragments.get(&index).ok_or(AssembleError::NotComplete)?;
            buf.extend_from_slice(&fragment.payload);
        }

        let body = ReportBody::decode(&buf)?;
        Ok(Report {
            source: self.source,
            report_no: self.report_no,
            channel: body.channel,
            id: body.id,
            local_time_ms: body.local_time_ms,
            clock_time: body.clock_time,
            data: body.data,
            first_received: self.first_received,
            last_received: self.last_received,
            fragments_received: self.fragments_received,
        })
    }
}

impl fmt::Display for PartialReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} report {} {}/{}",
            self.source,
            self.report_no,
            self.fragments.len(),
            self.total,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frag(report: u32, index: u8, total: u8, payload: &[u8]) -> Fragment {
        Fragment {
            report,
            index,
            total,
            payload: payload.to_vec(),
        }
    }

    #[test]
    fn test_missing_on_partial_session() {
        let mut pr = PartialReport::new(Address(1), 3);
        pr.add_fragment(frag(3, 0, 5, b"a"));
        pr.add_fragment(frag(3, 2, 5, b"b"));

        assert_eq!(pr.missing(), vec![1, 3, 4]);
        assert!(!pr.is_complete());
    }

    #[test]
    fn test_missing_while_total_unknown() {
        let pr = PartialReport::new(Address(1), 3);
        assert_eq!(pr.total(), 0);
        assert!(pr.missing().is_empty());
        assert!(!pr.is_complete());
    }

    #[test]
    fn test_complete_requires_fragment_zero() {
        let mut pr = PartialReport::new(Address(1), 3);
        pr.add_fragment(frag(3, 1, 2, b"b"));
        pr.add_fragment(frag(3, 2, 2, b"c"));
        // Two fragments held, but index 0 is absent.
        assert!(!pr.is_complete());
        assert_eq!(pr.missing(), vec![0]);
    }

    #[test]
    fn test_duplicate_is_idempotent_but_counted() {
        let mut pr = PartialReport::new(Address(1), 3);
        pr.add_fragment(frag(3, 0, 2, b"a"));
        let before = pr.last_received();

        pr.add_fragment(frag(3, 0, 2, b"a"));
        assert_eq!(pr.missing(), vec![1]);
        assert!(!pr.is_complete());
        assert_eq!(pr.fragments_received(), 2);
        assert!(pr.last_received() >= before);
    }

    #[test]
    fn test_assemble_premature() {
        let mut pr = PartialReport::new(Address(1), 3);
        pr.add_fragment(frag(3, 0, 2, b"a"));
        assert!(matches!(pr.assemble(), Err(AssembleError::NotComplete)));
    }

    #[test]
    fn test_assemble_in_index_order_regardless_of_arrival() {
        let body = ReportBody {
            channel: 2,
            id: 55,
            local_time_ms: 1000,
            clock_time: 2000,
            data: vec![9, 8, 7, 6, 5],
        };
        let bytes = body.encode();
        let (a, b, c) = (&bytes[..6], &bytes[6..12], &bytes[12..]);

        let mut pr = PartialReport::new(Address(0x22), 4);
        pr.add_fragment(frag(4, 2, 3, c));
        pr.add_fragment(frag(4, 0, 3, a));
        pr.add_fragment(frag(4, 1, 3, b));
        assert!(pr.is_complete());

        let report = pr.assemble().unwrap();
        assert_eq!(report.channel, 2);
        assert_eq!(report.id, 55);
        assert_eq!(report.local_time_ms, 1000);
        assert_eq!(report.clock_time, 2000);
        assert_eq!(report.data, vec![9, 8, 7, 6, 5]);
        assert_eq!(report.report_no, 4);
        assert_eq!(report.source, Address(0x22));
        assert_eq!(report.fragments_received, 3);
    }

    #[test]
    fn test_assemble_undecodable_body() {
        // Complete fragment set whose concatenation is shorter than the
        // fixed body header.
        let mut pr = PartialReport::new(Address(1), 9);
        pr.add_fragment(frag(9, 0, 1, b"tiny"));
        assert!(pr.is_complete());
        assert!(matches!(pr.assemble(), Err(AssembleError::Body(_))));
    }

    #[test]
    fn test_rogue_index_does_not_assemble_garbage() {
        let mut pr = PartialReport::new(Address(1), 5);
        pr.add_fragment(frag(5, 0, 2, b"a"));
        pr.add_fragment(frag(5, 200, 2, b"b"));
        // Count matches fragment 0's total, but index 1 is a hole.
        assert!(pr.is_complete());
        assert!(matches!(pr.assemble(), Err(AssembleError::NotComplete)));
    }
}
