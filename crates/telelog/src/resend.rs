// SPDX-License-Identifier: MIT

//! Scan logic for the two periodic re-acknowledgement schedulers.
//!
//! Both scans only read the session table; the collector loops own the send
//! pacing. Keeping the decisions pure keeps them testable without timers.

use crate::session::SessionTable;
use crate::transport::Address;
use crate::wire::Ack;

/// Sessions with a declared total below this are considered stuck before any
/// real fragmentation info arrived (reset-only or single un-routed fragment).
const STALLED_TOTAL_THRESHOLD: u8 = 2;

/// Pick the one stalled sender to re-acknowledge this cycle.
///
/// A sender whose session still has `total` unset or 1 appears stuck waiting
/// for routing; a full ack unsticks it. At most one per cycle to bound
/// outbound traffic per tick.
pub fn stalled_ack(sessions: &SessionTable) -> Option<(Address, Ack)> {
    sessions
        .iter()
        .find(|(_, pr)| pr.total() < STALLED_TOTAL_THRESHOLD)
        .map(|(addr, pr)| (*addr, Ack::full(pr.report_no())))
}

/// Missing-list acknowledgements for every incomplete session.
///
/// The caller is expected to pace these out with a pause between sends to
/// throttle bursts on the shared link.
pub fn missing_acks(sessions: &SessionTable) -> Vec<(Address, Ack)> {
    sessions
        .iter()
        .filter(|(_, pr)| !pr.is_complete())
        .map(|(addr, pr)| {
            (
                *addr,
                Ack {
                    report: pr.report_no(),
                    missing: pr.missing(),
                },
            )
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::PartialReport;
    use crate::wire::Fragment;

    fn session(source: Address, report: u32, total: u8, indices: &[u8]) -> PartialReport {
        let mut pr = PartialReport::new(source, report);
        for &index in indices {
            pr.add_fragment(Fragment {
                report,
                index,
                total,
                payload: vec![index],
            });
        }
        pr
    }

    #[test]
    fn test_stalled_picks_at_most_one() {
        let mut sessions = SessionTable::new();
        sessions.insert(Address(1), session(Address(1), 5, 1, &[0]));
        sessions.insert(Address(2), session(Address(2), 7, 1, &[0]));

        let (addr, ack) = stalled_ack(&sessions).unwrap();
        assert!(addr == Address(1) || addr == Address(2));
        assert!(ack.missing.is_empty());
    }

    #[test]
    fn test_stalled_ignores_fragmenting_senders() {
        let mut sessions = SessionTable::new();
        sessions.insert(Address(1), session(Address(1), 5, 3, &[0]));
        assert!(stalled_ack(&sessions).is_none());
    }

    #[test]
    fn test_stalled_matches_unknown_total() {
        let mut sessions = SessionTable::new();
        sessions.insert(Address(9), PartialReport::new(Address(9), 2));

        let (addr, ack) = stalled_ack(&sessions).unwrap();
        assert_eq!(addr, Address(9));
        assert_eq!(ack.report, 2);
    }

    #[test]
    fn test_missing_acks_carry_missing_lists() {
        let mut sessions = SessionTable::new();
        sessions.insert(Address(1), session(Address(1), 5, 4, &[0, 2]));
        sessions.insert(Address(2), session(Address(2), 6, 1, &[0])); // complete

        let acks = missing_acks(&sessions);
        assert_eq!(acks.len(), 1);
        assert_eq!(acks[0].0, Address(1));
        assert_eq!(acks[0].1.report, 5);
        assert_eq!(acks[0].1.missing, vec![1, 3]);
    }

    #[test]
    fn test_missing_acks_for_unknown_total() {
        // total unknown: incomplete, but nothing concrete to request yet.
        let mut sessions = SessionTable::new();
        sessions.insert(Address(3), PartialReport::new(Address(3), 8));

        let acks = missing_acks(&sessions);
        assert_eq!(acks.len(), 1);
        assert!(acks[0].1.missing.is_empty());
    }
}
