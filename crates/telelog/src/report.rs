// SPDX-License-Identifier: MIT

//! The assembled report output record and its persistent log formatting.

use std::fmt;

use chrono::{DateTime, Utc};

use crate::transport::Address;

/// A complete telemetry report, assembled from all of its fragments.
///
/// Immutable once produced; ownership passes to the output collaborator on
/// `append`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Report {
    pub source: Address,
    pub report_no: u32,
    pub channel: u8,
    pub id: u32,
    /// Milliseconds since sender boot.
    pub local_time_ms: u32,
    /// Seconds since the beginning of the century, or 0xFFFFFFFF when unset.
    pub clock_time: u32,
    pub data: Vec<u8>,

    /// When the first fragment of this report arrived.
    pub first_received: DateTime<Utc>,
    /// When the last fragment arrived.
    pub last_received: DateTime<Utc>,
    /// Fragment arrivals counted toward this report, retransmissions included.
    pub fragments_received: u32,
}

impl Report {
    /// Column header written once at the top of a fresh report log.
    pub fn storage_header() -> &'static str {
        "timestamp ff, timestamp lf, ADDR, reportnum, CHANNEL, reportid, clocktime, localtime, data"
    }

    /// One CSV data line for the persistent report log.
    ///
    /// The column order and formatting are load-bearing: downstream tooling
    /// parses these files, so clock time precedes local time and the channel
    /// is two hex digits.
    pub fn storage_line(&self) -> String {
        format!(
            "{},{},{},{},{:02X},{},{},{},{}",
            format_timestamp(self.first_received),
            format_timestamp(self.last_received),
            self.source,
            self.report_no,
            self.channel,
            self.id,
            self.clock_time,
            self.local_time_ms,
            hex_upper(&self.data),
        )
    }
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} report {} ([{:02X}] {}) {}",
            self.source,
            self.report_no,
            self.channel,
            self.id,
            hex_upper(&self.data),
        )
    }
}

/// Uppercase hex without separators, empty string for empty input.
pub(crate) fn hex_upper(data: &[u8]) -> String {
    let mut out = String::with_capacity(data.len() * 2);
    for byte in data {
        out.push_str(&format!("{byte:02X}"));
    }
    out
}

/// Wall-clock timestamp in the report log layout.
///
/// Millisecond precision with trailing zeros trimmed and the dot dropped for
/// whole seconds, to stay line-compatible with logs written by earlier
/// deployments.
pub(crate) fn format_timestamp(ts: DateTime<Utc>) -> String {
    let base = ts.format("%Y-%m-%d %H:%M:%S").to_string();
    let millis = ts.timestamp_subsec_millis();
    if millis == 0 {
        return base;
    }
    let mut frac = format!("{millis:03}");
    while frac.ends_with('0') {
        frac.pop();
    }
    format!("{base}.{frac}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ts(millis: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 5, 12, 34, 56).unwrap()
            + chrono::Duration::milliseconds(i64::from(millis))
    }

    #[test]
    fn test_timestamp_trims_trailing_zeros() {
        assert_eq!(format_timestamp(ts(0)), "2024-03-05 12:34:56");
        assert_eq!(format_timestamp(ts(500)), "2024-03-05 12:34:56.5");
        assert_eq!(format_timestamp(ts(120)), "2024-03-05 12:34:56.12");
        assert_eq!(format_timestamp(ts(123)), "2024-03-05 12:34:56.123");
        assert_eq!(format_timestamp(ts(7)), "2024-03-05 12:34:56.007");
    }

    #[test]
    fn test_storage_line_layout() {
        let report = Report {
            source: Address(0x0A3F),
            report_no: 17,
            channel: 0x05,
            id: 1234,
            local_time_ms: 99_000,
            clock_time: 777_000_111,
            data: vec![0xCA, 0xFE],
            first_received: ts(250),
            last_received: ts(750),
            fragments_received: 3,
        };

        assert_eq!(
            report.storage_line(),
            "2024-03-05 12:34:56.25,2024-03-05 12:34:56.75,0A3F,17,05,1234,777000111,99000,CAFE"
        );
    }

    #[test]
    fn test_storage_line_empty_data() {
        let report = Report {
            source: Address(1),
            report_no: 1,
            channel: 0,
            id: 0,
            local_time_ms: 0,
            clock_time: 0,
            data: vec![],
            first_received: ts(0),
            last_received: ts(0),
            fragments_received: 1,
        };
        assert!(report.storage_line().ends_with(",0,0,"));
    }

    #[test]
    fn test_hex_upper() {
        assert_eq!(hex_upper(&[]), "");
        assert_eq!(hex_upper(&[0x00, 0xAB, 0x0F]), "00AB0F");
    }
}
