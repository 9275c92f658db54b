// SPDX-License-Identifier: MIT

//! Wire codec for the report transfer protocol.
//!
//! Three fixed binary layouts, all integers big-endian:
//!
//! ```text
//! Fragment = 0x01 | report(u32) | index(u8) | total(u8) | payload...
//! Ack      = 0x02 | report(u32) | missing(u8)...
//! Body     = channel(u8) | id(u32) | local_time_ms(u32) | clock_time(u32) | data...
//! ```
//!
//! A `Fragment` carries one piece of a report; the `Body` layout only exists
//! after all fragments of a report have been concatenated in index order. An
//! `Ack` with an empty missing list means "fully received, stop sending".
//!
//! Decoding fails only on truncated input or an unrecognized leading header
//! byte. A decode failure discards that one packet and nothing else; it never
//! invalidates fragments that were already accepted.

use thiserror::Error;

/// Header byte of a report fragment packet.
pub const MSG_REPORT: u8 = 0x01;
/// Header byte of a report acknowledgement packet.
pub const MSG_REPORT_ACK: u8 = 0x02;

/// Fixed part of a fragment packet (header + report + index + total).
const FRAGMENT_FIXED_LEN: usize = 7;
/// Fixed part of an ack packet (header + report).
const ACK_FIXED_LEN: usize = 5;
/// Fixed part of an assembled report body.
const BODY_FIXED_LEN: usize = 13;

/// Wire decode errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("truncated packet: need at least {need} bytes, got {got}")]
    Truncated { need: usize, got: usize },

    #[error("unrecognized header byte 0x{0:02X}")]
    UnknownHeader(u8),
}

fn read_u32(buf: &[u8]) -> u32 {
    u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]])
}

/// One piece of a report, as transmitted on the link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fragment {
    /// Report number this fragment belongs to. Zero is the reset signal.
    pub report: u32,
    /// Fragment index, 0-based.
    pub index: u8,
    /// Fragment count declared by the sender. Authoritative from fragment 0.
    pub total: u8,
    /// Fragment payload bytes.
    pub payload: Vec<u8>,
}

impl Fragment {
    /// Decode a fragment packet.
    pub fn decode(buf: &[u8]) -> Result<Self, DecodeError> {
        if buf.is_empty() {
            return Err(DecodeError::Truncated {
                need: FRAGMENT_FIXED_LEN,
                got: 0,
            });
        }
        if buf[0] != MSG_REPORT {
            return Err(DecodeError::UnknownHeader(buf[0]));
        }
        if buf.len() < FRAGMENT_FIXED_LEN {
            return Err(DecodeError::Truncated {
                need: FRAGMENT_FIXED_LEN,
                got: buf.len(),
            });
        }

        Ok(Self {
            report: read_u32(&buf[1..5]),
            index: buf[5],
            total: buf[6],
            payload: buf[FRAGMENT_FIXED_LEN..].to_vec(),
        })
    }

    /// Encode the fragment to a packet.
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(FRAGMENT_FIXED_LEN + self.payload.len());
        buf.push(MSG_REPORT);
        buf.extend_from_slice(&self.report.to_be_bytes());
        buf.push(self.index);
        buf.push(self.total);
        buf.extend_from_slice(&self.payload);
        buf
    }
}

/// Acknowledgement for a report, optionally listing missing fragment indices.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ack {
    /// Report number being acknowledged.
    pub report: u32,
    /// Missing fragment indices, ascending. Empty means fully received.
    pub missing: Vec<u8>,
}

impl Ack {
    /// Full acknowledgement: everything received (or "stop sending this report").
    pub fn full(report: u32) -> Self {
        Self {
            report,
            missing: Vec::new(),
        }
    }

    /// Encode the ack to a packet.
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(ACK_FIXED_LEN + self.missing.len());
        buf.push(MSG_REPORT_ACK);
        buf.extend_from_slice(&self.report.to_be_bytes());
        buf.extend_from_slice(&self.missing);
        buf
    }

    /// Decode an ack packet.
    pub fn decode(buf: &[u8]) -> Result<Self, DecodeError> {
        if buf.is_empty() {
            return Err(DecodeError::Truncated {
                need: ACK_FIXED_LEN,
                got: 0,
            });
        }
        if buf[0] != MSG_REPORT_ACK {
            return Err(DecodeError::UnknownHeader(buf[0]));
        }
        if buf.len() < ACK_FIXED_LEN {
            return Err(DecodeError::Truncated {
                need: ACK_FIXED_LEN,
                got: buf.len(),
            });
        }

        Ok(Self {
            report: read_u32(&buf[1..5]),
            missing: buf[ACK_FIXED_LEN..].to_vec(),
        })
    }
}

/// Assembled report body: fixed header plus an opaque data tail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportBody {
    pub channel: u8,
    pub id: u32,
    /// Milliseconds since sender boot.
    pub local_time_ms: u32,
    /// Seconds since the beginning of the century, or 0xFFFFFFFF when unset.
    pub clock_time: u32,
    pub data: Vec<u8>,
}

impl ReportBody {
    /// Decode a reassembled report body.
    ///
    /// There is no header byte to check here; the body is addressed by the
    /// fragment stream it arrived in, so only truncation can fail.
    pub fn decode(buf: &[u8]) -> Result<Self, DecodeError> {
        if buf.len() < BODY_FIXED_LEN {
            return Err(DecodeError::Truncated {
                need: BODY_FIXED_LEN,
                got: buf.len(),
            });
        }

        Ok(Self {
            channel: buf[0],
            id: read_u32(&buf[1..5]),
            local_time_ms: read_u32(&buf[5..9]),
            clock_time: read_u32(&buf[9..13]),
            data: buf[BODY_FIXED_LEN..].to_vec(),
        })
    }

    /// Encode the body. Used by the sender side and by tests.
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(BODY_FIXED_LEN + self.data.len());
        buf.push(self.channel);
        buf.extend_from_slice(&self.id.to_be_bytes());
        buf.extend_from_slice(&self.local_time_ms.to_be_bytes());
        buf.extend_from_slice(&self.clock_time.to_be_bytes());
        buf.extend_from_slice(&self.data);
        buf
    }
}
