// SPDX-License-Identifier: MIT

//! Addressing types and the outbound transport capability.
//!
//! The collector does not manage links. It consumes decoded payloads from a
//! mailbox and sends acknowledgements through whatever [`Transport`] was wired
//! in at startup; the envelope layout and dispatch-by-type-id live here so
//! every transport implementation frames packets the same way.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

use crate::wire::DecodeError;

/// AM type id the report collector registers for.
pub const AMID_REPORTS: u8 = 9;

/// Default packet group.
pub const DEFAULT_GROUP: Group = Group(0x22);

/// Broadcast destination address.
pub const BROADCAST: Address = Address(0xFFFF);

/// Fixed part of an envelope (dest + source + group + amid).
const ENVELOPE_FIXED_LEN: usize = 6;

/// Logical address of a device on the link.
///
/// Rendered and parsed as four hex digits (`0A3F`), matching the persistent
/// log format and the CLI flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Address(pub u16);

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04X}", self.0)
    }
}

#[derive(Debug, Clone, Error)]
#[error("invalid hex address {0:?}")]
pub struct ParseAddressError(String);

impl FromStr for Address {
    type Err = ParseAddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        u16::from_str_radix(s, 16)
            .map(Address)
            .map_err(|_| ParseAddressError(s.to_string()))
    }
}

/// Packet group identifier. Rendered and parsed as two hex digits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Group(pub u8);

impl fmt::Display for Group {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02X}", self.0)
    }
}

#[derive(Debug, Clone, Error)]
#[error("invalid hex group {0:?}")]
pub struct ParseGroupError(String);

impl FromStr for Group {
    type Err = ParseGroupError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        u8::from_str_radix(s, 16)
            .map(Group)
            .map_err(|_| ParseGroupError(s.to_string()))
    }
}

/// Addressed packet envelope, as framed on the link:
///
/// ```text
/// dest(u16) | source(u16) | group(u8) | amid(u8) | payload...
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    pub dest: Address,
    pub source: Address,
    pub group: Group,
    pub amid: u8,
    pub payload: Vec<u8>,
}

impl Envelope {
    /// Encode the envelope for transmission.
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(ENVELOPE_FIXED_LEN + self.payload.len());
        buf.extend_from_slice(&self.dest.0.to_be_bytes());
        buf.extend_from_slice(&self.source.0.to_be_bytes());
        buf.push(self.group.0);
        buf.push(self.amid);
        buf.extend_from_slice(&self.payload);
        buf
    }

    /// Decode a received envelope.
    pub fn decode(buf: &[u8]) -> Result<Self, DecodeError> {
        if buf.len() < ENVELOPE_FIXED_LEN {
            return Err(DecodeError::Truncated {
                need: ENVELOPE_FIXED_LEN,
                got: buf.len(),
            });
        }

        Ok(Self {
            dest: Address(u16::from_be_bytes([buf[0], buf[1]])),
            source: Address(u16::from_be_bytes([buf[2], buf[3]])),
            group: Group(buf[4]),
            amid: buf[5],
            payload: buf[ENVELOPE_FIXED_LEN..].to_vec(),
        })
    }
}

/// A payload delivered to a registered mailbox, tagged with its originator.
#[derive(Debug, Clone)]
pub struct Inbound {
    pub source: Address,
    pub payload: Vec<u8>,
}

/// Outbound transmission errors. Logged by the caller, never retried here;
/// the remote sender's own retransmission is the recovery mechanism.
#[derive(Debug, Error)]
pub enum SendError {
    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("transport is closed")]
    Closed,
}

/// Outbound send capability of the wired-in connection layer.
///
/// Implementations hold the local source address and group context and frame
/// the payload into an [`Envelope`] themselves. Sends are fire-and-forget:
/// they must not block on peer acknowledgement.
pub trait Transport: Send + Sync {
    /// Send `payload` to `destination` under the given AM type id.
    fn send(&self, destination: Address, amid: u8, payload: &[u8]) -> Result<(), SendError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_address_display_and_parse() {
        let addr: Address = "0A3F".parse().unwrap();
        assert_eq!(addr, Address(0x0A3F));
        assert_eq!(addr.to_string(), "0A3F");
        assert_eq!(Address(1).to_string(), "0001");
        assert!("xyz".parse::<Address>().is_err());
        assert!("10000".parse::<Address>().is_err());
    }

    #[test]
    fn test_group_display_and_parse() {
        let group: Group = "22".parse().unwrap();
        assert_eq!(group, DEFAULT_GROUP);
        assert_eq!(group.to_string(), "22");
        assert!("1FF".parse::<Group>().is_err());
    }

    #[test]
    fn test_envelope_roundtrip() {
        let env = Envelope {
            dest: Address(0x0001),
            source: Address(0xBEEF),
            group: DEFAULT_GROUP,
            amid: AMID_REPORTS,
            payload: vec![1, 2, 3],
        };
        let buf = env.encode();
        assert_eq!(&buf[..6], &[0x00, 0x01, 0xBE, 0xEF, 0x22, 9]);
        assert_eq!(Envelope::decode(&buf).unwrap(), env);
    }

    #[test]
    fn test_envelope_truncated() {
        assert!(matches!(
            Envelope::decode(&[0, 1, 2]),
            Err(DecodeError::Truncated { need: 6, got: 3 })
        ));
    }
}
