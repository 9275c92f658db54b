// SPDX-License-Identifier: MIT

//! Collector configuration, consumed once at startup.

use std::time::Duration;

use crate::transport::{Address, Group, DEFAULT_GROUP};

/// Collector configuration.
#[derive(Debug, Clone)]
pub struct CollectorConfig {
    /// Local address acknowledgements are sent from.
    pub local: Address,

    /// Packet group this deployment operates in.
    pub group: Group,

    /// Period of the stalled-reset resender.
    pub reset_resend_interval: Duration,

    /// Period of the missing-fragment resender.
    pub missing_resend_interval: Duration,

    /// Pause between missing-fragment acks within one sweep, throttling
    /// bursts on the shared link.
    pub missing_resend_spacing: Duration,

    /// Inbound mailbox capacity.
    pub mailbox_capacity: usize,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            local: Address(0x0001),
            group: DEFAULT_GROUP,
            reset_resend_interval: Duration::from_secs(120),
            missing_resend_interval: Duration::from_secs(60),
            missing_resend_spacing: Duration::from_secs(5),
            mailbox_capacity: 64,
        }
    }
}

impl CollectorConfig {
    /// Set the local address.
    pub fn local(mut self, local: Address) -> Self {
        self.local = local;
        self
    }

    /// Set the packet group.
    pub fn group(mut self, group: Group) -> Self {
        self.group = group;
        self
    }

    /// Set the stalled-reset resender period.
    pub fn reset_resend_interval(mut self, interval: Duration) -> Self {
        self.reset_resend_interval = interval;
        self
    }

    /// Set the missing-fragment resender period.
    pub fn missing_resend_interval(mut self, interval: Duration) -> Self {
        self.missing_resend_interval = interval;
        self
    }

    /// Set the pause between missing-fragment acks within one sweep.
    pub fn missing_resend_spacing(mut self, spacing: Duration) -> Self {
        self.missing_resend_spacing = spacing;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = CollectorConfig::default();
        assert_eq!(config.local, Address(0x0001));
        assert_eq!(config.group, DEFAULT_GROUP);
        assert_eq!(config.reset_resend_interval, Duration::from_secs(120));
        assert_eq!(config.missing_resend_interval, Duration::from_secs(60));
        assert_eq!(config.missing_resend_spacing, Duration::from_secs(5));
    }

    #[test]
    fn test_builder_setters() {
        let config = CollectorConfig::default()
            .local(Address(0x00AA))
            .missing_resend_interval(Duration::from_secs(1));
        assert_eq!(config.local, Address(0x00AA));
        assert_eq!(config.missing_resend_interval, Duration::from_secs(1));
    }
}
