//! GATT engine configuration

use crate::att::constants::{ATT_MAX_MTU, ATT_MIN_MTU};
use crate::att::types::SecurityLevel;
use std::time::Duration;

/// Margin added to the link supervision timeout when deriving reply timeouts
const SUPERVISION_TIMEOUT_MARGIN: Duration = Duration::from_millis(50);

/// Tunables of one GATT engine, fixed at construction
#[derive(Debug, Clone)]
pub struct GattConfig {
    /// Reply timeout for read and discovery requests
    pub read_reply_timeout: Duration,
    /// Reply timeout for writes, prepared writes and indications
    pub write_reply_timeout: Duration,
    /// Reply timeout for the Exchange-MTU handshake
    pub initial_reply_timeout: Duration,
    /// How long the reader blocks in one transport read before re-checking state
    pub reader_poll_timeout: Duration,
    /// Capacity of the reply ring
    pub reply_ring_capacity: usize,
    /// MTU offered in client role
    pub client_max_mtu: u16,
    /// MTU answered in server role, clamped to the ATT range
    pub server_mtu: u16,
    /// Send Handle Value Confirmation before dispatching an indication
    pub auto_confirm_indications: bool,
    /// Read every descriptor value during discovery
    pub read_descriptor_values: bool,
    /// Link security the local attribute database checks permissions against
    pub security_level: SecurityLevel,
}

impl Default for GattConfig {
    fn default() -> Self {
        Self {
            read_reply_timeout: Duration::from_millis(550),
            write_reply_timeout: Duration::from_millis(550),
            initial_reply_timeout: Duration::from_millis(2500),
            reader_poll_timeout: Duration::from_secs(10),
            reply_ring_capacity: 128,
            client_max_mtu: 512,
            server_mtu: 512,
            auto_confirm_indications: true,
            read_descriptor_values: true,
            security_level: SecurityLevel::None,
        }
    }
}

impl GattConfig {
    /// Read reply timeout, never shorter than the link would need to notice a dead peer
    pub fn effective_read_timeout(&self, supervision_timeout: Duration) -> Duration {
        self.read_reply_timeout.max(supervision_timeout + SUPERVISION_TIMEOUT_MARGIN)
    }

    pub fn effective_write_timeout(&self, supervision_timeout: Duration) -> Duration {
        self.write_reply_timeout.max(supervision_timeout + SUPERVISION_TIMEOUT_MARGIN)
    }
}

/// The MTU both sides use after an exchange
pub fn negotiated_mtu(local: u16, remote: u16) -> u16 {
    local.min(remote).clamp(ATT_MIN_MTU, ATT_MAX_MTU)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_negotiated_mtu() {
        assert_eq!(negotiated_mtu(247, 185), 185);
        assert_eq!(negotiated_mtu(185, 247), 185);
        assert_eq!(negotiated_mtu(512, 10), ATT_MIN_MTU);
        assert_eq!(negotiated_mtu(1024, 0xFFFF), ATT_MAX_MTU);
    }

    #[test]
    fn test_effective_timeouts() {
        let config = GattConfig::default();
        assert_eq!(config.effective_read_timeout(Duration::from_millis(100)), Duration::from_millis(550));
        assert_eq!(config.effective_write_timeout(Duration::from_secs(2)), Duration::from_millis(2050));
    }
}
