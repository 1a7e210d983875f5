//! BlueDirect - A Rust library for GATT over a direct L2CAP ATT channel
//!
//! This library drives the Attribute Protocol on one connected LE link without a system
//! Bluetooth daemon in between. A [`GattHandler`] owns the channel and plays either role:
//! as a client it negotiates the MTU, discovers services, characteristics and descriptors,
//! reads and writes values (long ones included) and receives notifications and indications;
//! as a server it answers requests from a local attribute database or by forwarding them to
//! another engine.
//!
//! The channel is anything implementing [`AttTransport`]: the kernel [`L2capSocket`] on Linux
//! or an in-process [`MemoryChannel`].

pub mod att;
pub mod error;
pub mod gap;
pub mod gatt;
pub mod l2cap;
pub mod uuid;

// Re-export common types for convenience
pub use att::{AttError, AttErrorCode, AttPdu, AttPermissions, Attribute, AttributeDatabase, SecurityLevel};
pub use error::{GattError, GattResult};
pub use gap::{AddressType, BdAddr};
pub use gatt::{
    CharacteristicProperties, DisconnectReason, GattCharListener, GattCharacteristic, GattConfig,
    GattDatabase, GattDatabaseBuilder, GattDescriptor, GattHandler, GattRole, GattServerMode, GattService,
    GenericAccess, ValueEvent,
};
pub use l2cap::{AttTransport, L2capError, L2capListener, L2capSocket, MemoryChannel};
pub use uuid::Uuid;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn test_engine_on_closed_channel() {
        let (a, _b) = MemoryChannel::pair();
        a.close();

        let result = GattHandler::new(
            Arc::new(a),
            BdAddr::ANY,
            GattRole::Client,
            Duration::ZERO,
            GattConfig::default(),
            GattServerMode::Nop,
        );
        assert!(matches!(result, Err(GattError::NotConnected)));
    }
}
