//! GATT (Generic Attribute Profile) engine
//!
//! [`GattHandler`] runs ATT over one channel in either role: as a client it negotiates the
//! MTU, discovers the service tree and reads, writes and subscribes to values; as a server
//! it answers requests through a [`GattServerMode`] and pushes notifications/indications.

pub mod config;
mod discovery;
pub mod handler;
pub mod listener;
pub mod ring;
pub mod server;
pub mod types;
mod value;


pub use config::{negotiated_mtu, GattConfig};
pub use handler::GattHandler;
pub use listener::{AttPduObserver, GattCharListener, ListenerRegistry, ValueEvent};
pub use server::{
    DatabaseServer, ForwardServer, GattDatabase, GattDatabaseBuilder, GattServerHandler, GattServerMode,
    NopServer, ServerContext,
};
pub use types::*;
