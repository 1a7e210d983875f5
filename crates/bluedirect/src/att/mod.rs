//! Attribute Protocol (ATT) implementation
//!
//! PDU codec, error codes and the attribute database the local server answers from. The
//! request/response engine built on top of it lives in [`crate::gatt`].

pub mod constants;
pub mod database;
pub mod error;
pub mod pdu;
pub mod types;

#[cfg(test)]
mod tests;

// Re-export the public API
pub use self::constants::*;
pub use self::database::{Attribute, AttributeDatabase};
pub use self::error::{AttError, AttErrorCode, AttResult};
pub use self::pdu::*;
pub use self::types::{AttPermissions, SecurityLevel};
