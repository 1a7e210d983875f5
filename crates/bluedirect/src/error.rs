//! Error types for the bluedirect library
//!
//! [`GattError`] is what every public engine operation returns. Codec and transport layers
//! have their own errors ([`AttError`], [`L2capError`]) which convert into it.

use crate::att::error::AttError;
use crate::att::pdu::ErrorResponse;
use crate::l2cap::L2capError;
use crate::uuid::Uuid;
use std::time::Duration;
use thiserror::Error;

/// Errors surfaced by the GATT engine
#[derive(Error, Debug)]
pub enum GattError {
    /// Channel I/O failed; the engine has disconnected
    #[error("Transport error: {0}")]
    Transport(#[from] L2capError),

    /// No reply arrived in time; the engine has disconnected
    #[error("No reply to opcode 0x{opcode:02x} within {timeout:?}")]
    Timeout { opcode: u8, timeout: Duration },

    /// The peer sent a malformed or unexpected PDU; the engine has disconnected
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// The peer answered with an Error Response; the channel stays up
    #[error("ATT error response: {0}")]
    AttErrorResponse(ErrorResponse),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Descriptor type {0} is not a Client Characteristic Configuration")]
    InvalidDescriptorType(Uuid),

    #[error("Not connected")]
    NotConnected,

    #[error("Operation not available in this GATT role")]
    WrongRole,
}

impl GattError {
    /// Whether this error tore down the channel
    pub fn is_fatal(&self) -> bool {
        matches!(self, GattError::Transport(_) | GattError::Timeout { .. } | GattError::Protocol(_))
    }

    /// The Error Response carried by this error, if the peer sent one
    pub fn error_response(&self) -> Option<&ErrorResponse> {
        match self {
            GattError::AttErrorResponse(rsp) => Some(rsp),
            _ => None,
        }
    }
}

impl From<AttError> for GattError {
    fn from(err: AttError) -> Self {
        match err {
            AttError::InvalidParameter(msg) => GattError::InvalidArgument(msg),
            other => GattError::Protocol(other.to_string()),
        }
    }
}

/// Result type for GATT operations
pub type GattResult<T> = std::result::Result<T, GattError>;
