//! Type definitions for L2CAP operations

use thiserror::Error;

/// Error types specific to the ATT fixed channel
#[derive(Debug, Error)]
pub enum L2capError {
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Timed out waiting for data")]
    Timeout,

    #[error("PDU of {len} bytes exceeds channel MTU {mtu}")]
    MtuExceeded { len: usize, mtu: usize },

    #[error("Connection terminated")]
    ConnectionTerminated,

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Connection not established")]
    NotConnected,
}

impl L2capError {
    /// Whether the error only reports that no data arrived in time
    pub fn is_timeout(&self) -> bool {
        matches!(self, L2capError::Timeout)
    }
}

/// Result type for L2CAP operations
pub type L2capResult<T> = std::result::Result<T, L2capError>;
