//! L2CAP transport for the ATT fixed channel
//!
//! ATT runs over L2CAP CID 0x0004 on an LE link. The engine only needs to move whole PDUs
//! in both directions, so the channel is abstracted as [`AttTransport`]:
//! - [`L2capSocket`] is the kernel socket on Linux (`AF_BLUETOOTH`, `SOCK_SEQPACKET`)
//! - [`MemoryChannel`] connects two endpoints in-process

pub mod memory;
pub mod socket;
pub mod types;

use std::time::Duration;

pub use self::memory::MemoryChannel;
pub use self::socket::{L2capListener, L2capSocket};
pub use self::types::*;

/// A bidirectional, PDU-preserving channel carrying ATT
///
/// All methods take `&self`: the background reader blocks in [`AttTransport::read`] while
/// other threads write, and [`AttTransport::close`] must wake that reader.
pub trait AttTransport: Send + Sync {
    /// Send one PDU; returns the number of bytes written.
    fn write(&self, pdu: &[u8]) -> L2capResult<usize>;

    /// Receive one PDU into `buf`.
    ///
    /// Waits at most `timeout` (forever when `None`) and reports [`L2capError::Timeout`] if
    /// nothing arrived. A closed channel reports [`L2capError::ConnectionTerminated`].
    fn read(&self, buf: &mut [u8], timeout: Option<Duration>) -> L2capResult<usize>;

    /// Shut the channel down in both directions. Idempotent.
    fn close(&self);

    fn is_open(&self) -> bool;
}
