//! Server-role request handling
//!
//! Requests the peer sends to this engine are answered by a [`GattServerHandler`], chosen
//! once at construction through [`GattServerMode`]. The engine owns MTU bookkeeping and
//! Error Response framing; a handler only computes replies.

mod database;
mod forward;
mod nop;

pub use database::{DatabaseServer, GattDatabase, GattDatabaseBuilder};
pub use forward::ForwardServer;
pub use nop::NopServer;

use crate::att::constants::ATT_HANDLE_INVALID;
use crate::att::error::AttResult;
use crate::att::pdu::{AttPdu, ExchangeMtuRequest};
use crate::att::types::SecurityLevel;
use crate::gap::BdAddr;
use crate::gatt::handler::GattHandler;
use std::fmt;
use std::sync::Arc;

/// Connection state a handler sees for one request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServerContext {
    pub remote: BdAddr,
    /// MTU in effect on the channel; replies must fit in it
    pub mtu: u16,
    pub security_level: SecurityLevel,
}

impl ServerContext {
    /// Room for attribute data in a reply that only carries the opcode
    pub fn payload_len(&self) -> usize {
        self.mtu as usize - 1
    }
}

/// Answers the requests of a remote GATT client.
///
/// Every method gets the decoded request PDU and returns the reply PDU; an `Err` is sent back
/// as an Error Response for the request opcode. Handlers run on the engine's reader thread.
pub trait GattServerHandler: Send + Sync {
    /// Short name for logs
    fn name(&self) -> &'static str;

    /// The MTU to answer an Exchange-MTU request with
    fn exchange_mtu(&self, ctx: &ServerContext, req: &ExchangeMtuRequest, server_mtu: u16) -> AttResult<u16>;

    /// Read, Read-Blob and Read-Multiple requests
    fn read(&self, ctx: &ServerContext, req: &AttPdu) -> AttResult<AttPdu>;

    /// Write requests and commands, Prepare-Write and Execute-Write.
    ///
    /// Returns `None` for a Write Command, which has no reply.
    fn write(&self, ctx: &ServerContext, req: &AttPdu) -> AttResult<Option<AttPdu>>;

    fn find_information(&self, ctx: &ServerContext, req: &AttPdu) -> AttResult<AttPdu>;

    fn find_by_type_value(&self, ctx: &ServerContext, req: &AttPdu) -> AttResult<AttPdu>;

    fn read_by_type(&self, ctx: &ServerContext, req: &AttPdu) -> AttResult<AttPdu>;

    fn read_by_group_type(&self, ctx: &ServerContext, req: &AttPdu) -> AttResult<AttPdu>;

    /// Notification/indication bits the client wrote to the CCCD of `value_handle`
    fn client_char_config(&self, _value_handle: u16) -> Option<u16> {
        None
    }
}

/// How a server-role engine answers requests
#[derive(Clone, Default)]
pub enum GattServerMode {
    /// Answer every request with Request Not Supported
    #[default]
    Nop,
    /// Answer from a local attribute database
    Database(Arc<GattDatabase>),
    /// Relay requests to another connected engine in client role
    Forward(Arc<GattHandler>),
    /// Answer through an application-provided handler
    Custom(Arc<dyn GattServerHandler>),
}

impl GattServerMode {
    pub(crate) fn into_handler(self) -> Arc<dyn GattServerHandler> {
        match self {
            GattServerMode::Nop => Arc::new(NopServer),
            GattServerMode::Database(db) => Arc::new(DatabaseServer::new(db)),
            GattServerMode::Forward(upstream) => Arc::new(ForwardServer::new(upstream)),
            GattServerMode::Custom(handler) => handler,
        }
    }
}

impl fmt::Debug for GattServerMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GattServerMode::Nop => f.write_str("Nop"),
            GattServerMode::Database(db) => write!(f, "Database({} attributes)", db.len()),
            GattServerMode::Forward(upstream) => write!(f, "Forward({})", upstream.remote()),
            GattServerMode::Custom(handler) => write!(f, "Custom({})", handler.name()),
        }
    }
}

/// First handle a request refers to, for Error Responses
pub(crate) fn request_handle(req: &AttPdu) -> u16 {
    match req {
        AttPdu::FindInformationRequest(r) => r.start_handle,
        AttPdu::FindByTypeValueRequest(r) => r.start_handle,
        AttPdu::ReadByTypeRequest(r) => r.start_handle,
        AttPdu::ReadByGroupTypeRequest(r) => r.start_handle,
        AttPdu::ReadRequest(r) => r.handle,
        AttPdu::ReadBlobRequest(r) => r.handle,
        AttPdu::ReadMultipleRequest(r) => r.handles.first().copied().unwrap_or(ATT_HANDLE_INVALID),
        AttPdu::WriteRequest(r) => r.handle,
        AttPdu::WriteCommand(r) => r.handle,
        AttPdu::PrepareWriteRequest(r) => r.handle,
        _ => ATT_HANDLE_INVALID,
    }
}
