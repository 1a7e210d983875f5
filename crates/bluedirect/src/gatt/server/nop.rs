use super::{request_handle, GattServerHandler, ServerContext};
use crate::att::error::{AttError, AttErrorCode, AttResult};
use crate::att::pdu::{AttPdu, ExchangeMtuRequest};

/// Rejects every request; only the MTU exchange is answered
#[derive(Debug, Default, Clone, Copy)]
pub struct NopServer;

fn not_supported<T>(req: &AttPdu) -> AttResult<T> {
    Err(AttError::code(AttErrorCode::RequestNotSupported, request_handle(req)))
}

impl GattServerHandler for NopServer {
    fn name(&self) -> &'static str {
        "nop"
    }

    fn exchange_mtu(&self, _ctx: &ServerContext, _req: &ExchangeMtuRequest, server_mtu: u16) -> AttResult<u16> {
        Ok(server_mtu)
    }

    fn read(&self, _ctx: &ServerContext, req: &AttPdu) -> AttResult<AttPdu> {
        not_supported(req)
    }

    fn write(&self, _ctx: &ServerContext, req: &AttPdu) -> AttResult<Option<AttPdu>> {
        not_supported(req)
    }

    fn find_information(&self, _ctx: &ServerContext, req: &AttPdu) -> AttResult<AttPdu> {
        not_supported(req)
    }

    fn find_by_type_value(&self, _ctx: &ServerContext, req: &AttPdu) -> AttResult<AttPdu> {
        not_supported(req)
    }

    fn read_by_type(&self, _ctx: &ServerContext, req: &AttPdu) -> AttResult<AttPdu> {
        not_supported(req)
    }

    fn read_by_group_type(&self, _ctx: &ServerContext, req: &AttPdu) -> AttResult<AttPdu> {
        not_supported(req)
    }
}
