//! Relaying requests to another GATT server
//!
//! A server-role engine in forward mode passes each request to an upstream engine in client
//! role and sends the upstream reply back, trimmed to this channel's MTU.

use super::{request_handle, GattServerHandler, ServerContext};
use crate::att::error::{AttError, AttErrorCode, AttResult};
use crate::att::pdu::{AttPdu, ExchangeMtuRequest};
use crate::gatt::handler::GattHandler;
use log::{debug, warn};
use std::sync::Arc;

pub struct ForwardServer {
    upstream: Arc<GattHandler>,
}

impl ForwardServer {
    pub fn new(upstream: Arc<GattHandler>) -> Self {
        Self { upstream }
    }

    fn relay(&self, ctx: &ServerContext, req: &AttPdu) -> AttResult<AttPdu> {
        match self.upstream.forward_request(req) {
            Ok(reply) => Ok(fit_to_mtu(reply, ctx.mtu)),
            Err(err) => {
                warn!(
                    "{}: forwarding opcode 0x{:02x} to {} failed: {}",
                    ctx.remote,
                    req.opcode(),
                    self.upstream.remote(),
                    err
                );
                Err(AttError::code(AttErrorCode::Unlikely, request_handle(req)))
            }
        }
    }
}

/// Shrink a reply until it fits `mtu`: values are truncated, lists lose trailing entries.
///
/// List entries share one value length, so every entry is cut to what a lone entry may carry.
fn fit_to_mtu(mut reply: AttPdu, mtu: u16) -> AttPdu {
    let mtu = mtu as usize;
    let payload = mtu - 1;
    match &mut reply {
        AttPdu::ReadResponse(rsp) => rsp.value.truncate(payload),
        AttPdu::ReadBlobResponse(rsp) => rsp.value.truncate(payload),
        AttPdu::ReadMultipleResponse(rsp) => rsp.values.truncate(payload),
        AttPdu::ReadByTypeResponse(rsp) => {
            // opcode, length byte and handle; the length byte also caps the entry at 255
            let limit = (mtu - 4).min(u8::MAX as usize - 2);
            rsp.data.iter_mut().for_each(|entry| entry.value.truncate(limit));
        }
        AttPdu::ReadByGroupTypeResponse(rsp) => {
            let limit = (mtu - 6).min(u8::MAX as usize - 4);
            rsp.data.iter_mut().for_each(|entry| entry.value.truncate(limit));
        }
        _ => {}
    }

    while reply.encode().len() > mtu {
        let shrunk = match &mut reply {
            AttPdu::ReadByTypeResponse(rsp) if rsp.data.len() > 1 => rsp.data.pop().is_some(),
            AttPdu::ReadByGroupTypeResponse(rsp) if rsp.data.len() > 1 => rsp.data.pop().is_some(),
            AttPdu::FindInformationResponse(rsp) if rsp.information_data.len() > 1 => {
                rsp.information_data.pop().is_some()
            }
            AttPdu::FindByTypeValueResponse(rsp) if rsp.handles.len() > 1 => rsp.handles.pop().is_some(),
            _ => false,
        };
        if !shrunk {
            debug!("Reply 0x{:02x} still exceeds MTU {}", reply.opcode(), mtu);
            break;
        }
    }
    reply
}

impl GattServerHandler for ForwardServer {
    fn name(&self) -> &'static str {
        "forward"
    }

    fn exchange_mtu(&self, _ctx: &ServerContext, _req: &ExchangeMtuRequest, server_mtu: u16) -> AttResult<u16> {
        Ok(server_mtu.min(self.upstream.used_mtu()))
    }

    fn read(&self, ctx: &ServerContext, req: &AttPdu) -> AttResult<AttPdu> {
        self.relay(ctx, req)
    }

    fn write(&self, ctx: &ServerContext, req: &AttPdu) -> AttResult<Option<AttPdu>> {
        if let AttPdu::WriteCommand(_) = req {
            return match self.upstream.send(req) {
                Ok(()) => Ok(None),
                Err(err) => {
                    debug!("{}: dropping forwarded write command: {}", ctx.remote, err);
                    Err(AttError::code(AttErrorCode::Unlikely, request_handle(req)))
                }
            };
        }
        self.relay(ctx, req).map(Some)
    }

    fn find_information(&self, ctx: &ServerContext, req: &AttPdu) -> AttResult<AttPdu> {
        self.relay(ctx, req)
    }

    fn find_by_type_value(&self, ctx: &ServerContext, req: &AttPdu) -> AttResult<AttPdu> {
        self.relay(ctx, req)
    }

    fn read_by_type(&self, ctx: &ServerContext, req: &AttPdu) -> AttResult<AttPdu> {
        self.relay(ctx, req)
    }

    fn read_by_group_type(&self, ctx: &ServerContext, req: &AttPdu) -> AttResult<AttPdu> {
        self.relay(ctx, req)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::att::pdu::{AttributeData, HandleValue, ReadByGroupTypeResponse, ReadByTypeResponse, ReadResponse};

    #[test]
    fn test_fit_to_mtu() {
        let read = fit_to_mtu(AttPdu::ReadResponse(ReadResponse { value: vec![7; 100] }), 23);
        assert_eq!(read.encode().len(), 23);

        let data = (1..=10).map(|handle| HandleValue { handle, value: vec![0; 5] }).collect();
        let list = fit_to_mtu(AttPdu::ReadByTypeResponse(ReadByTypeResponse { data }), 23);
        let AttPdu::ReadByTypeResponse(rsp) = list else {
            panic!("reply kind changed");
        };
        // 2 header bytes + 3 entries of 7 bytes
        assert_eq!(rsp.data.len(), 3);
    }

    #[test]
    fn test_fit_to_mtu_cuts_lone_oversized_entry() {
        let data = vec![HandleValue { handle: 3, value: (0..100).collect() }];
        let list = fit_to_mtu(AttPdu::ReadByTypeResponse(ReadByTypeResponse { data }), 23);
        assert_eq!(list.encode().len(), 23);
        let AttPdu::ReadByTypeResponse(rsp) = list else {
            panic!("reply kind changed");
        };
        assert_eq!(rsp.data.len(), 1);
        assert_eq!(rsp.data[0].value, (0..19).collect::<Vec<u8>>());

        let data = (1..=3)
            .map(|handle| AttributeData { handle, end_group_handle: handle, value: vec![9; 40] })
            .collect();
        let groups = fit_to_mtu(AttPdu::ReadByGroupTypeResponse(ReadByGroupTypeResponse { data }), 23);
        assert_eq!(groups.encode().len(), 23);
        let AttPdu::ReadByGroupTypeResponse(rsp) = groups else {
            panic!("reply kind changed");
        };
        assert_eq!(rsp.data.len(), 1);
        assert_eq!(rsp.data[0].value.len(), 17);

        // entries longer than the length byte allows at a large MTU
        let data = vec![HandleValue { handle: 3, value: vec![1; 400] }];
        let AttPdu::ReadByTypeResponse(rsp) = fit_to_mtu(AttPdu::ReadByTypeResponse(ReadByTypeResponse { data }), 513)
        else {
            panic!("reply kind changed");
        };
        assert_eq!(rsp.data[0].value.len(), 253);
    }
}
