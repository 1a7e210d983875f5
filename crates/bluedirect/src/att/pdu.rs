//! ATT PDU codec
//!
//! Every PDU is `opcode (1 byte) + parameters`, little-endian, fixed offsets. Each PDU type
//! has its own struct implementing [`AttPacket`]; [`AttPdu`] wraps them all so the
//! engine can decode whatever arrives on the channel and classify it by [`OpcodeClass`].
//!
//! 128-bit UUIDs are copied byte-for-byte in transmission order and never reinterpreted
//! as integers.

use super::constants::*;
use super::error::{AttError, AttErrorCode, AttResult};
use crate::uuid::Uuid;
use byteorder::{LittleEndian, ReadBytesExt};
use std::io::{Cursor, Read};

/// How an opcode participates in the ATT exchange model
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpcodeClass {
    /// Client request, answered by exactly one response or an Error Response
    Request,
    /// Server response to a request (includes Error Response)
    Response,
    /// Client command, never answered
    Command,
    /// Server-initiated value push, never answered
    Notification,
    /// Server-initiated value push, answered by a confirmation
    Indication,
    /// Client answer to an indication
    Confirmation,
}

impl OpcodeClass {
    /// Classify a raw opcode.
    ///
    /// Opcodes this codec does not know are requests unless the command flag is set, so a
    /// server answers them with *Request Not Supported* as ATT requires.
    pub fn of(opcode: u8) -> Self {
        match opcode {
            ATT_ERROR_RSP
            | ATT_EXCHANGE_MTU_RSP
            | ATT_FIND_INFO_RSP
            | ATT_FIND_BY_TYPE_VALUE_RSP
            | ATT_READ_BY_TYPE_RSP
            | ATT_READ_RSP
            | ATT_READ_BLOB_RSP
            | ATT_READ_MULTIPLE_RSP
            | ATT_READ_BY_GROUP_TYPE_RSP
            | ATT_WRITE_RSP
            | ATT_PREPARE_WRITE_RSP
            | ATT_EXECUTE_WRITE_RSP => OpcodeClass::Response,
            ATT_HANDLE_VALUE_NTF => OpcodeClass::Notification,
            ATT_HANDLE_VALUE_IND => OpcodeClass::Indication,
            ATT_HANDLE_VALUE_CONF => OpcodeClass::Confirmation,
            op if op & ATT_OPCODE_COMMAND_FLAG != 0 => OpcodeClass::Command,
            _ => OpcodeClass::Request,
        }
    }
}

/// Response opcode matching a request opcode
pub fn response_opcode(request_opcode: u8) -> Option<u8> {
    match request_opcode {
        ATT_EXCHANGE_MTU_REQ => Some(ATT_EXCHANGE_MTU_RSP),
        ATT_FIND_INFO_REQ => Some(ATT_FIND_INFO_RSP),
        ATT_FIND_BY_TYPE_VALUE_REQ => Some(ATT_FIND_BY_TYPE_VALUE_RSP),
        ATT_READ_BY_TYPE_REQ => Some(ATT_READ_BY_TYPE_RSP),
        ATT_READ_REQ => Some(ATT_READ_RSP),
        ATT_READ_BLOB_REQ => Some(ATT_READ_BLOB_RSP),
        ATT_READ_MULTIPLE_REQ => Some(ATT_READ_MULTIPLE_RSP),
        ATT_READ_BY_GROUP_TYPE_REQ => Some(ATT_READ_BY_GROUP_TYPE_RSP),
        ATT_WRITE_REQ => Some(ATT_WRITE_RSP),
        ATT_PREPARE_WRITE_REQ => Some(ATT_PREPARE_WRITE_RSP),
        ATT_EXECUTE_WRITE_REQ => Some(ATT_EXECUTE_WRITE_RSP),
        ATT_HANDLE_VALUE_IND => Some(ATT_HANDLE_VALUE_CONF),
        _ => None,
    }
}

/// Minimum PDU length, opcode included, for the known opcodes.
pub fn min_pdu_len(opcode: u8) -> usize {
    match opcode {
        ATT_ERROR_RSP => 5,
        ATT_EXCHANGE_MTU_REQ | ATT_EXCHANGE_MTU_RSP => 3,
        ATT_FIND_INFO_REQ => 5,
        ATT_FIND_INFO_RSP => 2,
        ATT_FIND_BY_TYPE_VALUE_REQ => 7,
        ATT_READ_BY_TYPE_REQ | ATT_READ_BY_GROUP_TYPE_REQ => 7,
        ATT_READ_BY_TYPE_RSP | ATT_READ_BY_GROUP_TYPE_RSP => 2,
        ATT_READ_REQ => 3,
        ATT_READ_BLOB_REQ => 5,
        ATT_READ_MULTIPLE_REQ => 5,
        ATT_WRITE_REQ | ATT_WRITE_CMD => 3,
        ATT_PREPARE_WRITE_REQ | ATT_PREPARE_WRITE_RSP => 5,
        ATT_EXECUTE_WRITE_REQ => 2,
        ATT_HANDLE_VALUE_NTF | ATT_HANDLE_VALUE_IND => 3,
        _ => 1,
    }
}

/// ATT packet formats
pub trait AttPacket: Sized {
    /// Opcode for this packet
    fn opcode() -> u8;

    /// Parse packet from bytes, opcode included
    fn parse(data: &[u8]) -> AttResult<Self>;

    /// Serialize packet to bytes, opcode included
    fn serialize(&self) -> Vec<u8>;
}

/// Cursor over one PDU that reports short reads as malformed PDUs
struct PduReader<'a> {
    cursor: Cursor<&'a [u8]>,
    opcode: u8,
    len: usize,
}

impl<'a> PduReader<'a> {
    fn new(data: &'a [u8], opcode: u8) -> AttResult<Self> {
        if data.is_empty() {
            return Err(AttError::EmptyPdu);
        }
        if data[0] != opcode {
            return Err(AttError::MalformedPdu { opcode: data[0], len: data.len(), reason: "unexpected opcode" });
        }
        if data.len() < min_pdu_len(opcode) {
            return Err(AttError::MalformedPdu { opcode, len: data.len(), reason: "too short" });
        }

        let mut cursor = Cursor::new(data);
        cursor.set_position(1);
        Ok(Self { cursor, opcode, len: data.len() })
    }

    fn malformed(&self, reason: &'static str) -> AttError {
        AttError::MalformedPdu { opcode: self.opcode, len: self.len, reason }
    }

    fn u8(&mut self) -> AttResult<u8> {
        self.cursor.read_u8().map_err(|_| self.malformed("truncated field"))
    }

    fn u16(&mut self) -> AttResult<u16> {
        self.cursor.read_u16::<LittleEndian>().map_err(|_| self.malformed("truncated field"))
    }

    fn remaining(&self) -> usize {
        self.len - self.cursor.position() as usize
    }

    fn bytes(&mut self, count: usize) -> AttResult<Vec<u8>> {
        let mut buf = vec![0u8; count];
        self.cursor.read_exact(&mut buf).map_err(|_| self.malformed("truncated field"))?;
        Ok(buf)
    }

    fn rest(&mut self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(self.remaining());
        // Reading the remainder of an in-memory cursor cannot fail.
        let _ = self.cursor.read_to_end(&mut buf);
        buf
    }

    /// A UUID occupying the rest of the PDU (2 or 16 bytes)
    fn trailing_uuid(&mut self) -> AttResult<Uuid> {
        let raw = self.rest();
        match raw.len() {
            2 | 16 => Uuid::try_from_slice_le(&raw).ok_or_else(|| self.malformed("bad UUID")),
            _ => Err(self.malformed("UUID must be 2 or 16 bytes")),
        }
    }
}

/// Error response packet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorResponse {
    /// Request opcode in error
    pub request_opcode: u8,
    /// Attribute handle in error
    pub handle: u16,
    /// Error code
    pub error_code: AttErrorCode,
}

impl ErrorResponse {
    pub fn new(request_opcode: u8, handle: u16, error_code: AttErrorCode) -> Self {
        Self { request_opcode, handle, error_code }
    }

    pub fn is_attribute_not_found(&self) -> bool {
        self.error_code == AttErrorCode::AttributeNotFound
    }
}

impl std::fmt::Display for ErrorResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{:?} (0x{:02x}) for request 0x{:02x} on handle 0x{:04x}",
            self.error_code,
            u8::from(self.error_code),
            self.request_opcode,
            self.handle
        )
    }
}

impl AttPacket for ErrorResponse {
    fn opcode() -> u8 {
        ATT_ERROR_RSP
    }

    fn parse(data: &[u8]) -> AttResult<Self> {
        let mut r = PduReader::new(data, Self::opcode())?;
        Ok(Self {
            request_opcode: r.u8()?,
            handle: r.u16()?,
            error_code: r.u8()?.into(),
        })
    }

    fn serialize(&self) -> Vec<u8> {
        let mut packet = Vec::with_capacity(5);
        packet.push(Self::opcode());
        packet.push(self.request_opcode);
        packet.extend_from_slice(&self.handle.to_le_bytes());
        packet.push(self.error_code.into());
        packet
    }
}

/// Exchange MTU Request packet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExchangeMtuRequest {
    /// Client Rx MTU size
    pub client_mtu: u16,
}

impl AttPacket for ExchangeMtuRequest {
    fn opcode() -> u8 {
        ATT_EXCHANGE_MTU_REQ
    }

    fn parse(data: &[u8]) -> AttResult<Self> {
        let mut r = PduReader::new(data, Self::opcode())?;
        Ok(Self { client_mtu: r.u16()? })
    }

    fn serialize(&self) -> Vec<u8> {
        let mut packet = Vec::with_capacity(3);
        packet.push(Self::opcode());
        packet.extend_from_slice(&self.client_mtu.to_le_bytes());
        packet
    }
}

/// Exchange MTU Response packet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExchangeMtuResponse {
    /// Server Rx MTU size
    pub server_mtu: u16,
}

impl AttPacket for ExchangeMtuResponse {
    fn opcode() -> u8 {
        ATT_EXCHANGE_MTU_RSP
    }

    fn parse(data: &[u8]) -> AttResult<Self> {
        let mut r = PduReader::new(data, Self::opcode())?;
        Ok(Self { server_mtu: r.u16()? })
    }

    fn serialize(&self) -> Vec<u8> {
        let mut packet = Vec::with_capacity(3);
        packet.push(Self::opcode());
        packet.extend_from_slice(&self.server_mtu.to_le_bytes());
        packet
    }
}

/// Find Information Request packet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FindInformationRequest {
    pub start_handle: u16,
    pub end_handle: u16,
}

impl AttPacket for FindInformationRequest {
    fn opcode() -> u8 {
        ATT_FIND_INFO_REQ
    }

    fn parse(data: &[u8]) -> AttResult<Self> {
        let mut r = PduReader::new(data, Self::opcode())?;
        Ok(Self { start_handle: r.u16()?, end_handle: r.u16()? })
    }

    fn serialize(&self) -> Vec<u8> {
        let mut packet = Vec::with_capacity(5);
        packet.push(Self::opcode());
        packet.extend_from_slice(&self.start_handle.to_le_bytes());
        packet.extend_from_slice(&self.end_handle.to_le_bytes());
        packet
    }
}

/// Handle-UUID pair in a Find Information Response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandleUuid {
    pub handle: u16,
    pub uuid: Uuid,
}

/// Find Information Response packet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FindInformationResponse {
    /// [`ATT_FIND_INFO_RSP_FORMAT_16BIT`] or [`ATT_FIND_INFO_RSP_FORMAT_128BIT`]
    pub format: u8,
    pub information_data: Vec<HandleUuid>,
}

impl AttPacket for FindInformationResponse {
    fn opcode() -> u8 {
        ATT_FIND_INFO_RSP
    }

    fn parse(data: &[u8]) -> AttResult<Self> {
        let mut r = PduReader::new(data, Self::opcode())?;
        let format = r.u8()?;
        let uuid_len = match format {
            ATT_FIND_INFO_RSP_FORMAT_16BIT => 2,
            ATT_FIND_INFO_RSP_FORMAT_128BIT => 16,
            _ => return Err(r.malformed("unknown information data format")),
        };
        if r.remaining() % (2 + uuid_len) != 0 {
            return Err(r.malformed("information data not a multiple of the pair size"));
        }

        let mut information_data = Vec::with_capacity(r.remaining() / (2 + uuid_len));
        while r.remaining() > 0 {
            let handle = r.u16()?;
            let raw = r.bytes(uuid_len)?;
            let uuid = Uuid::try_from_slice_le(&raw).ok_or_else(|| r.malformed("bad UUID"))?;
            information_data.push(HandleUuid { handle, uuid });
        }

        Ok(Self { format, information_data })
    }

    fn serialize(&self) -> Vec<u8> {
        let mut packet = vec![Self::opcode(), self.format];
        for pair in &self.information_data {
            packet.extend_from_slice(&pair.handle.to_le_bytes());
            match (self.format, pair.uuid.as_u16()) {
                (ATT_FIND_INFO_RSP_FORMAT_16BIT, Some(uuid16)) => {
                    packet.extend_from_slice(&uuid16.to_le_bytes())
                }
                _ => packet.extend_from_slice(pair.uuid.as_bytes_le()),
            }
        }
        packet
    }
}

/// Find By Type Value Request packet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FindByTypeValueRequest {
    pub start_handle: u16,
    pub end_handle: u16,
    /// Always a 16-bit UUID in this request
    pub attribute_type: u16,
    pub attribute_value: Vec<u8>,
}

impl AttPacket for FindByTypeValueRequest {
    fn opcode() -> u8 {
        ATT_FIND_BY_TYPE_VALUE_REQ
    }

    fn parse(data: &[u8]) -> AttResult<Self> {
        let mut r = PduReader::new(data, Self::opcode())?;
        Ok(Self {
            start_handle: r.u16()?,
            end_handle: r.u16()?,
            attribute_type: r.u16()?,
            attribute_value: r.rest(),
        })
    }

    fn serialize(&self) -> Vec<u8> {
        let mut packet = Vec::with_capacity(7 + self.attribute_value.len());
        packet.push(Self::opcode());
        packet.extend_from_slice(&self.start_handle.to_le_bytes());
        packet.extend_from_slice(&self.end_handle.to_le_bytes());
        packet.extend_from_slice(&self.attribute_type.to_le_bytes());
        packet.extend_from_slice(&self.attribute_value);
        packet
    }
}

/// Handles Information entry of a Find By Type Value Response
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HandleRange {
    pub found_handle: u16,
    pub group_end_handle: u16,
}

/// Find By Type Value Response packet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FindByTypeValueResponse {
    pub handles: Vec<HandleRange>,
}

impl AttPacket for FindByTypeValueResponse {
    fn opcode() -> u8 {
        ATT_FIND_BY_TYPE_VALUE_RSP
    }

    fn parse(data: &[u8]) -> AttResult<Self> {
        let mut r = PduReader::new(data, Self::opcode())?;
        if r.remaining() % 4 != 0 {
            return Err(r.malformed("handles information not a multiple of 4"));
        }
        let mut handles = Vec::with_capacity(r.remaining() / 4);
        while r.remaining() > 0 {
            handles.push(HandleRange { found_handle: r.u16()?, group_end_handle: r.u16()? });
        }
        Ok(Self { handles })
    }

    fn serialize(&self) -> Vec<u8> {
        let mut packet = Vec::with_capacity(1 + 4 * self.handles.len());
        packet.push(Self::opcode());
        for range in &self.handles {
            packet.extend_from_slice(&range.found_handle.to_le_bytes());
            packet.extend_from_slice(&range.group_end_handle.to_le_bytes());
        }
        packet
    }
}

/// Read By Type Request packet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadByTypeRequest {
    pub start_handle: u16,
    pub end_handle: u16,
    pub attribute_type: Uuid,
}

impl AttPacket for ReadByTypeRequest {
    fn opcode() -> u8 {
        ATT_READ_BY_TYPE_REQ
    }

    fn parse(data: &[u8]) -> AttResult<Self> {
        let mut r = PduReader::new(data, Self::opcode())?;
        Ok(Self {
            start_handle: r.u16()?,
            end_handle: r.u16()?,
            attribute_type: r.trailing_uuid()?,
        })
    }

    fn serialize(&self) -> Vec<u8> {
        let mut packet = Vec::with_capacity(5 + self.attribute_type.att_len());
        packet.push(Self::opcode());
        packet.extend_from_slice(&self.start_handle.to_le_bytes());
        packet.extend_from_slice(&self.end_handle.to_le_bytes());
        packet.extend_from_slice(&self.attribute_type.to_att_bytes());
        packet
    }
}

/// Handle-value pair of a Read By Type Response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandleValue {
    pub handle: u16,
    pub value: Vec<u8>,
}

/// Read By Type Response packet
///
/// All entries share the same length; it is written once in the PDU.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadByTypeResponse {
    pub data: Vec<HandleValue>,
}

impl AttPacket for ReadByTypeResponse {
    fn opcode() -> u8 {
        ATT_READ_BY_TYPE_RSP
    }

    fn parse(data: &[u8]) -> AttResult<Self> {
        let mut r = PduReader::new(data, Self::opcode())?;
        let length = r.u8()? as usize;
        if r.remaining() == 0 {
            return Ok(Self { data: Vec::new() });
        }
        if length < 2 || r.remaining() % length != 0 {
            return Err(r.malformed("attribute data length mismatch"));
        }

        let mut entries = Vec::with_capacity(r.remaining() / length);
        while r.remaining() > 0 {
            let handle = r.u16()?;
            let value = r.bytes(length - 2)?;
            entries.push(HandleValue { handle, value });
        }
        Ok(Self { data: entries })
    }

    fn serialize(&self) -> Vec<u8> {
        let length = self.data.first().map_or(0, |entry| 2 + entry.value.len());
        let mut packet = Vec::with_capacity(2 + length * self.data.len());
        packet.push(Self::opcode());
        packet.push(length as u8);
        for entry in &self.data {
            packet.extend_from_slice(&entry.handle.to_le_bytes());
            packet.extend_from_slice(&entry.value);
        }
        packet
    }
}

/// Read Request packet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadRequest {
    pub handle: u16,
}

impl AttPacket for ReadRequest {
    fn opcode() -> u8 {
        ATT_READ_REQ
    }

    fn parse(data: &[u8]) -> AttResult<Self> {
        let mut r = PduReader::new(data, Self::opcode())?;
        Ok(Self { handle: r.u16()? })
    }

    fn serialize(&self) -> Vec<u8> {
        let mut packet = Vec::with_capacity(3);
        packet.push(Self::opcode());
        packet.extend_from_slice(&self.handle.to_le_bytes());
        packet
    }
}

/// Read Response packet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadResponse {
    pub value: Vec<u8>,
}

impl AttPacket for ReadResponse {
    fn opcode() -> u8 {
        ATT_READ_RSP
    }

    fn parse(data: &[u8]) -> AttResult<Self> {
        let mut r = PduReader::new(data, Self::opcode())?;
        Ok(Self { value: r.rest() })
    }

    fn serialize(&self) -> Vec<u8> {
        let mut packet = Vec::with_capacity(1 + self.value.len());
        packet.push(Self::opcode());
        packet.extend_from_slice(&self.value);
        packet
    }
}

/// Read Blob Request packet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadBlobRequest {
    pub handle: u16,
    pub offset: u16,
}

impl AttPacket for ReadBlobRequest {
    fn opcode() -> u8 {
        ATT_READ_BLOB_REQ
    }

    fn parse(data: &[u8]) -> AttResult<Self> {
        let mut r = PduReader::new(data, Self::opcode())?;
        Ok(Self { handle: r.u16()?, offset: r.u16()? })
    }

    fn serialize(&self) -> Vec<u8> {
        let mut packet = Vec::with_capacity(5);
        packet.push(Self::opcode());
        packet.extend_from_slice(&self.handle.to_le_bytes());
        packet.extend_from_slice(&self.offset.to_le_bytes());
        packet
    }
}

/// Read Blob Response packet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadBlobResponse {
    pub value: Vec<u8>,
}

impl AttPacket for ReadBlobResponse {
    fn opcode() -> u8 {
        ATT_READ_BLOB_RSP
    }

    fn parse(data: &[u8]) -> AttResult<Self> {
        let mut r = PduReader::new(data, Self::opcode())?;
        Ok(Self { value: r.rest() })
    }

    fn serialize(&self) -> Vec<u8> {
        let mut packet = Vec::with_capacity(1 + self.value.len());
        packet.push(Self::opcode());
        packet.extend_from_slice(&self.value);
        packet
    }
}

/// Read Multiple Request packet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadMultipleRequest {
    pub handles: Vec<u16>,
}

impl AttPacket for ReadMultipleRequest {
    fn opcode() -> u8 {
        ATT_READ_MULTIPLE_REQ
    }

    fn parse(data: &[u8]) -> AttResult<Self> {
        let mut r = PduReader::new(data, Self::opcode())?;
        if r.remaining() % 2 != 0 {
            return Err(r.malformed("odd handle list length"));
        }
        let mut handles = Vec::with_capacity(r.remaining() / 2);
        while r.remaining() > 0 {
            handles.push(r.u16()?);
        }
        Ok(Self { handles })
    }

    fn serialize(&self) -> Vec<u8> {
        let mut packet = Vec::with_capacity(1 + 2 * self.handles.len());
        packet.push(Self::opcode());
        for handle in &self.handles {
            packet.extend_from_slice(&handle.to_le_bytes());
        }
        packet
    }
}

/// Read Multiple Response packet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadMultipleResponse {
    /// Concatenated values, no delimiters
    pub values: Vec<u8>,
}

impl AttPacket for ReadMultipleResponse {
    fn opcode() -> u8 {
        ATT_READ_MULTIPLE_RSP
    }

    fn parse(data: &[u8]) -> AttResult<Self> {
        let mut r = PduReader::new(data, Self::opcode())?;
        Ok(Self { values: r.rest() })
    }

    fn serialize(&self) -> Vec<u8> {
        let mut packet = Vec::with_capacity(1 + self.values.len());
        packet.push(Self::opcode());
        packet.extend_from_slice(&self.values);
        packet
    }
}

/// Read By Group Type Request packet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadByGroupTypeRequest {
    pub start_handle: u16,
    pub end_handle: u16,
    pub group_type: Uuid,
}

impl AttPacket for ReadByGroupTypeRequest {
    fn opcode() -> u8 {
        ATT_READ_BY_GROUP_TYPE_REQ
    }

    fn parse(data: &[u8]) -> AttResult<Self> {
        let mut r = PduReader::new(data, Self::opcode())?;
        Ok(Self {
            start_handle: r.u16()?,
            end_handle: r.u16()?,
            group_type: r.trailing_uuid()?,
        })
    }

    fn serialize(&self) -> Vec<u8> {
        let mut packet = Vec::with_capacity(5 + self.group_type.att_len());
        packet.push(Self::opcode());
        packet.extend_from_slice(&self.start_handle.to_le_bytes());
        packet.extend_from_slice(&self.end_handle.to_le_bytes());
        packet.extend_from_slice(&self.group_type.to_att_bytes());
        packet
    }
}

/// Attribute data entry of a Read By Group Type Response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeData {
    /// Attribute handle
    pub handle: u16,
    /// End group handle
    pub end_group_handle: u16,
    /// Attribute value
    pub value: Vec<u8>,
}

/// Read By Group Type Response packet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadByGroupTypeResponse {
    pub data: Vec<AttributeData>,
}

impl AttPacket for ReadByGroupTypeResponse {
    fn opcode() -> u8 {
        ATT_READ_BY_GROUP_TYPE_RSP
    }

    fn parse(data: &[u8]) -> AttResult<Self> {
        let mut r = PduReader::new(data, Self::opcode())?;
        let length = r.u8()? as usize;
        if r.remaining() == 0 {
            return Ok(Self { data: Vec::new() });
        }
        if length < 4 || r.remaining() % length != 0 {
            return Err(r.malformed("attribute data length mismatch"));
        }

        let mut entries = Vec::with_capacity(r.remaining() / length);
        while r.remaining() > 0 {
            let handle = r.u16()?;
            let end_group_handle = r.u16()?;
            let value = r.bytes(length - 4)?;
            entries.push(AttributeData { handle, end_group_handle, value });
        }
        Ok(Self { data: entries })
    }

    fn serialize(&self) -> Vec<u8> {
        let length = self.data.first().map_or(0, |entry| 4 + entry.value.len());
        let mut packet = Vec::with_capacity(2 + length * self.data.len());
        packet.push(Self::opcode());
        packet.push(length as u8);
        for entry in &self.data {
            packet.extend_from_slice(&entry.handle.to_le_bytes());
            packet.extend_from_slice(&entry.end_group_handle.to_le_bytes());
            packet.extend_from_slice(&entry.value);
        }
        packet
    }
}

/// Write Request packet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteRequest {
    pub handle: u16,
    pub value: Vec<u8>,
}

impl AttPacket for WriteRequest {
    fn opcode() -> u8 {
        ATT_WRITE_REQ
    }

    fn parse(data: &[u8]) -> AttResult<Self> {
        let mut r = PduReader::new(data, Self::opcode())?;
        Ok(Self { handle: r.u16()?, value: r.rest() })
    }

    fn serialize(&self) -> Vec<u8> {
        handle_value_packet(Self::opcode(), self.handle, &self.value)
    }
}

/// Write Response packet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteResponse;

impl AttPacket for WriteResponse {
    fn opcode() -> u8 {
        ATT_WRITE_RSP
    }

    fn parse(data: &[u8]) -> AttResult<Self> {
        PduReader::new(data, Self::opcode())?;
        Ok(Self)
    }

    fn serialize(&self) -> Vec<u8> {
        vec![Self::opcode()]
    }
}

/// Write Command packet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteCommand {
    pub handle: u16,
    pub value: Vec<u8>,
}

impl AttPacket for WriteCommand {
    fn opcode() -> u8 {
        ATT_WRITE_CMD
    }

    fn parse(data: &[u8]) -> AttResult<Self> {
        let mut r = PduReader::new(data, Self::opcode())?;
        Ok(Self { handle: r.u16()?, value: r.rest() })
    }

    fn serialize(&self) -> Vec<u8> {
        handle_value_packet(Self::opcode(), self.handle, &self.value)
    }
}

/// Prepare Write Request packet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrepareWriteRequest {
    pub handle: u16,
    pub offset: u16,
    pub value: Vec<u8>,
}

impl AttPacket for PrepareWriteRequest {
    fn opcode() -> u8 {
        ATT_PREPARE_WRITE_REQ
    }

    fn parse(data: &[u8]) -> AttResult<Self> {
        let mut r = PduReader::new(data, Self::opcode())?;
        Ok(Self { handle: r.u16()?, offset: r.u16()?, value: r.rest() })
    }

    fn serialize(&self) -> Vec<u8> {
        prepare_write_packet(Self::opcode(), self.handle, self.offset, &self.value)
    }
}

/// Prepare Write Response packet, echoing the request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrepareWriteResponse {
    pub handle: u16,
    pub offset: u16,
    pub value: Vec<u8>,
}

impl PrepareWriteResponse {
    /// Whether this response echoes `request` exactly
    pub fn echoes(&self, request: &PrepareWriteRequest) -> bool {
        self.handle == request.handle && self.offset == request.offset && self.value == request.value
    }
}

impl AttPacket for PrepareWriteResponse {
    fn opcode() -> u8 {
        ATT_PREPARE_WRITE_RSP
    }

    fn parse(data: &[u8]) -> AttResult<Self> {
        let mut r = PduReader::new(data, Self::opcode())?;
        Ok(Self { handle: r.u16()?, offset: r.u16()?, value: r.rest() })
    }

    fn serialize(&self) -> Vec<u8> {
        prepare_write_packet(Self::opcode(), self.handle, self.offset, &self.value)
    }
}

/// Execute Write Request packet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecuteWriteRequest {
    /// [`ATT_EXEC_WRITE_COMMIT`] or [`ATT_EXEC_WRITE_CANCEL`]
    pub flags: u8,
}

impl AttPacket for ExecuteWriteRequest {
    fn opcode() -> u8 {
        ATT_EXECUTE_WRITE_REQ
    }

    fn parse(data: &[u8]) -> AttResult<Self> {
        let mut r = PduReader::new(data, Self::opcode())?;
        let flags = r.u8()?;
        if flags > ATT_EXEC_WRITE_COMMIT {
            return Err(r.malformed("invalid execute write flags"));
        }
        Ok(Self { flags })
    }

    fn serialize(&self) -> Vec<u8> {
        vec![Self::opcode(), self.flags]
    }
}

/// Execute Write Response packet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecuteWriteResponse;

impl AttPacket for ExecuteWriteResponse {
    fn opcode() -> u8 {
        ATT_EXECUTE_WRITE_RSP
    }

    fn parse(data: &[u8]) -> AttResult<Self> {
        PduReader::new(data, Self::opcode())?;
        Ok(Self)
    }

    fn serialize(&self) -> Vec<u8> {
        vec![Self::opcode()]
    }
}

/// Handle Value Notification packet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandleValueNotification {
    pub handle: u16,
    pub value: Vec<u8>,
}

impl AttPacket for HandleValueNotification {
    fn opcode() -> u8 {
        ATT_HANDLE_VALUE_NTF
    }

    fn parse(data: &[u8]) -> AttResult<Self> {
        let mut r = PduReader::new(data, Self::opcode())?;
        Ok(Self { handle: r.u16()?, value: r.rest() })
    }

    fn serialize(&self) -> Vec<u8> {
        handle_value_packet(Self::opcode(), self.handle, &self.value)
    }
}

/// Handle Value Indication packet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandleValueIndication {
    pub handle: u16,
    pub value: Vec<u8>,
}

impl AttPacket for HandleValueIndication {
    fn opcode() -> u8 {
        ATT_HANDLE_VALUE_IND
    }

    fn parse(data: &[u8]) -> AttResult<Self> {
        let mut r = PduReader::new(data, Self::opcode())?;
        Ok(Self { handle: r.u16()?, value: r.rest() })
    }

    fn serialize(&self) -> Vec<u8> {
        handle_value_packet(Self::opcode(), self.handle, &self.value)
    }
}

/// Handle Value Confirmation packet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandleValueConfirmation;

impl AttPacket for HandleValueConfirmation {
    fn opcode() -> u8 {
        ATT_HANDLE_VALUE_CONF
    }

    fn parse(data: &[u8]) -> AttResult<Self> {
        PduReader::new(data, Self::opcode())?;
        Ok(Self)
    }

    fn serialize(&self) -> Vec<u8> {
        vec![Self::opcode()]
    }
}

fn handle_value_packet(opcode: u8, handle: u16, value: &[u8]) -> Vec<u8> {
    let mut packet = Vec::with_capacity(ATT_HANDLE_VALUE_HEADER_SIZE + value.len());
    packet.push(opcode);
    packet.extend_from_slice(&handle.to_le_bytes());
    packet.extend_from_slice(value);
    packet
}

fn prepare_write_packet(opcode: u8, handle: u16, offset: u16, value: &[u8]) -> Vec<u8> {
    let mut packet = Vec::with_capacity(ATT_PREPARE_WRITE_HEADER_SIZE + value.len());
    packet.push(opcode);
    packet.extend_from_slice(&handle.to_le_bytes());
    packet.extend_from_slice(&offset.to_le_bytes());
    packet.extend_from_slice(value);
    packet
}

/// Any ATT PDU
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttPdu {
    ErrorResponse(ErrorResponse),
    ExchangeMtuRequest(ExchangeMtuRequest),
    ExchangeMtuResponse(ExchangeMtuResponse),
    FindInformationRequest(FindInformationRequest),
    FindInformationResponse(FindInformationResponse),
    FindByTypeValueRequest(FindByTypeValueRequest),
    FindByTypeValueResponse(FindByTypeValueResponse),
    ReadByTypeRequest(ReadByTypeRequest),
    ReadByTypeResponse(ReadByTypeResponse),
    ReadRequest(ReadRequest),
    ReadResponse(ReadResponse),
    ReadBlobRequest(ReadBlobRequest),
    ReadBlobResponse(ReadBlobResponse),
    ReadMultipleRequest(ReadMultipleRequest),
    ReadMultipleResponse(ReadMultipleResponse),
    ReadByGroupTypeRequest(ReadByGroupTypeRequest),
    ReadByGroupTypeResponse(ReadByGroupTypeResponse),
    WriteRequest(WriteRequest),
    WriteResponse(WriteResponse),
    WriteCommand(WriteCommand),
    PrepareWriteRequest(PrepareWriteRequest),
    PrepareWriteResponse(PrepareWriteResponse),
    ExecuteWriteRequest(ExecuteWriteRequest),
    ExecuteWriteResponse(ExecuteWriteResponse),
    HandleValueNotification(HandleValueNotification),
    HandleValueIndication(HandleValueIndication),
    HandleValueConfirmation(HandleValueConfirmation),
    /// Opcode this codec has no typed view for (e.g. signed writes)
    Unknown { opcode: u8, parameters: Vec<u8> },
}

impl AttPdu {
    /// Decode one PDU, rejecting anything longer than `mtu`.
    pub fn decode(data: &[u8], mtu: u16) -> AttResult<Self> {
        if data.is_empty() {
            return Err(AttError::EmptyPdu);
        }
        if data.len() > mtu as usize {
            return Err(AttError::ExceedsMtu { len: data.len(), mtu });
        }

        let pdu = match data[0] {
            ATT_ERROR_RSP => AttPdu::ErrorResponse(ErrorResponse::parse(data)?),
            ATT_EXCHANGE_MTU_REQ => AttPdu::ExchangeMtuRequest(ExchangeMtuRequest::parse(data)?),
            ATT_EXCHANGE_MTU_RSP => AttPdu::ExchangeMtuResponse(ExchangeMtuResponse::parse(data)?),
            ATT_FIND_INFO_REQ => {
                AttPdu::FindInformationRequest(FindInformationRequest::parse(data)?)
            }
            ATT_FIND_INFO_RSP => {
                AttPdu::FindInformationResponse(FindInformationResponse::parse(data)?)
            }
            ATT_FIND_BY_TYPE_VALUE_REQ => {
                AttPdu::FindByTypeValueRequest(FindByTypeValueRequest::parse(data)?)
            }
            ATT_FIND_BY_TYPE_VALUE_RSP => {
                AttPdu::FindByTypeValueResponse(FindByTypeValueResponse::parse(data)?)
            }
            ATT_READ_BY_TYPE_REQ => AttPdu::ReadByTypeRequest(ReadByTypeRequest::parse(data)?),
            ATT_READ_BY_TYPE_RSP => AttPdu::ReadByTypeResponse(ReadByTypeResponse::parse(data)?),
            ATT_READ_REQ => AttPdu::ReadRequest(ReadRequest::parse(data)?),
            ATT_READ_RSP => AttPdu::ReadResponse(ReadResponse::parse(data)?),
            ATT_READ_BLOB_REQ => AttPdu::ReadBlobRequest(ReadBlobRequest::parse(data)?),
            ATT_READ_BLOB_RSP => AttPdu::ReadBlobResponse(ReadBlobResponse::parse(data)?),
            ATT_READ_MULTIPLE_REQ => AttPdu::ReadMultipleRequest(ReadMultipleRequest::parse(data)?),
            ATT_READ_MULTIPLE_RSP => {
                AttPdu::ReadMultipleResponse(ReadMultipleResponse::parse(data)?)
            }
            ATT_READ_BY_GROUP_TYPE_REQ => {
                AttPdu::ReadByGroupTypeRequest(ReadByGroupTypeRequest::parse(data)?)
            }
            ATT_READ_BY_GROUP_TYPE_RSP => {
                AttPdu::ReadByGroupTypeResponse(ReadByGroupTypeResponse::parse(data)?)
            }
            ATT_WRITE_REQ => AttPdu::WriteRequest(WriteRequest::parse(data)?),
            ATT_WRITE_RSP => AttPdu::WriteResponse(WriteResponse::parse(data)?),
            ATT_WRITE_CMD => AttPdu::WriteCommand(WriteCommand::parse(data)?),
            ATT_PREPARE_WRITE_REQ => AttPdu::PrepareWriteRequest(PrepareWriteRequest::parse(data)?),
            ATT_PREPARE_WRITE_RSP => {
                AttPdu::PrepareWriteResponse(PrepareWriteResponse::parse(data)?)
            }
            ATT_EXECUTE_WRITE_REQ => AttPdu::ExecuteWriteRequest(ExecuteWriteRequest::parse(data)?),
            ATT_EXECUTE_WRITE_RSP => {
                AttPdu::ExecuteWriteResponse(ExecuteWriteResponse::parse(data)?)
            }
            ATT_HANDLE_VALUE_NTF => {
                AttPdu::HandleValueNotification(HandleValueNotification::parse(data)?)
            }
            ATT_HANDLE_VALUE_IND => {
                AttPdu::HandleValueIndication(HandleValueIndication::parse(data)?)
            }
            ATT_HANDLE_VALUE_CONF => {
                AttPdu::HandleValueConfirmation(HandleValueConfirmation::parse(data)?)
            }
            opcode => AttPdu::Unknown { opcode, parameters: data[1..].to_vec() },
        };
        Ok(pdu)
    }

    /// Encode to wire bytes, opcode included.
    pub fn encode(&self) -> Vec<u8> {
        match self {
            AttPdu::ErrorResponse(p) => p.serialize(),
            AttPdu::ExchangeMtuRequest(p) => p.serialize(),
            AttPdu::ExchangeMtuResponse(p) => p.serialize(),
            AttPdu::FindInformationRequest(p) => p.serialize(),
            AttPdu::FindInformationResponse(p) => p.serialize(),
            AttPdu::FindByTypeValueRequest(p) => p.serialize(),
            AttPdu::FindByTypeValueResponse(p) => p.serialize(),
            AttPdu::ReadByTypeRequest(p) => p.serialize(),
            AttPdu::ReadByTypeResponse(p) => p.serialize(),
            AttPdu::ReadRequest(p) => p.serialize(),
            AttPdu::ReadResponse(p) => p.serialize(),
            AttPdu::ReadBlobRequest(p) => p.serialize(),
            AttPdu::ReadBlobResponse(p) => p.serialize(),
            AttPdu::ReadMultipleRequest(p) => p.serialize(),
            AttPdu::ReadMultipleResponse(p) => p.serialize(),
            AttPdu::ReadByGroupTypeRequest(p) => p.serialize(),
            AttPdu::ReadByGroupTypeResponse(p) => p.serialize(),
            AttPdu::WriteRequest(p) => p.serialize(),
            AttPdu::WriteResponse(p) => p.serialize(),
            AttPdu::WriteCommand(p) => p.serialize(),
            AttPdu::PrepareWriteRequest(p) => p.serialize(),
            AttPdu::PrepareWriteResponse(p) => p.serialize(),
            AttPdu::ExecuteWriteRequest(p) => p.serialize(),
            AttPdu::ExecuteWriteResponse(p) => p.serialize(),
            AttPdu::HandleValueNotification(p) => p.serialize(),
            AttPdu::HandleValueIndication(p) => p.serialize(),
            AttPdu::HandleValueConfirmation(p) => p.serialize(),
            AttPdu::Unknown { opcode, parameters } => {
                let mut packet = Vec::with_capacity(1 + parameters.len());
                packet.push(*opcode);
                packet.extend_from_slice(parameters);
                packet
            }
        }
    }

    pub fn opcode(&self) -> u8 {
        match self {
            AttPdu::ErrorResponse(_) => ATT_ERROR_RSP,
            AttPdu::ExchangeMtuRequest(_) => ATT_EXCHANGE_MTU_REQ,
            AttPdu::ExchangeMtuResponse(_) => ATT_EXCHANGE_MTU_RSP,
            AttPdu::FindInformationRequest(_) => ATT_FIND_INFO_REQ,
            AttPdu::FindInformationResponse(_) => ATT_FIND_INFO_RSP,
            AttPdu::FindByTypeValueRequest(_) => ATT_FIND_BY_TYPE_VALUE_REQ,
            AttPdu::FindByTypeValueResponse(_) => ATT_FIND_BY_TYPE_VALUE_RSP,
            AttPdu::ReadByTypeRequest(_) => ATT_READ_BY_TYPE_REQ,
            AttPdu::ReadByTypeResponse(_) => ATT_READ_BY_TYPE_RSP,
            AttPdu::ReadRequest(_) => ATT_READ_REQ,
            AttPdu::ReadResponse(_) => ATT_READ_RSP,
            AttPdu::ReadBlobRequest(_) => ATT_READ_BLOB_REQ,
            AttPdu::ReadBlobResponse(_) => ATT_READ_BLOB_RSP,
            AttPdu::ReadMultipleRequest(_) => ATT_READ_MULTIPLE_REQ,
            AttPdu::ReadMultipleResponse(_) => ATT_READ_MULTIPLE_RSP,
            AttPdu::ReadByGroupTypeRequest(_) => ATT_READ_BY_GROUP_TYPE_REQ,
            AttPdu::ReadByGroupTypeResponse(_) => ATT_READ_BY_GROUP_TYPE_RSP,
            AttPdu::WriteRequest(_) => ATT_WRITE_REQ,
            AttPdu::WriteResponse(_) => ATT_WRITE_RSP,
            AttPdu::WriteCommand(_) => ATT_WRITE_CMD,
            AttPdu::PrepareWriteRequest(_) => ATT_PREPARE_WRITE_REQ,
            AttPdu::PrepareWriteResponse(_) => ATT_PREPARE_WRITE_RSP,
            AttPdu::ExecuteWriteRequest(_) => ATT_EXECUTE_WRITE_REQ,
            AttPdu::ExecuteWriteResponse(_) => ATT_EXECUTE_WRITE_RSP,
            AttPdu::HandleValueNotification(_) => ATT_HANDLE_VALUE_NTF,
            AttPdu::HandleValueIndication(_) => ATT_HANDLE_VALUE_IND,
            AttPdu::HandleValueConfirmation(_) => ATT_HANDLE_VALUE_CONF,
            AttPdu::Unknown { opcode, .. } => *opcode,
        }
    }

    pub fn class(&self) -> OpcodeClass {
        OpcodeClass::of(self.opcode())
    }

    /// Whether this PDU answers an outstanding request or indication
    pub fn is_reply(&self) -> bool {
        matches!(self.class(), OpcodeClass::Response | OpcodeClass::Confirmation)
    }

    /// Whether this PDU is a valid answer to a request with `request_opcode`
    pub fn answers(&self, request_opcode: u8) -> bool {
        match self {
            AttPdu::ErrorResponse(err) => err.request_opcode == request_opcode,
            other => response_opcode(request_opcode) == Some(other.opcode()),
        }
    }
}

impl From<ErrorResponse> for AttPdu {
    fn from(p: ErrorResponse) -> Self {
        AttPdu::ErrorResponse(p)
    }
}
