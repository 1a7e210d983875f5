//! Serving requests from a local attribute database

use super::{request_handle, GattServerHandler, ServerContext};
use crate::att::constants::*;
use crate::att::database::AttributeDatabase;
use crate::att::error::{AttError, AttErrorCode, AttResult};
use crate::att::pdu::*;
use crate::att::types::AttPermissions;
use crate::gatt::types::{CharacteristicProperties, PreferredConnectionParameters};
use crate::uuid::Uuid;
use log::debug;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

/// Builds a [`GattDatabase`] one declaration at a time.
///
/// Handles are assigned in order: a characteristic declaration is immediately followed by its
/// value, and characteristics that can notify or indicate get a CCCD right after the value.
#[derive(Debug, Default)]
pub struct GattDatabaseBuilder {
    attributes: AttributeDatabase,
    /// CCCD handle -> characteristic value handle
    cccds: BTreeMap<u16, u16>,
    in_service: bool,
    last_value_handle: Option<u16>,
}

impl GattDatabaseBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a primary service; returns its declaration handle.
    pub fn add_primary_service(&mut self, uuid: Uuid) -> AttResult<u16> {
        self.add_service(PRIMARY_SERVICE_UUID, uuid)
    }

    pub fn add_secondary_service(&mut self, uuid: Uuid) -> AttResult<u16> {
        self.add_service(SECONDARY_SERVICE_UUID, uuid)
    }

    fn add_service(&mut self, declaration_type: u16, uuid: Uuid) -> AttResult<u16> {
        let handle = self.attributes.add_attribute_with_next_handle(
            Uuid::from_u16(declaration_type),
            uuid.to_att_bytes(),
            AttPermissions::read_only(),
        )?;
        self.in_service = true;
        self.last_value_handle = None;
        Ok(handle)
    }

    /// Add a characteristic to the current service; returns its value handle.
    pub fn add_characteristic(
        &mut self,
        uuid: Uuid,
        properties: CharacteristicProperties,
        permissions: AttPermissions,
        value: Vec<u8>,
    ) -> AttResult<u16> {
        if !self.in_service {
            return Err(AttError::InvalidParameter("characteristic added before any service".into()));
        }

        let declaration_handle = self.next_handle()?;
        let value_handle = declaration_handle
            .checked_add(1)
            .ok_or_else(|| AttError::InvalidParameter("attribute handle space exhausted".into()))?;

        let mut declaration = Vec::with_capacity(3 + uuid.att_len());
        declaration.push(properties.bits());
        declaration.extend_from_slice(&value_handle.to_le_bytes());
        declaration.extend_from_slice(&uuid.to_att_bytes());

        self.attributes.add_attribute_with_next_handle(
            Uuid::from_u16(CHARACTERISTIC_UUID),
            declaration,
            AttPermissions::read_only(),
        )?;
        self.attributes.add_attribute_with_next_handle(uuid, value, permissions)?;
        self.last_value_handle = Some(value_handle);

        if properties.intersects(CharacteristicProperties::NOTIFY | CharacteristicProperties::INDICATE) {
            let cccd = self.attributes.add_attribute_with_next_handle(
                Uuid::from_u16(CLIENT_CHAR_CONFIG_UUID),
                vec![0, 0],
                AttPermissions::read_write(),
            )?;
            self.cccds.insert(cccd, value_handle);
        }

        Ok(value_handle)
    }

    /// Add a descriptor to the last characteristic; returns its handle.
    pub fn add_descriptor(&mut self, uuid: Uuid, permissions: AttPermissions, value: Vec<u8>) -> AttResult<u16> {
        let value_handle = self
            .last_value_handle
            .ok_or_else(|| AttError::InvalidParameter("descriptor added before any characteristic".into()))?;

        let handle = self.attributes.add_attribute_with_next_handle(uuid, value, permissions)?;
        if uuid == CLIENT_CHAR_CONFIG_UUID {
            self.cccds.insert(handle, value_handle);
        }
        Ok(handle)
    }

    /// Add a Generic Access service with device name, appearance and optional PPCP
    pub fn add_generic_access(
        &mut self,
        device_name: &str,
        appearance: u16,
        ppcp: Option<PreferredConnectionParameters>,
    ) -> AttResult<u16> {
        let service = self.add_primary_service(Uuid::from_u16(GENERIC_ACCESS_SERVICE_UUID))?;
        self.add_characteristic(
            Uuid::from_u16(DEVICE_NAME_UUID),
            CharacteristicProperties::READ,
            AttPermissions::read_only(),
            device_name.as_bytes().to_vec(),
        )?;
        self.add_characteristic(
            Uuid::from_u16(APPEARANCE_UUID),
            CharacteristicProperties::READ,
            AttPermissions::read_only(),
            appearance.to_le_bytes().to_vec(),
        )?;
        if let Some(ppcp) = ppcp {
            self.add_characteristic(
                Uuid::from_u16(PERIPHERAL_PREFERRED_CONN_PARAMS_UUID),
                CharacteristicProperties::READ,
                AttPermissions::read_only(),
                ppcp.to_bytes(),
            )?;
        }
        Ok(service)
    }

    fn next_handle(&self) -> AttResult<u16> {
        match self.attributes.last_handle() {
            None => Ok(ATT_HANDLE_MIN),
            Some(last) => last
                .checked_add(1)
                .ok_or_else(|| AttError::InvalidParameter("attribute handle space exhausted".into())),
        }
    }

    pub fn build(self) -> GattDatabase {
        GattDatabase { attributes: self.attributes, cccds: self.cccds }
    }
}

/// A finished attribute table shared by every connection serving it
#[derive(Debug)]
pub struct GattDatabase {
    attributes: AttributeDatabase,
    cccds: BTreeMap<u16, u16>,
}

impl GattDatabase {
    pub fn attributes(&self) -> &AttributeDatabase {
        &self.attributes
    }

    pub fn len(&self) -> usize {
        self.attributes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty()
    }

    /// Update a value from the local application, bypassing permissions
    pub fn set_value(&self, handle: u16, value: &[u8]) -> AttResult<()> {
        self.attributes.set_value(handle, value)
    }

    pub fn value(&self, handle: u16) -> Option<Vec<u8>> {
        self.attributes.get_attribute(handle).map(|attr| attr.value)
    }

    /// The characteristic value handle a CCCD belongs to
    pub fn cccd_owner(&self, cccd_handle: u16) -> Option<u16> {
        self.cccds.get(&cccd_handle).copied()
    }

    pub fn cccd_of(&self, value_handle: u16) -> Option<u16> {
        self.cccds.iter().find(|(_, &owner)| owner == value_handle).map(|(&cccd, _)| cccd)
    }
}

/// Per-connection server over a shared [`GattDatabase`].
///
/// CCCD values and the prepared-write queue belong to the connection, not the database.
pub struct DatabaseServer {
    db: Arc<GattDatabase>,
    prepared: Mutex<Vec<PrepareWriteRequest>>,
    /// CCCD handle -> bits written by this client
    cccd_state: Mutex<BTreeMap<u16, u16>>,
}

impl DatabaseServer {
    pub fn new(db: Arc<GattDatabase>) -> Self {
        Self { db, prepared: Mutex::new(Vec::new()), cccd_state: Mutex::new(BTreeMap::new()) }
    }

    fn prepared(&self) -> MutexGuard<'_, Vec<PrepareWriteRequest>> {
        self.prepared.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn cccd_state(&self) -> MutexGuard<'_, BTreeMap<u16, u16>> {
        self.cccd_state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// A stored value as this connection sees it
    fn connection_value(&self, handle: u16, stored: Vec<u8>) -> Vec<u8> {
        if self.db.cccd_owner(handle).is_none() {
            return stored;
        }
        self.cccd_state().get(&handle).copied().unwrap_or(0).to_le_bytes().to_vec()
    }

    fn read_value(&self, ctx: &ServerContext, handle: u16) -> AttResult<Vec<u8>> {
        let stored = self.db.attributes.read_by_handle(handle, ctx.security_level)?;
        Ok(self.connection_value(handle, stored))
    }

    fn write_value(&self, ctx: &ServerContext, handle: u16, value: &[u8]) -> AttResult<()> {
        if self.db.cccd_owner(handle).is_none() {
            return self.db.attributes.write_by_handle(handle, value, ctx.security_level);
        }

        self.db.attributes.check_writable(handle, ctx.security_level)?;
        if value.len() != 2 {
            return Err(AttError::code(AttErrorCode::InvalidAttributeValueLength, handle));
        }
        let bits = u16::from_le_bytes([value[0], value[1]]);
        debug!("{}: CCCD 0x{:04x} set to 0x{:04x}", ctx.remote, handle, bits);
        self.cccd_state().insert(handle, bits);
        Ok(())
    }

    fn prepare_write(&self, ctx: &ServerContext, req: &PrepareWriteRequest) -> AttResult<AttPdu> {
        self.db.attributes.check_writable(req.handle, ctx.security_level)?;

        let mut prepared = self.prepared();
        if prepared.len() >= ATT_PREPARE_WRITE_QUEUE_SIZE {
            return Err(AttError::code(AttErrorCode::PrepareQueueFull, req.handle));
        }
        prepared.push(req.clone());

        Ok(AttPdu::PrepareWriteResponse(PrepareWriteResponse {
            handle: req.handle,
            offset: req.offset,
            value: req.value.clone(),
        }))
    }

    fn execute_write(&self, ctx: &ServerContext, req: &ExecuteWriteRequest) -> AttResult<AttPdu> {
        let prepared = std::mem::take(&mut *self.prepared());
        if req.flags == ATT_EXEC_WRITE_CANCEL {
            debug!("{}: cancelled {} prepared writes", ctx.remote, prepared.len());
            return Ok(AttPdu::ExecuteWriteResponse(ExecuteWriteResponse));
        }

        let mut parts: BTreeMap<u16, Vec<(u16, Vec<u8>)>> = BTreeMap::new();
        for write in prepared {
            parts.entry(write.handle).or_default().push((write.offset, write.value));
        }

        for (handle, mut chunks) in parts {
            chunks.sort_by_key(|(offset, _)| *offset);

            let mut value = Vec::new();
            for (offset, chunk) in chunks {
                if offset as usize != value.len() {
                    return Err(AttError::code(AttErrorCode::InvalidOffset, handle));
                }
                value.extend_from_slice(&chunk);
            }
            if value.len() > ATT_MAX_ATTRIBUTE_VALUE_LEN {
                return Err(AttError::code(AttErrorCode::InvalidAttributeValueLength, handle));
            }
            self.write_value(ctx, handle, &value)?;
        }

        Ok(AttPdu::ExecuteWriteResponse(ExecuteWriteResponse))
    }
}

fn unexpected(req: &AttPdu) -> AttError {
    AttError::code(AttErrorCode::RequestNotSupported, request_handle(req))
}

impl GattServerHandler for DatabaseServer {
    fn name(&self) -> &'static str {
        "database"
    }

    fn exchange_mtu(&self, _ctx: &ServerContext, _req: &ExchangeMtuRequest, server_mtu: u16) -> AttResult<u16> {
        Ok(server_mtu)
    }

    fn read(&self, ctx: &ServerContext, req: &AttPdu) -> AttResult<AttPdu> {
        let limit = ctx.payload_len();
        match req {
            AttPdu::ReadRequest(r) => {
                let mut value = self.read_value(ctx, r.handle)?;
                value.truncate(limit);
                Ok(AttPdu::ReadResponse(ReadResponse { value }))
            }
            AttPdu::ReadBlobRequest(r) => {
                let value = self.read_value(ctx, r.handle)?;
                let offset = r.offset as usize;
                if offset > value.len() {
                    return Err(AttError::code(AttErrorCode::InvalidOffset, r.handle));
                }
                let end = value.len().min(offset + limit);
                Ok(AttPdu::ReadBlobResponse(ReadBlobResponse { value: value[offset..end].to_vec() }))
            }
            AttPdu::ReadMultipleRequest(r) => {
                let mut values = Vec::new();
                for &handle in &r.handles {
                    values.extend_from_slice(&self.read_value(ctx, handle)?);
                }
                values.truncate(limit);
                Ok(AttPdu::ReadMultipleResponse(ReadMultipleResponse { values }))
            }
            other => Err(unexpected(other)),
        }
    }

    fn write(&self, ctx: &ServerContext, req: &AttPdu) -> AttResult<Option<AttPdu>> {
        match req {
            AttPdu::WriteRequest(r) => {
                self.write_value(ctx, r.handle, &r.value)?;
                Ok(Some(AttPdu::WriteResponse(WriteResponse)))
            }
            AttPdu::WriteCommand(r) => {
                self.write_value(ctx, r.handle, &r.value)?;
                Ok(None)
            }
            AttPdu::PrepareWriteRequest(r) => self.prepare_write(ctx, r).map(Some),
            AttPdu::ExecuteWriteRequest(r) => self.execute_write(ctx, r).map(Some),
            other => Err(unexpected(other)),
        }
    }

    fn find_information(&self, ctx: &ServerContext, req: &AttPdu) -> AttResult<AttPdu> {
        let AttPdu::FindInformationRequest(r) = req else {
            return Err(unexpected(req));
        };
        let found = self.db.attributes.find_information(r.start_handle, r.end_handle)?;

        // All pairs in one response share the UUID width of the first.
        let short = found[0].1.as_u16().is_some();
        let (format, uuid_len) = if short {
            (ATT_FIND_INFO_RSP_FORMAT_16BIT, 2)
        } else {
            (ATT_FIND_INFO_RSP_FORMAT_128BIT, 16)
        };
        let max_entries = (ctx.mtu as usize - 2) / (2 + uuid_len);

        let information_data = found
            .into_iter()
            .take_while(|(_, uuid)| uuid.as_u16().is_some() == short)
            .take(max_entries)
            .map(|(handle, uuid)| HandleUuid { handle, uuid })
            .collect();
        Ok(AttPdu::FindInformationResponse(FindInformationResponse { format, information_data }))
    }

    fn find_by_type_value(&self, ctx: &ServerContext, req: &AttPdu) -> AttResult<AttPdu> {
        let AttPdu::FindByTypeValueRequest(r) = req else {
            return Err(unexpected(req));
        };
        let found = self.db.attributes.find_by_type_value(
            r.start_handle,
            r.end_handle,
            &Uuid::from_u16(r.attribute_type),
            &r.attribute_value,
            ctx.security_level,
        )?;

        let handles = found
            .into_iter()
            .take(ctx.payload_len() / 4)
            .map(|(found_handle, group_end_handle)| HandleRange { found_handle, group_end_handle })
            .collect();
        Ok(AttPdu::FindByTypeValueResponse(FindByTypeValueResponse { handles }))
    }

    fn read_by_type(&self, ctx: &ServerContext, req: &AttPdu) -> AttResult<AttPdu> {
        let AttPdu::ReadByTypeRequest(r) = req else {
            return Err(unexpected(req));
        };
        let found = self.db.attributes.read_by_type(
            r.start_handle,
            r.end_handle,
            &r.attribute_type,
            ctx.security_level,
        )?;

        let found: Vec<(u16, Vec<u8>)> = found
            .into_iter()
            .map(|(handle, value)| (handle, self.connection_value(handle, value)))
            .collect();

        // Entries must have equal length; the first decides, truncated to fit the PDU.
        let first_len = found[0].1.len();
        let value_len = first_len.min(ctx.mtu as usize - 4).min(u8::MAX as usize - 2);
        let max_entries = (ctx.mtu as usize - 2) / (2 + value_len);

        let data = found
            .into_iter()
            .take_while(|(_, value)| value.len() == first_len)
            .take(max_entries)
            .map(|(handle, mut value)| {
                value.truncate(value_len);
                HandleValue { handle, value }
            })
            .collect();
        Ok(AttPdu::ReadByTypeResponse(ReadByTypeResponse { data }))
    }

    fn read_by_group_type(&self, ctx: &ServerContext, req: &AttPdu) -> AttResult<AttPdu> {
        let AttPdu::ReadByGroupTypeRequest(r) = req else {
            return Err(unexpected(req));
        };
        let found = self.db.attributes.read_by_group_type(
            r.start_handle,
            r.end_handle,
            &r.group_type,
            ctx.security_level,
        )?;

        let first_len = found[0].2.len();
        let value_len = first_len.min(ctx.mtu as usize - 6).min(u8::MAX as usize - 4);
        let max_entries = (ctx.mtu as usize - 2) / (4 + value_len);

        let data = found
            .into_iter()
            .take_while(|(_, _, value)| value.len() == first_len)
            .take(max_entries)
            .map(|(handle, end_group_handle, mut value)| {
                value.truncate(value_len);
                AttributeData { handle, end_group_handle, value }
            })
            .collect();
        Ok(AttPdu::ReadByGroupTypeResponse(ReadByGroupTypeResponse { data }))
    }

    fn client_char_config(&self, value_handle: u16) -> Option<u16> {
        let cccd = self.db.cccd_of(value_handle)?;
        Some(self.cccd_state().get(&cccd).copied().unwrap_or(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::att::types::SecurityLevel;
    use crate::gap::BdAddr;

    const BATTERY_SERVICE: u16 = 0x180F;
    const BATTERY_LEVEL: u16 = 0x2A19;

    fn ctx(mtu: u16) -> ServerContext {
        ServerContext { remote: BdAddr::ANY, mtu, security_level: SecurityLevel::None }
    }

    fn battery_db() -> Arc<GattDatabase> {
        let mut builder = GattDatabaseBuilder::new();
        builder.add_generic_access("sensor", 0x0340, None).unwrap();
        builder.add_primary_service(Uuid::from_u16(BATTERY_SERVICE)).unwrap();
        builder
            .add_characteristic(
                Uuid::from_u16(BATTERY_LEVEL),
                CharacteristicProperties::READ | CharacteristicProperties::NOTIFY,
                AttPermissions::read_only(),
                vec![87],
            )
            .unwrap();
        Arc::new(builder.build())
    }

    #[test]
    fn test_builder_layout() {
        let db = battery_db();
        // 1: GAP service, 2/3: name, 4/5: appearance, 6: battery service, 7/8: level, 9: CCCD
        assert_eq!(db.len(), 9);
        assert_eq!(db.value(7), Some(vec![0x12, 0x08, 0x00, 0x19, 0x2A]));
        assert_eq!(db.cccd_owner(9), Some(8));
        assert_eq!(db.cccd_of(8), Some(9));
    }

    #[test]
    fn test_characteristic_needs_service() {
        let mut builder = GattDatabaseBuilder::new();
        let result = builder.add_characteristic(
            Uuid::from_u16(BATTERY_LEVEL),
            CharacteristicProperties::READ,
            AttPermissions::read_only(),
            vec![1],
        );
        assert!(matches!(result, Err(AttError::InvalidParameter(_))));
    }

    #[test]
    fn test_cccd_state_is_per_connection() {
        let db = battery_db();
        let first = DatabaseServer::new(db.clone());
        let second = DatabaseServer::new(db);

        let write = AttPdu::WriteRequest(WriteRequest { handle: 9, value: vec![0x01, 0x00] });
        assert_eq!(first.write(&ctx(23), &write).unwrap(), Some(AttPdu::WriteResponse(WriteResponse)));

        assert_eq!(first.client_char_config(8), Some(CCCD_NOTIFICATION));
        assert_eq!(second.client_char_config(8), Some(0));

        let read = AttPdu::ReadRequest(ReadRequest { handle: 9 });
        assert_eq!(
            first.read(&ctx(23), &read).unwrap(),
            AttPdu::ReadResponse(ReadResponse { value: vec![0x01, 0x00] })
        );
    }

    #[test]
    fn test_cccd_write_length() {
        let server = DatabaseServer::new(battery_db());
        let write = AttPdu::WriteRequest(WriteRequest { handle: 9, value: vec![0x01] });
        let err = server.write(&ctx(23), &write).unwrap_err();
        assert_eq!(err.to_error_code(), AttErrorCode::InvalidAttributeValueLength);
    }

    #[test]
    fn test_read_only_value() {
        let server = DatabaseServer::new(battery_db());
        let write = AttPdu::WriteRequest(WriteRequest { handle: 8, value: vec![1] });
        let err = server.write(&ctx(23), &write).unwrap_err();
        assert_eq!(err.to_error_code(), AttErrorCode::WriteNotPermitted);
        assert_eq!(err.handle(), Some(8));
    }

    #[test]
    fn test_prepared_write_assembly() {
        let mut builder = GattDatabaseBuilder::new();
        builder.add_primary_service(Uuid::from_u16(0xFFF0)).unwrap();
        let handle = builder
            .add_characteristic(
                Uuid::from_u16(0xFFF1),
                CharacteristicProperties::READ | CharacteristicProperties::WRITE,
                AttPermissions::read_write(),
                Vec::new(),
            )
            .unwrap();
        let db = Arc::new(builder.build());
        let server = DatabaseServer::new(db.clone());

        // Out of order on purpose; execution sorts by offset.
        for (offset, chunk) in [(3u16, vec![4, 5]), (0, vec![1, 2, 3])] {
            let req = PrepareWriteRequest { handle, offset, value: chunk.clone() };
            let rsp = server.write(&ctx(23), &AttPdu::PrepareWriteRequest(req)).unwrap();
            assert_eq!(
                rsp,
                Some(AttPdu::PrepareWriteResponse(PrepareWriteResponse { handle, offset, value: chunk }))
            );
        }
        assert_eq!(db.value(handle), Some(Vec::new()));

        let exec = AttPdu::ExecuteWriteRequest(ExecuteWriteRequest { flags: ATT_EXEC_WRITE_COMMIT });
        server.write(&ctx(23), &exec).unwrap();
        assert_eq!(db.value(handle), Some(vec![1, 2, 3, 4, 5]));
    }

    #[test]
    fn test_cancelled_prepared_write() {
        let mut builder = GattDatabaseBuilder::new();
        builder.add_primary_service(Uuid::from_u16(0xFFF0)).unwrap();
        let handle = builder
            .add_characteristic(
                Uuid::from_u16(0xFFF1),
                CharacteristicProperties::WRITE,
                AttPermissions::read_write(),
                vec![9],
            )
            .unwrap();
        let db = Arc::new(builder.build());
        let server = DatabaseServer::new(db.clone());

        let req = PrepareWriteRequest { handle, offset: 0, value: vec![1, 2] };
        server.write(&ctx(23), &AttPdu::PrepareWriteRequest(req)).unwrap();
        let cancel = AttPdu::ExecuteWriteRequest(ExecuteWriteRequest { flags: ATT_EXEC_WRITE_CANCEL });
        server.write(&ctx(23), &cancel).unwrap();

        assert_eq!(db.value(handle), Some(vec![9]));
        assert!(server.prepared().is_empty());
    }

    #[test]
    fn test_blob_offsets() {
        let mut builder = GattDatabaseBuilder::new();
        builder.add_primary_service(Uuid::from_u16(0xFFF0)).unwrap();
        let handle = builder
            .add_characteristic(
                Uuid::from_u16(0xFFF1),
                CharacteristicProperties::READ,
                AttPermissions::read_only(),
                (0..30).collect(),
            )
            .unwrap();
        let server = DatabaseServer::new(Arc::new(builder.build()));

        let read = server.read(&ctx(23), &AttPdu::ReadRequest(ReadRequest { handle })).unwrap();
        assert_eq!(read, AttPdu::ReadResponse(ReadResponse { value: (0..22).collect() }));

        let blob = |offset| server.read(&ctx(23), &AttPdu::ReadBlobRequest(ReadBlobRequest { handle, offset }));
        assert_eq!(blob(22).unwrap(), AttPdu::ReadBlobResponse(ReadBlobResponse { value: (22..30).collect() }));
        assert_eq!(blob(30).unwrap(), AttPdu::ReadBlobResponse(ReadBlobResponse { value: Vec::new() }));
        assert_eq!(blob(31).unwrap_err().to_error_code(), AttErrorCode::InvalidOffset);
    }

    #[test]
    fn test_group_response_fits_mtu() {
        let mut builder = GattDatabaseBuilder::new();
        for uuid in 0x1800..0x1808u16 {
            builder.add_primary_service(Uuid::from_u16(uuid)).unwrap();
        }
        let server = DatabaseServer::new(Arc::new(builder.build()));

        let req = AttPdu::ReadByGroupTypeRequest(ReadByGroupTypeRequest {
            start_handle: ATT_HANDLE_MIN,
            end_handle: ATT_HANDLE_MAX,
            group_type: Uuid::from_u16(PRIMARY_SERVICE_UUID),
        });
        let AttPdu::ReadByGroupTypeResponse(rsp) = server.read_by_group_type(&ctx(23), &req).unwrap() else {
            panic!("expected a group response");
        };
        // (23 - 2) / 6 entries of a 16-bit UUID
        assert_eq!(rsp.data.len(), 3);
        assert!(rsp.serialize().len() <= 23);
        assert_eq!(rsp.data[0].handle, 1);
        assert_eq!(rsp.data[0].end_group_handle, 1);
    }
}
