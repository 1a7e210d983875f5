//! Reading and writing attribute values, long values included

use super::handler::{CommandGuard, GattHandler};
use crate::att::constants::*;
use crate::att::error::AttErrorCode;
use crate::att::pdu::*;
use crate::error::{GattError, GattResult};
use crate::gatt::types::*;
use log::{debug, trace, warn};

fn unexpected(reply: &AttPdu) -> GattError {
    GattError::Protocol(format!("unexpected reply 0x{:02x}", reply.opcode()))
}

fn blob_offset(offset: usize) -> GattResult<u16> {
    u16::try_from(offset)
        .map_err(|_| GattError::InvalidArgument(format!("value offset {} out of range", offset)))
}

impl GattHandler {
    /// Read an attribute value.
    ///
    /// With `expected_length == 0` a single Read Request is made. Otherwise Read Blob
    /// requests follow until a chunk comes back shorter than `MTU - 1` or, for a positive
    /// `expected_length`, that many bytes have been read. An empty chunk at the end of a
    /// value whose length is a multiple of the chunk size is normal. Values are capped at
    /// 512 bytes.
    pub fn read_value(&self, handle: u16, expected_length: i32) -> GattResult<Vec<u8>> {
        let guard = self.lock_commands()?;
        self.read_value_locked(&guard, handle, expected_length)
    }

    pub(crate) fn read_value_locked(
        &self,
        guard: &CommandGuard<'_>,
        handle: u16,
        expected_length: i32,
    ) -> GattResult<Vec<u8>> {
        let chunk_len = self.used_mtu() as usize - 1;

        let req = AttPdu::ReadRequest(ReadRequest { handle });
        let mut value = match self.request_locked(guard, &req, self.read_timeout)? {
            AttPdu::ReadResponse(rsp) => rsp.value,
            other => return Err(unexpected(&other)),
        };
        if expected_length == 0 {
            return Ok(value);
        }

        let mut last_chunk = value.len();
        while last_chunk >= chunk_len {
            if expected_length > 0 && value.len() >= expected_length as usize {
                break;
            }
            if value.len() >= ATT_MAX_ATTRIBUTE_VALUE_LEN {
                debug!("{}: long read of 0x{:04x} stopped at {} bytes", self.remote(), handle, value.len());
                break;
            }

            let offset = blob_offset(value.len())?;
            let req = AttPdu::ReadBlobRequest(ReadBlobRequest { handle, offset });
            match self.request_locked(guard, &req, self.read_timeout) {
                Ok(AttPdu::ReadBlobResponse(rsp)) => {
                    last_chunk = rsp.value.len();
                    value.extend_from_slice(&rsp.value);
                }
                Ok(other) => return Err(unexpected(&other)),
                Err(err) => match err.error_response() {
                    Some(rsp)
                        if matches!(
                            rsp.error_code,
                            AttErrorCode::AttributeNotLong | AttErrorCode::InvalidOffset
                        ) =>
                    {
                        debug!("{}: long read of 0x{:04x} ended by {}", self.remote(), handle, rsp);
                        break;
                    }
                    _ => return Err(err),
                },
            }
        }

        value.truncate(ATT_MAX_ATTRIBUTE_VALUE_LEN);
        trace!("{}: read {} bytes from 0x{:04x}", self.remote(), value.len(), handle);
        Ok(value)
    }

    /// Write an attribute value.
    ///
    /// With `with_response` a Write Request is used, or Prepare/Execute Write when the value
    /// does not fit one PDU. Without it a Write Command is sent, which must fit one PDU.
    ///
    /// A Prepare Write Response that does not echo its request cancels the queue and
    /// disconnects.
    pub fn write_value(&self, handle: u16, value: &[u8], with_response: bool) -> GattResult<()> {
        let max_single = self.used_mtu() as usize - ATT_HANDLE_VALUE_HEADER_SIZE;

        if !with_response {
            if value.len() > max_single {
                return Err(GattError::InvalidArgument(format!(
                    "write command of {} bytes exceeds {} bytes",
                    value.len(),
                    max_single
                )));
            }
            return self.send(&AttPdu::WriteCommand(WriteCommand { handle, value: value.to_vec() }));
        }

        let guard = self.lock_commands()?;
        if value.len() > max_single {
            return self.write_long_value_locked(&guard, handle, value);
        }

        let req = AttPdu::WriteRequest(WriteRequest { handle, value: value.to_vec() });
        match self.request_locked(&guard, &req, self.write_timeout)? {
            AttPdu::WriteResponse(_) => Ok(()),
            other => Err(unexpected(&other)),
        }
    }

    fn write_long_value_locked(&self, guard: &CommandGuard<'_>, handle: u16, value: &[u8]) -> GattResult<()> {
        if value.len() > ATT_MAX_ATTRIBUTE_VALUE_LEN {
            return Err(GattError::InvalidArgument(format!(
                "value of {} bytes exceeds the attribute limit of {}",
                value.len(),
                ATT_MAX_ATTRIBUTE_VALUE_LEN
            )));
        }

        let chunk_len = self.used_mtu() as usize - ATT_PREPARE_WRITE_HEADER_SIZE;
        for (i, chunk) in value.chunks(chunk_len).enumerate() {
            let prepare = PrepareWriteRequest { handle, offset: blob_offset(i * chunk_len)?, value: chunk.to_vec() };
            match self.request_locked(guard, &AttPdu::PrepareWriteRequest(prepare.clone()), self.write_timeout) {
                Ok(AttPdu::PrepareWriteResponse(rsp)) if rsp.echoes(&prepare) => {}
                Ok(other) => {
                    warn!(
                        "{}: prepared write to 0x{:04x} at offset {} not echoed back",
                        self.remote(),
                        handle,
                        prepare.offset
                    );
                    self.cancel_prepared_writes_locked(guard);
                    self.disconnect_internal(DisconnectReason::ProtocolError);
                    return Err(GattError::Protocol(format!(
                        "prepare write reply 0x{:02x} does not echo the request",
                        other.opcode()
                    )));
                }
                Err(err) => {
                    if !err.is_fatal() {
                        self.cancel_prepared_writes_locked(guard);
                    }
                    return Err(err);
                }
            }
        }

        let execute = AttPdu::ExecuteWriteRequest(ExecuteWriteRequest { flags: ATT_EXEC_WRITE_COMMIT });
        match self.request_locked(guard, &execute, self.write_timeout)? {
            AttPdu::ExecuteWriteResponse(_) => Ok(()),
            other => Err(unexpected(&other)),
        }
    }

    fn cancel_prepared_writes_locked(&self, guard: &CommandGuard<'_>) {
        let cancel = AttPdu::ExecuteWriteRequest(ExecuteWriteRequest { flags: ATT_EXEC_WRITE_CANCEL });
        if let Err(err) = self.request_locked(guard, &cancel, self.write_timeout) {
            warn!("{}: cancelling prepared writes failed: {}", self.remote(), err);
        }
    }

    pub fn read_characteristic_value(
        &self,
        characteristic: &GattCharacteristic,
        expected_length: i32,
    ) -> GattResult<Vec<u8>> {
        self.read_value(characteristic.value_handle, expected_length)
    }

    pub fn write_characteristic_value(
        &self,
        characteristic: &GattCharacteristic,
        value: &[u8],
        with_response: bool,
    ) -> GattResult<()> {
        self.write_value(characteristic.value_handle, value, with_response)
    }

    /// Read a descriptor and store the value in it and in the engine's tree
    pub fn read_descriptor_value(&self, descriptor: &mut GattDescriptor) -> GattResult<()> {
        let value = self.read_value(descriptor.handle, -1)?;
        descriptor.value = value;
        self.store_descriptor_value(descriptor);
        Ok(())
    }

    /// Write a descriptor with response and store the value on success
    pub fn write_descriptor_value(&self, descriptor: &mut GattDescriptor, value: &[u8]) -> GattResult<()> {
        self.write_value(descriptor.handle, value, true)?;
        descriptor.value = value.to_vec();
        self.store_descriptor_value(descriptor);
        Ok(())
    }

    fn store_descriptor_value(&self, descriptor: &GattDescriptor) {
        let mut services = self.services.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let stored = services
            .iter_mut()
            .flat_map(|s| s.characteristics.iter_mut())
            .filter(|c| c.value_handle == descriptor.characteristic_value_handle)
            .flat_map(|c| c.descriptors.iter_mut())
            .find(|d| d.handle == descriptor.handle);
        if let Some(stored) = stored {
            stored.value = descriptor.value.clone();
        }
    }

    /// Write the notification/indication bits of a Client Characteristic Configuration
    pub fn config_notification_indication(
        &self,
        descriptor: &mut GattDescriptor,
        enable_notification: bool,
        enable_indication: bool,
    ) -> GattResult<()> {
        if !descriptor.is_client_char_config() {
            return Err(GattError::InvalidDescriptorType(descriptor.type_));
        }

        let mut bits = 0u16;
        if enable_notification {
            bits |= CCCD_NOTIFICATION;
        }
        if enable_indication {
            bits |= CCCD_INDICATION;
        }
        debug!("{}: CCCD 0x{:04x} <- 0x{:04x}", self.remote(), descriptor.handle, bits);
        self.write_descriptor_value(descriptor, &bits.to_le_bytes())
    }

    /// Enable notifications if the characteristic supports them, else indications.
    ///
    /// Returns `(notification, indication)` as enabled.
    pub fn enable_notification_or_indication(
        &self,
        characteristic: &GattCharacteristic,
    ) -> GattResult<(bool, bool)> {
        let notify = characteristic.properties.contains(CharacteristicProperties::NOTIFY);
        let indicate = !notify && characteristic.properties.contains(CharacteristicProperties::INDICATE);
        if !notify && !indicate {
            return Err(GattError::InvalidArgument(format!(
                "characteristic 0x{:04x} can neither notify nor indicate",
                characteristic.value_handle
            )));
        }

        let mut cccd = characteristic
            .client_char_config()
            .cloned()
            .ok_or_else(|| {
                GattError::InvalidArgument(format!(
                    "characteristic 0x{:04x} has no Client Characteristic Configuration",
                    characteristic.value_handle
                ))
            })?;
        self.config_notification_indication(&mut cccd, notify, indicate)?;
        Ok((notify, indicate))
    }

    /// Read several values in one exchange; the server concatenates them.
    pub fn read_multiple(&self, handles: &[u16]) -> GattResult<Vec<u8>> {
        if handles.len() < 2 {
            return Err(GattError::InvalidArgument("Read Multiple needs at least two handles".into()));
        }

        let guard = self.lock_commands()?;
        let req = AttPdu::ReadMultipleRequest(ReadMultipleRequest { handles: handles.to_vec() });
        match self.request_locked(&guard, &req, self.read_timeout)? {
            AttPdu::ReadMultipleResponse(rsp) => Ok(rsp.values),
            other => Err(unexpected(&other)),
        }
    }
}
