//! Service, characteristic and descriptor discovery
//!
//! Discovery walks the server's handle space once per connection and is best effort: an
//! Error Response other than *Attribute Not Found* ends the affected sub-range and keeps
//! what was found so far. Fatal errors abort it.

use super::handler::{CommandGuard, GattHandler};
use crate::att::constants::*;
use crate::att::pdu::*;
use crate::error::{GattError, GattResult};
use crate::gatt::types::*;
use crate::uuid::Uuid;
use log::{debug, info, warn};

/// What a discovery step does with a request failure
enum Stop {
    /// The range is exhausted or the peer refused; keep what was found
    Done,
    Fatal(GattError),
}

fn classify(err: GattError, what: &str) -> Stop {
    match err.error_response() {
        Some(rsp) if rsp.is_attribute_not_found() => Stop::Done,
        Some(rsp) => {
            warn!("{} discovery stopped by {}", what, rsp);
            Stop::Done
        }
        None if err.is_fatal() || matches!(err, GattError::NotConnected) => Stop::Fatal(err),
        None => {
            warn!("{} discovery stopped: {}", what, err);
            Stop::Done
        }
    }
}

fn unexpected(reply: &AttPdu) -> GattError {
    GattError::Protocol(format!("unexpected discovery reply 0x{:02x}", reply.opcode()))
}

impl GattHandler {
    /// Discover all primary services with their characteristics and descriptors.
    ///
    /// Replaces the engine's service tree and returns a copy of it.
    pub fn discover_complete_primary_services(&self) -> GattResult<Vec<GattService>> {
        self.require_role(GattRole::Client)?;
        let guard = self.lock_commands()?;

        let mut services = self.discover_primary_services_locked(&guard)?;
        for service in services.iter_mut() {
            self.discover_characteristics_locked(&guard, service)?;
            self.discover_descriptors_locked(&guard, service)?;
        }
        if self.config.read_descriptor_values {
            self.read_descriptor_values_locked(&guard, &mut services)?;
        }

        if !self.is_connected() {
            return Err(GattError::NotConnected);
        }
        let characteristics: usize = services.iter().map(|s| s.characteristics.len()).sum();
        info!(
            "{}: discovered {} services, {} characteristics",
            self.remote(),
            services.len(),
            characteristics
        );
        for service in &services {
            debug!("{}: {}", self.remote(), service);
        }

        *self.services.lock().unwrap_or_else(|poisoned| poisoned.into_inner()) = services.clone();
        Ok(services)
    }

    fn discover_primary_services_locked(&self, guard: &CommandGuard<'_>) -> GattResult<Vec<GattService>> {
        let mut services: Vec<GattService> = Vec::new();
        let mut start_handle = ATT_HANDLE_MIN;

        loop {
            let req = AttPdu::ReadByGroupTypeRequest(ReadByGroupTypeRequest {
                start_handle,
                end_handle: ATT_HANDLE_MAX,
                group_type: Uuid::from_u16(PRIMARY_SERVICE_UUID),
            });
            let rsp = match self.request_locked(guard, &req, self.read_timeout) {
                Ok(AttPdu::ReadByGroupTypeResponse(rsp)) => rsp,
                Ok(other) => return Err(unexpected(&other)),
                Err(err) => match classify(err, "Service") {
                    Stop::Done => break,
                    Stop::Fatal(err) => return Err(err),
                },
            };

            let mut last_end = None;
            for entry in rsp.data {
                let overlaps = services.last().is_some_and(|prev| entry.handle <= prev.end_handle);
                if entry.handle < start_handle || entry.end_group_handle < entry.handle || overlaps {
                    warn!(
                        "{}: ignoring service group 0x{:04x}..0x{:04x}",
                        self.remote(),
                        entry.handle,
                        entry.end_group_handle
                    );
                    continue;
                }
                let Some(uuid) = Uuid::try_from_slice_le(&entry.value) else {
                    warn!("{}: service 0x{:04x} has a malformed UUID", self.remote(), entry.handle);
                    continue;
                };
                services.push(GattService::new(true, entry.handle, entry.end_group_handle, uuid));
                last_end = Some(entry.end_group_handle);
            }

            match last_end {
                Some(end) if end < ATT_HANDLE_MAX => start_handle = end + 1,
                _ => break,
            }
        }
        Ok(services)
    }

    fn discover_characteristics_locked(&self, guard: &CommandGuard<'_>, service: &mut GattService) -> GattResult<()> {
        let mut start_handle = service.start_handle;

        while start_handle <= service.end_handle {
            let req = AttPdu::ReadByTypeRequest(ReadByTypeRequest {
                start_handle,
                end_handle: service.end_handle,
                attribute_type: Uuid::from_u16(CHARACTERISTIC_UUID),
            });
            let rsp = match self.request_locked(guard, &req, self.read_timeout) {
                Ok(AttPdu::ReadByTypeResponse(rsp)) => rsp,
                Ok(other) => return Err(unexpected(&other)),
                Err(err) => match classify(err, "Characteristic") {
                    Stop::Done => break,
                    Stop::Fatal(err) => return Err(err),
                },
            };

            let mut last_handle = None;
            for entry in rsp.data {
                if entry.handle < start_handle || entry.handle > service.end_handle {
                    continue;
                }
                last_handle = Some(entry.handle);
                match GattCharacteristic::from_declaration(service.start_handle, entry.handle, &entry.value) {
                    Some(characteristic) => service.characteristics.push(characteristic),
                    None => warn!(
                        "{}: malformed characteristic declaration at 0x{:04x}",
                        self.remote(),
                        entry.handle
                    ),
                }
            }

            match last_handle {
                Some(handle) if handle < service.end_handle => start_handle = handle + 1,
                _ => break,
            }
        }
        Ok(())
    }

    fn discover_descriptors_locked(&self, guard: &CommandGuard<'_>, service: &mut GattService) -> GattResult<()> {
        let ends: Vec<u16> = (0..service.characteristics.len())
            .map(|i| match service.characteristics.get(i + 1) {
                Some(next) => next.declaration_handle.saturating_sub(1),
                None => service.end_handle,
            })
            .collect();

        for (characteristic, end_handle) in service.characteristics.iter_mut().zip(ends) {
            let mut start_handle = match characteristic.value_handle.checked_add(1) {
                Some(handle) => handle,
                None => continue,
            };

            while start_handle <= end_handle {
                let req = AttPdu::FindInformationRequest(FindInformationRequest { start_handle, end_handle });
                let rsp = match self.request_locked(guard, &req, self.read_timeout) {
                    Ok(AttPdu::FindInformationResponse(rsp)) => rsp,
                    Ok(other) => return Err(unexpected(&other)),
                    Err(err) => match classify(err, "Descriptor") {
                        Stop::Done => break,
                        Stop::Fatal(err) => return Err(err),
                    },
                };

                let mut last_handle = None;
                for pair in rsp.information_data {
                    if pair.handle < start_handle || pair.handle > end_handle {
                        continue;
                    }
                    last_handle = Some(pair.handle);
                    characteristic
                        .descriptors
                        .push(GattDescriptor::new(characteristic.value_handle, pair.handle, pair.uuid));
                }

                match last_handle {
                    Some(handle) if handle < end_handle => start_handle = handle + 1,
                    _ => break,
                }
            }
        }
        Ok(())
    }

    fn read_descriptor_values_locked(&self, guard: &CommandGuard<'_>, services: &mut [GattService]) -> GattResult<()> {
        let descriptors = services
            .iter_mut()
            .flat_map(|s| s.characteristics.iter_mut())
            .flat_map(|c| c.descriptors.iter_mut());

        for descriptor in descriptors {
            match self.read_value_locked(guard, descriptor.handle, 0) {
                Ok(value) => descriptor.value = value,
                Err(err) if err.is_fatal() => return Err(err),
                Err(err) => debug!(
                    "{}: descriptor 0x{:04x} not readable: {}",
                    self.remote(),
                    descriptor.handle,
                    err
                ),
            }
        }
        Ok(())
    }

    /// Read the Generic Access service, if discovered, and remember it.
    ///
    /// Characteristics that are missing or unreadable are left at their defaults.
    pub fn read_generic_access(&self) -> GattResult<Option<GenericAccess>> {
        let Some(service) = self.find_service(&Uuid::from_u16(GENERIC_ACCESS_SERVICE_UUID)) else {
            return Ok(None);
        };

        let guard = self.lock_commands()?;
        let read = |uuid: u16| -> GattResult<Option<Vec<u8>>> {
            let Some(characteristic) = service.find_characteristic(&Uuid::from_u16(uuid)) else {
                return Ok(None);
            };
            match self.read_value_locked(&guard, characteristic.value_handle, 0) {
                Ok(value) => Ok(Some(value)),
                Err(err) if err.is_fatal() => Err(err),
                Err(err) => {
                    debug!("{}: Generic Access 0x{:04x} not readable: {}", self.remote(), uuid, err);
                    Ok(None)
                }
            }
        };

        let mut ga = GenericAccess::default();
        if let Some(name) = read(DEVICE_NAME_UUID)? {
            ga.device_name = String::from_utf8_lossy(&name).into_owned();
        }
        if let Some(appearance) = read(APPEARANCE_UUID)? {
            if appearance.len() >= 2 {
                ga.appearance = u16::from_le_bytes([appearance[0], appearance[1]]);
            }
        }
        if let Some(ppcp) = read(PERIPHERAL_PREFERRED_CONN_PARAMS_UUID)? {
            ga.preferred_connection_parameters = PreferredConnectionParameters::parse(&ppcp);
        }

        *self.generic_access.lock().unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(ga.clone());
        Ok(Some(ga))
    }
}
