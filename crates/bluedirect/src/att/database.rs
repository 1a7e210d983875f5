//! Attribute database backing the local ATT server
//!
//! Attributes live in a handle-ordered map. Every lookup reports an empty result as
//! *Attribute Not Found* on the requested start handle, which is exactly the Error Response a
//! server sends for it.
use super::constants::*;
use super::error::{AttError, AttErrorCode, AttResult};
use super::types::{AttPermissions, SecurityLevel};
use crate::uuid::Uuid;
use std::collections::BTreeMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

/// An attribute in the database
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    /// Attribute handle
    pub handle: u16,
    /// Attribute type (UUID)
    pub type_: Uuid,
    /// Attribute value
    pub value: Vec<u8>,
    /// Attribute permissions
    pub permissions: AttPermissions,
}

impl Attribute {
    pub fn new(handle: u16, type_: Uuid, value: Vec<u8>, permissions: AttPermissions) -> Self {
        Self { handle, type_, value, permissions }
    }

    /// Whether this attribute opens a service group
    pub fn is_service_declaration(&self) -> bool {
        self.type_ == PRIMARY_SERVICE_UUID || self.type_ == SECONDARY_SERVICE_UUID
    }

    /// Read the value, enforcing permissions
    pub fn read(&self, security_level: SecurityLevel) -> AttResult<&[u8]> {
        self.permissions.check_read(self.handle, security_level)?;
        Ok(&self.value)
    }

    /// Replace the value, enforcing permissions and the attribute length limit
    pub fn write(&mut self, value: &[u8], security_level: SecurityLevel) -> AttResult<()> {
        self.permissions.check_write(self.handle, security_level)?;
        if value.len() > ATT_MAX_ATTRIBUTE_VALUE_LEN {
            return Err(AttError::code(AttErrorCode::InvalidAttributeValueLength, self.handle));
        }
        self.value = value.to_vec();
        Ok(())
    }
}

/// Attribute database
#[derive(Debug, Default)]
pub struct AttributeDatabase {
    attributes: RwLock<BTreeMap<u16, Attribute>>,
}

fn not_found(handle: u16) -> AttError {
    AttError::code(AttErrorCode::AttributeNotFound, handle)
}

fn check_range(start_handle: u16, end_handle: u16) -> AttResult<()> {
    if start_handle == ATT_HANDLE_INVALID || start_handle > end_handle {
        return Err(AttError::code(AttErrorCode::InvalidHandle, start_handle));
    }
    Ok(())
}

impl AttributeDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    fn attributes(&self) -> RwLockReadGuard<'_, BTreeMap<u16, Attribute>> {
        self.attributes.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn attributes_mut(&self) -> RwLockWriteGuard<'_, BTreeMap<u16, Attribute>> {
        self.attributes.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Add an attribute at its own handle
    pub fn add_attribute(&self, attr: Attribute) -> AttResult<u16> {
        let handle = attr.handle;
        if handle == ATT_HANDLE_INVALID {
            return Err(AttError::InvalidParameter("handle 0x0000 is reserved".into()));
        }

        let mut attributes = self.attributes_mut();
        if attributes.contains_key(&handle) {
            return Err(AttError::InvalidParameter(format!("Duplicate handle: 0x{:04x}", handle)));
        }
        attributes.insert(handle, attr);
        Ok(handle)
    }

    /// Add an attribute after the current last handle
    pub fn add_attribute_with_next_handle(
        &self,
        type_: Uuid,
        value: Vec<u8>,
        permissions: AttPermissions,
    ) -> AttResult<u16> {
        let mut attributes = self.attributes_mut();
        let handle = match attributes.keys().next_back() {
            None => ATT_HANDLE_MIN,
            Some(&ATT_HANDLE_MAX) => {
                return Err(AttError::InvalidParameter("attribute handle space exhausted".into()))
            }
            Some(&last) => last + 1,
        };
        attributes.insert(handle, Attribute::new(handle, type_, value, permissions));
        Ok(handle)
    }

    /// Number of attributes
    pub fn len(&self) -> usize {
        self.attributes().len()
    }

    pub fn is_empty(&self) -> bool {
        self.attributes().is_empty()
    }

    /// Highest handle in use
    pub fn last_handle(&self) -> Option<u16> {
        self.attributes().keys().next_back().copied()
    }

    /// Get an attribute by handle
    pub fn get_attribute(&self, handle: u16) -> Option<Attribute> {
        self.attributes().get(&handle).cloned()
    }

    /// Last handle of the group opened at `handle`: the attribute before the next service
    /// declaration, or the last attribute in the database.
    fn group_end(attributes: &BTreeMap<u16, Attribute>, handle: u16) -> u16 {
        let next_service = attributes
            .range(handle.saturating_add(1)..)
            .find(|(_, attr)| attr.is_service_declaration())
            .map(|(&next, _)| next);

        match next_service {
            Some(next) => next - 1,
            None => attributes.keys().next_back().copied().unwrap_or(handle),
        }
    }

    /// Handle/type pairs in a range; permissions do not apply
    pub fn find_information(&self, start_handle: u16, end_handle: u16) -> AttResult<Vec<(u16, Uuid)>> {
        check_range(start_handle, end_handle)?;
        let attributes = self.attributes();
        let results: Vec<(u16, Uuid)> = attributes
            .range(start_handle..=end_handle)
            .map(|(&handle, attr)| (handle, attr.type_))
            .collect();

        if results.is_empty() {
            return Err(not_found(start_handle));
        }
        Ok(results)
    }

    /// Attributes of `type_` whose value equals `value`, with their group end handles
    pub fn find_by_type_value(
        &self,
        start_handle: u16,
        end_handle: u16,
        type_: &Uuid,
        value: &[u8],
        security_level: SecurityLevel,
    ) -> AttResult<Vec<(u16, u16)>> {
        check_range(start_handle, end_handle)?;
        let attributes = self.attributes();
        let mut results = Vec::new();

        for (&handle, attr) in attributes.range(start_handle..=end_handle) {
            if attr.type_ != *type_ {
                continue;
            }
            if !matches!(attr.read(security_level), Ok(attr_value) if attr_value == value) {
                continue;
            }
            let group_end = if attr.is_service_declaration() {
                Self::group_end(&attributes, handle)
            } else {
                handle
            };
            results.push((handle, group_end));
        }

        if results.is_empty() {
            return Err(not_found(start_handle));
        }
        Ok(results)
    }

    /// Values of the attributes of `attr_type` in a range.
    ///
    /// The first matching attribute that cannot be read fails the request; a later one ends
    /// the list so the peer retries from there.
    pub fn read_by_type(
        &self,
        start_handle: u16,
        end_handle: u16,
        attr_type: &Uuid,
        security_level: SecurityLevel,
    ) -> AttResult<Vec<(u16, Vec<u8>)>> {
        check_range(start_handle, end_handle)?;
        let attributes = self.attributes();
        let mut results = Vec::new();

        for (&handle, attr) in attributes.range(start_handle..=end_handle) {
            if attr.type_ != *attr_type {
                continue;
            }
            match attr.read(security_level) {
                Ok(value) => results.push((handle, value.to_vec())),
                Err(err) if results.is_empty() => return Err(err),
                Err(_) => break,
            }
        }

        if results.is_empty() {
            return Err(not_found(start_handle));
        }
        Ok(results)
    }

    /// Service groups of `group_type` in a range as `(handle, group end, value)`
    pub fn read_by_group_type(
        &self,
        start_handle: u16,
        end_handle: u16,
        group_type: &Uuid,
        security_level: SecurityLevel,
    ) -> AttResult<Vec<(u16, u16, Vec<u8>)>> {
        check_range(start_handle, end_handle)?;
        if *group_type != PRIMARY_SERVICE_UUID && *group_type != SECONDARY_SERVICE_UUID {
            return Err(AttError::code(AttErrorCode::UnsupportedGroupType, start_handle));
        }

        let attributes = self.attributes();
        let mut results = Vec::new();
        for (&handle, attr) in attributes.range(start_handle..=end_handle) {
            if attr.type_ != *group_type {
                continue;
            }
            let value = attr.read(security_level)?;
            results.push((handle, Self::group_end(&attributes, handle), value.to_vec()));
        }

        if results.is_empty() {
            return Err(not_found(start_handle));
        }
        Ok(results)
    }

    /// Read an attribute value by handle
    pub fn read_by_handle(&self, handle: u16, security_level: SecurityLevel) -> AttResult<Vec<u8>> {
        let attributes = self.attributes();
        let attr = attributes
            .get(&handle)
            .ok_or_else(|| AttError::code(AttErrorCode::InvalidHandle, handle))?;
        Ok(attr.read(security_level)?.to_vec())
    }

    /// Write an attribute value by handle
    pub fn write_by_handle(&self, handle: u16, value: &[u8], security_level: SecurityLevel) -> AttResult<()> {
        let mut attributes = self.attributes_mut();
        let attr = attributes
            .get_mut(&handle)
            .ok_or_else(|| AttError::code(AttErrorCode::InvalidHandle, handle))?;
        attr.write(value, security_level)
    }

    /// Replace a value from the local side, bypassing permissions
    pub fn set_value(&self, handle: u16, value: &[u8]) -> AttResult<()> {
        let mut attributes = self.attributes_mut();
        let attr = attributes
            .get_mut(&handle)
            .ok_or_else(|| AttError::code(AttErrorCode::InvalidHandle, handle))?;
        attr.value = value.to_vec();
        Ok(())
    }

    /// Check that `handle` exists and may be written at `security_level`
    pub fn check_writable(&self, handle: u16, security_level: SecurityLevel) -> AttResult<()> {
        let attributes = self.attributes();
        let attr = attributes
            .get(&handle)
            .ok_or_else(|| AttError::code(AttErrorCode::InvalidHandle, handle))?;
        attr.permissions.check_write(handle, security_level)
    }
}
