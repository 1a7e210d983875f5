//! GATT data model
//!
//! The discovered tree is owned top-down: a service holds its characteristics, a
//! characteristic holds its descriptors. Children remember their parent by handle
//! (`service_handle`, `characteristic_value_handle`) and the engine resolves them with
//! `service_of` / `characteristic_of`.

use crate::att::constants::*;
use crate::uuid::Uuid;
use bitflags::bitflags;
use std::fmt;

bitflags! {
    /// Characteristic properties as defined in the Bluetooth specification
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct CharacteristicProperties: u8 {
        const BROADCAST = 0x01;
        const READ = 0x02;
        const WRITE_WITHOUT_RESPONSE = 0x04;
        const WRITE = 0x08;
        const NOTIFY = 0x10;
        const INDICATE = 0x20;
        const AUTHENTICATED_SIGNED_WRITES = 0x40;
        const EXTENDED_PROPERTIES = 0x80;
    }
}

/// Which side of the ATT bearer this engine plays
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GattRole {
    Client,
    Server,
}

/// Why an engine disconnected
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisconnectReason {
    IoError,
    Timeout,
    ProtocolError,
    Requested,
}

impl fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reason = match self {
            DisconnectReason::IoError => "I/O error",
            DisconnectReason::Timeout => "reply timeout",
            DisconnectReason::ProtocolError => "protocol error",
            DisconnectReason::Requested => "requested",
        };
        f.write_str(reason)
    }
}

/// A GATT service
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GattService {
    /// Whether this is a primary or secondary service
    pub is_primary: bool,
    /// Service declaration handle
    pub start_handle: u16,
    /// Last handle of the service group (inclusive)
    pub end_handle: u16,
    /// Service UUID
    pub type_: Uuid,
    pub characteristics: Vec<GattCharacteristic>,
}

impl GattService {
    pub fn new(is_primary: bool, start_handle: u16, end_handle: u16, type_: Uuid) -> Self {
        Self { is_primary, start_handle, end_handle, type_, characteristics: Vec::new() }
    }

    /// Whether `handle` lies in this service's group
    pub fn contains(&self, handle: u16) -> bool {
        (self.start_handle..=self.end_handle).contains(&handle)
    }

    pub fn find_characteristic(&self, value_type: &Uuid) -> Option<&GattCharacteristic> {
        self.characteristics.iter().find(|c| c.value_type == *value_type)
    }
}

impl fmt::Display for GattService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Service {:?} [0x{:04x}..0x{:04x}] {} characteristics",
            self.type_,
            self.start_handle,
            self.end_handle,
            self.characteristics.len()
        )
    }
}

/// A GATT characteristic
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GattCharacteristic {
    /// Start handle of the owning service
    pub service_handle: u16,
    /// Characteristic declaration handle
    pub declaration_handle: u16,
    /// Value handle, as read from the declaration
    pub value_handle: u16,
    pub properties: CharacteristicProperties,
    /// Characteristic UUID
    pub value_type: Uuid,
    pub descriptors: Vec<GattDescriptor>,
}

impl GattCharacteristic {
    /// Decode a characteristic declaration value: properties (1), value handle (2), UUID (2 or 16).
    pub fn from_declaration(service_handle: u16, declaration_handle: u16, value: &[u8]) -> Option<Self> {
        if value.len() != 5 && value.len() != 19 {
            return None;
        }
        let properties = CharacteristicProperties::from_bits_retain(value[0]);
        let value_handle = u16::from_le_bytes([value[1], value[2]]);
        let value_type = Uuid::try_from_slice_le(&value[3..])?;

        Some(Self {
            service_handle,
            declaration_handle,
            value_handle,
            properties,
            value_type,
            descriptors: Vec::new(),
        })
    }

    /// Encode the declaration value for this characteristic
    pub fn declaration_value(&self) -> Vec<u8> {
        let mut value = Vec::with_capacity(3 + self.value_type.att_len());
        value.push(self.properties.bits());
        value.extend_from_slice(&self.value_handle.to_le_bytes());
        value.extend_from_slice(&self.value_type.to_att_bytes());
        value
    }

    pub fn find_descriptor(&self, type_: &Uuid) -> Option<&GattDescriptor> {
        self.descriptors.iter().find(|d| d.type_ == *type_)
    }

    /// The Client Characteristic Configuration descriptor, if present
    pub fn client_char_config(&self) -> Option<&GattDescriptor> {
        self.descriptors.iter().find(|d| d.is_client_char_config())
    }

    pub fn client_char_config_mut(&mut self) -> Option<&mut GattDescriptor> {
        self.descriptors.iter_mut().find(|d| d.is_client_char_config())
    }
}

impl fmt::Display for GattCharacteristic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Characteristic {:?} decl 0x{:04x} value 0x{:04x} {:?}",
            self.value_type, self.declaration_handle, self.value_handle, self.properties
        )
    }
}

/// A GATT characteristic descriptor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GattDescriptor {
    /// Value handle of the owning characteristic
    pub characteristic_value_handle: u16,
    pub handle: u16,
    pub type_: Uuid,
    /// Last value read or written; empty until read
    pub value: Vec<u8>,
}

impl GattDescriptor {
    pub fn new(characteristic_value_handle: u16, handle: u16, type_: Uuid) -> Self {
        Self { characteristic_value_handle, handle, type_, value: Vec::new() }
    }

    pub fn is_client_char_config(&self) -> bool {
        self.type_ == CLIENT_CHAR_CONFIG_UUID
    }

    pub fn is_extended_properties(&self) -> bool {
        self.type_ == CHAR_EXTENDED_PROPS_UUID
    }

    /// Notification/indication bits of a CCCD value
    pub fn cccd_bits(&self) -> Option<u16> {
        if !self.is_client_char_config() || self.value.len() < 2 {
            return None;
        }
        Some(u16::from_le_bytes([self.value[0], self.value[1]]))
    }
}

// Connection parameter bounds (units as in the PPCP characteristic)
const CONN_INTERVAL_MIN: u16 = 0x0006;
const CONN_INTERVAL_MAX: u16 = 0x0C80;
const CONN_LATENCY_MAX: u16 = 0x01F3;
const SUPERVISION_TIMEOUT_MIN: u16 = 0x000A;
const SUPERVISION_TIMEOUT_MAX: u16 = 0x0C80;
/// "No specific value" in a PPCP field
const PPCP_UNSPECIFIED: u16 = 0xFFFF;

/// Peripheral Preferred Connection Parameters (0x2A04)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PreferredConnectionParameters {
    /// Minimum connection interval (1.25ms units)
    pub conn_interval_min: u16,
    /// Maximum connection interval (1.25ms units)
    pub conn_interval_max: u16,
    /// Peripheral latency (number of events)
    pub conn_latency: u16,
    /// Connection supervision timeout (10ms units)
    pub supervision_timeout: u16,
}

impl PreferredConnectionParameters {
    pub fn parse(value: &[u8]) -> Option<Self> {
        if value.len() < 8 {
            return None;
        }
        let field = |i: usize| u16::from_le_bytes([value[i], value[i + 1]]);
        Some(Self {
            conn_interval_min: field(0),
            conn_interval_max: field(2),
            conn_latency: field(4),
            supervision_timeout: field(6),
        })
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut value = Vec::with_capacity(8);
        value.extend_from_slice(&self.conn_interval_min.to_le_bytes());
        value.extend_from_slice(&self.conn_interval_max.to_le_bytes());
        value.extend_from_slice(&self.conn_latency.to_le_bytes());
        value.extend_from_slice(&self.supervision_timeout.to_le_bytes());
        value
    }

    /// Validates that the parameters are within acceptable ranges
    pub fn validate(&self) -> bool {
        let interval_unspecified =
            self.conn_interval_min == PPCP_UNSPECIFIED || self.conn_interval_max == PPCP_UNSPECIFIED;
        let interval_ok = interval_unspecified
            || (self.conn_interval_min >= CONN_INTERVAL_MIN
                && self.conn_interval_max <= CONN_INTERVAL_MAX
                && self.conn_interval_min <= self.conn_interval_max);

        let latency_ok = self.conn_latency <= CONN_LATENCY_MAX;

        if self.supervision_timeout == PPCP_UNSPECIFIED {
            return interval_ok && latency_ok;
        }
        let timeout_ok = self.supervision_timeout >= SUPERVISION_TIMEOUT_MIN
            && self.supervision_timeout <= SUPERVISION_TIMEOUT_MAX;

        // timeout(ms) > max_interval(ms) * (latency + 1) * 2
        let relation_ok = interval_unspecified
            || (self.supervision_timeout as u32) * 4
                > (self.conn_interval_max as u32) * (self.conn_latency as u32 + 1);

        interval_ok && latency_ok && timeout_ok && relation_ok
    }
}

/// Values of the Generic Access service (0x1800)
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GenericAccess {
    pub device_name: String,
    pub appearance: u16,
    pub preferred_connection_parameters: Option<PreferredConnectionParameters>,
}

impl fmt::Display for GenericAccess {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "GenericAccess[name '{}', appearance 0x{:04x}", self.device_name, self.appearance)?;
        if let Some(ppcp) = &self.preferred_connection_parameters {
            write!(
                f,
                ", interval {}..{}, latency {}, timeout {}",
                ppcp.conn_interval_min, ppcp.conn_interval_max, ppcp.conn_latency, ppcp.supervision_timeout
            )?;
        }
        f.write_str("]")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_declaration_decoding() {
        let decl = [0x1A, 0x0F, 0x00, 0x37, 0x2A];
        let c = GattCharacteristic::from_declaration(0x000C, 0x000E, &decl).unwrap();

        assert_eq!(c.value_handle, 0x000F);
        assert_eq!(c.value_type, 0x2A37u16);
        assert!(c.properties.contains(CharacteristicProperties::NOTIFY));
        assert!(c.properties.contains(CharacteristicProperties::READ | CharacteristicProperties::WRITE));
        assert!(!c.properties.contains(CharacteristicProperties::INDICATE));
        assert_eq!(c.declaration_value(), decl.to_vec());

        assert!(GattCharacteristic::from_declaration(1, 2, &[0x02, 0x03, 0x00, 0x00]).is_none());
    }

    #[test]
    fn test_ppcp_validation() {
        let ppcp = PreferredConnectionParameters::parse(&[0x18, 0x00, 0x28, 0x00, 0x00, 0x00, 0xC8, 0x00]).unwrap();
        assert_eq!(ppcp.conn_interval_min, 24);
        assert_eq!(ppcp.supervision_timeout, 200);
        assert!(ppcp.validate());

        let bad = PreferredConnectionParameters { conn_latency: 600, ..ppcp };
        assert!(!bad.validate());

        // 4 s interval with 4 events of latency cannot fit in a 1 s supervision timeout
        let tight = PreferredConnectionParameters {
            conn_interval_min: 0x0C80,
            conn_interval_max: 0x0C80,
            conn_latency: 3,
            supervision_timeout: 100,
        };
        assert!(!tight.validate());
        assert_eq!(PreferredConnectionParameters::parse(&tight.to_bytes()), Some(tight));
    }
}
