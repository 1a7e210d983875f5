//! Device identity used to open and label a connection
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

// HCI address types
pub const PUBLIC_DEVICE_ADDRESS: u8 = 0x00;
pub const RANDOM_DEVICE_ADDRESS: u8 = 0x01;

// Address types as spelled in `sockaddr_l2.l2_bdaddr_type`
pub const BDADDR_LE_PUBLIC: u8 = 0x01;
pub const BDADDR_LE_RANDOM: u8 = 0x02;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum AddressType {
    #[default]
    Public,
    Random,
}

impl AddressType {
    /// Value for `sockaddr_l2.l2_bdaddr_type` on an LE link
    pub fn to_l2_bdaddr_type(self) -> u8 {
        match self {
            AddressType::Public => BDADDR_LE_PUBLIC,
            AddressType::Random => BDADDR_LE_RANDOM,
        }
    }
}

impl From<u8> for AddressType {
    fn from(value: u8) -> Self {
        match value {
            RANDOM_DEVICE_ADDRESS => AddressType::Random,
            _ => AddressType::Public,
        }
    }
}

impl From<AddressType> for u8 {
    fn from(value: AddressType) -> Self {
        match value {
            AddressType::Public => PUBLIC_DEVICE_ADDRESS,
            AddressType::Random => RANDOM_DEVICE_ADDRESS,
        }
    }
}

/// Bluetooth device address, stored little-endian as on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct BdAddr {
    pub bytes: [u8; 6],
}

impl BdAddr {
    pub const ANY: BdAddr = BdAddr { bytes: [0; 6] };

    pub fn new(bytes: [u8; 6]) -> Self {
        Self { bytes }
    }

    pub fn from_slice(slice: &[u8]) -> Option<Self> {
        if slice.len() >= 6 {
            let mut bytes = [0u8; 6];
            bytes.copy_from_slice(&slice[0..6]);
            Some(Self { bytes })
        } else {
            None
        }
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.bytes
    }
}

impl fmt::Display for BdAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:02X}:{:02X}:{:02X}:{:02X}:{:02X}:{:02X}",
            self.bytes[5],
            self.bytes[4],
            self.bytes[3],
            self.bytes[2],
            self.bytes[1],
            self.bytes[0]
        )
    }
}

#[derive(Debug, Error)]
#[error("Invalid Bluetooth address: {0}")]
pub struct BdAddrParseError(String);

impl FromStr for BdAddr {
    type Err = BdAddrParseError;

    /// Parses the colon-separated, most-significant-first form ("00:1A:7D:DA:71:13").
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split(':').collect();
        if parts.len() != 6 {
            return Err(BdAddrParseError(s.to_string()));
        }

        let mut bytes = [0u8; 6];
        for (i, part) in parts.iter().enumerate() {
            let octet = hex::decode(part).map_err(|_| BdAddrParseError(s.to_string()))?;
            if octet.len() != 1 {
                return Err(BdAddrParseError(s.to_string()));
            }
            bytes[5 - i] = octet[0];
        }
        Ok(Self { bytes })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_address_display_is_msb_first() {
        let addr: BdAddr = "00:1A:7D:DA:71:13".parse().unwrap();
        assert_eq!(addr.bytes, [0x13, 0x71, 0xDA, 0x7D, 0x1A, 0x00]);
        assert_eq!(addr.to_string(), "00:1A:7D:DA:71:13");

        assert!("00:1A:7D".parse::<BdAddr>().is_err());
        assert!("00:1A:7D:DA:71:1G".parse::<BdAddr>().is_err());
    }

    #[test]
    fn test_address_types() {
        assert_eq!(AddressType::from(RANDOM_DEVICE_ADDRESS), AddressType::Random);
        assert_eq!(AddressType::Public.to_l2_bdaddr_type(), BDADDR_LE_PUBLIC);
    }
}
