//! Bluetooth UUIDs as carried in ATT PDUs
//!
//! Every UUID is stored as its 128-bit little-endian expansion over the Bluetooth base UUID,
//! so a 16-bit `0x2902` and its 128-bit spelling compare and hash equal. On the wire a UUID
//! is written in the shortest form the peer understands: 2 bytes for SIG-assigned 16-bit
//! values, otherwise the full 16 bytes in transmission order.

use std::fmt;
use std::num::ParseIntError;
use std::str::FromStr;
use thiserror::Error;

/// A Bluetooth UUID.
#[derive(Clone, Copy, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Uuid {
    bytes: [u8; 16],
}

/// "00000000-0000-1000-8000-00805F9B34FB" in little-endian byte order.
const BASE_UUID_BYTES: [u8; 16] = [
    0xFB, 0x34, 0x9B, 0x5F, 0x80, 0x00, 0x00, 0x80, 0x00, 0x10, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
];

/// Offset within the base UUID where the 16/32-bit value is inserted.
const BASE_OFFSET: usize = 12;

impl Uuid {
    /// Creates a UUID directly from 16 bytes in little-endian (transmission) order.
    pub const fn from_bytes_le(bytes: [u8; 16]) -> Self {
        Uuid { bytes }
    }

    /// Creates a UUID from 16 bytes in big-endian (textual) order.
    pub fn from_bytes_be(mut bytes: [u8; 16]) -> Self {
        bytes.reverse();
        Uuid { bytes }
    }

    /// Creates a UUID from a 16-bit SIG-assigned value.
    pub const fn from_u16(uuid16: u16) -> Self {
        let mut bytes = BASE_UUID_BYTES;
        bytes[BASE_OFFSET] = uuid16 as u8;
        bytes[BASE_OFFSET + 1] = (uuid16 >> 8) as u8;
        Uuid { bytes }
    }

    /// Creates a UUID from a 32-bit SIG-assigned value.
    pub const fn from_u32(uuid32: u32) -> Self {
        let mut bytes = BASE_UUID_BYTES;
        bytes[BASE_OFFSET] = uuid32 as u8;
        bytes[BASE_OFFSET + 1] = (uuid32 >> 8) as u8;
        bytes[BASE_OFFSET + 2] = (uuid32 >> 16) as u8;
        bytes[BASE_OFFSET + 3] = (uuid32 >> 24) as u8;
        Uuid { bytes }
    }

    /// Creates a UUID from its 128-bit numeric value.
    pub const fn from_u128(value: u128) -> Self {
        Uuid { bytes: value.to_le_bytes() }
    }

    /// Parses a UUID from a little-endian wire slice of 2, 4 or 16 bytes.
    pub fn try_from_slice_le(slice: &[u8]) -> Option<Self> {
        match slice.len() {
            2 => Some(Uuid::from_u16(u16::from_le_bytes([slice[0], slice[1]]))),
            4 => Some(Uuid::from_u32(u32::from_le_bytes([
                slice[0], slice[1], slice[2], slice[3],
            ]))),
            16 => {
                let mut bytes = [0u8; 16];
                bytes.copy_from_slice(slice);
                Some(Uuid::from_bytes_le(bytes))
            }
            _ => None,
        }
    }

    /// The 16 bytes in little-endian order.
    pub const fn as_bytes_le(&self) -> &[u8; 16] {
        &self.bytes
    }

    /// The 16 bytes in big-endian order.
    pub fn as_bytes_be(&self) -> [u8; 16] {
        let mut bytes = self.bytes;
        bytes.reverse();
        bytes
    }

    fn is_sig_assigned(&self) -> bool {
        self.bytes[0..BASE_OFFSET] == BASE_UUID_BYTES[0..BASE_OFFSET]
    }

    /// The 16-bit short form, if this is a SIG-assigned 16-bit UUID.
    pub fn as_u16(&self) -> Option<u16> {
        if self.is_sig_assigned()
            && self.bytes[BASE_OFFSET + 2] == 0
            && self.bytes[BASE_OFFSET + 3] == 0
        {
            Some(u16::from_le_bytes([
                self.bytes[BASE_OFFSET],
                self.bytes[BASE_OFFSET + 1],
            ]))
        } else {
            None
        }
    }

    /// The 32-bit short form, if this is a SIG-assigned UUID.
    pub fn as_u32(&self) -> Option<u32> {
        if self.is_sig_assigned() {
            Some(u32::from_le_bytes([
                self.bytes[BASE_OFFSET],
                self.bytes[BASE_OFFSET + 1],
                self.bytes[BASE_OFFSET + 2],
                self.bytes[BASE_OFFSET + 3],
            ]))
        } else {
            None
        }
    }

    /// Number of bytes [`Uuid::to_att_bytes`] produces: 2 or 16.
    ///
    /// ATT has no 32-bit UUID encoding, so 32-bit values travel in full.
    pub fn att_len(&self) -> usize {
        if self.as_u16().is_some() {
            2
        } else {
            16
        }
    }

    /// Wire encoding used inside ATT PDUs.
    pub fn to_att_bytes(&self) -> Vec<u8> {
        match self.as_u16() {
            Some(uuid16) => uuid16.to_le_bytes().to_vec(),
            None => self.bytes.to_vec(),
        }
    }
}

impl From<u16> for Uuid {
    fn from(uuid16: u16) -> Self {
        Uuid::from_u16(uuid16)
    }
}

impl From<u32> for Uuid {
    fn from(uuid32: u32) -> Self {
        Uuid::from_u32(uuid32)
    }
}

impl From<[u8; 16]> for Uuid {
    /// Assumes bytes are in little-endian order.
    fn from(bytes: [u8; 16]) -> Self {
        Uuid::from_bytes_le(bytes)
    }
}

impl PartialEq<u16> for Uuid {
    fn eq(&self, other: &u16) -> bool {
        self.as_u16() == Some(*other)
    }
}

impl PartialEq<Uuid> for u16 {
    fn eq(&self, other: &Uuid) -> bool {
        other.as_u16() == Some(*self)
    }
}

impl fmt::Display for Uuid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let b = self.as_bytes_be();
        write!(f, "{:02x}{:02x}{:02x}{:02x}-{:02x}{:02x}-{:02x}{:02x}-{:02x}{:02x}-{:02x}{:02x}{:02x}{:02x}{:02x}{:02x}",
            b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7],
            b[8], b[9], b[10], b[11], b[12], b[13], b[14], b[15]
        )
    }
}

impl fmt::Debug for Uuid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.as_u16(), self.as_u32()) {
            (Some(uuid16), _) => write!(f, "Uuid(0x{:04X})", uuid16),
            (None, Some(uuid32)) => write!(f, "Uuid(0x{:08X})", uuid32),
            _ => write!(f, "Uuid({})", self),
        }
    }
}

/// Errors from parsing a textual UUID
#[derive(Debug, Error)]
pub enum UuidParseError {
    #[error("UUID must have 4, 8 or 32 hex digits")]
    InvalidLength,

    #[error("Invalid UUID digits: {0}")]
    InvalidDigits(#[from] ParseIntError),

    #[error("Invalid UUID hex: {0}")]
    Hex(#[from] hex::FromHexError),
}

impl FromStr for Uuid {
    type Err = UuidParseError;

    /// Accepts "180a", "0000180a" and the hyphenated 128-bit form.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let cleaned: String = s.chars().filter(|c| *c != '-').collect();

        match cleaned.len() {
            4 => Ok(Uuid::from_u16(u16::from_str_radix(&cleaned, 16)?)),
            8 => Ok(Uuid::from_u32(u32::from_str_radix(&cleaned, 16)?)),
            32 => {
                let mut bytes_be = [0u8; 16];
                hex::decode_to_slice(&cleaned, &mut bytes_be)?;
                Ok(Uuid::from_bytes_be(bytes_be))
            }
            _ => Err(UuidParseError::InvalidLength),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_and_long_forms_compare_equal() {
        let short = Uuid::from_u16(0x2902);
        let long: Uuid = "00002902-0000-1000-8000-00805f9b34fb".parse().unwrap();

        assert_eq!(short, long);
        assert_eq!(long.as_u16(), Some(0x2902));
        assert_eq!(short, 0x2902u16);
        assert_eq!(long.att_len(), 2);
        assert_eq!(long.to_att_bytes(), vec![0x02, 0x29]);
    }

    #[test]
    fn test_vendor_uuid_keeps_transmission_order() {
        let wire: Vec<u8> = (0u8..16).collect();
        let uuid = Uuid::try_from_slice_le(&wire).unwrap();

        assert_eq!(uuid.as_u16(), None);
        assert_eq!(uuid.att_len(), 16);
        assert_eq!(uuid.to_att_bytes(), wire);
        assert_eq!(uuid.to_string(), "0f0e0d0c-0b0a-0908-0706-050403020100");
    }

    #[test]
    fn test_parse_errors() {
        assert!(matches!("12".parse::<Uuid>(), Err(UuidParseError::InvalidLength)));
        assert!("zzzz".parse::<Uuid>().is_err());
        assert!(Uuid::try_from_slice_le(&[1, 2, 3]).is_none());
    }

    #[test]
    fn test_u128_round_trip() {
        let value = 0x0000180f_0000_1000_8000_00805f9b34fbu128;
        let uuid = Uuid::from_u128(value);
        assert_eq!(uuid.as_u16(), Some(0x180f));
        assert_eq!(format!("{:?}", uuid), "Uuid(0x180F)");
    }
}
