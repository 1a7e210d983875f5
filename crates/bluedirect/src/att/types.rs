//! Attribute permissions and link security
use super::constants::*;
use super::error::{AttError, AttErrorCode, AttResult};
use bitflags::bitflags;

bitflags! {
    /// Access permissions of one attribute in a local database
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct AttPermissions: u16 {
        const READ = ATT_PERM_READ;
        const WRITE = ATT_PERM_WRITE;
        const READ_ENCRYPTED = ATT_PERM_READ_ENCRYPTED;
        const WRITE_ENCRYPTED = ATT_PERM_WRITE_ENCRYPTED;
        const READ_AUTHENTICATED = ATT_PERM_READ_AUTHENTICATED;
        const WRITE_AUTHENTICATED = ATT_PERM_WRITE_AUTHENTICATED;
        const READ_AUTHORIZED = ATT_PERM_READ_AUTHORIZED;
        const WRITE_AUTHORIZED = ATT_PERM_WRITE_AUTHORIZED;
    }
}

impl AttPermissions {
    pub fn read_only() -> Self {
        Self::READ
    }

    pub fn write_only() -> Self {
        Self::WRITE
    }

    pub fn read_write() -> Self {
        Self::READ | Self::WRITE
    }

    /// Read-write permissions that demand at least `level` from the link
    pub fn for_security_level(level: SecurityLevel) -> Self {
        match level {
            SecurityLevel::None => Self::read_write(),
            SecurityLevel::EncryptionOnly => {
                Self::read_write() | Self::READ_ENCRYPTED | Self::WRITE_ENCRYPTED
            }
            SecurityLevel::EncryptionWithAuthentication | SecurityLevel::SecureConnections => {
                Self::read_write()
                    | Self::READ_ENCRYPTED
                    | Self::WRITE_ENCRYPTED
                    | Self::READ_AUTHENTICATED
                    | Self::WRITE_AUTHENTICATED
            }
        }
    }

    /// Check a read of `handle` over a link at `level`.
    ///
    /// Failures carry the error code a server reports: authentication before encryption
    /// before authorization, and *Read Not Permitted* when the attribute is not readable.
    pub fn check_read(&self, handle: u16, level: SecurityLevel) -> AttResult<()> {
        check_access(
            handle,
            level,
            self.contains(Self::READ),
            self.contains(Self::READ_AUTHENTICATED),
            self.contains(Self::READ_ENCRYPTED),
            self.contains(Self::READ_AUTHORIZED),
            AttErrorCode::ReadNotPermitted,
        )
    }

    /// Check a write of `handle` over a link at `level`.
    pub fn check_write(&self, handle: u16, level: SecurityLevel) -> AttResult<()> {
        check_access(
            handle,
            level,
            self.contains(Self::WRITE),
            self.contains(Self::WRITE_AUTHENTICATED),
            self.contains(Self::WRITE_ENCRYPTED),
            self.contains(Self::WRITE_AUTHORIZED),
            AttErrorCode::WriteNotPermitted,
        )
    }
}

fn check_access(
    handle: u16,
    level: SecurityLevel,
    permitted: bool,
    needs_authentication: bool,
    needs_encryption: bool,
    needs_authorization: bool,
    not_permitted: AttErrorCode,
) -> AttResult<()> {
    if !permitted {
        return Err(AttError::code(not_permitted, handle));
    }
    if needs_authentication && level < SecurityLevel::EncryptionWithAuthentication {
        return Err(AttError::code(AttErrorCode::InsufficientAuthentication, handle));
    }
    if needs_encryption && level < SecurityLevel::EncryptionOnly {
        return Err(AttError::code(AttErrorCode::InsufficientEncryption, handle));
    }
    // Authorization is an application decision this stack never grants.
    if needs_authorization {
        return Err(AttError::code(AttErrorCode::InsufficientAuthorization, handle));
    }
    Ok(())
}

/// Security level of the underlying link
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum SecurityLevel {
    /// No security (unencrypted)
    #[default]
    None,
    /// Encryption without authentication
    EncryptionOnly,
    /// Encryption with authentication
    EncryptionWithAuthentication,
    /// Secure Connections with encryption and authentication
    SecureConnections,
}
