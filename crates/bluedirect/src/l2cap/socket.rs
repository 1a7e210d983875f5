//! L2CAP socket for the ATT fixed channel
//!
//! Wraps the kernel's Bluetooth L2CAP socket bound to CID 0x0004. Reads wait with `poll`
//! so the background reader can give up after a bounded time; `close` shuts the socket
//! down, which wakes a reader blocked in `poll` on another thread.

use super::types::{L2capError, L2capResult};
use super::AttTransport;
use crate::att::constants::ATT_CID;
use crate::att::types::SecurityLevel;
use crate::gap::{AddressType, BdAddr, BDADDR_LE_PUBLIC};
use log::{debug, warn};
use std::os::unix::io::{AsRawFd, RawFd};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

// Bluetooth socket constants
const AF_BLUETOOTH: i32 = 31;
const BTPROTO_L2CAP: i32 = 0;
const SOL_BLUETOOTH: i32 = 274;
const BT_SECURITY: i32 = 4;

const BT_SECURITY_LOW: u8 = 1;
const BT_SECURITY_MEDIUM: u8 = 2;
const BT_SECURITY_HIGH: u8 = 3;
const BT_SECURITY_FIPS: u8 = 4;

const LISTEN_BACKLOG: i32 = 1;

// Define the sockaddr_l2 structure
#[repr(C)]
#[derive(Default)]
struct SockaddrL2 {
    l2_family: libc::sa_family_t,
    l2_psm: u16,
    l2_bdaddr: [u8; 6],
    l2_cid: u16,
    l2_bdaddr_type: u8,
}

impl SockaddrL2 {
    fn att(addr: &BdAddr, bdaddr_type: u8) -> Self {
        Self {
            l2_family: AF_BLUETOOTH as libc::sa_family_t,
            l2_psm: 0,
            l2_bdaddr: addr.bytes,
            l2_cid: ATT_CID.to_le(),
            l2_bdaddr_type: bdaddr_type,
        }
    }
}

#[repr(C)]
struct BtSecurity {
    level: u8,
    key_size: u8,
}

fn open_bound(local: &BdAddr) -> L2capResult<RawFd> {
    let fd = unsafe { libc::socket(AF_BLUETOOTH, libc::SOCK_SEQPACKET | libc::SOCK_CLOEXEC, BTPROTO_L2CAP) };
    if fd < 0 {
        return Err(L2capError::IoError(std::io::Error::last_os_error()));
    }

    let addr = SockaddrL2::att(local, BDADDR_LE_PUBLIC);
    let result = unsafe {
        libc::bind(
            fd,
            &addr as *const _ as *const libc::sockaddr,
            std::mem::size_of::<SockaddrL2>() as libc::socklen_t,
        )
    };
    if result < 0 {
        let err = std::io::Error::last_os_error();
        unsafe { libc::close(fd) };
        return Err(L2capError::IoError(err));
    }

    Ok(fd)
}

/// Connected L2CAP socket on the ATT channel
#[derive(Debug)]
pub struct L2capSocket {
    fd: RawFd,
    open: AtomicBool,
}

impl L2capSocket {
    /// Connect to `remote` over LE from the adapter with address `local`
    /// ([`BdAddr::ANY`] picks the default adapter).
    pub fn connect(local: &BdAddr, remote: &BdAddr, remote_type: AddressType) -> L2capResult<Self> {
        let fd = open_bound(local)?;

        let addr = SockaddrL2::att(remote, remote_type.to_l2_bdaddr_type());
        let result = unsafe {
            libc::connect(
                fd,
                &addr as *const _ as *const libc::sockaddr,
                std::mem::size_of::<SockaddrL2>() as libc::socklen_t,
            )
        };
        if result < 0 {
            let err = std::io::Error::last_os_error();
            unsafe { libc::close(fd) };
            return Err(L2capError::IoError(err));
        }

        debug!("L2CAP ATT channel connected to {}", remote);
        Ok(Self { fd, open: AtomicBool::new(true) })
    }

    /// Listen for incoming ATT channels on the adapter with address `local`
    pub fn listen(local: &BdAddr) -> L2capResult<L2capListener> {
        let fd = open_bound(local)?;
        if unsafe { libc::listen(fd, LISTEN_BACKLOG) } < 0 {
            let err = std::io::Error::last_os_error();
            unsafe { libc::close(fd) };
            return Err(L2capError::IoError(err));
        }
        Ok(L2capListener { fd })
    }

    /// Request a link security level. The kernel pairs or encrypts as needed.
    pub fn set_security_level(&self, level: SecurityLevel) -> L2capResult<()> {
        let sec = BtSecurity {
            level: match level {
                SecurityLevel::None => BT_SECURITY_LOW,
                SecurityLevel::EncryptionOnly => BT_SECURITY_MEDIUM,
                SecurityLevel::EncryptionWithAuthentication => BT_SECURITY_HIGH,
                SecurityLevel::SecureConnections => BT_SECURITY_FIPS,
            },
            key_size: 0,
        };
        let result = unsafe {
            libc::setsockopt(
                self.fd,
                SOL_BLUETOOTH,
                BT_SECURITY,
                &sec as *const _ as *const libc::c_void,
                std::mem::size_of::<BtSecurity>() as libc::socklen_t,
            )
        };
        if result < 0 {
            return Err(L2capError::IoError(std::io::Error::last_os_error()));
        }
        Ok(())
    }

    fn wait_readable(&self, timeout: Option<Duration>) -> L2capResult<()> {
        let mut pollfd = libc::pollfd { fd: self.fd, events: libc::POLLIN, revents: 0 };
        let timeout_ms = match timeout {
            Some(t) => t.as_millis().min(i32::MAX as u128) as libc::c_int,
            None => -1,
        };

        let result = unsafe { libc::poll(&mut pollfd, 1, timeout_ms) };
        if result < 0 {
            let err = std::io::Error::last_os_error();
            // An interrupted wait reads as "nothing yet"; the caller polls again.
            if err.kind() == std::io::ErrorKind::Interrupted {
                return Err(L2capError::Timeout);
            }
            return Err(L2capError::IoError(err));
        }
        if result == 0 {
            return Err(L2capError::Timeout);
        }
        if pollfd.revents & libc::POLLIN == 0
            && pollfd.revents & (libc::POLLHUP | libc::POLLERR | libc::POLLNVAL) != 0
        {
            return Err(L2capError::ConnectionTerminated);
        }
        Ok(())
    }
}

impl AttTransport for L2capSocket {
    fn write(&self, pdu: &[u8]) -> L2capResult<usize> {
        if !self.is_open() {
            return Err(L2capError::NotConnected);
        }
        match unsafe { libc::write(self.fd, pdu.as_ptr() as *const libc::c_void, pdu.len()) } {
            -1 => Err(L2capError::IoError(std::io::Error::last_os_error())),
            n => Ok(n as usize),
        }
    }

    fn read(&self, buf: &mut [u8], timeout: Option<Duration>) -> L2capResult<usize> {
        if !self.is_open() {
            return Err(L2capError::ConnectionTerminated);
        }
        self.wait_readable(timeout)?;

        let bytes_read = unsafe { libc::read(self.fd, buf.as_mut_ptr() as *mut libc::c_void, buf.len()) };
        match bytes_read {
            n if n < 0 => {
                let err = std::io::Error::last_os_error();
                match err.kind() {
                    std::io::ErrorKind::WouldBlock | std::io::ErrorKind::Interrupted => Err(L2capError::Timeout),
                    std::io::ErrorKind::ConnectionReset | std::io::ErrorKind::NotConnected => {
                        Err(L2capError::ConnectionTerminated)
                    }
                    _ => Err(L2capError::IoError(err)),
                }
            }
            0 => Err(L2capError::ConnectionTerminated),
            n => Ok(n as usize),
        }
    }

    fn close(&self) {
        if self.open.swap(false, Ordering::AcqRel) {
            if unsafe { libc::shutdown(self.fd, libc::SHUT_RDWR) } < 0 {
                warn!("L2CAP shutdown failed: {}", std::io::Error::last_os_error());
            }
        }
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }
}

impl AsRawFd for L2capSocket {
    fn as_raw_fd(&self) -> RawFd {
        self.fd
    }
}

impl Drop for L2capSocket {
    fn drop(&mut self) {
        self.close();
        unsafe {
            libc::close(self.fd);
        }
    }
}

/// Listening L2CAP socket accepting ATT channels
#[derive(Debug)]
pub struct L2capListener {
    fd: RawFd,
}

impl L2capListener {
    /// Block until a central connects; returns the channel and the peer's address.
    pub fn accept(&self) -> L2capResult<(L2capSocket, BdAddr, AddressType)> {
        let mut addr = SockaddrL2::default();
        let mut len = std::mem::size_of::<SockaddrL2>() as libc::socklen_t;
        let fd = unsafe { libc::accept(self.fd, &mut addr as *mut _ as *mut libc::sockaddr, &mut len) };
        if fd < 0 {
            return Err(L2capError::IoError(std::io::Error::last_os_error()));
        }

        let remote = BdAddr::new(addr.l2_bdaddr);
        let remote_type = if addr.l2_bdaddr_type == BDADDR_LE_PUBLIC {
            AddressType::Public
        } else {
            AddressType::Random
        };
        debug!("L2CAP ATT channel accepted from {}", remote);
        Ok((L2capSocket { fd, open: AtomicBool::new(true) }, remote, remote_type))
    }
}

impl AsRawFd for L2capListener {
    fn as_raw_fd(&self) -> RawFd {
        self.fd
    }
}

impl Drop for L2capListener {
    fn drop(&mut self) {
        unsafe {
            libc::close(self.fd);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sockaddr_l2_layout() {
        let addr = SockaddrL2::att(&BdAddr::new([1, 2, 3, 4, 5, 6]), BDADDR_LE_PUBLIC);
        assert_eq!(std::mem::size_of::<SockaddrL2>(), 14);
        assert_eq!(u16::from_le(addr.l2_cid), ATT_CID);
        assert_eq!(addr.l2_psm, 0);
    }
}
