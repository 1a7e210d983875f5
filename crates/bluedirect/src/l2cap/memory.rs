//! In-process ATT channel
//!
//! Two [`MemoryChannel`] endpoints connected back to back, preserving PDU boundaries like a
//! `SOCK_SEQPACKET` socket. Closing either end terminates the channel for both.

use super::types::{L2capError, L2capResult};
use super::AttTransport;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};

#[derive(Default)]
struct PipeState {
    packets: VecDeque<Vec<u8>>,
    closed: bool,
}

#[derive(Default)]
struct Pipe {
    state: Mutex<PipeState>,
    ready: Condvar,
}

impl Pipe {
    fn lock(&self) -> MutexGuard<'_, PipeState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn close(&self) {
        self.lock().closed = true;
        self.ready.notify_all();
    }
}

/// One end of an in-memory ATT channel
pub struct MemoryChannel {
    rx: Arc<Pipe>,
    tx: Arc<Pipe>,
    open: AtomicBool,
}

impl MemoryChannel {
    /// Create two connected endpoints
    pub fn pair() -> (MemoryChannel, MemoryChannel) {
        let a_to_b = Arc::new(Pipe::default());
        let b_to_a = Arc::new(Pipe::default());

        let a = MemoryChannel { rx: b_to_a.clone(), tx: a_to_b.clone(), open: AtomicBool::new(true) };
        let b = MemoryChannel { rx: a_to_b, tx: b_to_a, open: AtomicBool::new(true) };
        (a, b)
    }

    /// Receive one whole PDU
    pub fn recv(&self, timeout: Option<Duration>) -> L2capResult<Vec<u8>> {
        if !self.is_open() {
            return Err(L2capError::ConnectionTerminated);
        }

        let deadline = timeout.map(|t| Instant::now() + t);
        let mut state = self.rx.lock();
        loop {
            if let Some(packet) = state.packets.pop_front() {
                return Ok(packet);
            }
            if state.closed || !self.is_open() {
                return Err(L2capError::ConnectionTerminated);
            }

            state = match deadline {
                None => self.rx.ready.wait(state).unwrap_or_else(|poisoned| poisoned.into_inner()),
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return Err(L2capError::Timeout);
                    }
                    let (guard, _) = self
                        .rx
                        .ready
                        .wait_timeout(state, deadline - now)
                        .unwrap_or_else(|poisoned| poisoned.into_inner());
                    guard
                }
            };
        }
    }
}

impl AttTransport for MemoryChannel {
    fn write(&self, pdu: &[u8]) -> L2capResult<usize> {
        if !self.is_open() {
            return Err(L2capError::NotConnected);
        }

        let mut state = self.tx.lock();
        if state.closed {
            return Err(L2capError::ConnectionTerminated);
        }
        state.packets.push_back(pdu.to_vec());
        drop(state);

        self.tx.ready.notify_all();
        Ok(pdu.len())
    }

    fn read(&self, buf: &mut [u8], timeout: Option<Duration>) -> L2capResult<usize> {
        let packet = self.recv(timeout)?;
        // Oversized packets are truncated, as a SEQPACKET read would.
        let len = packet.len().min(buf.len());
        buf[..len].copy_from_slice(&packet[..len]);
        Ok(len)
    }

    fn close(&self) {
        if self.open.swap(false, Ordering::AcqRel) {
            self.tx.close();
            self.rx.close();
        }
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }
}

impl Drop for MemoryChannel {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_packets_keep_boundaries() {
        let (a, b) = MemoryChannel::pair();
        a.write(&[1, 2, 3]).unwrap();
        a.write(&[4]).unwrap();

        let mut buf = [0u8; 16];
        assert_eq!(b.read(&mut buf, Some(Duration::from_millis(10))).unwrap(), 3);
        assert_eq!(&buf[..3], &[1, 2, 3]);
        assert_eq!(b.recv(None).unwrap(), vec![4]);
    }

    #[test]
    fn test_read_times_out() {
        let (_a, b) = MemoryChannel::pair();
        let err = b.recv(Some(Duration::from_millis(20))).unwrap_err();
        assert!(err.is_timeout());
    }

    #[test]
    fn test_close_wakes_blocked_reader() {
        let (a, b) = MemoryChannel::pair();
        let b = Arc::new(b);
        let reader = {
            let b = b.clone();
            thread::spawn(move || b.recv(None))
        };

        thread::sleep(Duration::from_millis(20));
        a.close();

        assert!(matches!(reader.join().unwrap(), Err(L2capError::ConnectionTerminated)));
        assert!(matches!(b.write(&[1]), Err(L2capError::ConnectionTerminated)));
    }
}
