//! Bounded reply ring between the reader thread and the waiting caller

use log::warn;
use std::collections::VecDeque;
use std::sync::{Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};

/// Why a pop returned nothing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RingError {
    Timeout,
    Closed,
}

struct RingState<T> {
    items: VecDeque<T>,
    closed: bool,
}

/// A bounded FIFO; pushing into a full ring drops the oldest entry.
pub struct ReplyRing<T> {
    state: Mutex<RingState<T>>,
    available: Condvar,
    capacity: usize,
}

impl<T> ReplyRing<T> {
    pub fn new(capacity: usize) -> Self {
        Self {
            state: Mutex::new(RingState { items: VecDeque::with_capacity(capacity), closed: false }),
            available: Condvar::new(),
            capacity: capacity.max(1),
        }
    }

    fn lock(&self) -> MutexGuard<'_, RingState<T>> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Append an entry and wake one waiter. Returns false once the ring is closed.
    pub fn push(&self, item: T) -> bool {
        let mut state = self.lock();
        if state.closed {
            return false;
        }
        if state.items.len() >= self.capacity {
            warn!("Reply ring full ({} entries), dropping oldest reply", self.capacity);
            state.items.pop_front();
        }
        state.items.push_back(item);
        drop(state);

        self.available.notify_one();
        true
    }

    /// Take the oldest entry, waiting up to `timeout`.
    pub fn pop_timeout(&self, timeout: Duration) -> Result<T, RingError> {
        let deadline = Instant::now() + timeout;
        let mut state = self.lock();
        loop {
            if let Some(item) = state.items.pop_front() {
                return Ok(item);
            }
            if state.closed {
                return Err(RingError::Closed);
            }

            let now = Instant::now();
            if now >= deadline {
                return Err(RingError::Timeout);
            }
            let (guard, _) = self
                .available
                .wait_timeout(state, deadline - now)
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            state = guard;
        }
    }

    /// Discard entries no caller is waiting for
    pub fn clear(&self) -> usize {
        let mut state = self.lock();
        let dropped = state.items.len();
        state.items.clear();
        dropped
    }

    /// Close the ring, failing every current and future waiter
    pub fn close(&self) {
        let mut state = self.lock();
        state.closed = true;
        state.items.clear();
        drop(state);
        self.available.notify_all();
    }

    pub fn len(&self) -> usize {
        self.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_fifo_and_overflow() {
        let ring = ReplyRing::new(2);
        assert!(ring.push(1));
        assert!(ring.push(2));
        assert!(ring.push(3));

        assert_eq!(ring.len(), 2);
        assert_eq!(ring.pop_timeout(Duration::ZERO), Ok(2));
        assert_eq!(ring.pop_timeout(Duration::ZERO), Ok(3));
        assert_eq!(ring.pop_timeout(Duration::from_millis(5)), Err(RingError::Timeout));
    }

    #[test]
    fn test_close_wakes_waiter() {
        let ring = Arc::new(ReplyRing::<u8>::new(4));
        let waiter = {
            let ring = ring.clone();
            thread::spawn(move || ring.pop_timeout(Duration::from_secs(5)))
        };

        thread::sleep(Duration::from_millis(20));
        ring.close();

        assert_eq!(waiter.join().unwrap(), Err(RingError::Closed));
        assert!(!ring.push(1));
    }

    #[test]
    fn test_push_wakes_waiter() {
        let ring = Arc::new(ReplyRing::new(4));
        let waiter = {
            let ring = ring.clone();
            thread::spawn(move || ring.pop_timeout(Duration::from_secs(5)))
        };

        thread::sleep(Duration::from_millis(20));
        ring.push(vec![0x0B, 0x01]);

        assert_eq!(waiter.join().unwrap(), Ok(vec![0x0B, 0x01]));
    }
}
