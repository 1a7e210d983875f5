//! Listener registry for notifications, indications and raw inbound PDUs
//!
//! The registry is read on the reader thread for every event and mutated from caller
//! threads, so it is kept as a copy-on-write list: dispatch iterates an immutable snapshot
//! and never holds a lock while calling out.

use super::types::GattCharacteristic;
use crate::att::pdu::AttPdu;
use log::error;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, RwLock};
use std::time::Instant;

/// A value pushed by the server
#[derive(Debug, Clone, Copy)]
pub struct ValueEvent<'a> {
    /// Attribute handle the value belongs to
    pub handle: u16,
    /// The discovered characteristic owning `handle`, if any
    pub characteristic: Option<&'a GattCharacteristic>,
    pub value: &'a [u8],
    /// When the reader thread received the PDU
    pub timestamp: Instant,
}

/// Receives characteristic value events
///
/// Callbacks run on the engine's reader thread. They must not issue requests on the same
/// engine and wait for the reply, since the reader is the one that would deliver it.
pub trait GattCharListener: Send + Sync {
    fn notification_received(&self, _event: &ValueEvent<'_>) {}

    /// `confirmation_sent` tells whether the engine already confirmed the indication
    fn indication_received(&self, _event: &ValueEvent<'_>, _confirmation_sent: bool) {}
}

/// Sees every unsolicited PDU before it is dispatched
pub trait AttPduObserver: Send + Sync {
    fn pdu_received(&self, pdu: &AttPdu);
}

/// A list whose readers get immutable snapshots
pub struct CopyOnWriteList<T> {
    items: RwLock<Arc<Vec<T>>>,
}

impl<T: Clone> CopyOnWriteList<T> {
    pub fn new() -> Self {
        Self { items: RwLock::new(Arc::new(Vec::new())) }
    }

    /// The current contents; later mutations do not affect it
    pub fn snapshot(&self) -> Arc<Vec<T>> {
        self.items.read().unwrap_or_else(|poisoned| poisoned.into_inner()).clone()
    }

    fn update<R>(&self, f: impl FnOnce(&mut Vec<T>) -> R) -> R {
        let mut guard = self.items.write().unwrap_or_else(|poisoned| poisoned.into_inner());
        let mut next = (**guard).clone();
        let result = f(&mut next);
        *guard = Arc::new(next);
        result
    }

    /// Append `item` unless an equal entry exists; returns whether it was added.
    pub fn push_if_absent(&self, item: T, same: impl Fn(&T, &T) -> bool) -> bool {
        self.update(|items| {
            if items.iter().any(|existing| same(existing, &item)) {
                false
            } else {
                items.push(item);
                true
            }
        })
    }

    /// Remove every entry matching `pred`; returns how many were removed.
    pub fn remove_where(&self, pred: impl Fn(&T) -> bool) -> usize {
        self.update(|items| {
            let before = items.len();
            items.retain(|item| !pred(item));
            before - items.len()
        })
    }

    pub fn clear(&self) -> usize {
        self.remove_where(|_| true)
    }

    pub fn len(&self) -> usize {
        self.snapshot().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T: Clone> Default for CopyOnWriteList<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Compare trait objects by the object they point at, ignoring vtables
fn same_object<T: ?Sized>(a: &Arc<T>, b: &Arc<T>) -> bool {
    std::ptr::eq(Arc::as_ptr(a) as *const (), Arc::as_ptr(b) as *const ())
}

#[derive(Clone)]
struct ListenerEntry {
    listener: Arc<dyn GattCharListener>,
    /// Value handle of the characteristic this entry is limited to
    filter: Option<u16>,
}

impl ListenerEntry {
    fn matches(&self, listener: &Arc<dyn GattCharListener>, filter: Option<u16>) -> bool {
        same_object(&self.listener, listener) && self.filter == filter
    }

    fn accepts(&self, handle: u16) -> bool {
        self.filter.map_or(true, |value_handle| value_handle == handle)
    }
}

/// Registered characteristic listeners and PDU observers of one engine
#[derive(Default)]
pub struct ListenerRegistry {
    listeners: CopyOnWriteList<ListenerEntry>,
    observers: CopyOnWriteList<Arc<dyn AttPduObserver>>,
}

impl ListenerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `listener`, optionally limited to one characteristic.
    ///
    /// Returns false if the same listener with the same filter is already registered.
    pub fn add_char_listener(
        &self,
        listener: Arc<dyn GattCharListener>,
        characteristic: Option<&GattCharacteristic>,
    ) -> bool {
        let entry = ListenerEntry { listener, filter: characteristic.map(|c| c.value_handle) };
        self.listeners.push_if_absent(entry, |a, b| a.matches(&b.listener, b.filter))
    }

    /// Remove the registration of `listener` with exactly this filter
    pub fn remove_char_listener(
        &self,
        listener: &Arc<dyn GattCharListener>,
        characteristic: Option<&GattCharacteristic>,
    ) -> bool {
        let filter = characteristic.map(|c| c.value_handle);
        self.listeners.remove_where(|entry| entry.matches(listener, filter)) > 0
    }

    /// Remove every registration of `listener`, whatever its filter
    pub fn remove_char_listener_everywhere(&self, listener: &Arc<dyn GattCharListener>) -> usize {
        self.listeners.remove_where(|entry| same_object(&entry.listener, listener))
    }

    /// Remove every listener limited to `characteristic`
    pub fn remove_all_char_listeners_of(&self, characteristic: &GattCharacteristic) -> usize {
        self.listeners.remove_where(|entry| entry.filter == Some(characteristic.value_handle))
    }

    pub fn char_listener_count(&self) -> usize {
        self.listeners.len()
    }

    pub fn add_pdu_observer(&self, observer: Arc<dyn AttPduObserver>) -> bool {
        self.observers.push_if_absent(observer, same_object)
    }

    pub fn remove_pdu_observer(&self, observer: &Arc<dyn AttPduObserver>) -> bool {
        self.observers.remove_where(|existing| same_object(existing, observer)) > 0
    }

    /// Drop every listener and observer
    pub fn clear(&self) -> usize {
        self.listeners.clear() + self.observers.clear()
    }

    pub fn observe(&self, pdu: &AttPdu) {
        for observer in self.observers.snapshot().iter() {
            if catch_unwind(AssertUnwindSafe(|| observer.pdu_received(pdu))).is_err() {
                error!("PDU observer panicked on opcode 0x{:02x}", pdu.opcode());
            }
        }
    }

    /// Deliver a notification; returns how many listeners received it.
    pub fn dispatch_notification(&self, event: &ValueEvent<'_>) -> usize {
        self.dispatch(event.handle, "notification", |listener| listener.notification_received(event))
    }

    /// Deliver an indication; returns how many listeners received it.
    pub fn dispatch_indication(&self, event: &ValueEvent<'_>, confirmation_sent: bool) -> usize {
        self.dispatch(event.handle, "indication", |listener| {
            listener.indication_received(event, confirmation_sent)
        })
    }

    fn dispatch(&self, handle: u16, kind: &str, deliver: impl Fn(&dyn GattCharListener)) -> usize {
        let mut delivered = 0;
        for entry in self.listeners.snapshot().iter().filter(|entry| entry.accepts(handle)) {
            match catch_unwind(AssertUnwindSafe(|| deliver(entry.listener.as_ref()))) {
                Ok(()) => delivered += 1,
                Err(_) => error!("Listener panicked on {} for handle 0x{:04x}", kind, handle),
            }
        }
        delivered
    }
}
