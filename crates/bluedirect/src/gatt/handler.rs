//! The GATT engine of one ATT channel
//!
//! A [`GattHandler`] owns one connected [`AttTransport`] and a reader thread that owns its
//! read side. Inbound PDUs are sorted by opcode class: responses and confirmations go into
//! the reply ring where the one waiting caller picks them up, notifications and indications
//! go to the listener registry, and requests are answered by the server handler. All of that
//! dispatch happens on the reader thread.
//!
//! Callers exchange one request at a time under the command lock. Any transport failure,
//! reply timeout or protocol violation disconnects the engine for good; a new engine is
//! created for a new channel.

use crate::att::constants::*;
use crate::att::error::{AttError, AttErrorCode};
use crate::att::pdu::*;
use crate::error::{GattError, GattResult};
use crate::gap::BdAddr;
use crate::gatt::config::{negotiated_mtu, GattConfig};
use crate::gatt::listener::{AttPduObserver, GattCharListener, ListenerRegistry, ValueEvent};
use crate::gatt::ring::{ReplyRing, RingError};
use crate::gatt::server::{request_handle, GattServerHandler, GattServerMode, ServerContext};
use crate::gatt::types::*;
use crate::l2cap::{AttTransport, L2capError};
use crate::uuid::Uuid;
use log::{debug, error, info, trace, warn};
use std::sync::atomic::{AtomicBool, AtomicU16, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, Weak};
use std::thread::{self, JoinHandle, ThreadId};
use std::time::{Duration, Instant};

type DisconnectCallback = Box<dyn FnOnce(DisconnectReason) + Send>;

/// Proof that the caller holds the command lock
pub(crate) type CommandGuard<'a> = MutexGuard<'a, ()>;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// GATT client/server engine bound to one ATT channel
pub struct GattHandler {
    remote: BdAddr,
    role: GattRole,
    transport: Arc<dyn AttTransport>,
    pub(crate) config: GattConfig,
    pub(crate) read_timeout: Duration,
    pub(crate) write_timeout: Duration,

    connected: AtomicBool,
    used_mtu: AtomicU16,
    mtu_exchanged: AtomicBool,

    /// Serializes request/reply exchanges; ATT allows one outstanding request
    command_lock: Mutex<()>,
    replies: ReplyRing<AttPdu>,

    pub(crate) services: Mutex<Vec<GattService>>,
    pub(crate) generic_access: Mutex<Option<GenericAccess>>,
    registry: ListenerRegistry,
    server: Arc<dyn GattServerHandler>,

    reader: Mutex<Option<JoinHandle<()>>>,
    reader_id: OnceLock<ThreadId>,
    disconnect_callback: Mutex<Option<DisconnectCallback>>,
    disconnect_reason: Mutex<Option<DisconnectReason>>,
}

impl GattHandler {
    /// Start an engine on an open channel.
    ///
    /// `supervision_timeout` is the link supervision timeout; reply timeouts never go below
    /// it (plus a small margin).
    pub fn new(
        transport: Arc<dyn AttTransport>,
        remote: BdAddr,
        role: GattRole,
        supervision_timeout: Duration,
        config: GattConfig,
        server_mode: GattServerMode,
    ) -> GattResult<Arc<Self>> {
        if !transport.is_open() {
            return Err(GattError::NotConnected);
        }

        debug!("{}: starting GATT {:?} engine, server mode {:?}", remote, role, server_mode);
        let handler = Arc::new(Self {
            remote,
            role,
            transport: transport.clone(),
            read_timeout: config.effective_read_timeout(supervision_timeout),
            write_timeout: config.effective_write_timeout(supervision_timeout),
            replies: ReplyRing::new(config.reply_ring_capacity),
            config,
            connected: AtomicBool::new(true),
            used_mtu: AtomicU16::new(ATT_MIN_MTU),
            mtu_exchanged: AtomicBool::new(false),
            command_lock: Mutex::new(()),
            services: Mutex::new(Vec::new()),
            generic_access: Mutex::new(None),
            registry: ListenerRegistry::new(),
            server: server_mode.into_handler(),
            reader: Mutex::new(None),
            reader_id: OnceLock::new(),
            disconnect_callback: Mutex::new(None),
            disconnect_reason: Mutex::new(None),
        });

        let weak = Arc::downgrade(&handler);
        let poll_timeout = handler.config.reader_poll_timeout;
        let reader = thread::Builder::new()
            .name(format!("gatt-reader-{}", remote))
            .spawn(move || reader_loop(weak, transport, poll_timeout))
            .map_err(|err| GattError::Transport(L2capError::IoError(err)))?;

        let _ = handler.reader_id.set(reader.thread().id());
        *lock(&handler.reader) = Some(reader);
        Ok(handler)
    }

    pub fn remote(&self) -> BdAddr {
        self.remote
    }

    pub fn role(&self) -> GattRole {
        self.role
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    /// MTU in effect; 23 until an exchange completes
    pub fn used_mtu(&self) -> u16 {
        self.used_mtu.load(Ordering::Acquire)
    }

    /// Why the engine disconnected, once it has
    pub fn disconnect_reason(&self) -> Option<DisconnectReason> {
        *lock(&self.disconnect_reason)
    }

    pub(crate) fn require_role(&self, role: GattRole) -> GattResult<()> {
        if self.role != role {
            return Err(GattError::WrongRole);
        }
        Ok(())
    }

    fn is_reader_thread(&self) -> bool {
        self.reader_id.get() == Some(&thread::current().id())
    }

    //
    // Inbound path, reader thread only
    //

    fn process_inbound(&self, data: &[u8]) {
        trace!("{}: rx {}", self.remote, hex::encode(data));

        let limit = if self.mtu_exchanged.load(Ordering::Acquire) { self.used_mtu() } else { ATT_MAX_MTU };
        let pdu = match AttPdu::decode(data, limit) {
            Ok(pdu) => pdu,
            Err(err) => return self.on_malformed(data, err),
        };

        if pdu.is_reply() {
            if !self.replies.push(pdu) {
                debug!("{}: reply after disconnect dropped", self.remote);
            }
            return;
        }
        match pdu.class() {
            OpcodeClass::Notification => self.on_notification(pdu),
            OpcodeClass::Indication => self.on_indication(pdu),
            _ => self.serve(pdu),
        }
    }

    fn on_malformed(&self, data: &[u8], err: AttError) {
        let opcode = data.first().copied().unwrap_or(0);
        match OpcodeClass::of(opcode) {
            // A bad request is the peer's problem to retry; answer it and carry on.
            OpcodeClass::Request if !data.is_empty() => {
                warn!("{}: malformed request 0x{:02x}: {}", self.remote, opcode, err);
                let rsp = ErrorResponse::new(opcode, ATT_HANDLE_INVALID, AttErrorCode::InvalidPdu);
                let _ = self.send(&rsp.into());
            }
            OpcodeClass::Command => {
                warn!("{}: malformed command 0x{:02x} ignored: {}", self.remote, opcode, err);
            }
            _ => {
                error!("{}: malformed PDU {}: {}", self.remote, hex::encode(data), err);
                self.disconnect_internal(DisconnectReason::ProtocolError);
            }
        }
    }

    fn on_notification(&self, pdu: AttPdu) {
        self.registry.observe(&pdu);
        let AttPdu::HandleValueNotification(ntf) = pdu else {
            return;
        };

        let characteristic = self.characteristic_by_value_handle(ntf.handle);
        let event = ValueEvent {
            handle: ntf.handle,
            characteristic: characteristic.as_ref(),
            value: &ntf.value,
            timestamp: Instant::now(),
        };
        let delivered = self.registry.dispatch_notification(&event);
        trace!("{}: notification 0x{:04x} to {} listeners", self.remote, ntf.handle, delivered);
    }

    fn on_indication(&self, pdu: AttPdu) {
        self.registry.observe(&pdu);
        let AttPdu::HandleValueIndication(ind) = pdu else {
            return;
        };

        let confirmed = self.config.auto_confirm_indications
            && self.send(&AttPdu::HandleValueConfirmation(HandleValueConfirmation)).is_ok();

        let characteristic = self.characteristic_by_value_handle(ind.handle);
        let event = ValueEvent {
            handle: ind.handle,
            characteristic: characteristic.as_ref(),
            value: &ind.value,
            timestamp: Instant::now(),
        };
        let delivered = self.registry.dispatch_indication(&event, confirmed);
        trace!("{}: indication 0x{:04x} to {} listeners", self.remote, ind.handle, delivered);
    }

    fn server_context(&self) -> ServerContext {
        ServerContext {
            remote: self.remote,
            mtu: self.used_mtu(),
            security_level: self.config.security_level,
        }
    }

    /// Answer a request (or absorb a command) from the peer
    fn serve(&self, pdu: AttPdu) {
        self.registry.observe(&pdu);
        let ctx = self.server_context();
        let opcode = pdu.opcode();
        let is_request = pdu.class() == OpcodeClass::Request;

        let result = match &pdu {
            AttPdu::ExchangeMtuRequest(req) => return self.serve_exchange_mtu(&ctx, req),
            AttPdu::FindInformationRequest(_) => self.server.find_information(&ctx, &pdu).map(Some),
            AttPdu::FindByTypeValueRequest(_) => self.server.find_by_type_value(&ctx, &pdu).map(Some),
            AttPdu::ReadByTypeRequest(_) => self.server.read_by_type(&ctx, &pdu).map(Some),
            AttPdu::ReadByGroupTypeRequest(_) => self.server.read_by_group_type(&ctx, &pdu).map(Some),
            AttPdu::ReadRequest(_) | AttPdu::ReadBlobRequest(_) | AttPdu::ReadMultipleRequest(_) => {
                self.server.read(&ctx, &pdu).map(Some)
            }
            AttPdu::WriteRequest(_)
            | AttPdu::WriteCommand(_)
            | AttPdu::PrepareWriteRequest(_)
            | AttPdu::ExecuteWriteRequest(_) => self.server.write(&ctx, &pdu),
            _ => Err(AttError::code(AttErrorCode::RequestNotSupported, ATT_HANDLE_INVALID)),
        };

        if !is_request {
            if let Err(err) = result {
                debug!("{}: command 0x{:02x} failed: {}", self.remote, opcode, err);
            }
            return;
        }

        let reply = match result {
            Ok(Some(reply)) => reply,
            Ok(None) => return,
            Err(err) => {
                debug!("{}: {} server rejected 0x{:02x}: {}", self.remote, self.server.name(), opcode, err);
                let handle = err.handle().unwrap_or_else(|| request_handle(&pdu));
                ErrorResponse::new(opcode, handle, err.to_error_code()).into()
            }
        };
        match self.send(&reply) {
            Ok(()) => {}
            Err(GattError::InvalidArgument(reason)) => {
                // The request still gets an answer when the reply cannot be framed.
                warn!("{}: {} reply to 0x{:02x} dropped: {}", self.remote, self.server.name(), opcode, reason);
                let fallback = ErrorResponse::new(opcode, request_handle(&pdu), AttErrorCode::Unlikely);
                if let Err(err) = self.send(&fallback.into()) {
                    warn!("{}: failed to answer 0x{:02x}: {}", self.remote, opcode, err);
                }
            }
            Err(err) => warn!("{}: failed to answer 0x{:02x}: {}", self.remote, opcode, err),
        }
    }

    fn serve_exchange_mtu(&self, ctx: &ServerContext, req: &ExchangeMtuRequest) {
        let server_mtu = self.config.server_mtu.clamp(ATT_MIN_MTU, ATT_MAX_MTU);
        let server_mtu = match self.server.exchange_mtu(ctx, req, server_mtu) {
            Ok(mtu) => mtu.clamp(ATT_MIN_MTU, ATT_MAX_MTU),
            Err(err) => {
                let rsp = ErrorResponse::new(ATT_EXCHANGE_MTU_REQ, ATT_HANDLE_INVALID, err.to_error_code());
                let _ = self.send(&rsp.into());
                return;
            }
        };

        // The response goes out at the old MTU before the new one takes effect.
        let rsp = AttPdu::ExchangeMtuResponse(ExchangeMtuResponse { server_mtu });
        if self.send(&rsp).is_err() {
            return;
        }

        if self.mtu_exchanged.swap(true, Ordering::AcqRel) {
            debug!("{}: repeated MTU exchange, keeping MTU {}", self.remote, self.used_mtu());
            return;
        }
        let mtu = negotiated_mtu(server_mtu, req.client_mtu);
        self.used_mtu.store(mtu, Ordering::Release);
        info!("{}: MTU {} (client {}, server {})", self.remote, mtu, req.client_mtu, server_mtu);
    }

    //
    // Outbound path
    //

    fn write_raw(&self, bytes: &[u8]) -> GattResult<()> {
        trace!("{}: tx {}", self.remote, hex::encode(bytes));
        match self.transport.write(bytes) {
            Ok(_) => Ok(()),
            Err(err) => {
                error!("{}: write failed: {}", self.remote, err);
                self.disconnect_internal(DisconnectReason::IoError);
                Err(GattError::Transport(err))
            }
        }
    }

    /// Send a PDU that expects no reply (command, notification, confirmation).
    pub fn send(&self, pdu: &AttPdu) -> GattResult<()> {
        if !self.is_connected() {
            return Err(GattError::NotConnected);
        }

        let bytes = pdu.encode();
        let mtu = self.used_mtu();
        if bytes.len() > mtu as usize {
            return Err(GattError::InvalidArgument(format!(
                "PDU 0x{:02x} of {} bytes exceeds MTU {}",
                pdu.opcode(),
                bytes.len(),
                mtu
            )));
        }
        self.write_raw(&bytes)
    }

    /// Take the command lock.
    ///
    /// The reader thread may not: it is the one that delivers replies.
    pub(crate) fn lock_commands(&self) -> GattResult<CommandGuard<'_>> {
        if self.is_reader_thread() {
            return Err(GattError::InvalidArgument(
                "requests cannot be issued from the reader thread".into(),
            ));
        }
        Ok(lock(&self.command_lock))
    }

    /// Send `pdu` and wait for the PDU that answers it.
    ///
    /// An Error Response for the request is returned as a reply, not an error.
    pub(crate) fn send_with_reply_locked(
        &self,
        _guard: &CommandGuard<'_>,
        pdu: &AttPdu,
        timeout: Duration,
    ) -> GattResult<AttPdu> {
        if !self.is_connected() {
            return Err(GattError::NotConnected);
        }

        let stale = self.replies.clear();
        if stale > 0 {
            warn!("{}: discarded {} unsolicited replies", self.remote, stale);
        }

        let opcode = pdu.opcode();
        self.send(pdu)?;

        match self.replies.pop_timeout(timeout) {
            Ok(reply) if reply.answers(opcode) => Ok(reply),
            Ok(reply) => {
                error!(
                    "{}: reply 0x{:02x} does not answer request 0x{:02x}",
                    self.remote,
                    reply.opcode(),
                    opcode
                );
                self.disconnect_internal(DisconnectReason::ProtocolError);
                Err(GattError::Protocol(format!(
                    "unexpected reply 0x{:02x} to request 0x{:02x}",
                    reply.opcode(),
                    opcode
                )))
            }
            Err(RingError::Timeout) => {
                warn!("{}: no reply to 0x{:02x} within {:?}", self.remote, opcode, timeout);
                self.disconnect_internal(DisconnectReason::Timeout);
                Err(GattError::Timeout { opcode, timeout })
            }
            Err(RingError::Closed) => Err(GattError::Transport(L2capError::ConnectionTerminated)),
        }
    }

    /// Like [`Self::send_with_reply_locked`], with an Error Response surfaced as
    /// [`GattError::AttErrorResponse`]
    pub(crate) fn request_locked(
        &self,
        guard: &CommandGuard<'_>,
        pdu: &AttPdu,
        timeout: Duration,
    ) -> GattResult<AttPdu> {
        match self.send_with_reply_locked(guard, pdu, timeout)? {
            AttPdu::ErrorResponse(rsp) => Err(GattError::AttErrorResponse(rsp)),
            reply => Ok(reply),
        }
    }

    /// Send a request and wait for its reply, Error Responses included.
    pub fn send_with_reply(&self, pdu: &AttPdu, timeout: Duration) -> GattResult<AttPdu> {
        let guard = self.lock_commands()?;
        self.send_with_reply_locked(&guard, pdu, timeout)
    }

    /// Relay a request received by another engine and return the raw reply
    pub fn forward_request(&self, pdu: &AttPdu) -> GattResult<AttPdu> {
        let timeout = match pdu {
            AttPdu::WriteRequest(_) | AttPdu::PrepareWriteRequest(_) | AttPdu::ExecuteWriteRequest(_) => {
                self.write_timeout
            }
            _ => self.read_timeout,
        };
        self.send_with_reply(pdu, timeout)
    }

    //
    // Client initialisation
    //

    /// Exchange MTUs with the server; returns the MTU in effect.
    ///
    /// A server that rejects the exchange leaves the MTU at 23.
    pub fn exchange_mtu(&self) -> GattResult<u16> {
        self.require_role(GattRole::Client)?;
        let guard = self.lock_commands()?;

        if self.mtu_exchanged.load(Ordering::Acquire) {
            return Ok(self.used_mtu());
        }

        let client_mtu = self.config.client_max_mtu;
        let req = AttPdu::ExchangeMtuRequest(ExchangeMtuRequest { client_mtu });
        let timeout = self.config.initial_reply_timeout.max(self.read_timeout);

        match self.send_with_reply_locked(&guard, &req, timeout)? {
            AttPdu::ExchangeMtuResponse(rsp) => {
                let mtu = negotiated_mtu(client_mtu, rsp.server_mtu);
                self.used_mtu.store(mtu, Ordering::Release);
                self.mtu_exchanged.store(true, Ordering::Release);
                info!("{}: MTU {} (client {}, server {})", self.remote, mtu, client_mtu, rsp.server_mtu);
                Ok(mtu)
            }
            AttPdu::ErrorResponse(rsp) => {
                info!("{}: MTU exchange rejected ({}), keeping {}", self.remote, rsp, ATT_MIN_MTU);
                self.mtu_exchanged.store(true, Ordering::Release);
                Ok(self.used_mtu())
            }
            other => Err(GattError::Protocol(format!("unexpected MTU reply 0x{:02x}", other.opcode()))),
        }
    }

    /// MTU exchange, discovery of the complete tree and Generic Access.
    pub fn init_client_gatt(&self) -> GattResult<()> {
        self.exchange_mtu()?;
        let services = self.discover_complete_primary_services()?;

        match self.read_generic_access() {
            Ok(Some(ga)) => info!("{}: {}", self.remote, ga),
            Ok(None) => debug!("{}: no Generic Access service", self.remote),
            Err(err) if err.is_fatal() => return Err(err),
            Err(err) => warn!("{}: reading Generic Access failed: {}", self.remote, err),
        }

        info!("{}: GATT client ready, {} services, MTU {}", self.remote, services.len(), self.used_mtu());
        Ok(())
    }

    //
    // Discovered tree
    //

    /// Snapshot of the discovered services
    pub fn services(&self) -> Vec<GattService> {
        lock(&self.services).clone()
    }

    pub fn find_service(&self, uuid: &Uuid) -> Option<GattService> {
        lock(&self.services).iter().find(|s| s.type_ == *uuid).cloned()
    }

    /// First characteristic of type `uuid` in any service
    pub fn find_characteristic(&self, uuid: &Uuid) -> Option<GattCharacteristic> {
        lock(&self.services).iter().find_map(|s| s.find_characteristic(uuid)).cloned()
    }

    pub fn service_of(&self, characteristic: &GattCharacteristic) -> Option<GattService> {
        lock(&self.services)
            .iter()
            .find(|s| s.start_handle == characteristic.service_handle)
            .cloned()
    }

    pub fn characteristic_of(&self, descriptor: &GattDescriptor) -> Option<GattCharacteristic> {
        self.characteristic_by_value_handle(descriptor.characteristic_value_handle)
    }

    pub fn characteristic_by_value_handle(&self, value_handle: u16) -> Option<GattCharacteristic> {
        lock(&self.services)
            .iter()
            .flat_map(|s| s.characteristics.iter())
            .find(|c| c.value_handle == value_handle)
            .cloned()
    }

    pub fn generic_access(&self) -> Option<GenericAccess> {
        lock(&self.generic_access).clone()
    }

    //
    // Listeners
    //

    /// Register a listener for all characteristics, or only `characteristic`.
    ///
    /// Returns false if that listener/filter pair is already registered.
    pub fn add_char_listener(
        &self,
        listener: Arc<dyn GattCharListener>,
        characteristic: Option<&GattCharacteristic>,
    ) -> bool {
        self.registry.add_char_listener(listener, characteristic)
    }

    pub fn remove_char_listener(
        &self,
        listener: &Arc<dyn GattCharListener>,
        characteristic: Option<&GattCharacteristic>,
    ) -> bool {
        self.registry.remove_char_listener(listener, characteristic)
    }

    pub fn remove_char_listener_everywhere(&self, listener: &Arc<dyn GattCharListener>) -> usize {
        self.registry.remove_char_listener_everywhere(listener)
    }

    pub fn remove_all_char_listeners_of(&self, characteristic: &GattCharacteristic) -> usize {
        self.registry.remove_all_char_listeners_of(characteristic)
    }

    pub fn char_listener_count(&self) -> usize {
        self.registry.char_listener_count()
    }

    pub fn add_pdu_observer(&self, observer: Arc<dyn AttPduObserver>) -> bool {
        self.registry.add_pdu_observer(observer)
    }

    pub fn remove_pdu_observer(&self, observer: &Arc<dyn AttPduObserver>) -> bool {
        self.registry.remove_pdu_observer(observer)
    }

    //
    // Server role
    //

    /// Push a value to the client without confirmation
    pub fn send_notification(&self, handle: u16, value: &[u8]) -> GattResult<()> {
        self.require_role(GattRole::Server)?;
        self.check_pushed_value(value)?;
        self.send(&AttPdu::HandleValueNotification(HandleValueNotification { handle, value: value.to_vec() }))
    }

    /// Push a value and wait for the client's confirmation
    pub fn send_indication(&self, handle: u16, value: &[u8]) -> GattResult<()> {
        self.require_role(GattRole::Server)?;
        self.check_pushed_value(value)?;

        let guard = self.lock_commands()?;
        let ind = AttPdu::HandleValueIndication(HandleValueIndication { handle, value: value.to_vec() });
        self.send_with_reply_locked(&guard, &ind, self.write_timeout)?;
        Ok(())
    }

    fn check_pushed_value(&self, value: &[u8]) -> GattResult<()> {
        let max = self.used_mtu() as usize - ATT_HANDLE_VALUE_HEADER_SIZE;
        if value.len() > max {
            return Err(GattError::InvalidArgument(format!(
                "value of {} bytes exceeds {} bytes allowed by MTU {}",
                value.len(),
                max,
                self.used_mtu()
            )));
        }
        Ok(())
    }

    /// Confirm an indication by hand, when automatic confirmation is off
    pub fn send_indication_confirmation(&self) -> GattResult<()> {
        self.send(&AttPdu::HandleValueConfirmation(HandleValueConfirmation))
    }

    /// CCCD bits the client wrote for `value_handle`, if the server mode tracks them
    pub fn client_char_config(&self, value_handle: u16) -> Option<u16> {
        self.server.client_char_config(value_handle)
    }

    //
    // Liveness and teardown
    //

    /// Check the peer still answers.
    ///
    /// Reads the Generic Access characteristics, or walks the first service group when none
    /// were discovered. An Error Response still proves the peer is alive.
    pub fn ping(&self) -> GattResult<()> {
        let targets: Vec<u16> = self
            .find_service(&Uuid::from_u16(GENERIC_ACCESS_SERVICE_UUID))
            .map(|s| s.characteristics.iter().map(|c| c.value_handle).collect())
            .unwrap_or_default();

        let guard = self.lock_commands()?;
        let mut result = Ok(());
        if targets.is_empty() {
            let req = AttPdu::ReadByGroupTypeRequest(ReadByGroupTypeRequest {
                start_handle: ATT_HANDLE_MIN,
                end_handle: ATT_HANDLE_MAX,
                group_type: Uuid::from_u16(PRIMARY_SERVICE_UUID),
            });
            result = self.send_with_reply_locked(&guard, &req, self.read_timeout).map(|_| ());
        }
        for handle in targets {
            let req = AttPdu::ReadRequest(ReadRequest { handle });
            result = self.send_with_reply_locked(&guard, &req, self.read_timeout).map(|_| ());
            if result.is_err() {
                break;
            }
        }

        if let Err(err) = &result {
            warn!("{}: ping failed: {}", self.remote, err);
        }
        result
    }

    /// Run `callback` once when the engine disconnects; immediately if it already has.
    pub fn set_disconnect_callback<F>(&self, callback: F)
    where
        F: FnOnce(DisconnectReason) + Send + 'static,
    {
        let mut slot = lock(&self.disconnect_callback);
        if let Some(reason) = self.disconnect_reason() {
            drop(slot);
            callback(reason);
            return;
        }
        *slot = Some(Box::new(callback));
    }

    pub fn disconnect(&self) {
        self.disconnect_internal(DisconnectReason::Requested);
    }

    pub(crate) fn disconnect_internal(&self, reason: DisconnectReason) {
        if self.connected.compare_exchange(true, false, Ordering::AcqRel, Ordering::Acquire).is_err() {
            return;
        }
        info!("{}: GATT disconnect: {}", self.remote, reason);

        // The reason is recorded under the callback lock so a concurrent
        // set_disconnect_callback either sees it or leaves its callback for us.
        let callback = {
            let mut slot = lock(&self.disconnect_callback);
            *lock(&self.disconnect_reason) = Some(reason);
            slot.take()
        };

        self.replies.close();
        self.transport.close();
        let dropped = self.registry.clear();
        debug!("{}: dropped {} listeners", self.remote, dropped);
        lock(&self.services).clear();
        *lock(&self.generic_access) = None;

        if !self.is_reader_thread() {
            let reader = lock(&self.reader).take();
            if let Some(reader) = reader {
                if reader.join().is_err() {
                    error!("{}: reader thread panicked", self.remote);
                }
            }
        }

        if let Some(callback) = callback {
            callback(reason);
        }
    }
}

impl Drop for GattHandler {
    fn drop(&mut self) {
        self.disconnect_internal(DisconnectReason::Requested);
    }
}

/// Reader thread body; holds the engine only while handling a PDU
fn reader_loop(handler: Weak<GattHandler>, transport: Arc<dyn AttTransport>, poll_timeout: Duration) {
    let mut buf = vec![0u8; ATT_MAX_MTU as usize + 1];
    loop {
        let result = transport.read(&mut buf, Some(poll_timeout));

        let Some(handler) = handler.upgrade() else {
            break;
        };
        if !handler.is_connected() {
            break;
        }

        match result {
            Ok(0) => {
                info!("{}: channel closed by peer", handler.remote);
                handler.disconnect_internal(DisconnectReason::IoError);
                break;
            }
            Ok(len) => handler.process_inbound(&buf[..len]),
            Err(err) if err.is_timeout() => continue,
            Err(err) => {
                warn!("{}: read failed: {}", handler.remote, err);
                handler.disconnect_internal(DisconnectReason::IoError);
                break;
            }
        }
    }
    trace!("GATT reader exiting");
}
