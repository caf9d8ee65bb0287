//! The single-session client core: the state machine, the
//! public publish/subscribe/unsubscribe/yield_now surface, and the dispatch
//! of inbound packets to the ack tables and the subscription table.
//!
//! Grounded on `mqtt-sync-client/src/{client.rs,session.rs}`'s blocking,
//! ack-waiting API, redesigned so that acking, republishing, keep-alive and
//! reconnect are all driven by repeated calls to `yield_now` rather than a
//! per-call blocking wait loop.

use std::time::{Duration, Instant};

use log::{trace, warn};

use mqtt_core::topic::validate_topic_name;
use mqtt_core::{Error, PacketId, QoS};
use mqtt_packet::{
    Connect, ConnectAck, Packet, Publish, PublishAck, PublishReceived, Subscribe, SubscribeAck,
    SubscribeReturnCode, Unsubscribe, UnsubscribeAck, WriteTo,
};

use crate::auth::Authenticator;
use crate::config::ClientConfig;
use crate::event::{Event, EventHandler, Message};
use crate::inflight::{PubEntry, PubInflightTable, SubEntry, SubInflightTable, SubKind};
use crate::io::{PacketIo, ReadOutcome};
use crate::keepalive::{KeepAliveState, ReconnectState};
use crate::subscription::{Callback, InstallOutcome, SubscriptionTable, TopicBinding};
use crate::transport::Transport;

use std::sync::Mutex;

/// The client's connectivity state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientState {
    /// Constructed but never successfully handshaken.
    Invalid,
    /// Constructed, handshake not yet attempted.
    Initialized,
    /// CONNECT/CONNACK succeeded; normal operation.
    Connected,
    /// The transport was lost; a reconnect has not yet been scheduled.
    Disconnected,
    /// Disconnected, waiting out the backoff before the next reconnect attempt.
    DisconnectedReconnecting,
}

/// Everything protected by the client's one "general" lock:
/// connectivity state, the packet-id counter, the subscription table and the
/// keep-alive/reconnect schedulers.
struct GeneralState {
    client_state: ClientState,
    next_packet_id: u16,
    subscriptions: SubscriptionTable,
    keepalive: KeepAliveState,
    reconnect: Option<ReconnectState>,
}

impl GeneralState {
    fn alloc_packet_id(&mut self) -> PacketId {
        let id = self.next_packet_id;
        self.next_packet_id = if self.next_packet_id == u16::MAX {
            1
        } else {
            self.next_packet_id + 1
        };
        id
    }
}

/// A single MQTT 3.1.1 session: one broker connection, driven entirely by the
/// owner's thread calling [`Client::publish`]/[`Client::subscribe`]/
/// [`Client::unsubscribe`] and [`Client::yield_now`].
///
/// The write-buffer, pub-inflight, sub-inflight and general bookkeeping are
/// each realized as their own `Mutex`; the write-buffer
/// lock additionally guards the read buffer, since both live on the same
/// `PacketIo` and only one side of the connection is ever read or written at
/// a time from a single owner thread. No lock is ever held while a callback
/// runs.
pub struct Client<T, A, H> {
    io: Mutex<PacketIo<T>>,
    pub_inflight: Mutex<PubInflightTable>,
    sub_inflight: Mutex<SubInflightTable>,
    general: Mutex<GeneralState>,
    config: ClientConfig,
    authenticator: Mutex<A>,
    event_handler: Mutex<H>,
}

impl<T, A, H> Client<T, A, H>
where
    T: Transport,
    A: Authenticator,
    H: EventHandler,
{
    /// Connects the transport, performs the CONNECT/CONNACK handshake, and
    /// returns a client in the `Connected` state. On any failure the
    /// transport is torn down and the error is returned.
    pub fn construct(
        config: ClientConfig,
        mut transport: T,
        authenticator: A,
        event_handler: H,
    ) -> Result<Self, Error> {
        transport.connect()?;

        let buffer_capacity = config.buffer_capacity;
        let mut io = PacketIo::new(transport, buffer_capacity);
        let deadline = Instant::now() + config.request_timeout;

        if let Err(e) = do_handshake(&mut io, &config, deadline) {
            io.transport().disconnect();
            return Err(e);
        }

        let now = Instant::now();
        let keepalive_interval = keepalive_interval_for(&config);

        Ok(Client {
            io: Mutex::new(io),
            pub_inflight: Mutex::new(PubInflightTable::new(config.pub_inflight_max)),
            sub_inflight: Mutex::new(SubInflightTable::new(crate::config::SUB_INFLIGHT_MAX)),
            general: Mutex::new(GeneralState {
                client_state: ClientState::Connected,
                next_packet_id: 1,
                subscriptions: SubscriptionTable::new(crate::config::SUB_NUM_MAX),
                keepalive: KeepAliveState::new(now, keepalive_interval),
                reconnect: None,
            }),
            config,
            authenticator: Mutex::new(authenticator),
            event_handler: Mutex::new(event_handler),
        })
    }

    /// Sends a best-effort DISCONNECT, tears down the transport and consumes
    /// the client. Never fails: a transport error here is swallowed, since
    /// the caller is tearing the session down regardless.
    pub fn deconstruct(self) {
        let mut io = self.io.lock().unwrap();
        let deadline = Instant::now() + self.config.request_timeout;
        let _ = io.write_packet(&Packet::Disconnect, deadline);
        io.transport().disconnect();
    }

    /// The client's current connectivity state.
    pub fn state(&self) -> ClientState {
        self.general.lock().unwrap().client_state
    }

    /// Fails with `Error::StateError` unless the client is currently
    /// `Connected`. Exposed so a caller can check before attempting
    /// publish/subscribe/unsubscribe rather than relying on their error return.
    pub fn check_state_normal(&self) -> Result<(), Error> {
        match self.state() {
            ClientState::Connected => Ok(()),
            _ => Err(Error::StateError),
        }
    }

    /// Publishes `payload` to `topic` at `qos`. For QoS 0 this is fire-and
    /// forget (the returned packet id is always `0`). For QoS 1/2 the entry
    /// is recorded in the pub-inflight table *before* the packet is written,
    /// so a broker ack racing the send can never arrive before there is
    /// somewhere to record it.
    pub fn publish(
        &self,
        topic: &str,
        payload: &[u8],
        qos: QoS,
        retain: bool,
    ) -> Result<PacketId, Error> {
        self.check_state_normal()?;
        validate_topic_name(topic)?;

        let packet_id = if qos == QoS::AtMostOnce {
            None
        } else {
            Some(self.general.lock().unwrap().alloc_packet_id())
        };

        let packet = Packet::Publish(Publish {
            dup: false,
            qos,
            retain,
            topic,
            packet_id,
            payload,
        });

        let mut serialized = Vec::with_capacity(packet.size());
        packet.write_to(&mut serialized);

        if let Some(id) = packet_id {
            self.pub_inflight.lock().unwrap().push(PubEntry {
                packet_id: id,
                sent_at: Instant::now(),
                serialized: serialized.clone(),
            })?;
        }

        let deadline = Instant::now() + self.config.request_timeout;
        if let Err(e) = self.io.lock().unwrap().write_raw(&serialized, deadline) {
            if let Some(id) = packet_id {
                self.pub_inflight.lock().unwrap().remove(id);
            }
            self.on_network_error();
            return Err(e);
        }

        Ok(packet_id.unwrap_or(0))
    }

    /// Subscribes `filter` at `qos`, installing `callback` once the broker's
    /// SUBACK arrives. The binding is not visible to inbound PUBLISH dispatch
    /// until the SUBACK is processed by `yield_now`.
    pub fn subscribe(
        &self,
        filter: &str,
        qos: QoS,
        context: u64,
        callback: Callback,
    ) -> Result<PacketId, Error> {
        self.check_state_normal()?;
        let parsed = mqtt_core::topic::validate_topic_filter(filter)?;
        let binding = TopicBinding::new(parsed, qos, context, callback);

        let packet_id = self.general.lock().unwrap().alloc_packet_id();

        self.sub_inflight.lock().unwrap().push(SubEntry {
            packet_id,
            sent_at: Instant::now(),
            kind: SubKind::Subscribe,
            binding,
        })?;

        let packet = Packet::Subscribe(Subscribe {
            packet_id,
            subscriptions: vec![(filter, qos)],
        });

        let deadline = Instant::now() + self.config.request_timeout;
        if let Err(e) = self.io.lock().unwrap().write_packet(&packet, deadline) {
            self.sub_inflight.lock().unwrap().remove(packet_id);
            self.on_network_error();
            return Err(e);
        }

        Ok(packet_id)
    }

    /// Unsubscribes `filter`, removing every installed binding whose
    /// `(filter, context, callback)` matches once the broker's UNSUBACK
    /// arrives.
    pub fn unsubscribe(
        &self,
        filter: &str,
        context: u64,
        callback: Callback,
    ) -> Result<PacketId, Error> {
        self.check_state_normal()?;
        let parsed = mqtt_core::topic::validate_topic_filter(filter)?;
        let binding = TopicBinding::new(parsed, QoS::AtMostOnce, context, callback);

        let packet_id = self.general.lock().unwrap().alloc_packet_id();

        self.sub_inflight.lock().unwrap().push(SubEntry {
            packet_id,
            sent_at: Instant::now(),
            kind: SubKind::Unsubscribe,
            binding,
        })?;

        let packet = Packet::Unsubscribe(Unsubscribe {
            packet_id,
            topic_filters: vec![filter],
        });

        let deadline = Instant::now() + self.config.request_timeout;
        if let Err(e) = self.io.lock().unwrap().write_packet(&packet, deadline) {
            self.sub_inflight.lock().unwrap().remove(packet_id);
            self.on_network_error();
            return Err(e);
        }

        Ok(packet_id)
    }

    /// Services the connection for up to `timeout_ms`: reads and dispatches
    /// at most one inbound packet, sweeps both ack tables for republishes and
    /// timeouts, and drives keep-alive/reconnect. Returns once the timeout
    /// elapses; a malformed inbound packet is dropped and does not end the
    /// call early, only a hard transport failure does.
    pub fn yield_now(&self, timeout_ms: u64) -> Result<(), Error> {
        let deadline = Instant::now() + Duration::from_millis(timeout_ms);

        loop {
            if self.state() == ClientState::Connected {
                self.read_and_dispatch(deadline)?;
                self.sweep_pub_inflight();
                self.sweep_sub_inflight();
            }

            self.keepalive_tick(deadline);

            if Instant::now() >= deadline {
                return Ok(());
            }
        }
    }

    fn read_and_dispatch(&self, deadline: Instant) -> Result<(), Error> {
        let step_deadline = Instant::now().min(deadline) + Duration::from_millis(20);
        let step_deadline = step_deadline.min(deadline);

        let outcome = {
            let mut io = self.io.lock().unwrap();
            io.read_packet(step_deadline)
        };

        match outcome {
            Ok(ReadOutcome::Timeout) => Ok(()),
            Ok(ReadOutcome::Overflow) => {
                warn!("dropped oversized inbound packet");
                Ok(())
            }
            Ok(ReadOutcome::Ready(len)) => {
                let parsed = {
                    let io = self.io.lock().unwrap();
                    mqtt_packet::parse(&io.read_buf()[..len]).map(|(p, _)| p.into_owned())
                };

                self.on_inbound_packet();

                match parsed {
                    Ok(packet) => self.dispatch(&packet),
                    Err(_) => {
                        warn!("dropped malformed inbound packet");
                        Ok(())
                    }
                }
            }
            Err(Error::NetworkError) => {
                self.on_network_error();
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    fn on_inbound_packet(&self) {
        let mut general = self.general.lock().unwrap();
        let interval = keepalive_interval_for(&self.config);
        general.keepalive.on_inbound_packet(Instant::now(), interval);
    }

    fn dispatch(&self, packet: &OwnedPacket) -> Result<(), Error> {
        match packet {
            OwnedPacket::Publish {
                dup: _,
                qos,
                retain: _,
                topic,
                packet_id,
                payload,
            } => self.handle_publish(*qos, topic, *packet_id, payload),
            OwnedPacket::PublishAck { packet_id } => {
                self.handle_pub_ack(*packet_id);
                Ok(())
            }
            OwnedPacket::PublishReceived { packet_id } => {
                self.handle_pub_ack(*packet_id);
                Ok(())
            }
            OwnedPacket::SubscribeAck { packet_id, status } => {
                self.handle_suback(*packet_id, status);
                Ok(())
            }
            OwnedPacket::UnsubscribeAck { packet_id } => {
                self.handle_unsuback(*packet_id);
                Ok(())
            }
            OwnedPacket::Pong => Ok(()),
            OwnedPacket::Other => Ok(()),
        }
    }

    fn handle_publish(
        &self,
        qos: QoS,
        topic: &str,
        packet_id: Option<PacketId>,
        payload: &[u8],
    ) -> Result<(), Error> {
        let message = Message {
            topic: topic.to_owned(),
            payload: payload.to_owned(),
        };

        let matched = {
            let general = self.general.lock().unwrap();
            general.subscriptions.matching(topic)
        };

        if matched.is_empty() {
            self.emit(Event::PublishReceived(message.clone()));
        } else {
            for binding in &matched {
                binding.invoke(&message);
            }
        }

        match qos {
            QoS::AtMostOnce => {}
            QoS::AtLeastOnce => {
                if let Some(id) = packet_id {
                    self.send_control_packet(Packet::PublishAck(PublishAck { packet_id: id }));
                }
            }
            QoS::ExactlyOnce => {
                if let Some(id) = packet_id {
                    self.send_control_packet(Packet::PublishReceived(PublishReceived {
                        packet_id: id,
                    }));
                }
            }
        }

        Ok(())
    }

    /// PUBACK and PUBREC are both "the broker considers this publish
    /// delivered" from this client's point of view; the QoS 2 handshake is
    /// deliberately truncated at PUBREC, never progressing to
    /// PUBREL/PUBCOMP.
    fn handle_pub_ack(&self, packet_id: PacketId) {
        let cleared = self.pub_inflight.lock().unwrap().mark_invalid_by_id(packet_id);
        if cleared {
            self.emit(Event::PublishSuccess(packet_id));
        }
    }

    fn handle_suback(&self, packet_id: PacketId, status: &[SubscribeReturnCode]) {
        let entry = self.sub_inflight.lock().unwrap().mark_invalid_by_id(packet_id);

        let entry = match entry {
            Some(e) if e.kind == SubKind::Subscribe => e,
            Some(_) => return,
            None => {
                self.emit(Event::SubInfoNotFound(packet_id));
                return;
            }
        };

        match status.first() {
            Some(SubscribeReturnCode::Failure) => {
                self.emit(Event::SubscribeNack(packet_id));
            }
            _ => {
                let outcome = self.general.lock().unwrap().subscriptions.install(entry.binding);
                match outcome {
                    InstallOutcome::Installed | InstallOutcome::DuplicateIgnored => {
                        self.emit(Event::SubscribeSuccess(packet_id));
                    }
                    InstallOutcome::Full => {
                        warn!("broker granted subscription {} but the local subscription table is full", packet_id);
                        self.emit(Event::SubscribeSuccess(packet_id));
                    }
                }
            }
        }
    }

    fn handle_unsuback(&self, packet_id: PacketId) {
        let entry = self.sub_inflight.lock().unwrap().mark_invalid_by_id(packet_id);

        match entry {
            Some(e) if e.kind == SubKind::Unsubscribe => {
                self.general.lock().unwrap().subscriptions.remove_matching(&e.binding);
                self.emit(Event::UnsubscribeSuccess(packet_id));
            }
            Some(_) => {}
            None => self.emit(Event::SubInfoNotFound(packet_id)),
        }
    }

    fn sweep_pub_inflight(&self) {
        let max_age = self.config.request_timeout * 2;
        let mut republish = Vec::new();

        {
            let mut table = self.pub_inflight.lock().unwrap();
            table.sweep(Instant::now(), max_age, |entry| {
                republish.push(entry.serialized.clone());
            });
        }

        if republish.is_empty() {
            return;
        }

        let deadline = Instant::now() + self.config.request_timeout;
        let mut io = self.io.lock().unwrap();
        for bytes in &republish {
            if io.write_raw(bytes, deadline).is_err() {
                drop(io);
                self.on_network_error();
                return;
            }
        }
    }

    fn sweep_sub_inflight(&self) {
        let max_age = self.config.request_timeout * 2;
        let mut timed_out = Vec::new();

        {
            let mut table = self.sub_inflight.lock().unwrap();
            table.sweep(Instant::now(), max_age, |entry| {
                timed_out.push((entry.packet_id, entry.kind));
            });
        }

        for (packet_id, kind) in timed_out {
            match kind {
                SubKind::Subscribe => self.emit(Event::SubscribeTimeout(packet_id)),
                SubKind::Unsubscribe => self.emit(Event::UnsubscribeTimeout(packet_id)),
            }
        }
    }

    fn keepalive_tick(&self, outer_deadline: Instant) {
        let now = Instant::now();
        let state = self.state();

        match state {
            ClientState::Connected => {
                let interval = keepalive_interval_for(&self.config);
                let due = {
                    let general = self.general.lock().unwrap();
                    general.keepalive.is_due(now)
                };
                if due {
                    let deadline = now + self.config.request_timeout;
                    let sent = self.io.lock().unwrap().write_packet(&Packet::Ping, deadline);
                    if sent.is_ok() {
                        self.general.lock().unwrap().keepalive.on_ping_sent(now, interval);
                    } else {
                        self.on_network_error();
                    }
                }
            }
            ClientState::Disconnected => {
                self.io.lock().unwrap().transport().disconnect();
                self.emit(Event::Disconnect);
                let mut general = self.general.lock().unwrap();
                general.reconnect = Some(ReconnectState::new(now));
                general.client_state = ClientState::DisconnectedReconnecting;
            }
            ClientState::DisconnectedReconnecting => {
                let due = {
                    let general = self.general.lock().unwrap();
                    general.reconnect.as_ref().map_or(false, |r| r.is_due(now))
                };
                if due {
                    self.attempt_reconnect(now, outer_deadline);
                }
            }
            ClientState::Invalid | ClientState::Initialized => {}
        }
    }

    fn attempt_reconnect(&self, now: Instant, outer_deadline: Instant) {
        // Auth failure does not advance the backoff: the deadline is left
        // armed where it already was, so the next `yield_now` retries
        // immediately rather than waiting out a doubled interval.
        if let Err(e) = self.authenticator.lock().unwrap().authenticate() {
            trace!("reconnect authenticate failed: {:?}", e);
            return;
        }

        let result = {
            let mut io = self.io.lock().unwrap();
            io.transport().disconnect();
            if let Err(e) = io.transport().connect() {
                Err(e)
            } else {
                let deadline = outer_deadline.max(now) + self.config.request_timeout;
                do_handshake(&mut io, &self.config, deadline)
            }
        };

        match result {
            Ok(()) => {
                let mut general = self.general.lock().unwrap();
                general.client_state = ClientState::Connected;
                general.reconnect = None;
                general.keepalive = KeepAliveState::new(now, keepalive_interval_for(&self.config));
                drop(general);
                self.emit(Event::Reconnect);
            }
            Err(e) => {
                trace!("reconnect attempt failed: {:?}", e);
                self.general.lock().unwrap().reconnect.as_mut().unwrap().on_failure(now);
            }
        }
    }

    fn on_network_error(&self) {
        let mut general = self.general.lock().unwrap();
        if general.client_state == ClientState::Connected {
            general.client_state = ClientState::Disconnected;
        }
    }

    fn send_control_packet(&self, packet: Packet<'_>) {
        let deadline = Instant::now() + self.config.request_timeout;
        if self.io.lock().unwrap().write_packet(&packet, deadline).is_err() {
            self.on_network_error();
        }
    }

    fn emit(&self, event: Event) {
        self.event_handler.lock().unwrap().on_event(event);
    }
}

fn keepalive_interval_for(config: &ClientConfig) -> Duration {
    config.keepalive_interval
}

fn do_handshake<T: Transport>(
    io: &mut PacketIo<T>,
    config: &ClientConfig,
    deadline: Instant,
) -> Result<(), Error> {
    let connect = Packet::Connect(Connect {
        clean_session: config.clean_session,
        keep_alive: config.keepalive_interval.as_secs() as u16,
        client_id: &config.client_id,
        last_will: None,
        username: config.user_name.as_deref(),
        password: config.password.as_deref(),
    });

    io.write_packet(&connect, deadline)?;

    loop {
        match io.read_packet(deadline)? {
            ReadOutcome::Timeout => return Err(Error::NetworkError),
            ReadOutcome::Overflow => continue,
            ReadOutcome::Ready(len) => {
                let (packet, _) = mqtt_packet::parse(&io.read_buf()[..len])?;
                match packet {
                    Packet::ConnectAck(ConnectAck { return_code,.. }) => {
                        return if return_code.is_accepted() {
                            Ok(())
                        } else {
                            Err(Error::from_connect_return_code(return_code))
                        };
                    }
                    _ => continue,
                }
            }
        }
    }
}

/// An owned copy of the inbound-packet shapes `dispatch` needs, detached from
/// the borrowed read buffer so dispatch can run after the `io` lock is
/// released.
enum OwnedPacket {
    Publish {
        dup: bool,
        qos: QoS,
        retain: bool,
        topic: String,
        packet_id: Option<PacketId>,
        payload: Vec<u8>,
    },
    PublishAck {
        packet_id: PacketId,
    },
    PublishReceived {
        packet_id: PacketId,
    },
    SubscribeAck {
        packet_id: PacketId,
        status: Vec<SubscribeReturnCode>,
    },
    UnsubscribeAck {
        packet_id: PacketId,
    },
    Pong,
    Other,
}

trait IntoOwnedPacket {
    fn into_owned(self) -> OwnedPacket;
}

impl<'a> IntoOwnedPacket for Packet<'a> {
    fn into_owned(self) -> OwnedPacket {
        match self {
            Packet::Publish(p) => OwnedPacket::Publish {
                dup: p.dup,
                qos: p.qos,
                retain: p.retain,
                topic: p.topic.to_owned(),
                packet_id: p.packet_id,
                payload: p.payload.to_owned(),
            },
            Packet::PublishAck(PublishAck { packet_id }) => OwnedPacket::PublishAck { packet_id },
            Packet::PublishReceived(PublishReceived { packet_id }) => {
                OwnedPacket::PublishReceived { packet_id }
            }
            Packet::SubscribeAck(SubscribeAck { packet_id, status }) => {
                OwnedPacket::SubscribeAck { packet_id, status }
            }
            Packet::UnsubscribeAck(UnsubscribeAck { packet_id }) => {
                OwnedPacket::UnsubscribeAck { packet_id }
            }
            Packet::Pong => OwnedPacket::Pong,
            _ => OwnedPacket::Other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::NoopAuthenticator;
    use crate::transport::testing::LoopbackTransport;
    use mqtt_core::ConnectReturnCode;
    use std::sync::{Arc, Mutex as StdMutex};

    fn accept_connack(transport: &mut LoopbackTransport) {
        let packet = Packet::ConnectAck(ConnectAck {
            session_present: false,
            return_code: ConnectReturnCode::ConnectionAccepted,
        });
        let mut bytes = Vec::new();
        packet.write_to(&mut bytes);
        transport.push_inbound(&bytes);
    }

    struct RecordingHandler(Arc<StdMutex<Vec<Event>>>);

    impl EventHandler for RecordingHandler {
        fn on_event(&mut self, event: Event) {
            self.0.lock().unwrap().push(event);
        }
    }

    fn make_client() -> (
        Client<LoopbackTransport, NoopAuthenticator, RecordingHandler>,
        Arc<StdMutex<Vec<Event>>>,
    ) {
        make_client_with_auth(NoopAuthenticator)
    }

    fn make_client_with_auth<A: Authenticator>(
        auth: A,
    ) -> (
        Client<LoopbackTransport, A, RecordingHandler>,
        Arc<StdMutex<Vec<Event>>>,
    ) {
        let mut transport = LoopbackTransport::new();
        transport.connect().unwrap();
        accept_connack(&mut transport);

        let events = Arc::new(StdMutex::new(Vec::new()));
        let config = ClientConfig::new("broker", 1883, "dev-1");
        let client = Client::construct(config, transport, auth, RecordingHandler(events.clone()))
            .unwrap();

        (client, events)
    }

    /// An [`Authenticator`] that fails its first `fail_times` calls, then
    /// always succeeds.
    struct FlakyAuthenticator {
        fail_times: Arc<StdMutex<usize>>,
    }

    impl Authenticator for FlakyAuthenticator {
        fn authenticate(&mut self) -> Result<(), Error> {
            let mut remaining = self.fail_times.lock().unwrap();
            if *remaining > 0 {
                *remaining -= 1;
                Err(Error::NetworkConnectError)
            } else {
                Ok(())
            }
        }
    }

    #[test]
    fn construct_performs_the_connect_handshake_and_reaches_connected() {
        let (client, _events) = make_client();
        assert_eq!(client.state(), ClientState::Connected);
    }

    #[test]
    fn publish_at_qos0_does_not_register_a_pub_inflight_entry() {
        let (client, _events) = make_client();
        let id = client.publish("/a/b", b"hi", QoS::AtMostOnce, false).unwrap();
        assert_eq!(id, 0);
        assert!(client.pub_inflight.lock().unwrap().is_empty());
    }

    #[test]
    fn publish_at_qos1_registers_a_pub_inflight_entry_before_returning() {
        let (client, _events) = make_client();
        let id = client.publish("/a/b", b"hi", QoS::AtLeastOnce, false).unwrap();
        assert_ne!(id, 0);
        assert_eq!(client.pub_inflight.lock().unwrap().len(), 1);
    }

    #[test]
    fn puback_clears_the_inflight_entry_and_emits_publish_success() {
        let (client, events) = make_client();
        let id = client.publish("/a/b", b"hi", QoS::AtLeastOnce, false).unwrap();

        let ack = Packet::PublishAck(PublishAck { packet_id: id });
        let mut bytes = Vec::new();
        ack.write_to(&mut bytes);
        client.io.lock().unwrap().transport().push_inbound(&bytes);

        client.yield_now(50).unwrap();

        assert!(client.pub_inflight.lock().unwrap().is_empty());
        assert!(events.lock().unwrap().contains(&Event::PublishSuccess(id)));
    }

    #[test]
    fn subscribe_then_suback_installs_the_binding_and_dispatches_publishes() {
        let (client, events) = make_client();
        let hits = Arc::new(StdMutex::new(0usize));
        let hits2 = hits.clone();

        let id = client
            .subscribe(
                "/a/b",
                QoS::AtMostOnce,
                0,
                Arc::new(move |_msg: &Message| {
                    *hits2.lock().unwrap() += 1;
                }),
            )
            .unwrap();

        let suback = Packet::SubscribeAck(SubscribeAck {
            packet_id: id,
            status: vec![SubscribeReturnCode::Success(QoS::AtMostOnce)],
        });
        let mut bytes = Vec::new();
        suback.write_to(&mut bytes);
        client.io.lock().unwrap().transport().push_inbound(&bytes);
        client.yield_now(50).unwrap();

        assert!(events.lock().unwrap().contains(&Event::SubscribeSuccess(id)));

        let publish = Packet::Publish(Publish {
            dup: false,
            qos: QoS::AtMostOnce,
            retain: false,
            topic: "/a/b",
            packet_id: None,
            payload: b"hello",
        });
        let mut bytes = Vec::new();
        publish.write_to(&mut bytes);
        client.io.lock().unwrap().transport().push_inbound(&bytes);
        client.yield_now(50).unwrap();

        assert_eq!(*hits.lock().unwrap(), 1);
    }

    #[test]
    fn suback_with_no_matching_inflight_entry_emits_sub_info_not_found() {
        let (client, events) = make_client();

        let suback = Packet::SubscribeAck(SubscribeAck {
            packet_id: 42,
            status: vec![SubscribeReturnCode::Success(QoS::AtMostOnce)],
        });
        let mut bytes = Vec::new();
        suback.write_to(&mut bytes);
        client.io.lock().unwrap().transport().push_inbound(&bytes);
        client.yield_now(50).unwrap();

        assert!(events.lock().unwrap().contains(&Event::SubInfoNotFound(42)));
    }

    #[test]
    fn publish_rejects_malformed_topic_names() {
        let (client, _events) = make_client();
        let err = client.publish("no-leading-slash", b"x", QoS::AtMostOnce, false).unwrap_err();
        assert_eq!(err, Error::TopicFormat);
    }

    #[test]
    fn network_error_emits_disconnect_and_enters_reconnecting() {
        let (client, events) = make_client();

        client.io.lock().unwrap().transport().disconnect();
        client.yield_now(20).unwrap();

        assert_eq!(client.state(), ClientState::DisconnectedReconnecting);
        assert!(events.lock().unwrap().contains(&Event::Disconnect));
    }

    #[test]
    fn reconnect_succeeds_once_backoff_elapses_and_emits_reconnect() {
        let (client, events) = make_client_with_auth(NoopAuthenticator);

        client.io.lock().unwrap().transport().disconnect();
        client.yield_now(20).unwrap();
        assert_eq!(client.state(), ClientState::DisconnectedReconnecting);

        accept_connack(client.io.lock().unwrap().transport());
        std::thread::sleep(Duration::from_millis(1_050));
        client.yield_now(20).unwrap();

        assert_eq!(client.state(), ClientState::Connected);
        assert!(events.lock().unwrap().contains(&Event::Reconnect));
    }

    #[test]
    fn auth_failure_during_reconnect_does_not_advance_backoff() {
        let fail_times = Arc::new(StdMutex::new(1));
        let (client, events) = make_client_with_auth(FlakyAuthenticator {
            fail_times: fail_times.clone(),
        });

        client.io.lock().unwrap().transport().disconnect();
        client.yield_now(20).unwrap();
        assert_eq!(client.state(), ClientState::DisconnectedReconnecting);

        accept_connack(client.io.lock().unwrap().transport());
        std::thread::sleep(Duration::from_millis(1_050));

        // First attempt: auth fails, backoff must NOT advance past its
        // original 1s interval (which has already elapsed).
        client.yield_now(20).unwrap();
        assert_eq!(*fail_times.lock().unwrap(), 0);
        assert_eq!(client.state(), ClientState::DisconnectedReconnecting);

        // Immediately retried, with no further sleep: only possible if the
        // reconnect deadline was left due rather than doubled to +2s.
        client.yield_now(20).unwrap();
        assert_eq!(client.state(), ClientState::Connected);
        assert!(events.lock().unwrap().contains(&Event::Reconnect));
    }
}
