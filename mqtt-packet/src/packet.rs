use num_enum::TryFromPrimitive;

use crate::mqtt::{ConnectReturnCode, PacketId, QoS};

/// The fixed 4-byte protocol name field, `[0x00, 0x04, 'M', 'Q', 'T', 'T']`.
pub const PROTOCOL_NAME: &[u8] = b"\x00\x04MQTT";
/// The protocol level byte for MQTT 3.1.1.
pub const PROTOCOL_LEVEL: u8 = 4;

/// MQTT 3.1.1 Control Packets.
///
/// PUBREL and PUBCOMP are intentionally absent: the client core only ever
/// sends PUBREC in response to an inbound QoS 2 PUBLISH and does not await
/// the rest of the handshake.
#[derive(Debug, PartialEq, Clone)]
pub enum Packet<'a> {
    /// Client request to connect to Server.
    Connect(Connect<'a>),
    /// Connect acknowledgment.
    ConnectAck(ConnectAck),
    /// Publish message.
    Publish(Publish<'a>),
    /// Publish acknowledgment (QoS 1).
    PublishAck(PublishAck),
    /// Publish received, first half of the QoS 2 handshake.
    PublishReceived(PublishReceived),
    /// Publish release, sent by the broker as the second half of the QoS 2
    /// handshake. The client core acknowledges receipt at the PUBREC step
    /// and does not send PUBCOMP; see [`Packet`] docs.
    PublishRelease(PublishRelease),
    /// Client subscribe request.
    Subscribe(Subscribe<'a>),
    /// Subscribe acknowledgment.
    SubscribeAck(SubscribeAck),
    /// Client unsubscribe request.
    Unsubscribe(Unsubscribe<'a>),
    /// Unsubscribe acknowledgment.
    UnsubscribeAck(UnsubscribeAck),
    /// PING request.
    Ping,
    /// PING response.
    Pong,
    /// Client is disconnecting.
    Disconnect,
}

/// Each MQTT Control Packet begins with a fixed header.
#[derive(Debug, PartialEq, Clone)]
pub struct FixedHeader {
    /// MQTT Control Packet type.
    pub packet_type: Type,
    /// Flags specific to each MQTT Control Packet type.
    pub packet_flags: u8,
    /// Number of bytes remaining in the packet after the fixed header.
    pub remaining_length: usize,
}

/// MQTT Control Packet type, the high nibble of the first fixed-header byte.
#[repr(u8)]
#[derive(Debug, Eq, PartialEq, Copy, Clone, TryFromPrimitive)]
pub enum Type {
    /// Client request to connect to Server.
    CONNECT = 1,
    /// Connect acknowledgment.
    CONNACK = 2,
    /// Publish message.
    PUBLISH = 3,
    /// Publish acknowledgment.
    PUBACK = 4,
    /// Publish received (assured delivery part 1).
    PUBREC = 5,
    /// Publish release (assured delivery part 2). Never emitted by this codec's `WriteTo`.
    PUBREL = 6,
    /// Publish complete (assured delivery part 3). Never emitted by this codec's `WriteTo`.
    PUBCOMP = 7,
    /// Client subscribe request.
    SUBSCRIBE = 8,
    /// Subscribe acknowledgment.
    SUBACK = 9,
    /// Unsubscribe request.
    UNSUBSCRIBE = 10,
    /// Unsubscribe acknowledgment.
    UNSUBACK = 11,
    /// PING request.
    PINGREQ = 12,
    /// PING response.
    PINGRESP = 13,
    /// Client is disconnecting.
    DISCONNECT = 14,
}

/// Client request to connect to Server.
#[derive(Debug, PartialEq, Clone)]
pub struct Connect<'a> {
    /// The handling of the Session state.
    pub clean_session: bool,
    /// A time interval measured in seconds; `0` disables keep-alive.
    pub keep_alive: u16,
    /// Identifies the Client to the Server.
    pub client_id: &'a str,
    /// The Will Message, if any, to be stored and published on ungraceful disconnect.
    pub last_will: Option<LastWill<'a>>,
    /// Username for authentication/authorization.
    pub username: Option<&'a str>,
    /// Password for authentication/authorization.
    pub password: Option<&'a [u8]>,
}

bitflags! {
    /// CONNECT flags byte.
    #[derive(Default)]
    pub struct ConnectFlags: u8 {
        const USERNAME      = 0b1000_0000;
        const PASSWORD      = 0b0100_0000;
        const WILL_RETAIN   = 0b0010_0000;
        const WILL_QOS      = 0b0001_1000;
        const LAST_WILL     = 0b0000_0100;
        const CLEAN_SESSION = 0b0000_0010;
    }
}

const WILL_QOS_SHIFT: usize = 3;

impl ConnectFlags {
    /// Extracts the Will QoS sub-field.
    pub fn qos(self) -> Option<QoS> {
        QoS::try_from_primitive((self & Self::WILL_QOS).bits() >> WILL_QOS_SHIFT).ok()
    }
}

impl From<QoS> for ConnectFlags {
    fn from(qos: QoS) -> Self {
        Self::from_bits_truncate((qos as u8) << WILL_QOS_SHIFT)
    }
}

/// The Will Message associated with a CONNECT.
#[derive(Debug, PartialEq, Clone)]
pub struct LastWill<'a> {
    /// QoS used to publish the Will Message.
    pub qos: QoS,
    /// Whether the Will Message is published with the RETAIN flag set.
    pub retain: bool,
    /// The Will topic.
    pub topic: &'a str,
    /// The Will payload.
    pub message: &'a [u8],
}

/// Connect acknowledgment.
#[derive(Debug, PartialEq, Clone)]
pub struct ConnectAck {
    /// Whether the Server has existing session state for this Client.
    pub session_present: bool,
    /// The CONNACK return code.
    pub return_code: ConnectReturnCode,
}

bitflags! {
    /// CONNACK flags byte.
    #[derive(Default)]
    pub struct ConnectAckFlags: u8 {
        const SESSION_PRESENT = 0b0000_0001;
    }
}

/// Publish message.
#[derive(Debug, PartialEq, Clone)]
pub struct Publish<'a> {
    /// Set when this may be a redelivery of an earlier PUBLISH attempt.
    pub dup: bool,
    /// Delivery assurance level.
    pub qos: QoS,
    /// Whether the Server should retain this Application Message.
    pub retain: bool,
    /// The topic this message is published to.
    pub topic: &'a str,
    /// Present only when `qos` is 1 or 2.
    pub packet_id: Option<PacketId>,
    /// The Application Message payload.
    pub payload: &'a [u8],
}

bitflags! {
    /// PUBLISH flags byte.
    #[derive(Default)]
    pub struct PublishFlags: u8 {
        const DUP = 0b0000_1000;
        const QOS = 0b0000_0110;
        const RETAIN = 0b0000_0001;
    }
}

const PUBLISH_QOS_SHIFT: usize = 1;

impl Publish<'_> {
    /// Computes the fixed-header flags byte for this PUBLISH.
    pub fn flags(&self) -> PublishFlags {
        let mut flags = PublishFlags::from(self.qos);
        if self.dup {
            flags |= PublishFlags::DUP;
        }
        if self.retain {
            flags |= PublishFlags::RETAIN;
        }
        flags
    }
}

impl PublishFlags {
    /// Extracts the QoS sub-field.
    pub fn qos(self) -> Option<QoS> {
        QoS::try_from_primitive((self & Self::QOS).bits() >> PUBLISH_QOS_SHIFT).ok()
    }
}

impl From<QoS> for PublishFlags {
    fn from(qos: QoS) -> Self {
        Self::from_bits_truncate((qos as u8) << PUBLISH_QOS_SHIFT)
    }
}

/// Publish acknowledgment (QoS 1).
#[derive(Debug, PartialEq, Clone, Copy)]
pub struct PublishAck {
    /// Packet identifier of the acknowledged PUBLISH.
    pub packet_id: PacketId,
}

/// Publish received, first half of the QoS 2 handshake.
#[derive(Debug, PartialEq, Clone, Copy)]
pub struct PublishReceived {
    /// Packet identifier of the PUBLISH this PUBREC responds to.
    pub packet_id: PacketId,
}

/// Publish release, second half of the QoS 2 handshake (inbound only; this
/// codec never writes one).
#[derive(Debug, PartialEq, Clone, Copy)]
pub struct PublishRelease {
    /// Packet identifier of the PUBLISH this PUBREL responds to.
    pub packet_id: PacketId,
}

/// Client subscribe request.
#[derive(Debug, PartialEq, Clone)]
pub struct Subscribe<'a> {
    /// Packet identifier.
    pub packet_id: PacketId,
    /// Topic filters and the maximum QoS requested for each.
    pub subscriptions: Vec<(&'a str, QoS)>,
}

/// Subscribe acknowledgment.
#[derive(Debug, PartialEq, Clone)]
pub struct SubscribeAck {
    /// Packet identifier of the SUBSCRIBE being acknowledged.
    pub packet_id: PacketId,
    /// One return code per topic filter in the original SUBSCRIBE, in order.
    pub status: Vec<SubscribeReturnCode>,
}

impl SubscribeAck {
    /// The reserved byte value signaling subscription failure.
    pub const FAILURE: u8 = 0x80;
}

/// Per-filter SUBACK return code.
#[derive(Debug, PartialEq, Clone, Copy)]
pub enum SubscribeReturnCode {
    /// The broker granted this QoS for the filter.
    Success(QoS),
    /// The broker refused the subscription.
    Failure,
}

impl From<SubscribeReturnCode> for u8 {
    fn from(code: SubscribeReturnCode) -> u8 {
        match code {
            SubscribeReturnCode::Success(qos) => qos as u8,
            SubscribeReturnCode::Failure => SubscribeAck::FAILURE,
        }
    }
}

/// Client unsubscribe request.
#[derive(Debug, PartialEq, Clone)]
pub struct Unsubscribe<'a> {
    /// Packet identifier.
    pub packet_id: PacketId,
    /// Topic filters to remove.
    pub topic_filters: Vec<&'a str>,
}

/// Unsubscribe acknowledgment.
#[derive(Debug, PartialEq, Clone, Copy)]
pub struct UnsubscribeAck {
    /// Packet identifier of the UNSUBSCRIBE being acknowledged.
    pub packet_id: PacketId,
}
