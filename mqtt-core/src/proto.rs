use core::convert::TryFrom;

use derive_more::Display;
use num_enum::TryFromPrimitive;

/// The revision level of the protocol used by the Client.
///
/// Only MQTT 3.1.1 is supported; the protocol byte is always [`ProtocolVersion::V311`].
#[repr(u8)]
#[derive(Debug, Eq, PartialEq, Clone, Copy, TryFromPrimitive)]
pub enum ProtocolVersion {
    /// The value of the Protocol Level field for version 3.1.1 of the protocol is 4 (0x04).
    V311 = 4,
}

/// Quality of Service levels.
#[repr(u8)]
#[derive(Clone, Copy, Debug, Display, Hash, PartialEq, Eq, PartialOrd, Ord, TryFromPrimitive)]
pub enum QoS {
    /// At most once delivery: no packet identifier, no acknowledgment.
    #[display(fmt = "at-most-once")]
    AtMostOnce = 0,
    /// At least once delivery: PUBLISH carries a packet identifier and is acked by PUBACK.
    #[display(fmt = "at-least-once")]
    AtLeastOnce = 1,
    /// Exactly once delivery: PUBLISH/PUBREC/PUBREL/PUBCOMP four-way handshake.
    ///
    /// The client core only completes the receiver side of this handshake as
    /// far as sending PUBREC; see `mqtt-client`'s publish handler.
    #[display(fmt = "exactly-once")]
    ExactlyOnce = 2,
}

impl Default for QoS {
    fn default() -> Self {
        QoS::AtMostOnce
    }
}

/// Packet Identifier.
///
/// The variable header of PUBLISH (QoS ≥ 1), SUBSCRIBE, SUBACK, UNSUBSCRIBE,
/// UNSUBACK, PUBACK and PUBREC carries a 2-byte packet identifier. Value `0`
/// is reserved and never issued by the client's packet-id counter.
pub type PacketId = u16;

/// CONNACK return code.
///
/// The five rejection codes are the ones MQTT 3.1.1 defines; any other byte
/// value still decodes successfully as `Unknown`, since a broker speaking a
/// future or vendor-extended revision of the protocol may send one and the
/// client should surface that distinctly rather than treat the whole CONNACK
/// as malformed.
#[derive(Debug, Eq, PartialEq, Clone, Copy, Display)]
pub enum ConnectReturnCode {
    /// Connection accepted.
    #[display(fmt = "connection accepted")]
    ConnectionAccepted,
    /// The Server does not support the level of the MQTT protocol requested by the Client.
    #[display(fmt = "connection refused, unacceptable protocol version")]
    UnacceptableProtocolVersion,
    /// The Client identifier is correct UTF-8 but not allowed by the Server.
    #[display(fmt = "connection refused, identifier rejected")]
    IdentifierRejected,
    /// The network connection has been made but the MQTT service is unavailable.
    #[display(fmt = "connection refused, server unavailable")]
    ServiceUnavailable,
    /// The data in the user name or password is malformed.
    #[display(fmt = "connection refused, bad user name or password")]
    BadUserNameOrPassword,
    /// The Client is not authorized to connect.
    #[display(fmt = "connection refused, not authorized")]
    NotAuthorized,
    /// Any return code outside the five defined above.
    #[display(fmt = "connection refused, unknown return code {}", _0)]
    Unknown(u8),
}

impl ConnectReturnCode {
    /// Decodes a raw CONNACK return-code byte. Always succeeds: codes
    /// outside the five defined ones decode as `Unknown`.
    pub fn from_byte(b: u8) -> Option<Self> {
        Some(match b {
            0 => ConnectReturnCode::ConnectionAccepted,
            1 => ConnectReturnCode::UnacceptableProtocolVersion,
            2 => ConnectReturnCode::IdentifierRejected,
            3 => ConnectReturnCode::ServiceUnavailable,
            4 => ConnectReturnCode::BadUserNameOrPassword,
            5 => ConnectReturnCode::NotAuthorized,
            other => ConnectReturnCode::Unknown(other),
        })
    }

    pub fn is_accepted(self) -> bool {
        self == ConnectReturnCode::ConnectionAccepted
    }

    /// The raw CONNACK return-code byte for this value.
    pub fn to_byte(self) -> u8 {
        match self {
            ConnectReturnCode::ConnectionAccepted => 0,
            ConnectReturnCode::UnacceptableProtocolVersion => 1,
            ConnectReturnCode::IdentifierRejected => 2,
            ConnectReturnCode::ServiceUnavailable => 3,
            ConnectReturnCode::BadUserNameOrPassword => 4,
            ConnectReturnCode::NotAuthorized => 5,
            ConnectReturnCode::Unknown(b) => b,
        }
    }
}
