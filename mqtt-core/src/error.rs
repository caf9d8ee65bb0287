/// Every failure kind the client core, the codec or topic validation can
/// produce, grouped by the layer that raises it.
///
/// Error kinds are value-level: nothing here is exceptional. Most client API
/// calls return `Result<PacketId, Error>`; ack-timeout and an unmatched
/// SUBACK/UNSUBACK are deliberately *not* variants here even though both
/// conditions are named below, because both are surfaced as an `Event`,
/// never as a call failure (see `mqtt-client::event::Event`).
#[derive(Debug, thiserror::Error, PartialEq, Eq, Clone)]
pub enum Error {
    // -- input validation --
    #[error("a required value was null or empty")]
    NullValue,
    #[error("topic name or filter is malformed")]
    TopicFormat,
    #[error("invalid QoS for this operation")]
    PublishQoS,
    #[error("unexpected ack packet type for this request")]
    PublishAckType,

    // -- state --
    #[error("operation is not valid in the client's current state")]
    StateError,

    // -- resource --
    #[error("in-flight table is full")]
    PushToListFull,
    #[error("subscription table is full")]
    SubHandleFull,
    #[error("caller-provided buffer is too small")]
    BufferTooSmall,
    #[error("allocation failed")]
    AllocFail,

    // -- codec --
    #[error("failed to serialize CONNECT packet")]
    ConnectPacketError,
    #[error("failed to serialize PUBLISH packet")]
    PublishPacketError,
    #[error("failed to serialize SUBSCRIBE packet")]
    SubscribePacketError,
    #[error("failed to serialize UNSUBSCRIBE packet")]
    UnsubscribePacketError,
    #[error("failed to serialize ack packet")]
    AckPacketError,
    #[error("failed to parse CONNACK packet")]
    ConnackPacketError,
    #[error("failed to serialize PING packet")]
    PingPacketError,
    #[error("malformed or truncated packet on the wire")]
    ReadError,

    // -- network --
    #[error("transport read/write failed")]
    NetworkError,
    #[error("transport connect failed")]
    NetworkConnectError,
    #[error("TLS certificate verification failed")]
    CertVerifyFail,

    // -- protocol (CONNACK return codes) --
    #[error("broker rejected unacceptable protocol version")]
    ConnackUnacceptableProtocol,
    #[error("broker rejected client identifier")]
    ConnackIdentifierRejected,
    #[error("broker service unavailable")]
    ConnackServerUnavailable,
    #[error("broker rejected user name or password")]
    ConnackBadUserdata,
    #[error("broker rejected authorization")]
    ConnackNotAuthorized,
    #[error("broker returned an unrecognized CONNACK return code")]
    ConnackUnknown,
    #[error("broker returned SUBACK failure (0x80)")]
    SubscribeAckFailure,
    #[error("a SUBACK/UNSUBACK matched no tracked in-flight request")]
    SubInfoNotFound,

    // -- timeout (surfaced as events, listed here for completeness of the kind space) --
    #[error("subscribe request timed out waiting for SUBACK")]
    SubscribeTimeout,
    #[error("unsubscribe request timed out waiting for UNSUBACK")]
    UnsubscribeTimeout,
}

impl Error {
    /// Maps a CONNACK return code to the matching protocol error kind.
    pub fn from_connect_return_code(code: crate::ConnectReturnCode) -> Self {
        use crate::ConnectReturnCode::*;

        match code {
            ConnectionAccepted => unreachable!("accepted is not an error"),
            UnacceptableProtocolVersion => Error::ConnackUnacceptableProtocol,
            IdentifierRejected => Error::ConnackIdentifierRejected,
            ServiceUnavailable => Error::ConnackServerUnavailable,
            BadUserNameOrPassword => Error::ConnackBadUserdata,
            NotAuthorized => Error::ConnackNotAuthorized,
            Unknown(_) => Error::ConnackUnknown,
        }
    }
}
