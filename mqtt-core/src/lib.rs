//! Shared vocabulary for the MQTT 3.1.1 constrained client: protocol-level
//! value types, the unified error enum and topic-filter matching.
//!
//! Neither the wire codec (`mqtt-packet`) nor the client core (`mqtt-client`)
//! own these types outright; both depend on this crate so that a `QoS` or an
//! `Error::TopicFormat` means the same thing on either side of the codec
//! boundary.

mod error;
mod proto;
pub mod topic;

pub use crate::error::Error;
pub use crate::proto::{ConnectReturnCode, PacketId, ProtocolVersion, QoS};

pub type Result<T> = core::result::Result<T, Error>;
