//! Events surfaced to the owner's `EventHandler`, and the
//! dynamic-dispatch-via-variant realization of the original's function
//! pointer + opaque context.

use mqtt_core::PacketId;

/// An inbound application message delivered to a matching subscription
/// handler, or to the default handler if nothing matched.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    /// The concrete topic the broker published to.
    pub topic: String,
    /// The application payload.
    pub payload: Vec<u8>,
}

/// Every event kind the client can surface to an `EventHandler`.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// An inbound PUBLISH that matched no subscription-table entry.
    PublishReceived(Message),
    /// A QoS 1/2 publish the broker acknowledged.
    PublishSuccess(PacketId),
    /// A SUBSCRIBE the broker granted.
    SubscribeSuccess(PacketId),
    /// A SUBSCRIBE the broker refused (SUBACK return code 0x80).
    SubscribeNack(PacketId),
    /// A SUBSCRIBE that received no SUBACK within `2 * request_timeout`.
    SubscribeTimeout(PacketId),
    /// An UNSUBSCRIBE the broker acknowledged.
    UnsubscribeSuccess(PacketId),
    /// An UNSUBSCRIBE that received no UNSUBACK within `2 * request_timeout`.
    UnsubscribeTimeout(PacketId),
    /// A SUBACK/UNSUBACK matched no tracked request in the sub-inflight table.
    SubInfoNotFound(PacketId),
    /// The transport connection was lost.
    Disconnect,
    /// A reconnect attempt succeeded.
    Reconnect,
}

/// Callback invoked for every [`Event`], with no client lock held.
pub trait EventHandler {
    /// Handles one event.
    fn on_event(&mut self, event: Event);
}

impl<F> EventHandler for F
where
    F: FnMut(Event),
{
    fn on_event(&mut self, event: Event) {
        self(event)
    }
}
