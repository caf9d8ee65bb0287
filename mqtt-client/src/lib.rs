//! A single-session MQTT 3.1.1 client core: one broker connection, serviced
//! entirely by the owner's thread through `publish`/`subscribe`/
//! `unsubscribe` and repeated calls to `yield_now`. There is no background
//! thread, no connection pool and no broker-side behavior here — see
//! `mqtt-core` for the shared vocabulary and `mqtt-packet` for the wire
//! codec this crate builds on.

#[macro_use]
extern crate log;

pub extern crate mqtt_core as mqtt;
pub extern crate mqtt_packet as packet;

pub mod auth;
pub mod client;
pub mod config;
pub mod event;
pub mod inflight;
pub mod io;
pub mod keepalive;
pub mod subscription;
pub mod transport;

pub use crate::auth::{Authenticator, NoopAuthenticator};
pub use crate::client::{Client, ClientState};
pub use crate::config::{ClientConfig, TlsTrust};
pub use crate::event::{Event, EventHandler, Message};
pub use crate::subscription::{Callback, TopicBinding};
pub use crate::transport::{TcpTransport, Transport};
