//! The MQTT protocol works by exchanging a series of MQTT Control Packets in
//! a defined way.
//!
//! This crate implements the MQTT 3.1.1 wire format: [`Packet`], the
//! [`FixedHeader`] and remaining-length variable-byte integer, and the
//! `WriteTo`/`parse` pair that make up the Packet Codec contract.
//! `mqtt-client` depends only on this boundary, never on nom or bytes
//! directly.
#![warn(missing_docs)]

#[macro_use]
extern crate bitflags;

extern crate mqtt_core as mqtt;

mod decode;
mod encode;
mod packet;

pub use crate::decode::parse;
pub use crate::encode::WriteTo;
pub use crate::packet::*;
