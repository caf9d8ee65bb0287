//! Packet I/O: serializing a [`Packet`] into the send
//! buffer and writing it out, and reading exactly one packet's raw bytes
//! into the read buffer, both against a [`Transport`] deadline. Grounded on
//! `mqtt-sync-client/src/io.rs`'s `Sender` impl (hex-dump trace of every
//! write via `hexplay`), adapted to the deadline-based `Transport` contract
//! instead of a plain blocking `io::Write`.

use std::time::Instant;

use hexplay::HexViewBuilder;
use log::trace;

use mqtt_core::Error;
use mqtt_packet::{Packet, WriteTo};

use crate::transport::Transport;

/// Default capacity of the send/read byte slabs.
pub const DEFAULT_BUFFER_SIZE: usize = 1024;

/// What [`PacketIo::read_packet`] observed.
pub enum ReadOutcome {
    /// No header byte arrived before the deadline; not an error.
    Timeout,
    /// A full packet's raw bytes are in `PacketIo::read_buf()[..len]`.
    Ready(usize),
    /// The packet would not fit in the read buffer; its body was drained and
    /// discarded, no packet is propagated.
    Overflow,
}

/// Owns the send/read byte slabs and drives a [`Transport`] to fill or drain
/// them one packet at a time.
pub struct PacketIo<T> {
    transport: T,
    send_buf: Vec<u8>,
    read_buf: Vec<u8>,
    read_buf_capacity: usize,
}

impl<T: Transport> PacketIo<T> {
    pub fn new(transport: T, buffer_capacity: usize) -> Self {
        PacketIo {
            transport,
            send_buf: Vec::with_capacity(buffer_capacity),
            read_buf: Vec::with_capacity(buffer_capacity),
            read_buf_capacity: buffer_capacity,
        }
    }

    pub fn transport(&mut self) -> &mut T {
        &mut self.transport
    }

    /// The raw bytes of the most recently completed `read_packet`.
    pub fn read_buf(&self) -> &[u8] {
        &self.read_buf
    }

    /// Serializes `packet` into the send buffer and writes it in full before
    /// `deadline`, retrying short writes. A partial send still outstanding at
    /// the deadline is `Error::NetworkError`.
    pub fn write_packet(&mut self, packet: &Packet<'_>, deadline: Instant) -> Result<(), Error> {
        self.send_buf.clear();
        packet.write_to(&mut self.send_buf);
        let written = self.send_buf.len();

        self.flush_send_buf(deadline)?;

        trace!("wrote {:?} packet as {} bytes", packet, written);

        Ok(())
    }

    /// Writes raw, already-serialized bytes in full before `deadline`. Used
    /// for the initial send and every republish of a pub-inflight entry, so a
    /// PUBLISH is serialized exactly once and the same bytes are replayed
    /// verbatim on timeout.
    pub fn write_raw(&mut self, bytes: &[u8], deadline: Instant) -> Result<(), Error> {
        self.send_buf.clear();
        self.send_buf.extend_from_slice(bytes);

        self.flush_send_buf(deadline)?;

        trace!(
            "wrote {} raw bytes:\n{}",
            bytes.len(),
            HexViewBuilder::new(bytes).finish()
        );

        Ok(())
    }

    fn flush_send_buf(&mut self, deadline: Instant) -> Result<(), Error> {
        let mut written = 0;
        while written < self.send_buf.len() {
            let n = self.transport.write(&self.send_buf[written..], deadline)?;
            if n == 0 && Instant::now() >= deadline {
                return Err(Error::NetworkError);
            }
            written += n;
        }
        Ok(())
    }

    /// Reads exactly one packet's raw bytes (fixed header + remaining body)
    /// into the read buffer.
    pub fn read_packet(&mut self, deadline: Instant) -> Result<ReadOutcome, Error> {
        let mut header_byte = [0u8; 1];
        if fill(&mut self.transport, &mut header_byte, deadline)? == 0 {
            return Ok(ReadOutcome::Timeout);
        }

        let mut varint_bytes = Vec::with_capacity(4);
        let mut remaining_length: usize = 0;
        let mut multiplier: usize = 1;
        loop {
            let mut b = [0u8; 1];
            if fill(&mut self.transport, &mut b, deadline)? == 0 {
                return Err(Error::NetworkError);
            }
            varint_bytes.push(b[0]);
            remaining_length += usize::from(b[0] & 0x7F) * multiplier;

            if b[0] & 0x80 == 0 {
                break;
            }
            if varint_bytes.len() == 4 {
                return Err(Error::ReadError);
            }
            multiplier *= 128;
        }

        let total_len = 1 + varint_bytes.len() + remaining_length;
        if total_len > self.read_buf_capacity {
            self.drain(remaining_length, deadline)?;
            return Ok(ReadOutcome::Overflow);
        }

        self.read_buf.clear();
        self.read_buf.push(header_byte[0]);
        self.read_buf.extend_from_slice(&varint_bytes);
        self.read_buf.resize(total_len, 0);
        let body_start = 1 + varint_bytes.len();
        if fill(&mut self.transport, &mut self.read_buf[body_start..], deadline)? != remaining_length
        {
            return Err(Error::NetworkError);
        }

        trace!(
            "read {} bytes:\n{}",
            total_len,
            HexViewBuilder::new(&self.read_buf).finish()
        );

        Ok(ReadOutcome::Ready(total_len))
    }

    fn drain(&mut self, mut remaining: usize, deadline: Instant) -> Result<(), Error> {
        let mut scratch = [0u8; 256];
        while remaining > 0 {
            let n = remaining.min(scratch.len());
            let read = fill(&mut self.transport, &mut scratch[..n], deadline)?;
            if read == 0 {
                return Err(Error::NetworkError);
            }
            remaining -= read;
        }
        Ok(())
    }
}

/// Fills `buf` completely, retrying `Transport::read` until it is full or
/// `deadline` passes, returning however many bytes were actually filled.
fn fill<T: Transport>(transport: &mut T, buf: &mut [u8], deadline: Instant) -> Result<usize, Error> {
    let mut filled = 0;
    while filled < buf.len() && Instant::now() < deadline {
        let n = transport.read(&mut buf[filled..], deadline)?;
        filled += n;
        if n == 0 && Instant::now() >= deadline {
            break;
        }
    }
    Ok(filled)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::testing::LoopbackTransport;
    use mqtt_packet::parse;
    use std::time::Duration;

    fn deadline() -> Instant {
        Instant::now() + Duration::from_millis(200)
    }

    #[test]
    fn read_packet_times_out_when_nothing_arrives() {
        let mut transport = LoopbackTransport::new();
        transport.connect().unwrap();
        let mut io = PacketIo::new(transport, DEFAULT_BUFFER_SIZE);

        match io.read_packet(deadline()).unwrap() {
            ReadOutcome::Timeout => {}
            _ => panic!("expected timeout"),
        }
    }

    #[test]
    fn write_then_read_round_trips_a_ping() {
        let mut transport = LoopbackTransport::new();
        transport.connect().unwrap();
        let mut io = PacketIo::new(transport, DEFAULT_BUFFER_SIZE);

        io.write_packet(&Packet::Ping, deadline()).unwrap();
        let written = io.transport().outbound.clone();
        io.transport().push_inbound(&written);

        match io.read_packet(deadline()).unwrap() {
            ReadOutcome::Ready(len) => {
                let (packet, consumed) = parse(&io.read_buf()[..len]).unwrap();
                assert_eq!(consumed, len);
                assert_eq!(packet, Packet::Ping);
            }
            _ => panic!("expected a packet"),
        }
    }

    #[test]
    fn oversized_packet_is_drained_and_reported_as_overflow() {
        let mut transport = LoopbackTransport::new();
        transport.connect().unwrap();
        let mut io = PacketIo::new(transport, 8);

        let packet = Packet::Publish(mqtt_packet::Publish {
            dup: false,
            qos: mqtt_core::QoS::AtMostOnce,
            retain: false,
            topic: "/a/b/c/d/e",
            packet_id: None,
            payload: b"hello world, this payload is long",
        });
        let mut raw = Vec::new();
        packet.write_to(&mut raw);
        io.transport().push_inbound(&raw);

        match io.read_packet(deadline()).unwrap() {
            ReadOutcome::Overflow => {}
            _ => panic!("expected overflow"),
        }
    }
}
