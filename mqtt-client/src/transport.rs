//! The `Transport` external contract: byte-oriented blocking
//! read/write with a per-call deadline, plus the `TcpTransport` and
//! in-memory implementations.

use std::io::{self, Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::time::{Duration, Instant};

use mqtt_core::Error;

/// Byte-oriented transport with a deadline on every blocking call.
///
/// A `read` returning `Ok(0)` before `deadline` elapses means "no data yet",
/// not end-of-stream; callers use the deadline, not the return value, to
/// decide whether they have timed out.
pub trait Transport {
    /// Establishes the underlying connection.
    fn connect(&mut self) -> Result<(), Error>;

    /// Tears down the underlying connection. Idempotent.
    fn disconnect(&mut self);

    /// Reads into `buf`, blocking at most until `deadline`.
    fn read(&mut self, buf: &mut [u8], deadline: Instant) -> Result<usize, Error>;

    /// Writes from `buf`, blocking at most until `deadline`. The core retries
    /// short writes until `buf` is fully sent or `deadline` expires.
    fn write(&mut self, buf: &[u8], deadline: Instant) -> Result<usize, Error>;
}

/// A blocking `std::net::TcpStream`-backed transport.
///
/// TLS is out of scope; `pub_key` in [`crate::config::ClientConfig`] is accepted but
/// unused by this implementation, matching `mqtt-sync-client/src/connect.rs`'s
/// plain-TCP `TcpStream` usage.
pub struct TcpTransport {
    host: String,
    port: u16,
    stream: Option<TcpStream>,
}

impl TcpTransport {
    /// Creates a transport targeting `host:port`. Does not connect yet.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        TcpTransport {
            host: host.into(),
            port,
            stream: None,
        }
    }

    fn stream_mut(&mut self) -> Result<&mut TcpStream, Error> {
        self.stream.as_mut().ok_or(Error::NetworkError)
    }
}

fn remaining(deadline: Instant) -> Duration {
    deadline.saturating_duration_since(Instant::now())
}

impl Transport for TcpTransport {
    fn connect(&mut self) -> Result<(), Error> {
        let addrs = (self.host.as_str(), self.port)
            .to_socket_addrs()
            .map_err(|_| Error::NetworkConnectError)?;

        for addr in addrs {
            if let Ok(stream) = TcpStream::connect(addr) {
                stream.set_nodelay(true).ok();
                self.stream = Some(stream);
                return Ok(());
            }
        }

        Err(Error::NetworkConnectError)
    }

    fn disconnect(&mut self) {
        self.stream = None;
    }

    fn read(&mut self, buf: &mut [u8], deadline: Instant) -> Result<usize, Error> {
        let timeout = remaining(deadline);
        let stream = self.stream_mut()?;
        stream
            .set_read_timeout(if timeout.is_zero() { None } else { Some(timeout) })
            .map_err(|_| Error::NetworkError)?;

        match stream.read(buf) {
            Ok(n) => Ok(n),
            Err(e) if matches_timeout(&e) => Ok(0),
            Err(_) => Err(Error::NetworkError),
        }
    }

    fn write(&mut self, buf: &[u8], deadline: Instant) -> Result<usize, Error> {
        let timeout = remaining(deadline);
        let stream = self.stream_mut()?;
        stream
            .set_write_timeout(if timeout.is_zero() { None } else { Some(timeout) })
            .map_err(|_| Error::NetworkError)?;

        let mut written = 0;
        while written < buf.len() {
            if Instant::now() >= deadline {
                break;
            }
            match stream.write(&buf[written..]) {
                Ok(0) => break,
                Ok(n) => written += n,
                Err(e) if matches_timeout(&e) => break,
                Err(_) => return Err(Error::NetworkError),
            }
        }

        Ok(written)
    }
}

fn matches_timeout(e: &io::Error) -> bool {
    matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut)
}

/// An in-memory loopback transport for driving client scenarios in tests
/// without a real socket: writes append to `outbound`, and the test harness
/// feeds bytes into `inbound` for subsequent reads to drain.
#[cfg(any(test, feature = "test-support"))]
pub mod testing {
    use super::*;
    use std::collections::VecDeque;

    /// Scriptable in-memory [`Transport`]: the test harness pushes broker
    /// bytes onto `inbound` and inspects `outbound` for what the client wrote.
    #[derive(Default)]
    pub struct LoopbackTransport {
        pub inbound: VecDeque<u8>,
        pub outbound: Vec<u8>,
        pub connected: bool,
        pub fail_connect: bool,
    }

    impl LoopbackTransport {
        pub fn new() -> Self {
            Self::default()
        }

        /// Queues bytes for the next `read` calls to drain.
        pub fn push_inbound(&mut self, bytes: &[u8]) {
            self.inbound.extend(bytes.iter().copied());
        }
    }

    impl Transport for LoopbackTransport {
        fn connect(&mut self) -> Result<(), Error> {
            if self.fail_connect {
                Err(Error::NetworkConnectError)
            } else {
                self.connected = true;
                Ok(())
            }
        }

        fn disconnect(&mut self) {
            self.connected = false;
        }

        fn read(&mut self, buf: &mut [u8], _deadline: Instant) -> Result<usize, Error> {
            if !self.connected {
                return Err(Error::NetworkError);
            }

            let mut n = 0;
            while n < buf.len() {
                match self.inbound.pop_front() {
                    Some(b) => {
                        buf[n] = b;
                        n += 1;
                    }
                    None => break,
                }
            }
            Ok(n)
        }

        fn write(&mut self, buf: &[u8], _deadline: Instant) -> Result<usize, Error> {
            if !self.connected {
                return Err(Error::NetworkError);
            }
            self.outbound.extend_from_slice(buf);
            Ok(buf.len())
        }
    }
}
