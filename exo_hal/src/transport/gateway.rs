//! TCP connection to a fieldbus gateway process.
//!
//! One command line out, one reply line back. The socket read timeout bounds
//! every round trip. A timed-out socket may still receive the late reply, so
//! it is dropped and the next command reconnects.

use std::io::{BufRead, BufReader, ErrorKind, Write};
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::time::{Duration, Instant};

use exo_common::drive::DriveError;
use tracing::{debug, info, warn};

use super::Transport;

struct Connection {
    reader: BufReader<TcpStream>,
    writer: TcpStream,
}

impl Connection {
    fn open(target: &SocketAddr, timeout: Duration) -> Result<Self, DriveError> {
        let stream = TcpStream::connect_timeout(target, timeout)
            .map_err(|e| DriveError::Transport(format!("connect {target}: {e}")))?;
        stream
            .set_read_timeout(Some(timeout))
            .and_then(|()| stream.set_write_timeout(Some(timeout)))
            .and_then(|()| stream.set_nodelay(true))
            .map_err(|e| DriveError::Transport(e.to_string()))?;
        let writer = stream
            .try_clone()
            .map_err(|e| DriveError::Transport(e.to_string()))?;
        Ok(Self {
            reader: BufReader::new(stream),
            writer,
        })
    }

    fn round_trip(&mut self, line: &str) -> Result<String, DriveError> {
        self.writer
            .write_all(line.as_bytes())
            .and_then(|()| self.writer.write_all(b"\n"))
            .map_err(|e| match e.kind() {
                ErrorKind::WouldBlock | ErrorKind::TimedOut => DriveError::Timeout(line.to_string()),
                _ => DriveError::Transport(e.to_string()),
            })?;

        let mut reply = String::new();
        match self.reader.read_line(&mut reply) {
            Ok(0) => Err(DriveError::Transport("gateway closed connection".into())),
            Ok(_) => Ok(reply.trim_end().to_string()),
            Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {
                Err(DriveError::Timeout(line.to_string()))
            }
            Err(e) => Err(DriveError::Transport(e.to_string())),
        }
    }
}

/// The `[..]` prefix of a command or reply line.
fn tag(line: &str) -> Option<&str> {
    let end = line.find(']')?;
    line.starts_with('[').then(|| &line[..=end])
}

pub struct GatewayTransport {
    target: SocketAddr,
    timeout: Duration,
    connection: Option<Connection>,
    last_round_trip: Duration,
}

impl GatewayTransport {
    /// Connect to `address` (`host:port`).
    ///
    /// # Errors
    /// `DriveError::Transport` if the address does not resolve or the connection fails.
    pub fn connect(address: &str, timeout: Duration) -> Result<Self, DriveError> {
        let target = address
            .to_socket_addrs()
            .map_err(|e| DriveError::Transport(format!("resolve {address}: {e}")))?
            .next()
            .ok_or_else(|| DriveError::Transport(format!("no address for {address}")))?;

        let connection = Connection::open(&target, timeout)?;
        info!(%target, timeout_ms = timeout.as_millis() as u64, "Connected to fieldbus gateway");
        Ok(Self {
            target,
            timeout,
            connection: Some(connection),
            last_round_trip: Duration::ZERO,
        })
    }

    /// Duration of the most recent command round trip.
    pub fn last_round_trip(&self) -> Duration {
        self.last_round_trip
    }

    fn connection(&mut self) -> Result<&mut Connection, DriveError> {
        if self.connection.is_none() {
            debug!(target = %self.target, "Reconnecting to fieldbus gateway");
            self.connection = Some(Connection::open(&self.target, self.timeout)?);
        }
        self.connection
            .as_mut()
            .ok_or_else(|| DriveError::Transport("gateway not connected".into()))
    }
}

impl Transport for GatewayTransport {
    fn name(&self) -> &'static str {
        "gateway"
    }

    fn send(&mut self, line: &str) -> Result<String, DriveError> {
        let start = Instant::now();
        let result = self.connection()?.round_trip(line);
        let reply = match result {
            Ok(reply) => reply,
            Err(e) => {
                // Anything still in flight belongs to this command.
                self.connection = None;
                return Err(e);
            }
        };

        if tag(&reply) != tag(line) {
            warn!(command = line, reply = %reply, "Gateway reply out of sequence");
            self.connection = None;
            return Err(DriveError::Transport(format!(
                "reply '{reply}' does not answer '{line}'"
            )));
        }

        self.last_round_trip = start.elapsed();
        debug!(
            rtt_us = self.last_round_trip.as_micros() as u64,
            reply = %reply,
            "Gateway reply"
        );
        Ok(reply)
    }
}
