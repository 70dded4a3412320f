//! Byte-level link to the simulator.
//!
//! The simulator exposes two sub-channels:
//!
//! * a **request/response** channel: one text request, one text reply, in
//!   strict alternation;
//! * a **command** channel: newline-terminated text commands with no reply.
//!
//! [`Transport`] is the seam the RPC client talks through.  [`TcpTransport`]
//! is the production implementation (one blocking TCP socket per channel);
//! [`SimTransport`][crate::sim_transport::SimTransport] is the in-process
//! double used by tests.

use std::io::{self, Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

use kinobridge_types::SimError;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::literal::{self, LiteralError};

/// Size of a single socket read.
const READ_CHUNK: usize = 16 * 1024;

/// Upper bound on one reply.
///
/// Replies longer than this are treated as a broken stream rather than
/// buffered without limit.
pub const MAX_REPLY_BYTES: usize = 64 * 1024 * 1024; // 64 MiB

/// Duplex link to the simulator.
pub trait Transport: Send {
    /// Send `payload` on the request/response channel and block until the
    /// complete reply has arrived.
    ///
    /// # Errors
    ///
    /// Returns [`SimError::TransportFailure`] when the channel is closed,
    /// times out, or delivers something that cannot be a reply.
    fn request(&mut self, payload: &str) -> Result<String, SimError>;

    /// Write `command` on the command channel.  No reply is read.
    ///
    /// # Errors
    ///
    /// Returns [`SimError::TransportFailure`] when the write fails.
    fn send_command(&mut self, command: &str) -> Result<(), SimError>;
}

/// How the end of a reply is recognised on the request channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Framing {
    /// No delimiter: keep reading until the bytes form one complete literal.
    /// A bare number split across reads can end early; compound replies
    /// cannot.
    #[default]
    Literal,
    /// Each reply ends with `\n`.
    Line,
}

/// Blocking TCP transport with one socket per sub-channel.
pub struct TcpTransport {
    request: TcpStream,
    command: TcpStream,
    framing: Framing,
}

impl TcpTransport {
    /// Connect both channels on `host`.
    ///
    /// `timeout` bounds connecting and every subsequent read and write;
    /// `None` blocks indefinitely.
    ///
    /// # Errors
    ///
    /// Returns [`SimError::TransportFailure`] if either socket cannot be
    /// opened or configured.
    pub fn connect(
        host: &str,
        request_port: u16,
        command_port: u16,
        timeout: Option<Duration>,
        framing: Framing,
    ) -> Result<Self, SimError> {
        let request = open_stream(host, request_port, timeout)?;
        let command = open_stream(host, command_port, timeout)?;
        debug!(host, request_port, command_port, ?framing, "simulator channels connected");
        Ok(Self::from_streams(request, command, framing))
    }

    /// Wrap two already-connected streams.
    pub fn from_streams(request: TcpStream, command: TcpStream, framing: Framing) -> Self {
        Self {
            request,
            command,
            framing,
        }
    }

    fn read_reply(&mut self) -> Result<String, SimError> {
        let mut reply = Vec::new();
        let mut chunk = [0u8; READ_CHUNK];
        let mut nesting = NestingScan::default();
        loop {
            let n = self
                .request
                .read(&mut chunk)
                .map_err(|e| io_failure("reading reply", &e))?;
            if n == 0 {
                return Err(SimError::TransportFailure(
                    "simulator closed the request channel".to_string(),
                ));
            }
            reply.extend_from_slice(&chunk[..n]);
            if reply.len() > MAX_REPLY_BYTES {
                return Err(SimError::TransportFailure(format!(
                    "reply exceeds the limit of {MAX_REPLY_BYTES} bytes"
                )));
            }

            match self.framing {
                Framing::Line => {
                    if let Some(end) = reply.iter().position(|&b| b == b'\n') {
                        reply.truncate(end);
                        break;
                    }
                }
                Framing::Literal => {
                    nesting.feed(&chunk[..n]);
                    if nesting.may_be_complete() && literal_settled(&reply)? {
                        break;
                    }
                }
            }
        }
        String::from_utf8(reply)
            .map_err(|e| SimError::TransportFailure(format!("reply is not valid UTF-8: {e}")))
    }
}

impl Transport for TcpTransport {
    fn request(&mut self, payload: &str) -> Result<String, SimError> {
        self.request
            .write_all(payload.as_bytes())
            .map_err(|e| io_failure("sending request", &e))?;
        self.read_reply()
    }

    fn send_command(&mut self, command: &str) -> Result<(), SimError> {
        self.command
            .write_all(command.as_bytes())
            .map_err(|e| io_failure("sending command", &e))
    }
}

/// `true` once `reply` holds a whole literal, or text that can never become
/// one.
fn literal_settled(reply: &[u8]) -> Result<bool, SimError> {
    match std::str::from_utf8(reply) {
        Ok(text) => Ok(literal::parse(text) != Err(LiteralError::Incomplete)),
        // A multi-byte character split across reads.
        Err(e) if e.error_len().is_none() => Ok(false),
        Err(e) => Err(SimError::TransportFailure(format!(
            "reply is not valid UTF-8: {e}"
        ))),
    }
}

/// Bracket nesting of the bytes received so far, tracked across reads so the
/// buffered reply is only parsed once its outermost sequence can have closed.
#[derive(Debug, Default)]
struct NestingScan {
    depth: usize,
    quote: Option<u8>,
    escaped: bool,
}

impl NestingScan {
    fn feed(&mut self, bytes: &[u8]) {
        for &b in bytes {
            match self.quote {
                Some(_) if self.escaped => self.escaped = false,
                Some(_) if b == b'\\' => self.escaped = true,
                Some(q) if b == q => self.quote = None,
                Some(_) => {}
                None => match b {
                    b'\'' | b'"' => self.quote = Some(b),
                    b'(' | b'[' => self.depth += 1,
                    b')' | b']' => self.depth = self.depth.saturating_sub(1),
                    _ => {}
                },
            }
        }
    }

    /// Also `true` past [`literal::MAX_DEPTH`], where the parser rejects the
    /// reply without needing its end.
    fn may_be_complete(&self) -> bool {
        (self.depth == 0 && self.quote.is_none()) || self.depth > literal::MAX_DEPTH
    }
}

fn open_stream(host: &str, port: u16, timeout: Option<Duration>) -> Result<TcpStream, SimError> {
    let addr = (host, port)
        .to_socket_addrs()
        .map_err(|e| io_failure("resolving simulator address", &e))?
        .next()
        .ok_or_else(|| {
            SimError::TransportFailure(format!("'{host}:{port}' resolved to no address"))
        })?;
    let stream = match timeout {
        Some(t) => TcpStream::connect_timeout(&addr, t),
        None => TcpStream::connect(addr),
    }
    .map_err(|e| io_failure(&format!("connecting to {addr}"), &e))?;

    stream
        .set_read_timeout(timeout)
        .and_then(|_| stream.set_write_timeout(timeout))
        .and_then(|_| stream.set_nodelay(true))
        .map_err(|e| io_failure("configuring socket", &e))?;
    Ok(stream)
}

fn io_failure(context: &str, err: &io::Error) -> SimError {
    let detail = match err.kind() {
        io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut => "timed out".to_string(),
        _ => err.to_string(),
    };
    SimError::TransportFailure(format!("{context}: {detail}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::BufRead;
    use std::net::TcpListener;
    use std::thread;

    /// Start a one-shot fake simulator; returns the transport connected to it
    /// and the server thread.
    fn serve<F>(framing: Framing, server: F) -> (TcpTransport, thread::JoinHandle<()>)
    where
        F: FnOnce(TcpStream, TcpStream) + Send + 'static,
    {
        let request_listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let command_listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let request_port = request_listener.local_addr().unwrap().port();
        let command_port = command_listener.local_addr().unwrap().port();

        let handle = thread::spawn(move || {
            let (req, _) = request_listener.accept().unwrap();
            let (cmd, _) = command_listener.accept().unwrap();
            server(req, cmd);
        });

        let transport = TcpTransport::connect(
            "127.0.0.1",
            request_port,
            command_port,
            Some(Duration::from_secs(5)),
            framing,
        )
        .unwrap();
        (transport, handle)
    }

    #[test]
    fn literal_framing_reassembles_split_reply() {
        let (mut transport, handle) = serve(Framing::Literal, |mut req, _cmd| {
            let mut buf = [0u8; 64];
            let n = req.read(&mut buf).unwrap();
            assert_eq!(&buf[..n], b"extractState()");
            req.write_all(b"[((1.0, 2.0").unwrap();
            req.flush().unwrap();
            thread::sleep(Duration::from_millis(50));
            req.write_all(b", 3.0),)]").unwrap();
        });

        let reply = transport.request("extractState()").unwrap();
        assert_eq!(reply, "[((1.0, 2.0, 3.0),)]");
        handle.join().unwrap();
    }

    #[test]
    fn line_framing_stops_at_newline() {
        let (mut transport, handle) = serve(Framing::Line, |mut req, _cmd| {
            let mut buf = [0u8; 64];
            let _ = req.read(&mut buf).unwrap();
            req.write_all(b"None\n").unwrap();
        });

        assert_eq!(transport.request("nextTick()").unwrap(), "None");
        handle.join().unwrap();
    }

    #[test]
    fn commands_arrive_on_command_channel() {
        let (mut transport, handle) = serve(Framing::Literal, |_req, cmd| {
            let mut line = String::new();
            io::BufReader::new(cmd).read_line(&mut line).unwrap();
            assert_eq!(line, "id simulation reset_objects\n");
        });

        transport
            .send_command("id simulation reset_objects\n")
            .unwrap();
        handle.join().unwrap();
    }

    /// Replies with `reply`, then holds the channel open until the client
    /// hangs up.
    fn reply_and_hold(reply: Vec<u8>) -> impl FnOnce(TcpStream, TcpStream) + Send + 'static {
        move |mut req, _cmd| {
            let mut buf = [0u8; 64];
            let _ = req.read(&mut buf).unwrap();
            req.write_all(&reply).unwrap();
            while req.read(&mut buf).map(|n| n > 0).unwrap_or(false) {}
        }
    }

    #[test]
    fn unknown_word_reply_returns_without_waiting() {
        let (mut transport, handle) = serve(Framing::Literal, reply_and_hold(b"error".to_vec()));
        assert_eq!(transport.request("extractState()").unwrap(), "error");
        drop(transport);
        handle.join().unwrap();
    }

    #[test]
    fn runaway_nesting_returns_without_waiting() {
        let (mut transport, handle) =
            serve(Framing::Literal, reply_and_hold(vec![b'['; 10_000]));
        let reply = transport.request("extractState()").unwrap();
        assert!(reply.len() > literal::MAX_DEPTH);
        drop(transport);
        handle.join().unwrap();
    }

    #[test]
    fn nesting_scan_ignores_brackets_in_strings() {
        let mut scan = NestingScan::default();
        scan.feed(b"[('a)', \"b]\\\"\"");
        assert!(!scan.may_be_complete());
        scan.feed(b")");
        assert!(!scan.may_be_complete());
        scan.feed(b"]");
        assert!(scan.may_be_complete());

        let mut scan = NestingScan::default();
        scan.feed(b"1.5");
        assert!(scan.may_be_complete());
        scan.feed(b" 'open");
        assert!(!scan.may_be_complete());
    }

    #[test]
    fn closed_channel_is_transport_failure() {
        let (mut transport, handle) = serve(Framing::Literal, |req, _cmd| {
            drop(req);
        });
        handle.join().unwrap();

        let result = transport.request("extractState()");
        assert!(matches!(result, Err(SimError::TransportFailure(_))));
    }
}
