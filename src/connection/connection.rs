use std::io::{self, BufReader};
use std::net::{TcpStream, ToSocketAddrs};
use std::sync::Mutex;
use std::time::Duration;

use crate::config::{Config, Limits};
use crate::connection::ConnectionState;
use crate::connection::transport::{MaybeTlsStream, Transport, WriteHalf};
use crate::error::{Error, Result};
use crate::message::{CloseCode, CloseFrame, Incoming, Message};
use crate::protocol::mask::random_mask;
use crate::protocol::{ClientHandshake, Decoded, Frame, OpCode};
use crate::sync::lock;
use crate::uri::{ConnectionTarget, Scheme};

/// A client WebSocket connection over a blocking transport.
///
/// `Connection` handles frame encoding, masking, automatic Pong replies and
/// the close handshake. Messages are single frames: fragmented messages are
/// rejected as protocol violations.
///
/// The transport is split on creation. The read half is only touched by
/// [`recv`](Connection::recv); the write half is shared by `send`, `ping`,
/// `pong`, `close` and the Pong replies `recv` emits. Both live behind their
/// own locks, so a blocked `recv` never delays a `send`.
///
/// ## Type Parameters
///
/// - `T`: The transport (e.g. `TcpStream`, [`MaybeTlsStream`])
pub struct Connection<T: Transport = MaybeTlsStream> {
    reader: Mutex<BufReader<T::Reader>>,
    writer: Mutex<Option<T::Writer>>,
    state: Mutex<ConnectionState>,
    last_error: Mutex<Option<String>>,
    target: ConnectionTarget,
    limits: Limits,
    stall: Duration,
}

impl<T: Transport> std::fmt::Debug for Connection<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("target", &self.target)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl<T: Transport> Connection<T> {
    /// Perform the upgrade handshake over an already connected transport.
    ///
    /// Reads of the response are bounded by whatever timeout the transport
    /// carries. On failure the transport is torn down.
    ///
    /// ## Errors
    ///
    /// - `Error::InvalidHeaderValue` if a configured header cannot be sent
    /// - `Error::HandshakeFailed` if the server does not answer `101`
    /// - `Error::HandshakeTooLarge` if the response exceeds the limit
    /// - I/O errors from the transport
    pub fn handshake(transport: T, target: ConnectionTarget, config: &Config) -> Result<Self> {
        let (reader, writer) = transport.split()?;
        let conn = Self::from_halves(reader, writer, target, config);
        conn.upgrade(config)?;
        Ok(conn)
    }

    /// A connection in `Connecting` state, before any byte has been written.
    fn from_halves(reader: T::Reader, writer: T::Writer, target: ConnectionTarget, config: &Config) -> Self {
        Self {
            reader: Mutex::new(BufReader::new(reader)),
            writer: Mutex::new(Some(writer)),
            state: Mutex::new(ConnectionState::Connecting),
            last_error: Mutex::new(None),
            target,
            limits: config.limits.clone(),
            stall: config.timeouts.stall,
        }
    }

    /// Send the upgrade request and judge the response, moving to `Open`.
    fn upgrade(&self, config: &Config) -> Result<()> {
        let outcome = {
            let mut reader = lock(&self.reader);
            let mut writer = lock(&self.writer);
            match writer.as_mut() {
                Some(w) => ClientHandshake::new(&self.target, config.origin.as_deref(), &config.headers)
                    .and_then(|hs| hs.perform(&mut *reader, w, config.limits.max_handshake_size)),
                None => Err(Error::NotConnected),
            }
        };
        let outcome = match outcome {
            Ok(outcome) => outcome,
            Err(e) => {
                log::debug!("handshake with {} failed: {e}", self.target);
                self.record(&e);
                self.shutdown(None);
                return Err(e);
            }
        };

        if !outcome.accept_matches {
            log::warn!(
                "{}: Sec-WebSocket-Accept mismatch (got {:?}), continuing",
                self.target,
                outcome.accept
            );
        }
        log::debug!("connected to {}: {}", self.target, outcome.status_line);
        self.set_state(ConnectionState::Open);
        Ok(())
    }

    /// The endpoint this connection was opened to.
    pub fn target(&self) -> &ConnectionTarget {
        &self.target
    }

    /// Get the current connection state.
    pub fn state(&self) -> ConnectionState {
        *lock(&self.state)
    }

    /// Returns `true` while frames may be sent.
    pub fn is_connected(&self) -> bool {
        self.state().can_send()
    }

    /// Description of the most recent failure, if any.
    pub fn last_error(&self) -> Option<String> {
        lock(&self.last_error).clone()
    }

    /// Send a text or binary message as a single frame.
    ///
    /// ## Errors
    ///
    /// - `Error::NotConnected` before the upgrade has completed
    /// - `Error::ConnectionClosed` once the connection is closing or closed
    /// - I/O errors from the transport; the connection is then closed
    ///
    /// Every failure is also recorded as the last error.
    pub fn send(&self, message: impl Into<Message>) -> Result<()> {
        let frame = match message.into() {
            Message::Text(text) => Frame::text(text.into_bytes()),
            Message::Binary(data) => Frame::binary(data),
        };
        self.write_frame(&frame)
    }

    /// Send a Ping. Payloads over 125 bytes are truncated.
    ///
    /// ## Errors
    ///
    /// Same as [`send`](Connection::send).
    pub fn ping(&self, payload: impl Into<Vec<u8>>) -> Result<()> {
        self.write_frame(&Frame::ping(payload))
    }

    /// Send an unsolicited Pong. Payloads over 125 bytes are truncated.
    ///
    /// ## Errors
    ///
    /// Same as [`send`](Connection::send).
    pub fn pong(&self, payload: impl Into<Vec<u8>>) -> Result<()> {
        self.write_frame(&Frame::pong(payload))
    }

    /// Receive the next inbound event.
    ///
    /// Pings are answered automatically and never returned. A Close from the
    /// peer is echoed back, the transport is torn down and
    /// `Incoming::Closed` is returned; every later call returns
    /// `Incoming::Closed(None)`.
    ///
    /// A frame larger than `max_frame_size` closes the connection with
    /// status 1009 and is reported as `Incoming::Closed` with that status.
    ///
    /// ## Errors
    ///
    /// - `Error::NotConnected` before the upgrade has completed
    /// - `Error::ProtocolViolation` for continuation or fragmented frames,
    ///   malformed control frames or close payloads
    /// - `Error::ReservedOpcode` / `Error::InvalidOpcode` / `Error::ReservedBitsSet`
    /// - `Error::InvalidUtf8` for a text frame that is not UTF-8
    /// - I/O errors other than the read timeout
    ///
    /// Any error closes the connection before it is returned.
    pub fn recv(&self) -> Result<Incoming> {
        match self.state() {
            ConnectionState::Connecting => return Err(Error::NotConnected),
            state if !state.is_active() => return Ok(Incoming::Closed(None)),
            _ => {}
        }

        let mut reader = lock(&self.reader);
        loop {
            let frame = match Frame::read_from(&mut *reader, self.limits.max_frame_size, self.stall)
            {
                Ok(Decoded::NoData) => return Ok(Incoming::NoData),
                Ok(Decoded::Frame(frame)) => frame,
                Err(Error::ConnectionClosed(_)) => {
                    if self.state().is_active() {
                        log::debug!("{}: stream ended without a close frame", self.target);
                        self.shutdown(None);
                    }
                    return Ok(Incoming::Closed(None));
                }
                Err(e @ Error::FrameTooLarge { .. }) => {
                    log::warn!("{}: {e}", self.target);
                    self.record(&e);
                    let status = CloseFrame::new(CloseCode::MessageTooBig, "frame too large");
                    self.shutdown(Some(Frame::close(
                        Some(status.code.as_u16()),
                        &status.reason,
                    )));
                    return Ok(Incoming::Closed(Some(status)));
                }
                Err(e) => return Err(self.abort(e)),
            };

            if let Err(e) = frame.validate() {
                return Err(self.abort(e));
            }

            match frame.opcode {
                OpCode::Continuation => {
                    return Err(self.abort(Error::ProtocolViolation(
                        "continuation frames are not supported".into(),
                    )));
                }
                OpCode::Text | OpCode::Binary if !frame.fin => {
                    return Err(self.abort(Error::ProtocolViolation(
                        "fragmented messages are not supported".into(),
                    )));
                }
                OpCode::Text => {
                    return match String::from_utf8(frame.into_payload()) {
                        Ok(text) => Ok(Incoming::Message(Message::Text(text))),
                        Err(_) => Err(self.abort(Error::InvalidUtf8)),
                    };
                }
                OpCode::Binary => {
                    return Ok(Incoming::Message(Message::Binary(frame.into_payload())));
                }
                OpCode::Ping => {
                    log::trace!("{}: ping of {} bytes, replying", self.target, frame.payload().len());
                    self.write_frame(&Frame::pong(frame.into_payload()))?;
                }
                OpCode::Pong => return Ok(Incoming::Pong),
                OpCode::Close => {
                    let status = match CloseFrame::from_payload(frame.payload()) {
                        Ok(status) => status,
                        Err(e) => return Err(self.abort(e)),
                    };
                    log::debug!("{}: peer closed with {:?}", self.target, status);
                    // Echo the peer's status back.
                    let echo = match &status {
                        Some(s) if !s.code.is_reserved() => Frame::close(Some(s.code.as_u16()), ""),
                        _ => Frame::close(None, ""),
                    };
                    self.shutdown(Some(echo));
                    return Ok(Incoming::Closed(status));
                }
            }
        }
    }

    /// Close the connection.
    ///
    /// Sends a Close frame with `code` and `reason` (best-effort), then tears
    /// the transport down, which also wakes a thread blocked in `recv`.
    /// Reserved codes (1004-1006, 1015) are sent as a Close without status.
    /// Calling this again, or after the peer closed, does nothing.
    pub fn close(&self, code: CloseCode, reason: &str) {
        {
            let mut state = lock(&self.state);
            if matches!(*state, ConnectionState::Closing | ConnectionState::Closed) {
                return;
            }
            *state = ConnectionState::Closing;
        }
        log::debug!("{}: closing with {}", self.target, code.as_u16());

        let code = (!code.is_reserved()).then(|| code.as_u16());
        self.shutdown(Some(Frame::close(code, reason)));
    }

    fn write_frame(&self, frame: &Frame) -> Result<()> {
        let result = self.try_write_frame(frame);
        if let Err(ref e) = result {
            self.record(e);
        }
        result
    }

    fn try_write_frame(&self, frame: &Frame) -> Result<()> {
        match self.state() {
            ConnectionState::Open => {}
            ConnectionState::Connecting => return Err(Error::NotConnected),
            _ => return Err(Error::ConnectionClosed(None)),
        }

        let mut writer = lock(&self.writer);
        let Some(w) = writer.as_mut() else {
            return Err(Error::ConnectionClosed(None));
        };

        let result = random_mask().and_then(|mask| frame.write_to(w, Some(mask)));
        if let Err(ref e) = result {
            log::debug!("{}: write failed, closing: {e}", self.target);
            if let Some(mut w) = writer.take() {
                let _ = w.teardown();
            }
            self.set_state(ConnectionState::Closed);
        }
        result
    }

    /// Record `err`, close with the matching status and hand `err` back.
    fn abort(&self, err: Error) -> Error {
        if !matches!(err, Error::Io { .. }) {
            log::warn!("{}: {err}, closing", self.target);
        }
        self.record(&err);
        let status = match err {
            Error::InvalidUtf8 => Some(CloseCode::InvalidPayload),
            Error::Io { .. } => None,
            _ => Some(CloseCode::ProtocolError),
        };
        self.shutdown(status.map(|code| Frame::close(Some(code.as_u16()), "")));
        err
    }

    /// Best-effort Close frame, then transport teardown. Leaves the state `Closed`.
    fn shutdown(&self, close_frame: Option<Frame>) {
        {
            let mut writer = lock(&self.writer);
            if let Some(mut w) = writer.take() {
                if let Some(frame) = close_frame {
                    let _ = random_mask().and_then(|mask| frame.write_to(&mut w, Some(mask)));
                }
                if let Err(e) = w.teardown() {
                    log::debug!("{}: teardown: {e}", self.target);
                }
            }
        }
        self.set_state(ConnectionState::Closed);
    }

    fn set_state(&self, next: ConnectionState) {
        let mut state = lock(&self.state);
        *state = state.advance(next);
    }

    fn record(&self, err: &Error) {
        *lock(&self.last_error) = Some(err.to_string());
    }
}

impl<T: Transport> Drop for Connection<T> {
    fn drop(&mut self) {
        let writer = self
            .writer
            .get_mut()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        if let Some(mut w) = writer.take() {
            let _ = w.teardown();
        }
    }
}

/// Open a client connection to a `ws://` or `wss://` URI.
///
/// Resolves the host, connects with the connect timeout, applies socket
/// timeouts, wraps TLS for `wss` and performs the upgrade handshake. The
/// read timeout in [`Config::timeouts`] takes effect once the handshake
/// succeeds.
///
/// ## Errors
///
/// - `Error::InvalidUri` before any network activity
/// - `Error::TlsUnavailable` for `wss` without the `tls-rustls` feature
/// - `Error::Tls` for TLS failures
/// - handshake and I/O errors as for [`Connection::handshake`]
pub fn connect(uri: &str, config: &Config) -> Result<Connection<MaybeTlsStream>> {
    let target = ConnectionTarget::parse(uri)?;
    if target.scheme().is_secure() && !cfg!(feature = "tls-rustls") {
        return Err(Error::TlsUnavailable);
    }

    let stream = open_tcp(&target, config)?;
    let control = stream.try_clone()?;
    let transport = match target.scheme() {
        Scheme::Ws => MaybeTlsStream::Plain(stream),
        Scheme::Wss => secure(stream, &target, config)?,
    };

    let conn = Connection::handshake(transport, target, config)?;
    control.set_read_timeout(non_zero(config.timeouts.read))?;
    Ok(conn)
}

#[cfg(feature = "tls-rustls")]
fn secure(stream: TcpStream, target: &ConnectionTarget, config: &Config) -> Result<MaybeTlsStream> {
    let tls = config
        .tls
        .clone()
        .unwrap_or_else(crate::tls::client_config_with_webpki_roots);
    let stream = crate::tls::TlsStream::connect(tls, target.host(), stream)?;
    Ok(MaybeTlsStream::Tls(stream))
}

#[cfg(not(feature = "tls-rustls"))]
fn secure(_stream: TcpStream, _target: &ConnectionTarget, _config: &Config) -> Result<MaybeTlsStream> {
    Err(Error::TlsUnavailable)
}

fn open_tcp(target: &ConnectionTarget, config: &Config) -> Result<TcpStream> {
    let timeout = non_zero(config.timeouts.connect);
    let mut last_err = None;

    for addr in (target.host(), target.port()).to_socket_addrs()? {
        log::debug!("connecting to {target} via {addr}");
        let attempt = match timeout {
            Some(t) => TcpStream::connect_timeout(&addr, t),
            None => TcpStream::connect(addr),
        };
        match attempt {
            Ok(stream) => {
                // The connect timeout also bounds the handshake reads.
                stream.set_read_timeout(timeout)?;
                stream.set_write_timeout(non_zero(config.timeouts.write))?;
                stream.set_nodelay(config.nodelay)?;
                return Ok(stream);
            }
            Err(e) => last_err = Some(e),
        }
    }

    Err(last_err
        .unwrap_or_else(|| {
            io::Error::new(
                io::ErrorKind::NotFound,
                format!("{} resolved to no addresses", target.host()),
            )
        })
        .into())
}

fn non_zero(d: Duration) -> Option<Duration> {
    (!d.is_zero()).then_some(d)
}
