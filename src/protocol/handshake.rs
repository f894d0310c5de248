//! Client side of the WebSocket opening handshake (RFC 6455 §4.1).
//!
//! The client writes an HTTP/1.1 Upgrade request and accepts the connection
//! iff the status line starts with `HTTP/1.1 101`. The remaining response
//! headers are read and discarded; `Sec-WebSocket-Accept` is compared with
//! the expected value for diagnostics only.

use std::io::{BufRead, Read, Write};

use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use sha1::{Digest, Sha1};

use crate::error::{Error, Result};
use crate::uri::ConnectionTarget;

/// The WebSocket GUID used in the Sec-WebSocket-Accept calculation (RFC 6455).
pub const WS_GUID: &str = "258EAFA5-E914-47DA-95CA-C5AB0DC85B11";

/// Headers the handshake writes itself; callers may not override them.
const RESERVED_HEADERS: [&str; 5] = [
    "host",
    "connection",
    "upgrade",
    "sec-websocket-key",
    "sec-websocket-version",
];

/// Computes the Sec-WebSocket-Accept value from the client's Sec-WebSocket-Key.
///
/// The accept key is calculated as: Base64(SHA-1(key + GUID))
///
/// # Example
///
/// ```
/// use wsline::protocol::handshake::compute_accept_key;
///
/// let key = "dGhlIHNhbXBsZSBub25jZQ==";
/// let accept = compute_accept_key(key);
/// assert_eq!(accept, "s3pPLMBiTxaQ9kYGzzhZRbK+xOo=");
/// ```
pub fn compute_accept_key(key: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(key.as_bytes());
    hasher.update(WS_GUID.as_bytes());
    let hash = hasher.finalize();
    BASE64.encode(hash)
}

/// Generate a fresh `Sec-WebSocket-Key`: 16 random bytes, base64 encoded.
///
/// # Errors
///
/// Returns [`Error::Io`] if the OS random source is unavailable.
pub fn generate_key() -> Result<String> {
    let mut nonce = [0u8; 16];
    getrandom::getrandom(&mut nonce).map_err(|e| Error::Io {
        kind: std::io::ErrorKind::Other,
        message: format!("random source unavailable: {e}"),
    })?;
    Ok(BASE64.encode(nonce))
}

/// Validate that a header name/value pair can be written on the wire.
///
/// # Errors
/// Returns `Error::InvalidHeaderValue` if either contains `\r` or `\n`, the
/// name is empty or contains `:`, or the name is one the handshake owns.
fn validate_header(name: &str, value: &str) -> Result<()> {
    let reject = |reason: &str| {
        Err(Error::InvalidHeaderValue {
            header: name.to_string(),
            reason: reason.to_string(),
        })
    };
    if name.is_empty() || name.contains(':') || name.chars().any(char::is_whitespace) {
        return reject("invalid header name");
    }
    if value.contains('\r') || value.contains('\n') {
        return reject("contains CR or LF characters");
    }
    if RESERVED_HEADERS.contains(&name.to_ascii_lowercase().as_str()) {
        return reject("set by the handshake itself");
    }
    Ok(())
}

/// What the server said in a successful upgrade response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandshakeOutcome {
    /// The raw status line, without the trailing CRLF.
    pub status_line: String,
    /// The `Sec-WebSocket-Accept` value, if the server sent one.
    pub accept: Option<String>,
    /// Whether `accept` equals the value computed from our key.
    pub accept_matches: bool,
}

/// A prepared client upgrade request.
#[derive(Debug, Clone)]
pub struct ClientHandshake {
    key: String,
    request: Vec<u8>,
}

impl ClientHandshake {
    /// Build the upgrade request for `target`.
    ///
    /// `origin` defaults to the target's own origin. Extra headers are
    /// appended after the standard ones, in order.
    ///
    /// # Errors
    ///
    /// - `Error::InvalidHeaderValue` if an extra header or the origin is malformed
    /// - `Error::Io` if no random key can be generated
    pub fn new(
        target: &ConnectionTarget,
        origin: Option<&str>,
        headers: &[(String, String)],
    ) -> Result<Self> {
        let key = generate_key()?;
        Self::with_key(target, origin, headers, key)
    }

    /// Build the upgrade request with a caller-chosen key.
    ///
    /// # Errors
    ///
    /// Same as [`ClientHandshake::new`], minus key generation.
    pub fn with_key(
        target: &ConnectionTarget,
        origin: Option<&str>,
        headers: &[(String, String)],
        key: String,
    ) -> Result<Self> {
        let origin = origin.map_or_else(|| target.origin(), str::to_string);
        validate_header("Origin", &origin)?;

        let mut request = Vec::with_capacity(256);
        request.extend_from_slice(format!("GET {} HTTP/1.1\r\n", target.path()).as_bytes());
        request.extend_from_slice(format!("Host: {}\r\n", target.host_header()).as_bytes());
        request.extend_from_slice(b"Connection: Upgrade\r\n");
        request.extend_from_slice(b"Upgrade: websocket\r\n");
        request.extend_from_slice(format!("Sec-WebSocket-Key: {key}\r\n").as_bytes());
        request.extend_from_slice(b"Sec-WebSocket-Version: 13\r\n");
        request.extend_from_slice(format!("Origin: {origin}\r\n").as_bytes());
        for (name, value) in headers {
            validate_header(name, value)?;
            request.extend_from_slice(format!("{name}: {value}\r\n").as_bytes());
        }
        request.extend_from_slice(b"\r\n");

        Ok(Self { key, request })
    }

    /// The base64 `Sec-WebSocket-Key` sent with the request.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// The serialized request bytes.
    #[must_use]
    pub fn request(&self) -> &[u8] {
        &self.request
    }

    /// Write the request, then read and judge the response.
    ///
    /// # Errors
    ///
    /// See [`ClientHandshake::read_response`]; write failures are propagated.
    pub fn perform<R, W>(&self, reader: &mut R, writer: &mut W, max_size: usize) -> Result<HandshakeOutcome>
    where
        R: BufRead + ?Sized,
        W: Write + ?Sized,
    {
        writer.write_all(&self.request)?;
        writer.flush()?;
        self.read_response(reader, max_size)
    }

    /// Read the status line and the header block up to the empty line.
    ///
    /// Reads line by line so no frame bytes following the response are
    /// consumed from `reader` beyond its own buffer.
    ///
    /// # Errors
    ///
    /// - `Error::HandshakeFailed` if the status line does not start with
    ///   `HTTP/1.1 101`, or the stream ends before the header block does
    /// - `Error::HandshakeTooLarge` if the response exceeds `max_size`
    /// - `Error::Io` on transport failures, including read timeouts
    pub fn read_response<R: BufRead + ?Sized>(&self, reader: &mut R, max_size: usize) -> Result<HandshakeOutcome> {
        let mut total = 0usize;
        let status_line = read_line(reader, &mut total, max_size)?
            .ok_or_else(|| Error::HandshakeFailed("connection closed before response".into()))?;

        if !status_line.starts_with("HTTP/1.1 101") {
            return Err(Error::HandshakeFailed(status_line));
        }

        let mut accept = None;
        loop {
            let line = read_line(reader, &mut total, max_size)?.ok_or_else(|| {
                Error::HandshakeFailed("connection closed inside response headers".into())
            })?;
            if line.is_empty() {
                break;
            }
            if let Some((name, value)) = line.split_once(':') {
                if name.trim().eq_ignore_ascii_case("sec-websocket-accept") {
                    accept = Some(value.trim().to_string());
                }
            }
        }

        let expected = compute_accept_key(&self.key);
        let accept_matches = accept.as_deref() == Some(expected.as_str());
        if !accept_matches {
            log::warn!(
                "server Sec-WebSocket-Accept {:?} does not match expected {:?}; continuing",
                accept,
                expected
            );
        }

        Ok(HandshakeOutcome {
            status_line,
            accept,
            accept_matches,
        })
    }
}

/// Read one CRLF (or LF) terminated line. `None` means end of stream.
///
/// Never buffers more than what is left of `max_size` plus one byte.
fn read_line<R: BufRead + ?Sized>(reader: &mut R, total: &mut usize, max_size: usize) -> Result<Option<String>> {
    let budget = max_size.saturating_sub(*total).saturating_add(1);
    let mut buf = Vec::new();
    let n = (&mut *reader).take(budget as u64).read_until(b'\n', &mut buf)?;
    if n == 0 {
        return Ok(None);
    }
    *total += n;
    if *total > max_size {
        return Err(Error::HandshakeTooLarge {
            size: *total,
            max: max_size,
        });
    }
    while matches!(buf.last(), Some(b'\n' | b'\r')) {
        buf.pop();
    }
    Ok(Some(String::from_utf8_lossy(&buf).into_owned()))
}
