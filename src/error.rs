//! Error types for the WebSocket client.
//!
//! This module defines all error conditions that can occur while parsing a
//! target URI, upgrading a stream, exchanging frames, or running the
//! background receive loop.

use thiserror::Error;

/// Result type alias for WebSocket operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur during WebSocket operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum Error {
    /// Malformed scheme, host, port or path in the connection string.
    #[error("Invalid URI: {0}")]
    InvalidUri(String),

    /// The server answered the upgrade request with something other than 101.
    #[error("Handshake failed: {0}")]
    HandshakeFailed(String),

    /// Handshake response exceeds the configured maximum.
    #[error("Handshake too large: {size} bytes (max: {max})")]
    HandshakeTooLarge {
        /// Bytes read so far.
        size: usize,
        /// Maximum allowed size.
        max: usize,
    },

    /// A caller-supplied header cannot be written on the wire.
    #[error("Invalid header value for {header}: {reason}")]
    InvalidHeaderValue {
        /// Header name.
        header: String,
        /// Why it was rejected.
        reason: String,
    },

    /// Protocol violation detected (fragments, unexpected opcodes, bad close payloads).
    #[error("Protocol violation: {0}")]
    ProtocolViolation(String),

    /// Frame size exceeds configured maximum.
    #[error("Frame too large: {size} bytes (max: {max})")]
    FrameTooLarge {
        /// Announced frame size.
        size: u64,
        /// Maximum allowed size.
        max: usize,
    },

    /// Invalid UTF-8 in text frame.
    #[error("Invalid UTF-8 in text frame")]
    InvalidUtf8,

    /// Reserved opcode used.
    #[error("Reserved opcode: {0:#x}")]
    ReservedOpcode(u8),

    /// Invalid opcode value.
    #[error("Invalid opcode: {0:#x}")]
    InvalidOpcode(u8),

    /// Reserved bits set without negotiated extension.
    #[error("Reserved bits set without negotiated extension")]
    ReservedBitsSet,

    /// Connection has been closed, by the peer or locally.
    #[error("Connection closed: {0:?}")]
    ConnectionClosed(Option<u16>),

    /// The upgrade handshake has not completed yet.
    #[error("Not connected")]
    NotConnected,

    /// I/O error from the underlying transport.
    #[error("I/O error ({kind:?}): {message}")]
    Io {
        /// Kind of the original error, kept so callers can tell timeouts apart.
        kind: std::io::ErrorKind,
        /// Rendered error message.
        message: String,
    },

    /// TLS setup or session failure.
    #[error("TLS error: {0}")]
    Tls(String),

    /// A `wss://` target was requested but TLS support is not compiled in.
    #[error("TLS support is not enabled (build with the `tls-rustls` feature)")]
    TlsUnavailable,

    /// A background task is already running for this client.
    #[error("Background task already running")]
    AlreadyRunning,

    /// The background task exceeded its scheduler timeout.
    #[error("Task timed out after {0:?}")]
    TaskTimeout(std::time::Duration),

    /// The scheduler no longer accepts work.
    #[error("Scheduler is shut down")]
    SchedulerClosed,
}

impl Error {
    /// Returns `true` if the error means the stream has ended.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        matches!(self, Error::ConnectionClosed(_))
    }

    /// Returns `true` if the error is a read/write timeout on the transport.
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            Error::Io {
                kind: std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut,
                ..
            }
        )
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::UnexpectedEof
            | std::io::ErrorKind::ConnectionReset
            | std::io::ErrorKind::ConnectionAborted
            | std::io::ErrorKind::BrokenPipe => Error::ConnectionClosed(None),
            kind => Error::Io {
                kind,
                message: err.to_string(),
            },
        }
    }
}

impl From<std::str::Utf8Error> for Error {
    fn from(_: std::str::Utf8Error) -> Self {
        Error::InvalidUtf8
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::FrameTooLarge {
            size: 20_000_000,
            max: 16_000_000,
        };
        assert_eq!(
            err.to_string(),
            "Frame too large: 20000000 bytes (max: 16000000)"
        );
        assert_eq!(
            Error::HandshakeFailed("HTTP/1.1 400 Bad Request".into()).to_string(),
            "Handshake failed: HTTP/1.1 400 Bad Request"
        );
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "nope");
        let ws_err: Error = io_err.into();
        assert!(matches!(
            ws_err,
            Error::Io {
                kind: std::io::ErrorKind::PermissionDenied,
                ..
            }
        ));
    }

    #[test]
    fn test_stream_end_maps_to_closed() {
        for kind in [
            std::io::ErrorKind::UnexpectedEof,
            std::io::ErrorKind::ConnectionReset,
            std::io::ErrorKind::BrokenPipe,
        ] {
            let err: Error = std::io::Error::new(kind, "gone").into();
            assert!(err.is_closed(), "{kind:?} should map to ConnectionClosed");
        }
    }

    #[test]
    fn test_timeout_detection() {
        let err: Error = std::io::Error::new(std::io::ErrorKind::TimedOut, "slow").into();
        assert!(err.is_timeout());
        assert!(!Error::NotConnected.is_timeout());
    }

    #[test]
    fn test_error_clone() {
        let err = Error::InvalidUtf8;
        let cloned = err.clone();
        assert_eq!(err, cloned);
    }
}
