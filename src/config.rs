//! Configuration and limits for WebSocket client connections.

use std::time::Duration;

/// Resource limits for a connection.
///
/// These bound memory use when talking to a misbehaving or hostile peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Limits {
    /// Maximum payload size of a single received frame in bytes.
    ///
    /// Larger frames close the connection with status 1009.
    ///
    /// Default: 16 MB (16 * 1024 * 1024)
    pub max_frame_size: usize,

    /// Maximum size of the handshake response in bytes.
    ///
    /// Default: 8 KB (8192)
    pub max_handshake_size: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_frame_size: 16 * 1024 * 1024, // 16 MB
            max_handshake_size: 8192,
        }
    }
}

impl Limits {
    #[must_use]
    pub const fn new(max_frame_size: usize, max_handshake_size: usize) -> Self {
        Self {
            max_frame_size,
            max_handshake_size,
        }
    }

    /// Limits suitable for small embedded systems.
    ///
    /// - Max frame: 64 KB
    /// - Max handshake: 4 KB
    #[must_use]
    pub const fn embedded() -> Self {
        Self {
            max_frame_size: 64 * 1024,
            max_handshake_size: 4096,
        }
    }
}

/// Timeout configuration for client connections.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Timeouts {
    /// Bounds the TCP connect, the TLS handshake and every read of the
    /// upgrade response.
    ///
    /// Default: 10 seconds
    pub connect: Duration,

    /// Socket read timeout once the connection is open. A read that times
    /// out before any frame byte arrives is reported as "no data yet", so
    /// this is also the polling interval of a receive loop.
    ///
    /// Default: 1 second
    pub read: Duration,

    /// Socket write timeout.
    ///
    /// Default: 10 seconds
    pub write: Duration,

    /// How long a frame that has started arriving may stall before the
    /// read fails.
    ///
    /// Default: 30 seconds
    pub stall: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            connect: Duration::from_secs(10),
            read: Duration::from_secs(1),
            write: Duration::from_secs(10),
            stall: Duration::from_secs(30),
        }
    }
}

impl Timeouts {
    #[must_use]
    pub const fn new(connect: Duration, read: Duration, write: Duration, stall: Duration) -> Self {
        Self {
            connect,
            read,
            write,
            stall,
        }
    }
}

/// Client connection configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub limits: Limits,

    pub timeouts: Timeouts,

    /// `Origin` header value. Defaults to the target's own origin.
    pub origin: Option<String>,

    /// Extra headers appended to the upgrade request, in order.
    pub headers: Vec<(String, String)>,

    /// Disable Nagle's algorithm on the TCP socket.
    pub nodelay: bool,

    /// TLS client configuration for `wss://` targets. When unset, the
    /// webpki root store is used.
    #[cfg(feature = "tls-rustls")]
    pub tls: Option<std::sync::Arc<rustls::ClientConfig>>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            limits: Limits::default(),
            timeouts: Timeouts::default(),
            origin: None,
            headers: Vec::new(),
            nodelay: true,
            #[cfg(feature = "tls-rustls")]
            tls: None,
        }
    }
}

impl Config {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_limits(mut self, limits: Limits) -> Self {
        self.limits = limits;
        self
    }

    #[must_use]
    pub fn with_timeouts(mut self, timeouts: Timeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    /// Shorthand for setting the receive polling interval.
    #[must_use]
    pub fn with_read_timeout(mut self, read: Duration) -> Self {
        self.timeouts.read = read;
        self
    }

    #[must_use]
    pub fn with_origin(mut self, origin: impl Into<String>) -> Self {
        self.origin = Some(origin.into());
        self
    }

    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    #[must_use]
    pub fn with_nodelay(mut self, nodelay: bool) -> Self {
        self.nodelay = nodelay;
        self
    }

    #[cfg(feature = "tls-rustls")]
    #[must_use]
    pub fn with_tls(mut self, tls: std::sync::Arc<rustls::ClientConfig>) -> Self {
        self.tls = Some(tls);
        self
    }

    /// Preset for constrained devices: embedded limits, short timeouts.
    #[must_use]
    pub fn embedded() -> Self {
        Self {
            limits: Limits::embedded(),
            timeouts: Timeouts::new(
                Duration::from_secs(5),
                Duration::from_millis(200),
                Duration::from_secs(5),
                Duration::from_secs(10),
            ),
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_limits_default() {
        let limits = Limits::default();
        assert_eq!(limits.max_frame_size, 16 * 1024 * 1024);
        assert_eq!(limits.max_handshake_size, 8192);
    }

    #[test]
    fn test_limits_embedded() {
        let limits = Limits::embedded();
        assert_eq!(limits.max_frame_size, 64 * 1024);
        assert_eq!(limits.max_handshake_size, 4096);
    }

    #[test]
    fn test_timeouts_default() {
        let t = Timeouts::default();
        assert_eq!(t.connect, Duration::from_secs(10));
        assert_eq!(t.read, Duration::from_secs(1));
        assert!(t.stall > t.read);
    }

    #[test]
    fn test_config_builder() {
        let config = Config::new()
            .with_origin("http://device.local")
            .with_header("X-Device", "badge-7")
            .with_header("X-Token", "t")
            .with_read_timeout(Duration::from_millis(50))
            .with_nodelay(false);

        assert_eq!(config.origin.as_deref(), Some("http://device.local"));
        assert_eq!(
            config.headers,
            vec![
                ("X-Device".to_string(), "badge-7".to_string()),
                ("X-Token".to_string(), "t".to_string()),
            ]
        );
        assert_eq!(config.timeouts.read, Duration::from_millis(50));
        assert!(!config.nodelay);
    }

    #[test]
    fn test_config_embedded() {
        let config = Config::embedded();
        assert_eq!(config.limits, Limits::embedded());
        assert_eq!(config.timeouts.read, Duration::from_millis(200));
        assert!(config.nodelay);
    }
}
