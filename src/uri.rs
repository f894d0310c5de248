//! Connection target parsing for `ws://` and `wss://` URIs.
//!
//! The authority is validated with [`url::Url`]; the path is passed through
//! untouched, with no percent-decoding or query handling.

use std::fmt;
use std::str::FromStr;

use url::{Host, Url};

use crate::error::{Error, Result};

/// URI scheme of a WebSocket target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scheme {
    /// Plain TCP (`ws://`).
    Ws,
    /// TLS over TCP (`wss://`).
    Wss,
}

impl Scheme {
    /// Port used when the URI does not name one.
    #[inline]
    #[must_use]
    pub const fn default_port(self) -> u16 {
        match self {
            Scheme::Ws => 80,
            Scheme::Wss => 443,
        }
    }

    /// Check if this scheme requires TLS.
    #[inline]
    #[must_use]
    pub const fn is_secure(self) -> bool {
        matches!(self, Scheme::Wss)
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Scheme::Ws => "ws",
            Scheme::Wss => "wss",
        }
    }
}

impl fmt::Display for Scheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A validated, decomposed connection target.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConnectionTarget {
    scheme: Scheme,
    host: String,
    port: u16,
    path: String,
}

impl ConnectionTarget {
    /// Parse a connection string such as `ws://example.com:8080/chat`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidUri`] if:
    /// - the scheme is not exactly `ws` or `wss`
    /// - the host is empty or carries userinfo
    /// - the port is not a number in `1..=65535`
    /// - the URI contains whitespace or control characters
    pub fn parse(uri: &str) -> Result<Self> {
        if uri.chars().any(|c| c.is_whitespace() || c.is_control()) {
            return Err(Error::InvalidUri(format!(
                "whitespace or control characters in {uri:?}"
            )));
        }

        // `Url` lowercases the scheme, so match it on the raw text.
        let (scheme, rest) = uri
            .split_once("://")
            .ok_or_else(|| Error::InvalidUri(format!("missing scheme in {uri:?}")))?;
        let scheme = match scheme {
            "ws" => Scheme::Ws,
            "wss" => Scheme::Wss,
            other => {
                return Err(Error::InvalidUri(format!("unsupported scheme {other:?}")));
            }
        };

        // The request target is sliced from the input, since `Url`
        // normalizes dot-segments and percent-encoding.
        let (authority, path) = match rest.find(['/', '?']) {
            Some(idx) => (&rest[..idx], &rest[idx..]),
            None => (rest, ""),
        };
        let path = if path.is_empty() {
            "/".to_string()
        } else if path.starts_with('?') {
            format!("/{path}")
        } else {
            path.to_string()
        };

        if authority.is_empty() {
            return Err(Error::InvalidUri(format!("missing host in {uri:?}")));
        }
        if authority.contains('@') {
            return Err(Error::InvalidUri("userinfo is not supported".into()));
        }
        if authority.contains('\\') || authority.ends_with(':') {
            return Err(Error::InvalidUri(format!("malformed authority {authority:?}")));
        }

        let url = Url::parse(&format!("{scheme}://{authority}/"))
            .map_err(|e| Error::InvalidUri(format!("{uri:?}: {e}")))?;
        let host = match url.host() {
            Some(Host::Domain(name)) if !name.is_empty() => name.to_string(),
            Some(Host::Ipv4(addr)) => addr.to_string(),
            Some(Host::Ipv6(addr)) => addr.to_string(),
            _ => return Err(Error::InvalidUri(format!("missing host in {uri:?}"))),
        };
        let port = match url.port_or_known_default() {
            Some(0) => return Err(Error::InvalidUri("port out of range: 0".into())),
            Some(port) => port,
            None => scheme.default_port(),
        };

        Ok(Self {
            scheme,
            host,
            port,
            path,
        })
    }

    #[inline]
    #[must_use]
    pub fn scheme(&self) -> Scheme {
        self.scheme
    }

    /// Host name or address, without IPv6 brackets.
    #[inline]
    #[must_use]
    pub fn host(&self) -> &str {
        &self.host
    }

    #[inline]
    #[must_use]
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Request target sent in the upgrade request line, byte-for-byte as given.
    #[inline]
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Value for the `Host` header: the port is omitted when it is the
    /// scheme default and IPv6 literals are bracketed.
    #[must_use]
    pub fn host_header(&self) -> String {
        let host = if self.host.contains(':') {
            format!("[{}]", self.host)
        } else {
            self.host.clone()
        };
        if self.port == self.scheme.default_port() {
            host
        } else {
            format!("{}:{}", host, self.port)
        }
    }

    /// Default `Origin` header value for this target.
    #[must_use]
    pub fn origin(&self) -> String {
        let scheme = if self.scheme.is_secure() { "https" } else { "http" };
        format!("{}://{}", scheme, self.host_header())
    }
}

impl FromStr for ConnectionTarget {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for ConnectionTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let host = if self.host.contains(':') {
            format!("[{}]", self.host)
        } else {
            self.host.clone()
        };
        write!(f, "{}://{}:{}{}", self.scheme, host, self.port, self.path)
    }
}
