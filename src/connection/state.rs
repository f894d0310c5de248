//! Connection lifecycle.

use std::fmt;

/// Where a [`Connection`](super::Connection) is in its lifecycle.
///
/// Ordered, and only ever advanced: `Connecting < Open < Closing < Closed`.
/// `Closing` lasts while our own Close frame is being written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, PartialOrd, Ord)]
#[non_exhaustive]
pub enum ConnectionState {
    #[default]
    Connecting,
    Open,
    Closing,
    Closed,
}

impl ConnectionState {
    #[must_use]
    #[inline]
    pub const fn is_active(&self) -> bool {
        !matches!(self, Self::Closed)
    }

    /// Outbound frames are accepted only while `Open`.
    #[must_use]
    #[inline]
    pub const fn can_send(&self) -> bool {
        matches!(self, Self::Open)
    }

    /// Move to `next` unless we are already past it.
    #[must_use]
    #[inline]
    pub fn advance(self, next: Self) -> Self {
        self.max(next)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Connecting => "connecting",
            Self::Open => "open",
            Self::Closing => "closing",
            Self::Closed => "closed",
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [ConnectionState; 4] = [
        ConnectionState::Connecting,
        ConnectionState::Open,
        ConnectionState::Closing,
        ConnectionState::Closed,
    ];

    #[test]
    fn test_starts_connecting() {
        assert_eq!(ConnectionState::default(), ConnectionState::Connecting);
    }

    #[test]
    fn test_only_open_sends() {
        let senders: Vec<_> = ALL.into_iter().filter(ConnectionState::can_send).collect();
        assert_eq!(senders, vec![ConnectionState::Open]);
    }

    #[test]
    fn test_only_closed_is_inactive() {
        let inactive: Vec<_> = ALL.into_iter().filter(|s| !s.is_active()).collect();
        assert_eq!(inactive, vec![ConnectionState::Closed]);
    }

    #[test]
    fn test_advance_never_goes_back() {
        for from in ALL {
            for to in ALL {
                let next = from.advance(to);
                assert!(next >= from, "{from} -> {to} gave {next}");
                assert_eq!(next, from.max(to));
            }
        }
    }

    #[test]
    fn test_display() {
        let labels: Vec<_> = ALL.iter().map(ToString::to_string).collect();
        assert_eq!(labels, ["connecting", "open", "closing", "closed"]);
    }
}
