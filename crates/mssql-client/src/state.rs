//! Session lifecycle states.

use std::fmt;

/// Where a [`Session`](crate::Session) is in its lifecycle.
///
/// ```text
/// Disconnected -> Connecting -> Connected -> Dead
///                      |             |
///                      +-------------+--> Disconnected
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    /// No transport handle.
    #[default]
    Disconnected,
    /// A login is in progress.
    Connecting,
    /// Logged in with defaults applied.
    Connected,
    /// The transport reported the handle dead.
    Dead,
}

impl SessionState {
    /// Whether requests can be sent.
    #[must_use]
    pub fn is_connected(self) -> bool {
        self == Self::Connected
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Dead => "dead",
        })
    }
}
