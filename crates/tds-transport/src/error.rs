//! Transport-level error types.

use thiserror::Error;

/// Errors reported by a [`Transport`](crate::Transport) or
/// [`Connector`](crate::Connector).
///
/// The detailed diagnostics for a failure arrive separately through the
/// [`callbacks`](crate::callbacks) channel; these variants only name the
/// primitive that failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// Opening a session failed.
    #[error("login to {host} failed")]
    Login {
        /// The host that refused the login.
        host: String,
    },

    /// A command primitive reported failure.
    #[error("{0} failed")]
    Failed(&'static str),

    /// The session handle is dead or already closed.
    #[error("session handle is dead")]
    Dead,

    /// A column index outside the current result set.
    #[error("no such column: {index} (result has {count} columns)")]
    InvalidColumn {
        /// Requested zero-based column index.
        index: usize,
        /// Number of columns in the current result set.
        count: usize,
    },

    /// A row status the transport could not continue past.
    #[error("row fetch failed: {0}")]
    Row(&'static str),
}
