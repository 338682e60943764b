//! Client error types.

use mssql_types::TypeError;
use thiserror::Error;

/// Errors that can occur during client operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Opening a session failed.
    #[error("failed to connect to {host}: {detail}")]
    Connection {
        /// Host the login was sent to.
        host: String,
        /// Library and server diagnostics for the failure.
        detail: String,
    },

    /// The session is dead and could not be reopened.
    #[error("connection is dead")]
    DeadConnection,

    /// The server is a mirror and the request must go to its partner.
    #[error("database is acting as a mirror: {message}")]
    MirrorRedirect {
        /// The server message that reported it.
        message: String,
    },

    /// A request failed on the server or in the transport.
    #[error("{}", server_text(.context, .error, .message))]
    Server {
        /// What failed.
        context: String,
        /// Accumulated library error text.
        error: String,
        /// Accumulated server message text.
        message: String,
    },

    /// The number of arguments does not match the placeholders.
    #[error("incorrect number of params, expecting {expected} got {actual}")]
    ParameterCount {
        /// Placeholders in the query.
        expected: usize,
        /// Arguments supplied.
        actual: usize,
    },

    /// A value could not be converted.
    #[error(transparent)]
    Type(#[from] TypeError),

    /// A scan was attempted before the first call to `next`.
    #[error("scan called without calling next")]
    NoCurrentRow,

    /// No column with the given name.
    #[error("column not found in result: {0}")]
    ColumnNotFound(String),

    /// A scan assigned a different number of values than expected.
    #[error("wrong scan count, expected {expected}, actual {actual}")]
    ScanCount {
        /// Expected number of assigned values.
        expected: usize,
        /// Number actually assigned.
        actual: usize,
    },

    /// More scan destinations than columns.
    #[error("more destinations ({destinations}) than columns ({columns})")]
    TooManyDestinations {
        /// Number of destinations.
        destinations: usize,
        /// Number of columns in the row.
        columns: usize,
    },

    /// A procedure result has no current result set.
    #[error("no current result to scan")]
    NoResult,

    /// A query expected to return a row returned none.
    #[error("no rows in result")]
    NoRows,

    /// Invalid configuration.
    #[error("configuration error: {0}")]
    Config(String),
}

fn server_text(context: &str, error: &str, message: &str) -> String {
    if error.is_empty() {
        context.to_string()
    } else {
        format!("{error}\n{message}")
    }
}

impl Error {
    /// Whether the session may have been lost and a fresh one could
    /// succeed.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Connection { .. } | Self::DeadConnection | Self::MirrorRedirect { .. }
        )
    }
}

/// Result type for client operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_error_prefers_diagnostics() {
        let err = Error::Server {
            context: "dbsqlexec failed".into(),
            error: "General SQL Server error".into(),
            message: "Msg 208".into(),
        };
        assert_eq!(err.to_string(), "General SQL Server error\nMsg 208");

        let err = Error::Server {
            context: "dbsqlexec failed".into(),
            error: String::new(),
            message: "ignored".into(),
        };
        assert_eq!(err.to_string(), "dbsqlexec failed");
    }

    #[test]
    fn test_transient_classification() {
        assert!(Error::DeadConnection.is_transient());
        assert!(!Error::NoRows.is_transient());
        assert!(!Error::Config("x".into()).is_transient());
    }
}
