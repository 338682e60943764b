//! Pool error types.

use thiserror::Error;

/// Errors that can occur during pool operations.
#[derive(Debug, Error)]
pub enum PoolError {
    /// Opening or using a session failed.
    #[error(transparent)]
    Session(#[from] mssql_client::Error),

    /// The pool has been closed.
    #[error("pool is closed")]
    PoolClosed,

    /// Invalid pool configuration.
    #[error("invalid pool configuration: {0}")]
    InvalidConfig(String),
}

impl PoolError {
    /// Whether a later attempt could succeed.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Session(err) => err.is_transient(),
            Self::PoolClosed | Self::InvalidConfig(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_errors_convert() {
        let err: PoolError = mssql_client::Error::DeadConnection.into();
        assert!(err.is_transient());
        assert_eq!(err.to_string(), "connection is dead");
        assert!(!PoolError::PoolClosed.is_transient());
    }
}
