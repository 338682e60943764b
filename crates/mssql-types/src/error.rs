//! Type conversion error types.

use thiserror::Error;

/// Errors that can occur while converting between Rust values, [`SqlValue`]s
/// and wire buffers.
///
/// [`SqlValue`]: crate::SqlValue
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TypeError {
    /// The value cannot be represented by the requested type.
    #[error("type mismatch: expected {expected}, got {actual}")]
    TypeMismatch {
        /// The type the conversion needed.
        expected: &'static str,
        /// Description of the value that was supplied.
        actual: String,
    },

    /// A numeric value does not fit the target type.
    #[error("value out of range for {target}: {value}")]
    OutOfRange {
        /// Target type name.
        target: &'static str,
        /// The offending value, rendered as text.
        value: String,
    },

    /// A wire buffer is shorter than the fixed width of its type.
    #[error("truncated {type_name} buffer: expected {expected} bytes, got {actual}")]
    Truncated {
        /// Wire type name.
        type_name: &'static str,
        /// Bytes required.
        expected: usize,
        /// Bytes available.
        actual: usize,
    },

    /// A NULL was read into a destination that cannot hold one.
    #[error("unexpected NULL for {0}")]
    UnexpectedNull(&'static str),
}

impl TypeError {
    pub(crate) fn mismatch(expected: &'static str, actual: impl Into<String>) -> Self {
        Self::TypeMismatch {
            expected,
            actual: actual.into(),
        }
    }

    pub(crate) fn out_of_range(target: &'static str, value: impl ToString) -> Self {
        Self::OutOfRange {
            target,
            value: value.to_string(),
        }
    }
}
