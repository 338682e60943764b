//! Scan destinations.
//!
//! A scan copies values of the current row into caller-owned destinations.
//! Plain values are assigned positionally through [`ScanTarget`]. A struct
//! that implements [`Record`] (usually through `#[derive(Record)]`) is filled
//! by column name instead: each column name is normalized with
//! [`naming::field_key`](mssql_types::naming::field_key) and matched against
//! the normalized field names.

use mssql_types::{FromSql, SqlValue, TypeError};

/// Something a single column value can be scanned into.
pub trait ScanTarget {
    /// Convert and store `value`.
    fn assign(&mut self, value: &SqlValue) -> Result<(), TypeError>;

    /// This destination as a record, when it is filled by column name.
    fn as_record(&mut self) -> Option<&mut dyn Record> {
        None
    }
}

impl<T: FromSql> ScanTarget for T {
    fn assign(&mut self, value: &SqlValue) -> Result<(), TypeError> {
        *self = T::from_sql(value)?;
        Ok(())
    }
}

/// A struct filled by column name.
pub trait Record {
    /// Assign `value` to the field that column `column` maps to.
    ///
    /// Returns `Ok(false)` when no field maps to the column.
    fn assign_column(&mut self, column: &str, value: &SqlValue) -> Result<bool, TypeError>;
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_values_assign_through_from_sql() {
        let mut id = 0i32;
        let mut name: Option<String> = Some("x".into());
        id.assign(&SqlValue::BigInt(42)).unwrap();
        name.assign(&SqlValue::Null).unwrap();
        assert_eq!(id, 42);
        assert_eq!(name, None);
        assert!(id.as_record().is_none());
    }

    #[test]
    fn test_null_into_non_option_is_an_error() {
        let mut id = 7i64;
        assert_eq!(
            id.assign(&SqlValue::Null),
            Err(TypeError::UnexpectedNull("i64"))
        );
        assert_eq!(id, 7);
    }
}
