//! Scripted result sets.

use mssql_types::{SqlValue, WireType};
use tds_transport::{ColumnInfo, RowStatus, ServerMessage};

/// A result set the mock server sends back.
///
/// ```rust,ignore
/// let authors = MockResultSet::new()
///     .column("au_id", WireType::VarChar, 11)
///     .column("au_lname", WireType::VarChar, 40)
///     .row([SqlValue::String("172-32-1176".into()), SqlValue::String("White".into())]);
/// ```
#[derive(Debug, Clone, Default)]
pub struct MockResultSet {
    pub(crate) columns: Vec<ColumnInfo>,
    pub(crate) rows: Vec<Vec<SqlValue>>,
    pub(crate) rows_affected: Option<i64>,
    pub(crate) return_status: Option<i32>,
    pub(crate) messages: Vec<ServerMessage>,
    pub(crate) trailing_status: Option<RowStatus>,
}

impl MockResultSet {
    /// An empty result set without columns, as sent for statements that
    /// return no rows.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a column.
    #[must_use]
    pub fn column(mut self, name: impl Into<String>, wire: WireType, size: i32) -> Self {
        self.columns.push(ColumnInfo {
            name: name.into(),
            type_code: wire.code(),
            size,
        });
        self
    }

    /// Add a row. Missing trailing values read as NULL.
    #[must_use]
    pub fn row(mut self, values: impl IntoIterator<Item = SqlValue>) -> Self {
        self.rows.push(values.into_iter().collect());
        self
    }

    /// Override the affected row count.
    #[must_use]
    pub fn rows_affected(mut self, count: i64) -> Self {
        self.rows_affected = Some(count);
        self
    }

    /// Attach a procedure return status to this result set.
    #[must_use]
    pub fn return_status(mut self, status: i32) -> Self {
        self.return_status = Some(status);
        self
    }

    /// Deliver a server message while this result set is current.
    #[must_use]
    pub fn message(mut self, message: ServerMessage) -> Self {
        self.messages.push(message);
        self
    }

    /// After the scripted rows, report `status` instead of
    /// [`RowStatus::NoMoreRows`] once.
    #[must_use]
    pub fn then_row_status(mut self, status: RowStatus) -> Self {
        self.trailing_status = Some(status);
        self
    }

    /// The count the transport reports: the override if set, `-1` for a
    /// result without columns, otherwise the number of rows.
    #[must_use]
    pub fn affected(&self) -> i64 {
        match self.rows_affected {
            Some(count) => count,
            None if self.columns.is_empty() => -1,
            None => i64::try_from(self.rows.len()).unwrap_or(i64::MAX),
        }
    }
}
