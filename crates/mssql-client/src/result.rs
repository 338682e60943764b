//! Result sets returned by a batch or procedure call.

use mssql_types::{FromSql, SqlValue, WireType};

use crate::error::{Error, Result};
use crate::scan::{Record, ScanTarget};

/// Column metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    /// Column name.
    pub name: String,
    /// Size the column was bound with.
    pub size: i32,
    /// Wire type the column was bound as.
    pub wire_type: WireType,
}

impl Column {
    /// Create column metadata.
    #[must_use]
    pub fn new(name: impl Into<String>, size: i32, wire_type: WireType) -> Self {
        Self {
            name: name.into(),
            size,
            wire_type,
        }
    }
}

/// One materialized result set with a forward-only cursor.
///
/// The cursor starts before the first row. [`next`](Self::next) moves it;
/// scanning reads the row it points at.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultSet {
    columns: Vec<Column>,
    rows: Vec<Vec<SqlValue>>,
    return_value: Option<i32>,
    rows_affected: i64,
    message: String,
    cursor: Option<usize>,
    scan_count: usize,
}

impl ResultSet {
    /// Create an empty result set with the given columns.
    #[must_use]
    pub fn new(columns: Vec<Column>) -> Self {
        Self {
            columns,
            ..Self::default()
        }
    }

    /// Append a row. Missing trailing values are filled with NULL and extra
    /// values are dropped.
    pub fn push_row(&mut self, mut row: Vec<SqlValue>) {
        row.resize(self.columns.len(), SqlValue::Null);
        self.rows.push(row);
    }

    pub(crate) fn set_return_value(&mut self, value: Option<i32>) {
        self.return_value = value;
    }

    pub(crate) fn set_rows_affected(&mut self, count: i64) {
        self.rows_affected = count;
    }

    pub(crate) fn set_message(&mut self, message: String) {
        self.message = message;
    }

    /// Column metadata.
    #[must_use]
    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    /// Column names in order.
    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|c| c.name.as_str())
    }

    /// All rows.
    #[must_use]
    pub fn rows(&self) -> &[Vec<SqlValue>] {
        &self.rows
    }

    /// Number of rows.
    #[must_use]
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Whether the result set has no rows.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Return status of the procedure that produced this result, if any.
    #[must_use]
    pub fn return_value(&self) -> Option<i32> {
        self.return_value
    }

    /// Rows affected by the statement, `-1` when the server did not say.
    #[must_use]
    pub fn rows_affected(&self) -> i64 {
        self.rows_affected
    }

    /// Server messages delivered while this result set was read.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Value at `row`, `col`.
    #[must_use]
    pub fn value(&self, row: usize, col: usize) -> Option<&SqlValue> {
        self.rows.get(row).and_then(|r| r.get(col))
    }

    /// Index of the row the cursor points at.
    #[must_use]
    pub fn current_row(&self) -> Option<usize> {
        self.cursor
    }

    /// Whether another row follows the cursor.
    #[must_use]
    pub fn has_next(&self) -> bool {
        self.cursor.map_or(0, |c| c + 1) < self.rows.len()
    }

    /// Move the cursor to the next row. Returns `false`, leaving the cursor
    /// where it is, when there is none.
    #[allow(clippy::should_implement_trait)]
    pub fn next(&mut self) -> bool {
        if !self.has_next() {
            return false;
        }
        self.cursor = Some(self.cursor.map_or(0, |c| c + 1));
        true
    }

    /// Number of values the last scan assigned.
    #[must_use]
    pub fn scan_count(&self) -> usize {
        self.scan_count
    }

    /// Index of the column named exactly `name`.
    pub fn find_column(&self, name: &str) -> Result<usize> {
        self.columns
            .iter()
            .position(|c| c.name == name)
            .ok_or_else(|| Error::ColumnNotFound(name.to_string()))
    }

    /// Copy the current row into `dest`.
    ///
    /// A single destination that is a [`Record`] is filled by column name and
    /// unmatched columns are skipped. Otherwise values are assigned in column
    /// order, and there may be fewer destinations than columns but not more.
    pub fn scan(&mut self, dest: &mut [&mut dyn ScanTarget]) -> Result<()> {
        self.scan_count = 0;
        let row = self
            .cursor
            .and_then(|c| self.rows.get(c))
            .ok_or(Error::NoCurrentRow)?;

        if let [single] = &mut *dest {
            if let Some(record) = single.as_record() {
                self.scan_count = scan_record(&self.columns, row, record)?;
                return Ok(());
            }
        }

        if dest.len() > row.len() {
            return Err(Error::TooManyDestinations {
                destinations: dest.len(),
                columns: row.len(),
            });
        }
        for (target, value) in dest.iter_mut().zip(row) {
            target.assign(value)?;
        }
        self.scan_count = dest.len();
        Ok(())
    }

    /// [`scan`](Self::scan), then fail unless exactly `expected` values were
    /// assigned.
    pub fn must_scan(&mut self, expected: usize, dest: &mut [&mut dyn ScanTarget]) -> Result<()> {
        self.scan(dest)?;
        if self.scan_count != expected {
            return Err(Error::ScanCount {
                expected,
                actual: self.scan_count,
            });
        }
        Ok(())
    }

    /// Copy the value of column `name` in the current row into `dest`.
    pub fn scan_column(&self, name: &str, dest: &mut dyn ScanTarget) -> Result<()> {
        let row = self.current().ok_or(Error::NoCurrentRow)?;
        let index = self.find_column(name)?;
        dest.assign(&row[index])?;
        Ok(())
    }

    /// Values of the row the cursor points at.
    #[must_use]
    pub fn current(&self) -> Option<&[SqlValue]> {
        self.cursor
            .and_then(|c| self.rows.get(c))
            .map(Vec::as_slice)
    }

    /// Value of column `index` in the current row.
    pub fn get<T: FromSql>(&self, index: usize) -> Result<T> {
        let row = self.current().ok_or(Error::NoCurrentRow)?;
        let value = row
            .get(index)
            .ok_or_else(|| Error::ColumnNotFound(format!("#{index}")))?;
        Ok(T::from_sql(value)?)
    }

    /// Value of column `name` in the current row.
    pub fn get_by_name<T: FromSql>(&self, name: &str) -> Result<T> {
        let index = self.find_column(name)?;
        self.get(index)
    }

    /// Value of column `index` in the current row, `None` if NULL, missing
    /// or not convertible.
    #[must_use]
    pub fn try_get<T: FromSql>(&self, index: usize) -> Option<T> {
        self.current()
            .and_then(|row| row.get(index))
            .and_then(|v| T::from_sql_nullable(v).ok().flatten())
    }
}

fn scan_record(columns: &[Column], row: &[SqlValue], record: &mut dyn Record) -> Result<usize> {
    let mut assigned = 0;
    for (column, value) in columns.iter().zip(row) {
        if record.assign_column(&column.name, value)? {
            assigned += 1;
        }
    }
    Ok(assigned)
}
