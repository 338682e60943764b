//! Statements with `?` placeholders, run through `sp_executesql`.
//!
//! ```text
//! select * from authors where au_lname = ? and contract = ?
//! ```
//!
//! becomes
//!
//! ```text
//! exec sp_executesql N'select * from authors where au_lname = @p1 and contract = @p2;
//!    select cast(coalesce(scope_identity(), -1) as bigint) last_insert_id,
//!           cast(@@rowcount as bigint) rows_affected
//! ', N'@p1 nvarchar (5), @p2 bit', @p1=N'White', @p2=1
//! ```
//!
//! The trailing select is the status row; [`StatusRow::from_results`] reads it
//! back.

use std::fmt::Write as _;

use mssql_types::{SqlValue, ToSql, TypeError};
use tracing::Instrument;

use crate::error::{Error, Result};
use crate::instrumentation;
use crate::result::ResultSet;
use crate::session::Session;

const STATUS_ROW: &str = ";
   select cast(coalesce(scope_identity(), -1) as bigint) last_insert_id,
          cast(@@rowcount as bigint) rows_affected
";

/// Identity and row count reported by the status row of an
/// [`execute_sql`](Session::execute_sql) call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatusRow {
    /// Identity generated by the statement, if any.
    pub last_insert_id: Option<i64>,
    /// Rows affected by the statement, if reported.
    pub rows_affected: Option<i64>,
}

impl StatusRow {
    /// Read the status row from the last result set.
    #[must_use]
    pub fn from_results(results: &[ResultSet]) -> Self {
        let Some(last) = results.last() else {
            return Self::default();
        };
        let value = |column: &str| {
            let index = last.find_column(column).ok()?;
            match last.value(0, index)? {
                SqlValue::BigInt(v) if *v != -1 => Some(*v),
                _ => None,
            }
        };
        Self {
            last_insert_id: value("last_insert_id"),
            rows_affected: value("rows_affected"),
        }
    }
}

/// Replace each `?` with `@p1`, `@p2`, ... and double single quotes.
///
/// Returns the statement and the number of placeholders.
#[must_use]
pub fn rewrite_placeholders(query: &str) -> (String, usize) {
    let mut statement = String::with_capacity(query.len() + 8);
    let mut count = 0;
    for (i, part) in query.split('?').enumerate() {
        if i > 0 {
            count += 1;
            let _ = write!(statement, "@p{count}");
        }
        statement.push_str(part);
    }
    (quote(&statement), count)
}

fn quote(s: &str) -> String {
    s.replace('\'', "''")
}

/// Literal for a floating point argument. Values outside a plain decimal's
/// comfortable range use exponent notation, since the server caps decimal
/// literals at 38 digits.
fn float_literal(target: &'static str, v: f64, plain: String, scientific: String) -> Result<String> {
    if !v.is_finite() {
        return Err(TypeError::OutOfRange {
            target,
            value: plain,
        }
        .into());
    }
    if v != 0.0 && !(1e-6..1e15).contains(&v.abs()) {
        Ok(scientific)
    } else {
        Ok(plain)
    }
}

/// Declaration and literal for one argument.
fn declare(value: &SqlValue) -> Result<(String, String)> {
    Ok(match value {
        SqlValue::TinyInt(v) => ("tinyint".into(), v.to_string()),
        SqlValue::SmallInt(v) => ("smallint".into(), v.to_string()),
        SqlValue::Int(v) => ("int".into(), v.to_string()),
        SqlValue::BigInt(v) => ("bigint".into(), v.to_string()),
        SqlValue::Real(v) => (
            "real".into(),
            float_literal("real", f64::from(*v), v.to_string(), format!("{v:e}"))?,
        ),
        SqlValue::Float(v) => (
            "float".into(),
            float_literal("float", *v, v.to_string(), format!("{v:e}"))?,
        ),
        SqlValue::Bool(v) => ("bit".into(), u8::from(*v).to_string()),
        SqlValue::Binary(b) => {
            let mut hex = String::with_capacity(2 + b.len() * 2);
            hex.push_str("0x");
            for byte in b.iter() {
                let _ = write!(hex, "{byte:02x}");
            }
            (format!("varbinary ({})", b.len().max(1)), hex)
        }
        SqlValue::DateTime(dt) => {
            let text = dt.format("%Y-%m-%dT%H:%M:%S%.3f").to_string();
            (format!("nvarchar ({})", text.len()), format!("N'{text}'"))
        }
        SqlValue::Null => ("nvarchar (1)".into(), "NULL".into()),
        SqlValue::String(s) => (
            format!("nvarchar ({})", s.chars().count().max(1)),
            format!("N'{}'", quote(s)),
        ),
    })
}

/// Build the `sp_executesql` batch for `query` with `args`.
pub fn render(query: &str, args: &[SqlValue]) -> Result<String> {
    let (mut statement, expected) = rewrite_placeholders(query);
    if expected != args.len() {
        return Err(Error::ParameterCount {
            expected,
            actual: args.len(),
        });
    }
    statement.push_str(STATUS_ROW);
    if args.is_empty() {
        return Ok(format!("exec sp_executesql N'{statement}'"));
    }

    let mut definitions = Vec::with_capacity(args.len());
    let mut values = Vec::with_capacity(args.len());
    for (i, arg) in args.iter().enumerate() {
        let (sql_type, literal) = declare(arg)?;
        definitions.push(format!("@p{} {sql_type}", i + 1));
        values.push(format!("@p{}={literal}", i + 1));
    }
    Ok(format!(
        "exec sp_executesql N'{statement}', N'{}', {}",
        definitions.join(", "),
        values.join(", ")
    ))
}

impl Session {
    /// Run `query` with `?` placeholders bound to `params`.
    ///
    /// The last result set is the status row; see [`StatusRow`].
    ///
    /// ```rust,ignore
    /// let results = session
    ///     .execute_sql("update authors set contract = ? where au_id = ?", &[&true, &"172-32-1176"])
    ///     .await?;
    /// let status = StatusRow::from_results(&results);
    /// ```
    pub async fn execute_sql(
        &mut self,
        query: &str,
        params: &[&(dyn ToSql + Sync)],
    ) -> Result<Vec<ResultSet>> {
        let args = params
            .iter()
            .map(|p| p.to_sql())
            .collect::<std::result::Result<Vec<_>, TypeError>>()?;
        let sql = render(query, &args)?;
        let span = instrumentation::execute_span(&self.credentials, query);
        self.exec(&sql).instrument(span).await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use mssql_types::WireType;
    use proptest::prelude::*;

    use super::*;
    use crate::result::Column;

    #[test]
    fn test_placeholders_are_numbered() {
        let (statement, count) = rewrite_placeholders("select * from t where a = ? and b = ?");
        assert_eq!(statement, "select * from t where a = @p1 and b = @p2");
        assert_eq!(count, 2);
        assert_eq!(rewrite_placeholders("select 'it''s'"), ("select ''it''''s''".into(), 0));
    }

    #[test]
    fn test_argument_count_must_match() {
        assert!(matches!(
            render("select ?", &[]),
            Err(Error::ParameterCount {
                expected: 1,
                actual: 0
            })
        ));
        assert!(matches!(
            render("select 1", &[SqlValue::Int(1)]),
            Err(Error::ParameterCount {
                expected: 0,
                actual: 1
            })
        ));
    }

    #[test]
    fn test_render_without_arguments() {
        let sql = render("select 1", &[]).unwrap();
        assert!(sql.starts_with("exec sp_executesql N'select 1;"));
        assert!(sql.contains("as bigint) rows_affected"));
        assert!(sql.ends_with("'"));
    }

    #[test]
    fn test_render_declares_each_argument() {
        let sql = render(
            "select * from authors where au_lname = ? and contract = ? and id > ?",
            &[
                SqlValue::String("O'Leary".into()),
                SqlValue::Bool(true),
                SqlValue::TinyInt(7),
            ],
        )
        .unwrap();
        assert!(sql.contains("N'@p1 nvarchar (7), @p2 bit, @p3 tinyint'"));
        assert!(sql.ends_with("@p1=N'O''Leary', @p2=1, @p3=7"));
    }

    #[test]
    fn test_declare_binary_and_numbers() {
        assert_eq!(
            declare(&SqlValue::Binary(vec![0xde, 0xad].into())).unwrap(),
            ("varbinary (2)".into(), "0xdead".into())
        );
        assert_eq!(declare(&SqlValue::BigInt(-5)).unwrap(), ("bigint".into(), "-5".into()));
        assert_eq!(declare(&SqlValue::String(String::new())).unwrap().0, "nvarchar (1)");
    }

    #[test]
    fn test_float_literals_stay_valid() {
        assert_eq!(declare(&SqlValue::Float(2.5)).unwrap(), ("float".into(), "2.5".into()));
        assert_eq!(declare(&SqlValue::Float(0.0)).unwrap().1, "0");
        assert_eq!(declare(&SqlValue::Float(1e300)).unwrap().1, "1e300");
        assert_eq!(declare(&SqlValue::Float(-2.5e-9)).unwrap().1, "-2.5e-9");
        assert_eq!(declare(&SqlValue::Real(0.5)).unwrap(), ("real".into(), "0.5".into()));

        for v in [f64::NAN, f64::INFINITY, f64::NEG_INFINITY] {
            assert!(matches!(
                declare(&SqlValue::Float(v)),
                Err(Error::Type(TypeError::OutOfRange { target: "float", .. }))
            ));
        }
        assert!(matches!(
            render("select ?", &[SqlValue::Real(f32::NAN)]),
            Err(Error::Type(TypeError::OutOfRange { target: "real", .. }))
        ));
    }

    #[test]
    fn test_status_row() {
        let mut status = ResultSet::new(vec![
            Column::new("last_insert_id", 8, WireType::BigInt),
            Column::new("rows_affected", 8, WireType::BigInt),
        ]);
        status.push_row(vec![SqlValue::BigInt(-1), SqlValue::BigInt(3)]);
        let row = StatusRow::from_results(&[ResultSet::default(), status]);
        assert_eq!(row.last_insert_id, None);
        assert_eq!(row.rows_affected, Some(3));
        assert_eq!(StatusRow::from_results(&[]), StatusRow::default());
    }

    proptest! {
        #[test]
        fn placeholder_count_matches_question_marks(query in "[a-z ?'=,]{0,64}") {
            let (statement, count) = rewrite_placeholders(&query);
            prop_assert_eq!(count, query.matches('?').count());
            prop_assert!(!statement.contains('?'));
            prop_assert_eq!(statement.matches('\'').count(), query.matches('\'').count() * 2);
        }
    }
}
