//! Tracing spans for session operations.
//!
//! Every batch, procedure call and login runs inside a `tracing` span named
//! after [`span_names`]. Spans carry the database system, the target host and
//! database, the statement kind and, for batches, the statement text with its
//! literals masked.
//!
//! ```text
//! mssql.query{db.system="mssql" server.address="db1" db.operation="SELECT"
//!             db.statement="select * from authors where au_id = ?"}
//! ```

use tracing::Span;

use crate::config::Credentials;

/// Value of the `db.system` field.
pub const DB_SYSTEM: &str = "mssql";

/// Span names.
pub mod span_names {
    /// Opening a session.
    pub const CONNECT: &str = "mssql.connect";
    /// Running a batch.
    pub const QUERY: &str = "mssql.query";
    /// Running a `?` placeholder statement.
    pub const EXECUTE: &str = "mssql.execute";
    /// Calling a stored procedure.
    pub const CALL_PROCEDURE: &str = "mssql.call_procedure";
    /// `begin transaction`.
    pub const BEGIN_TRANSACTION: &str = "mssql.begin_transaction";
    /// `commit transaction`.
    pub const COMMIT: &str = "mssql.commit";
    /// `rollback transaction`.
    pub const ROLLBACK: &str = "mssql.rollback";
}

/// Longest statement text recorded on a span, in bytes.
const MAX_STATEMENT_LEN: usize = 2048;

/// Statement text as it appears on a span: literals replaced by `?`, cut to
/// [`MAX_STATEMENT_LEN`].
#[must_use]
pub fn sanitize(sql: &str) -> String {
    truncate(&mask_literals(sql, "?"), MAX_STATEMENT_LEN)
}

/// Replace quoted strings and standalone numbers with `placeholder`.
///
/// Doubled quotes inside a string are part of the string. Digits that
/// continue an identifier (`@p1`, `table2`) are kept.
fn mask_literals(sql: &str, placeholder: &str) -> String {
    let mut out = String::with_capacity(sql.len());
    let mut chars = sql.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '\'' | '"' => {
                loop {
                    match chars.next() {
                        Some(q) if q == c && chars.peek() == Some(&c) => {
                            chars.next();
                        }
                        Some(q) if q == c => break,
                        Some(_) => {}
                        None => break,
                    }
                }
                out.push_str(placeholder);
            }
            '0'..='9' if !out.ends_with(|p: char| p.is_alphanumeric() || p == '_' || p == '@') => {
                while chars.next_if(|d| d.is_ascii_digit() || *d == '.').is_some() {}
                out.push_str(placeholder);
            }
            _ => out.push(c),
        }
    }

    out
}

/// Cut `s` to at most `max_len` bytes on a character boundary, marking the
/// cut with `...`.
fn truncate(s: &str, max_len: usize) -> String {
    if s.len() <= max_len {
        return s.to_string();
    }
    let mut end = max_len.saturating_sub(3);
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &s[..end])
}

const OPERATIONS: [(&str, &str); 12] = [
    ("SELECT", "SELECT"),
    ("INSERT", "INSERT"),
    ("UPDATE", "UPDATE"),
    ("DELETE", "DELETE"),
    ("EXEC", "EXECUTE"),
    ("BEGIN TRAN", "BEGIN"),
    ("COMMIT", "COMMIT"),
    ("ROLLBACK", "ROLLBACK"),
    ("IF @@TRANCOUNT > 0 ROLLBACK", "ROLLBACK"),
    ("CREATE", "CREATE"),
    ("ALTER", "ALTER"),
    ("DROP", "DROP"),
];

/// Statement kind recorded as `db.operation`.
#[must_use]
pub fn extract_operation(sql: &str) -> &'static str {
    let head: String = sql.trim_start().chars().take(32).collect::<String>().to_uppercase();
    OPERATIONS
        .iter()
        .find(|(prefix, _)| head.starts_with(prefix))
        .map_or("OTHER", |(_, operation)| *operation)
}

/// Span for a login attempt.
pub(crate) fn connect_span(credentials: &Credentials) -> Span {
    tracing::debug_span!(
        span_names::CONNECT,
        db.system = DB_SYSTEM,
        server.address = %credentials.host,
        db.name = ?credentials.database,
    )
}

/// Span for a batch.
pub(crate) fn query_span(credentials: &Credentials, sql: &str) -> Span {
    let operation = extract_operation(sql);
    let span_name = match operation {
        "BEGIN" => span_names::BEGIN_TRANSACTION,
        "COMMIT" => span_names::COMMIT,
        "ROLLBACK" => span_names::ROLLBACK,
        _ => span_names::QUERY,
    };
    tracing::debug_span!(
        span_names::QUERY,
        otel.name = span_name,
        db.system = DB_SYSTEM,
        server.address = %credentials.host,
        db.operation = operation,
        db.statement = %sanitize(sql),
    )
}

/// Span for a `?` placeholder statement. Records the statement as written,
/// before arguments are inlined.
pub(crate) fn execute_span(credentials: &Credentials, query: &str) -> Span {
    tracing::debug_span!(
        span_names::EXECUTE,
        db.system = DB_SYSTEM,
        server.address = %credentials.host,
        db.operation = extract_operation(query),
        db.statement = %sanitize(query),
    )
}

/// Span for a procedure call.
pub(crate) fn procedure_span(credentials: &Credentials, name: &str) -> Span {
    tracing::debug_span!(
        span_names::CALL_PROCEDURE,
        db.system = DB_SYSTEM,
        server.address = %credentials.host,
        db.operation = "EXECUTE",
        db.procedure = name,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_masks_string_and_number_literals() {
        assert_eq!(
            sanitize("select * from authors where au_lname = 'O''Leary' and age > 42"),
            "select * from authors where au_lname = ? and age > ?"
        );
        assert_eq!(
            sanitize("exec sp_executesql N'select @p1', N'@p1 int', @p1=12.5"),
            "exec sp_executesql N?, N?, @p1=?"
        );
    }

    #[test]
    fn test_identifier_digits_are_kept() {
        assert_eq!(sanitize("select col2 from t1"), "select col2 from t1");
    }

    #[test]
    fn test_unterminated_string_is_masked() {
        assert_eq!(mask_literals("select 'abc", "?"), "select ?");
    }

    #[test]
    fn test_truncation_respects_char_boundaries() {
        assert_eq!(truncate("select 1", 8), "select 1");
        assert_eq!(truncate("select ééé", 8), "selec...");
        assert_eq!(truncate("ééééé", 6), "é...");
    }

    #[test]
    fn test_long_statements_are_cut() {
        let sql = format!("select {} from authors", "au_lname, ".repeat(400));
        let recorded = sanitize(&sql);
        assert_eq!(recorded.len(), MAX_STATEMENT_LEN);
        assert!(recorded.ends_with("..."));
    }

    #[test]
    fn test_extract_operation() {
        assert_eq!(extract_operation("  select 1"), "SELECT");
        assert_eq!(extract_operation("exec sp_who"), "EXECUTE");
        assert_eq!(extract_operation("EXECUTE sp_who"), "EXECUTE");
        assert_eq!(extract_operation("begin transaction"), "BEGIN");
        assert_eq!(extract_operation("if @@trancount > 0 rollback transaction"), "ROLLBACK");
        assert_eq!(extract_operation("set lock_timeout 5"), "OTHER");
    }
}
