//! Reading result sets off a transport.

use mssql_types::{WireType, codec};
use tds_transport::{ColumnBinding, RowStatus, Transport};

use crate::diagnostics::Diagnostics;
use crate::error::{Error, Result};
use crate::result::{Column, ResultSet};

/// Read every pending result set of the last command.
///
/// Fails if a row fetch fails or if the library reported an error while
/// the results were read.
pub(crate) async fn fetch_results(
    transport: &mut dyn Transport,
    diagnostics: &Diagnostics,
) -> Result<Vec<ResultSet>> {
    let mut results = Vec::new();

    loop {
        diagnostics.begin_result();
        let more = transport
            .next_result_set()
            .await
            .map_err(|e| diagnostics.server_error(e))?;
        if !more {
            diagnostics.finish_result();
            break;
        }

        let columns = bind_columns(transport, diagnostics)?;
        let mut result = ResultSet::new(columns);
        read_rows(transport, diagnostics, &mut result).await?;

        result.set_rows_affected(transport.rows_affected());
        result.set_return_value(transport.return_status());
        result.set_message(diagnostics.finish_result());
        results.push(result);
    }

    if diagnostics.has_error() {
        return Err(diagnostics.server_error("dbresults failed"));
    }
    tracing::trace!(result_sets = results.len(), "fetched results");
    Ok(results)
}

fn bind_columns(transport: &mut dyn Transport, diagnostics: &Diagnostics) -> Result<Vec<Column>> {
    let count = transport.column_count();
    let mut columns = Vec::with_capacity(count);

    for index in 0..count {
        let info = transport
            .column(index)
            .map_err(|e| diagnostics.server_error(e))?;
        let declared = WireType::from_code(info.type_code);
        let size = match declared {
            WireType::UniqueIdentifier => 36,
            WireType::Decimal | WireType::Numeric => 8,
            _ => info.size,
        };
        let bind_type = declared.bind_type();
        let binding = ColumnBinding {
            type_code: bind_type.code(),
            buffer_len: usize::try_from(size).unwrap_or(0) + 1,
            variable: declared.is_max_size(size),
        };
        transport
            .bind_column(index, binding)
            .map_err(|e| diagnostics.server_error(e))?;
        columns.push(Column::new(info.name, size, bind_type));
    }

    Ok(columns)
}

async fn read_rows(
    transport: &mut dyn Transport,
    diagnostics: &Diagnostics,
    result: &mut ResultSet,
) -> Result<()> {
    loop {
        match transport.next_row().await {
            RowStatus::Row => {
                let mut row = Vec::with_capacity(result.columns().len());
                for (index, column) in result.columns().iter().enumerate() {
                    let data = transport
                        .column_data(index)
                        .map_err(|e| diagnostics.server_error(e))?;
                    row.push(codec::decode_nullable(column.wire_type, data.as_deref())?);
                }
                result.push_row(row);
            }
            RowStatus::NoMoreRows => return Ok(()),
            RowStatus::BufferFull => {
                return Err(diagnostics.server_error("dbnextrow failed: Buffer Full"));
            }
            RowStatus::Failed => return Err(diagnostics.server_error("dbnextrow failed: Failure")),
            RowStatus::Other(kind) => {
                tracing::trace!(kind, "skipping non-regular row");
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Arc;

    use mssql_testing::{MockResultSet, MockServer, Reply};
    use mssql_types::SqlValue;
    use tds_transport::{Connector, DiagnosticSink, LoginParams, callbacks};

    use super::*;

    async fn run(server: &MockServer, sql: &str) -> (Result<Vec<ResultSet>>, Arc<Diagnostics>) {
        let mut transport = server
            .login(&LoginParams::new("srv", "sa", "pwd"))
            .await
            .unwrap();
        let diagnostics = Arc::new(Diagnostics::new());
        let sink: std::sync::Weak<dyn DiagnosticSink> =
            Arc::downgrade(&(Arc::clone(&diagnostics) as Arc<dyn DiagnosticSink>));
        callbacks::register(transport.handle_id(), sink);
        transport.submit_command(sql).unwrap();
        transport.execute().await.unwrap();
        let results = fetch_results(transport.as_mut(), &diagnostics).await;
        callbacks::unregister(transport.handle_id());
        (results, diagnostics)
    }

    #[tokio::test]
    async fn test_columns_are_bound_by_bind_type() {
        let server = MockServer::new();
        server.on(
            "from accounts",
            Reply::result(
                MockResultSet::new()
                    .column("id", WireType::UniqueIdentifier, 16)
                    .column("balance", WireType::Decimal, 17)
                    .column("photo", WireType::Image, 64_512)
                    .row([
                        SqlValue::String("6F9619FF-8B86-D011-B42D-00C04FC964FF".into()),
                        SqlValue::Float(12.5),
                        SqlValue::Binary(vec![1u8, 2, 3].into()),
                    ]),
            ),
        );

        let (results, _) = run(&server, "select * from accounts").await;
        let results = results.unwrap();
        let rs = &results[0];
        assert_eq!(rs.columns()[0].size, 36);
        assert_eq!(rs.columns()[0].wire_type, WireType::Char);
        assert_eq!(rs.columns()[1].size, 8);
        assert_eq!(rs.columns()[1].wire_type, WireType::Float);
        assert_eq!(rs.value(0, 1), Some(&SqlValue::Float(12.5)));
        assert_eq!(
            rs.value(0, 2),
            Some(&SqlValue::Binary(vec![1u8, 2, 3].into()))
        );
    }

    #[tokio::test]
    async fn test_statement_without_rows_still_yields_a_result() {
        let server = MockServer::new();
        server.on(
            "update authors",
            Reply::result(MockResultSet::new().rows_affected(3)),
        );
        let (results, _) = run(&server, "update authors set contract = 1").await;
        let results = results.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].rows_affected(), 3);
        assert!(results[0].columns().is_empty());
    }

    #[tokio::test]
    async fn test_buffer_full_is_an_error() {
        let server = MockServer::new();
        server.on(
            "from big",
            Reply::result(
                MockResultSet::new()
                    .column("n", WireType::Int, 4)
                    .row([SqlValue::Int(1)])
                    .then_row_status(RowStatus::BufferFull),
            ),
        );
        let (results, _) = run(&server, "select n from big").await;
        match results {
            Err(Error::Server { context, .. }) => {
                assert_eq!(context, "dbnextrow failed: Buffer Full");
            }
            other => unreachable!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_messages_attach_to_their_result_set() {
        let server = MockServer::new();
        server.on(
            "print",
            Reply::results([
                MockResultSet::new().message(tds_transport::ServerMessage::new(0, 0, "first")),
                MockResultSet::new().message(tds_transport::ServerMessage::new(0, 0, "second")),
            ]),
        );
        let (results, diagnostics) = run(&server, "print 'first' print 'second'").await;
        let results = results.unwrap();
        assert!(results[0].message().contains("first"));
        assert!(!results[0].message().contains("second"));
        assert!(results[1].message().contains("second"));
        assert_eq!(diagnostics.message_count(0), 2);
    }

    #[tokio::test]
    async fn test_late_library_error_fails_the_fetch() {
        let server = MockServer::new();
        server.on(
            "select 1",
            Reply::result(MockResultSet::new().column("n", WireType::Int, 4).row([SqlValue::Int(1)]))
                .with_late_error(tds_transport::LibraryError::new(20004, 9, "Read from SQL server failed.")),
        );
        let (results, diagnostics) = run(&server, "select 1").await;
        assert!(matches!(results, Err(Error::Server { .. })));
        assert!(diagnostics.error_text().contains("Read from SQL server failed."));
    }
}
