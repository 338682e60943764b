//! The session side of the mock server.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use bytes::{BufMut, Bytes, BytesMut};
use mssql_types::{EncodeOptions, SqlValue, WireType, codec};
use tds_transport::{
    ColumnBinding, ColumnInfo, HandleId, LibraryError, OutputParam, RowStatus, RpcParam,
    ServerMessage, Transport, TransportError, callbacks,
};

use crate::result::MockResultSet;
use crate::script::{ProcedureReply, Reply, RpcCall};
use crate::server::{CallOutcome, MSG_MIRROR_DATABASE, MockServer, Outcome};

const MSG_GENERAL_ERROR: i32 = 20018;
const MSG_DEAD_PROCESS: i32 = 20047;
const MSG_NO_PROCEDURE: i32 = 2812;

/// One open session on a [`MockServer`].
pub struct MockTransport {
    server: MockServer,
    handle: HandleId,
    host: String,
    database: Option<String>,
    dead: Arc<AtomicBool>,
    closed: bool,
    command: String,
    pending: VecDeque<MockResultSet>,
    current: Option<MockResultSet>,
    row: Option<usize>,
    trailing_sent: bool,
    bindings: Vec<Option<ColumnBinding>>,
    late_error: Option<LibraryError>,
    final_status: Option<i32>,
    return_status: Option<i32>,
    rpc: Option<RpcCall>,
    outputs: Vec<OutputParam>,
}

impl MockTransport {
    pub(crate) fn new(
        server: MockServer,
        handle: HandleId,
        host: String,
        database: Option<String>,
        dead: Arc<AtomicBool>,
    ) -> Self {
        Self {
            server,
            handle,
            host,
            database,
            dead,
            closed: false,
            command: String::new(),
            pending: VecDeque::new(),
            current: None,
            row: None,
            trailing_sent: false,
            bindings: Vec::new(),
            late_error: None,
            final_status: None,
            return_status: None,
            rpc: None,
            outputs: Vec::new(),
        }
    }

    fn ensure_alive(&self) -> Result<(), TransportError> {
        if self.is_dead() {
            callbacks::report_error(
                Some(self.handle),
                &LibraryError::new(MSG_DEAD_PROCESS, 1, "DBPROCESS is dead or not enabled"),
            );
            return Err(TransportError::Dead);
        }
        Ok(())
    }

    /// Report a server error the way the library does: the message, then
    /// the generic library error pointing at it.
    fn report_failure(&self, message: &ServerMessage) {
        callbacks::report_message(Some(self.handle), message);
        callbacks::report_error(
            Some(self.handle),
            &LibraryError::new(
                MSG_GENERAL_ERROR,
                message.severity,
                "General SQL Server error: Check messages from the SQL Server",
            ),
        );
    }

    fn mirror_message(&self) -> ServerMessage {
        let database = self.database.as_deref().unwrap_or("master");
        ServerMessage::new(
            MSG_MIRROR_DATABASE,
            14,
            format!(
                "The database \"{database}\" cannot be opened. It is acting as a mirror database."
            ),
        )
        .server(self.host.clone())
    }

    fn reset_results(&mut self) {
        self.pending.clear();
        self.current = None;
        self.row = None;
        self.bindings.clear();
        self.late_error = None;
        self.final_status = None;
        self.return_status = None;
        self.outputs.clear();
    }

    fn start(&mut self, reply: Reply) -> Result<(), TransportError> {
        if reply.disconnect {
            self.dead.store(true, Ordering::Release);
            return self.ensure_alive();
        }
        if let Some(message) = &reply.failure {
            self.report_failure(message);
            return Err(TransportError::Failed("dbsqlexec"));
        }
        self.pending = reply.results.into();
        self.late_error = reply.late_error;
        Ok(())
    }

    fn answer_call(&mut self, call: &RpcCall, reply: ProcedureReply) -> Result<(), TransportError> {
        if let Some(message) = &reply.error {
            self.report_failure(message);
            return Err(TransportError::Failed("dbrpcsend"));
        }
        let mut outputs = Vec::new();
        for (name, value) in &reply.outputs {
            let Some(param) = call.params.iter().find(|p| p.output && p.name.eq_ignore_ascii_case(name)) else {
                continue;
            };
            let wire = WireType::from_code(param.type_code);
            outputs.push(OutputParam {
                name: param.name.clone(),
                type_code: param.type_code,
                data: cell_bytes(wire, value)?,
            });
        }
        self.pending = reply.results.into();
        self.final_status = reply.return_status;
        self.outputs = outputs;
        Ok(())
    }

    fn current_value(&self, index: usize) -> Result<&SqlValue, TransportError> {
        static NULL: SqlValue = SqlValue::Null;
        let current = self.current.as_ref().ok_or(TransportError::Row("no current result"))?;
        let row = self
            .row
            .and_then(|r| current.rows.get(r))
            .ok_or(TransportError::Row("no current row"))?;
        Ok(row.get(index).unwrap_or(&NULL))
    }
}

/// The bytes a bound column or output parameter delivers for `value`.
///
/// Binary data carries one trailing pad byte. Text is NUL terminated.
fn cell_bytes(wire: WireType, value: &SqlValue) -> Result<Option<Bytes>, TransportError> {
    if value.is_null() {
        return Ok(None);
    }
    let fixed = matches!(
        wire,
        WireType::TinyInt
            | WireType::SmallInt
            | WireType::Int
            | WireType::BigInt
            | WireType::Real
            | WireType::Float
            | WireType::Bit
            | WireType::BitN
            | WireType::Money
            | WireType::SmallMoney
            | WireType::DateTime
            | WireType::SmallDateTime
    );
    if fixed || wire.is_binary() {
        let encoded = codec::encode(wire, value, EncodeOptions::default())
            .map_err(|_| TransportError::Failed("dbconvert"))?;
        return Ok(encoded.data);
    }
    let text = match value {
        SqlValue::String(s) => s.clone(),
        other => other.to_string(),
    };
    let mut buf = BytesMut::with_capacity(text.len() + 1);
    buf.put_slice(text.as_bytes());
    buf.put_u8(0);
    Ok(Some(buf.freeze()))
}

#[async_trait]
impl Transport for MockTransport {
    fn handle_id(&self) -> HandleId {
        self.handle
    }

    fn submit_command(&mut self, sql: &str) -> Result<(), TransportError> {
        self.ensure_alive()?;
        self.command = sql.to_string();
        Ok(())
    }

    async fn execute(&mut self) -> Result<(), TransportError> {
        self.ensure_alive()?;
        self.reset_results();
        let sql = std::mem::take(&mut self.command);
        match self.server.run_batch(&self.host, &sql) {
            Outcome::Mirror => {
                let message = self.mirror_message();
                self.report_failure(&message);
                Err(TransportError::Failed("dbsqlexec"))
            }
            Outcome::Results(reply) => self.start(reply),
        }
    }

    async fn next_result_set(&mut self) -> Result<bool, TransportError> {
        self.ensure_alive()?;
        if let Some(error) = self.late_error.take() {
            callbacks::report_error(Some(self.handle), &error);
        }
        self.row = None;
        self.trailing_sent = false;
        self.current = self.pending.pop_front();
        match &self.current {
            Some(result) => {
                for message in &result.messages {
                    callbacks::report_message(Some(self.handle), message);
                }
                self.bindings = vec![None; result.columns.len()];
                self.return_status = result.return_status;
                Ok(true)
            }
            None => {
                self.bindings.clear();
                self.return_status = self.final_status;
                Ok(false)
            }
        }
    }

    fn column_count(&self) -> usize {
        self.current.as_ref().map_or(0, |r| r.columns.len())
    }

    fn column(&self, index: usize) -> Result<ColumnInfo, TransportError> {
        let count = self.column_count();
        self.current
            .as_ref()
            .and_then(|r| r.columns.get(index))
            .cloned()
            .ok_or(TransportError::InvalidColumn { index, count })
    }

    fn bind_column(&mut self, index: usize, binding: ColumnBinding) -> Result<(), TransportError> {
        let count = self.bindings.len();
        let slot = self
            .bindings
            .get_mut(index)
            .ok_or(TransportError::InvalidColumn { index, count })?;
        *slot = Some(binding);
        Ok(())
    }

    async fn next_row(&mut self) -> RowStatus {
        if self.is_dead() {
            return RowStatus::Failed;
        }
        let Some(current) = &self.current else {
            return RowStatus::NoMoreRows;
        };
        let next = self.row.map_or(0, |r| r + 1);
        if next < current.rows.len() {
            self.row = Some(next);
            return RowStatus::Row;
        }
        match current.trailing_status {
            Some(status) if !self.trailing_sent => {
                self.trailing_sent = true;
                status
            }
            _ => RowStatus::NoMoreRows,
        }
    }

    fn column_data(&self, index: usize) -> Result<Option<Bytes>, TransportError> {
        let count = self.bindings.len();
        let binding = self
            .bindings
            .get(index)
            .copied()
            .flatten()
            .ok_or(TransportError::InvalidColumn { index, count })?;
        let value = self.current_value(index)?;
        cell_bytes(WireType::from_code(binding.type_code), value)
    }

    fn rows_affected(&self) -> i64 {
        self.current.as_ref().map_or(-1, MockResultSet::affected)
    }

    fn return_status(&self) -> Option<i32> {
        self.return_status
    }

    fn init_rpc(&mut self, name: &str) -> Result<(), TransportError> {
        self.ensure_alive()?;
        self.rpc = Some(RpcCall {
            name: name.to_string(),
            params: Vec::new(),
        });
        Ok(())
    }

    fn bind_rpc_param(&mut self, param: RpcParam) -> Result<(), TransportError> {
        self.ensure_alive()?;
        let call = self.rpc.as_mut().ok_or(TransportError::Failed("dbrpcparam"))?;
        call.params.push(param);
        Ok(())
    }

    fn reset_rpc(&mut self) {
        if let Some(call) = self.rpc.take() {
            self.server.call_abandoned(call);
        }
    }

    async fn send_rpc(&mut self) -> Result<(), TransportError> {
        self.ensure_alive()?;
        let call = self.rpc.take().ok_or(TransportError::Failed("dbrpcsend"))?;
        self.reset_results();
        match self.server.run_call(&self.host, &call) {
            CallOutcome::Mirror => {
                let message = self.mirror_message();
                self.report_failure(&message);
                Err(TransportError::Failed("dbrpcsend"))
            }
            CallOutcome::Missing => {
                let message = ServerMessage::new(
                    MSG_NO_PROCEDURE,
                    16,
                    format!("Could not find stored procedure '{}'.", call.name),
                )
                .server(self.host.clone());
                self.report_failure(&message);
                Err(TransportError::Failed("dbrpcsend"))
            }
            CallOutcome::Procedure(procedure) => {
                let reply = (procedure.handler)(&call);
                self.answer_call(&call, reply)
            }
        }
    }

    fn output_params(&self) -> Vec<OutputParam> {
        self.outputs.clone()
    }

    async fn use_database(&mut self, database: &str) -> Result<(), TransportError> {
        self.ensure_alive()?;
        self.server.run_batch(&self.host, &format!("use {database}"));
        self.database = Some(database.to_string());
        callbacks::report_message(
            Some(self.handle),
            &ServerMessage::new(
                tds_transport::message::MSG_DATABASE_CHANGED,
                10,
                format!("Changed database context to '{database}'."),
            ),
        );
        Ok(())
    }

    fn is_dead(&self) -> bool {
        self.closed || self.dead.load(Ordering::Acquire)
    }

    fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            self.server.session_closed(self.handle);
        }
    }
}

impl Drop for MockTransport {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use tds_transport::{Connector, LoginParams};

    use super::*;
    use crate::script::{Procedure, ProcedureParam};

    async fn open(server: &MockServer) -> Box<dyn Transport> {
        server
            .login(&LoginParams::new("srv", "sa", "pwd"))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_scripted_rows_are_served_in_bound_types() {
        let server = MockServer::new();
        server.on(
            "from authors",
            Reply::result(
                MockResultSet::new()
                    .column("id", WireType::Int, 4)
                    .column("photo", WireType::VarBinary, 16)
                    .column("name", WireType::VarChar, 40)
                    .row([
                        SqlValue::Int(7),
                        SqlValue::Binary(Bytes::from_static(&[1, 2])),
                        SqlValue::String("White".into()),
                    ]),
            ),
        );
        let mut t = open(&server).await;
        t.submit_command("select * from authors").unwrap();
        t.execute().await.unwrap();
        assert!(t.next_result_set().await.unwrap());
        for i in 0..3 {
            let info = t.column(i).unwrap();
            t.bind_column(
                i,
                ColumnBinding {
                    type_code: info.type_code,
                    buffer_len: 64,
                    variable: false,
                },
            )
            .unwrap();
        }
        assert_eq!(t.next_row().await, RowStatus::Row);
        assert_eq!(t.column_data(0).unwrap().unwrap().as_ref(), &[7u8, 0, 0, 0]);
        assert_eq!(t.column_data(1).unwrap().unwrap().as_ref(), &[1u8, 2, 0]);
        assert_eq!(t.column_data(2).unwrap().unwrap().as_ref(), b"White\0");
        assert_eq!(t.next_row().await, RowStatus::NoMoreRows);
        assert_eq!(t.rows_affected(), 1);
        assert!(!t.next_result_set().await.unwrap());
    }

    #[tokio::test]
    async fn test_unscripted_batch_returns_empty_result() {
        let server = MockServer::new();
        let mut t = open(&server).await;
        t.submit_command("set ansi_padding on").unwrap();
        t.execute().await.unwrap();
        assert!(t.next_result_set().await.unwrap());
        assert_eq!(t.column_count(), 0);
        assert_eq!(t.rows_affected(), -1);
        assert!(!t.next_result_set().await.unwrap());
        assert_eq!(server.batch_count("ansi_padding"), 1);
    }

    #[tokio::test]
    async fn test_limited_reply_falls_through() {
        let server = MockServer::new();
        server.on("select 1", Reply::error(208, 16, "nope").times(1));
        let mut t = open(&server).await;
        t.submit_command("select 1").unwrap();
        assert!(t.execute().await.is_err());
        t.submit_command("select 1").unwrap();
        assert!(t.execute().await.is_ok());
    }

    #[tokio::test]
    async fn test_kill_all_marks_sessions_dead() {
        let server = MockServer::new();
        let mut t = open(&server).await;
        assert_eq!(server.open_sessions(), 1);
        server.kill_all();
        assert!(t.is_dead());
        assert_eq!(t.submit_command("select 1"), Err(TransportError::Dead));
        t.close();
        assert_eq!(server.open_sessions(), 0);
    }

    #[tokio::test]
    async fn test_procedure_outputs_follow_bound_params() {
        let server = MockServer::new();
        server.procedure(
            Procedure::new("add_one")
                .param(ProcedureParam::input("@in", WireType::Int, 4))
                .param(ProcedureParam::output("@out", WireType::Int, 4))
                .handler(|call| {
                    let input = call.value("@in").and_then(|v| v.as_i64()).unwrap_or(0);
                    ProcedureReply::new()
                        .status(Some(3))
                        .output("@out", SqlValue::Int(i32::try_from(input + 1).unwrap()))
                }),
        );
        let mut t = open(&server).await;
        t.init_rpc("add_one").unwrap();
        t.bind_rpc_param(RpcParam {
            name: "@in".into(),
            output: false,
            type_code: WireType::Int.code(),
            max_output_len: -1,
            data: Some(Bytes::from_static(&[41, 0, 0, 0])),
            data_len: 4,
        })
        .unwrap();
        t.bind_rpc_param(RpcParam {
            name: "@out".into(),
            output: true,
            type_code: WireType::Int.code(),
            max_output_len: 4,
            data: None,
            data_len: 0,
        })
        .unwrap();
        t.send_rpc().await.unwrap();
        assert!(!t.next_result_set().await.unwrap());
        assert_eq!(t.return_status(), Some(3));
        let outputs = t.output_params();
        assert_eq!(outputs.len(), 1);
        assert_eq!(outputs[0].data.as_deref(), Some(&[42u8, 0, 0, 0][..]));
    }

    #[tokio::test]
    async fn test_missing_procedure_fails() {
        let server = MockServer::new();
        let mut t = open(&server).await;
        t.init_rpc("nope").unwrap();
        assert_eq!(t.send_rpc().await, Err(TransportError::Failed("dbrpcsend")));
        assert_eq!(server.rpc_calls().len(), 1);
    }

    #[tokio::test]
    async fn test_reset_rpc_drops_the_staged_call() {
        let server = MockServer::new();
        let mut t = open(&server).await;
        t.init_rpc("add_one").unwrap();
        t.reset_rpc();
        assert_eq!(t.send_rpc().await, Err(TransportError::Failed("dbrpcsend")));
        assert!(server.rpc_calls().is_empty());
        assert_eq!(server.abandoned_calls().len(), 1);
        assert_eq!(server.abandoned_calls()[0].name, "add_one");
    }

    #[tokio::test]
    async fn test_unreachable_host_refuses_login() {
        let server = MockServer::new();
        server.unreachable("down");
        let err = server
            .login(&LoginParams::new("down", "sa", "pwd"))
            .await
            .err()
            .unwrap();
        assert_eq!(err, TransportError::Login { host: "down".into() });
        assert_eq!(server.login_hosts(), vec!["down".to_string()]);
        assert_eq!(server.open_sessions(), 0);
    }
}
