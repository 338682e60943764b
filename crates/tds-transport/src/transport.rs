//! The primitives a client library session exposes.
//!
//! The traits mirror the DB-Library call surface: submit a command buffer,
//! execute it, walk result sets and rows through bound column buffers, and
//! build remote procedure calls parameter by parameter. Implementations own
//! the native session; callers never share one across tasks.

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::TransportError;
use crate::handle::HandleId;
use crate::login::LoginParams;

/// Metadata of one result column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnInfo {
    /// Column name (empty for unnamed expressions).
    pub name: String,
    /// Wire type code.
    pub type_code: i32,
    /// Declared size in bytes.
    pub size: i32,
}

/// How a column's data should be delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnBinding {
    /// Wire type code the data is converted to.
    pub type_code: i32,
    /// Size of the fixed buffer; ignored for variable bindings.
    pub buffer_len: usize,
    /// Read the data per row at its actual length instead of into a fixed
    /// buffer (`(max)` columns).
    pub variable: bool,
}

/// Outcome of advancing to the next row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowStatus {
    /// A regular row is available.
    Row,
    /// The result set is exhausted.
    NoMoreRows,
    /// The row buffer is full.
    BufferFull,
    /// The fetch failed.
    Failed,
    /// A compute row or another row kind that carries no regular data.
    Other(i32),
}

/// One parameter of a remote procedure call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RpcParam {
    /// Parameter name, including the leading `@`.
    pub name: String,
    /// Whether the value is returned to the caller.
    pub output: bool,
    /// Wire type code.
    pub type_code: i32,
    /// Largest value the caller accepts back; `-1` for inputs.
    pub max_output_len: i32,
    /// The encoded value, `None` for NULL.
    pub data: Option<Bytes>,
    /// Declared length of `data`.
    pub data_len: i32,
}

/// An output parameter returned by a procedure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputParam {
    /// Parameter name.
    pub name: String,
    /// Wire type code of the returned value.
    pub type_code: i32,
    /// The returned bytes, `None` for NULL.
    pub data: Option<Bytes>,
}

/// Opens sessions against a server.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Log in and open a session.
    ///
    /// On failure the library has usually reported details through
    /// [`callbacks::report_error`](crate::callbacks::report_error) without a
    /// handle; [`callbacks::last_error`](crate::callbacks::last_error) holds
    /// them.
    async fn login(&self, params: &LoginParams) -> Result<Box<dyn Transport>, TransportError>;

    /// The library's version banner.
    fn library_version(&self) -> String;
}

/// An open session.
#[async_trait]
pub trait Transport: Send {
    /// Identity used to route this session's diagnostics.
    fn handle_id(&self) -> HandleId;

    /// Replace the command buffer with `sql`.
    fn submit_command(&mut self, sql: &str) -> Result<(), TransportError>;

    /// Send the command buffer and wait for the server to start answering.
    async fn execute(&mut self) -> Result<(), TransportError>;

    /// Advance to the next result set. `Ok(false)` when there are no more.
    async fn next_result_set(&mut self) -> Result<bool, TransportError>;

    /// Number of columns in the current result set.
    fn column_count(&self) -> usize;

    /// Metadata of the column at zero-based `index`.
    fn column(&self, index: usize) -> Result<ColumnInfo, TransportError>;

    /// Bind the column at zero-based `index`.
    fn bind_column(&mut self, index: usize, binding: ColumnBinding) -> Result<(), TransportError>;

    /// Advance to the next row of the current result set.
    async fn next_row(&mut self) -> RowStatus;

    /// Data of the column at `index` in the current row, converted to its
    /// binding. `None` when the value is NULL. Binary data carries one
    /// trailing pad byte.
    fn column_data(&self, index: usize) -> Result<Option<Bytes>, TransportError>;

    /// Rows affected by the statement that produced the current result set.
    fn rows_affected(&self) -> i64;

    /// Return status of the procedure that produced the current result, if
    /// one was sent.
    fn return_status(&self) -> Option<i32>;

    /// Start building a call to procedure `name`.
    fn init_rpc(&mut self, name: &str) -> Result<(), TransportError>;

    /// Add a parameter to the call being built.
    fn bind_rpc_param(&mut self, param: RpcParam) -> Result<(), TransportError>;

    /// Drop the call being built without sending it.
    fn reset_rpc(&mut self);

    /// Send the call.
    async fn send_rpc(&mut self) -> Result<(), TransportError>;

    /// Output parameters returned by the last call.
    fn output_params(&self) -> Vec<OutputParam>;

    /// Change the current database.
    async fn use_database(&mut self, database: &str) -> Result<(), TransportError>;

    /// Whether the session is dead.
    fn is_dead(&self) -> bool;

    /// Close the session. Further calls fail with [`TransportError::Dead`].
    fn close(&mut self);
}
