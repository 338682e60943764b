//! Scripted replies to batches and procedure calls.

use std::fmt;
use std::sync::Arc;

use mssql_types::{SqlValue, WireType, codec};
use tds_transport::{LibraryError, RpcParam, ServerMessage};

use crate::result::MockResultSet;

/// How the server answers a batch.
#[derive(Debug, Clone, Default)]
pub struct Reply {
    pub(crate) results: Vec<MockResultSet>,
    pub(crate) failure: Option<ServerMessage>,
    pub(crate) late_error: Option<LibraryError>,
    pub(crate) disconnect: bool,
    pub(crate) remaining: Option<usize>,
}

impl Reply {
    /// A single result set without columns.
    #[must_use]
    pub fn empty() -> Self {
        Self::result(MockResultSet::new())
    }

    /// A single result set.
    #[must_use]
    pub fn result(result: MockResultSet) -> Self {
        Self {
            results: vec![result],
            ..Self::default()
        }
    }

    /// Several result sets, in order.
    #[must_use]
    pub fn results(results: impl IntoIterator<Item = MockResultSet>) -> Self {
        Self {
            results: results.into_iter().collect(),
            ..Self::default()
        }
    }

    /// Fail the batch with a server error.
    #[must_use]
    pub fn error(number: i32, severity: i32, text: impl Into<String>) -> Self {
        Self {
            failure: Some(ServerMessage::new(number, severity, text)),
            ..Self::default()
        }
    }

    /// Kill the session while the batch runs.
    #[must_use]
    pub fn disconnect() -> Self {
        Self {
            disconnect: true,
            ..Self::default()
        }
    }

    /// Append another result set.
    #[must_use]
    pub fn and_result(mut self, result: MockResultSet) -> Self {
        self.results.push(result);
        self
    }

    /// Report a library error while the results are fetched.
    #[must_use]
    pub fn with_late_error(mut self, error: LibraryError) -> Self {
        self.late_error = Some(error);
        self
    }

    /// Only answer this many batches, then fall through to other scripts.
    #[must_use]
    pub fn times(mut self, count: usize) -> Self {
        self.remaining = Some(count);
        self
    }
}

/// A parameter declared by a mock procedure, as the catalog reports it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcedureParam {
    /// Name, including the leading `@`.
    pub name: String,
    /// Catalog type.
    pub wire: WireType,
    /// Whether the parameter is declared `output`.
    pub is_output: bool,
    /// Declared length; `-1` for `(max)`.
    pub max_length: i16,
    /// Numeric precision.
    pub precision: u8,
    /// Numeric scale.
    pub scale: u8,
}

impl ProcedureParam {
    /// An input parameter.
    #[must_use]
    pub fn input(name: impl Into<String>, wire: WireType, max_length: i16) -> Self {
        Self {
            name: name.into(),
            wire,
            is_output: false,
            max_length,
            precision: 0,
            scale: 0,
        }
    }

    /// An output parameter.
    #[must_use]
    pub fn output(name: impl Into<String>, wire: WireType, max_length: i16) -> Self {
        Self {
            is_output: true,
            ..Self::input(name, wire, max_length)
        }
    }
}

/// What a procedure returns for one call.
#[derive(Debug, Clone)]
pub struct ProcedureReply {
    /// Result sets, in order.
    pub results: Vec<MockResultSet>,
    /// Return status; `None` when the procedure sends none.
    pub return_status: Option<i32>,
    /// Output values by parameter name.
    pub outputs: Vec<(String, SqlValue)>,
    /// Fail the call with this server error instead.
    pub error: Option<ServerMessage>,
}

impl Default for ProcedureReply {
    fn default() -> Self {
        Self {
            results: Vec::new(),
            return_status: Some(0),
            outputs: Vec::new(),
            error: None,
        }
    }
}

impl ProcedureReply {
    /// Return status `0`, no results.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a result set.
    #[must_use]
    pub fn result(mut self, result: MockResultSet) -> Self {
        self.results.push(result);
        self
    }

    /// Set the return status.
    #[must_use]
    pub fn status(mut self, status: Option<i32>) -> Self {
        self.return_status = status;
        self
    }

    /// Return a value for an output parameter.
    #[must_use]
    pub fn output(mut self, name: impl Into<String>, value: SqlValue) -> Self {
        self.outputs.push((name.into(), value));
        self
    }

    /// Fail the call.
    #[must_use]
    pub fn error(number: i32, severity: i32, text: impl Into<String>) -> Self {
        Self {
            error: Some(ServerMessage::new(number, severity, text)),
            ..Self::default()
        }
    }
}

type Handler = Arc<dyn Fn(&RpcCall) -> ProcedureReply + Send + Sync>;

/// A stored procedure known to the mock server.
#[derive(Clone)]
pub struct Procedure {
    pub(crate) name: String,
    pub(crate) params: Vec<ProcedureParam>,
    pub(crate) handler: Handler,
}

impl Procedure {
    /// A procedure that returns status `0` and nothing else.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            params: Vec::new(),
            handler: Arc::new(|_| ProcedureReply::default()),
        }
    }

    /// Declare the next parameter.
    #[must_use]
    pub fn param(mut self, param: ProcedureParam) -> Self {
        self.params.push(param);
        self
    }

    /// Always answer with `reply`.
    #[must_use]
    pub fn returns(mut self, reply: ProcedureReply) -> Self {
        self.handler = Arc::new(move |_| reply.clone());
        self
    }

    /// Compute the reply from the call.
    #[must_use]
    pub fn handler<F>(mut self, handler: F) -> Self
    where
        F: Fn(&RpcCall) -> ProcedureReply + Send + Sync + 'static,
    {
        self.handler = Arc::new(handler);
        self
    }
}

impl fmt::Debug for Procedure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Procedure")
            .field("name", &self.name)
            .field("params", &self.params)
            .finish_non_exhaustive()
    }
}

/// A procedure call as the server received it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RpcCall {
    /// Procedure name.
    pub name: String,
    /// Bound parameters, in bind order.
    pub params: Vec<RpcParam>,
}

impl RpcCall {
    /// The bound parameter called `name`.
    #[must_use]
    pub fn param(&self, name: &str) -> Option<&RpcParam> {
        self.params.iter().find(|p| p.name.eq_ignore_ascii_case(name))
    }

    /// Decode the value bound for parameter `name`.
    ///
    /// Returns `None` when no such parameter was bound or its data does not
    /// decode; a NULL binding decodes to [`SqlValue::Null`].
    #[must_use]
    pub fn value(&self, name: &str) -> Option<SqlValue> {
        let param = self.param(name)?;
        let wire = WireType::from_code(param.type_code);
        codec::decode_nullable(wire, param.data.as_deref()).ok()
    }
}
