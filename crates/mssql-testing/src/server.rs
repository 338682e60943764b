//! The mock server and its connector.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use mssql_types::{SqlValue, WireType};
use parking_lot::Mutex;
use tds_transport::{
    Connector, HandleId, LibraryError, LoginParams, Transport, TransportError, callbacks,
};

use crate::result::MockResultSet;
use crate::script::{Procedure, Reply, RpcCall};
use crate::transport::MockTransport;

/// Banner reported by default.
pub const DEFAULT_LIBRARY_VERSION: &str = "freetds v1.3.17";

/// Message number a mirror database answers every request with.
pub const MSG_MIRROR_DATABASE: i32 = 954;

/// An in-memory server that answers logins, batches and procedure calls
/// from a script.
///
/// Clones share the same state, so a test keeps one handle for scripting and
/// assertions while the driver owns another as its [`Connector`].
#[derive(Debug, Clone, Default)]
pub struct MockServer {
    state: Arc<Mutex<ServerState>>,
}

#[derive(Debug, Default)]
struct ServerState {
    library_version: Option<String>,
    replies: Vec<(String, Reply)>,
    procedures: HashMap<String, Procedure>,
    unreachable: HashSet<String>,
    mirrors: HashSet<String>,
    logins: Vec<LoginParams>,
    batches: Vec<String>,
    rpc_calls: Vec<RpcCall>,
    abandoned_calls: Vec<RpcCall>,
    sessions: HashMap<HandleId, Arc<AtomicBool>>,
}

/// What a batch resolved to.
pub(crate) enum Outcome {
    Results(Reply),
    Mirror,
}

/// What a procedure call resolved to.
pub(crate) enum CallOutcome {
    Procedure(Procedure),
    Missing,
    Mirror,
}

impl MockServer {
    /// An empty server: every batch succeeds with one empty result set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Change the library banner the connector reports.
    pub fn set_library_version(&self, banner: impl Into<String>) {
        self.state.lock().library_version = Some(banner.into());
    }

    /// Answer batches containing `needle` (case-insensitive) with `reply`.
    ///
    /// Later scripts take precedence over earlier ones.
    pub fn on(&self, needle: impl Into<String>, reply: Reply) {
        let needle = needle.into().to_lowercase();
        self.state.lock().replies.push((needle, reply));
    }

    /// Register a stored procedure. Its parameters are also served to
    /// parameter catalog queries.
    pub fn procedure(&self, procedure: Procedure) {
        let key = procedure.name.to_lowercase();
        self.state.lock().procedures.insert(key, procedure);
    }

    /// Refuse logins to `host`.
    pub fn unreachable(&self, host: impl Into<String>) {
        self.state.lock().unreachable.insert(host.into());
    }

    /// Accept logins to `host` again.
    pub fn reachable(&self, host: &str) {
        self.state.lock().unreachable.remove(host);
    }

    /// Make `host` act as a mirror: logins succeed, every request fails
    /// with the mirror database message.
    pub fn mirror(&self, host: impl Into<String>) {
        self.state.lock().mirrors.insert(host.into());
    }

    /// Make `host` a principal again.
    pub fn promote(&self, host: &str) {
        self.state.lock().mirrors.remove(host);
    }

    /// Kill every open session.
    pub fn kill_all(&self) {
        let state = self.state.lock();
        for dead in state.sessions.values() {
            dead.store(true, Ordering::Release);
        }
        tracing::debug!(sessions = state.sessions.len(), "killed all mock sessions");
    }

    /// Logins attempted so far, refused ones included.
    #[must_use]
    pub fn logins(&self) -> Vec<LoginParams> {
        self.state.lock().logins.clone()
    }

    /// Hosts of the logins attempted so far.
    #[must_use]
    pub fn login_hosts(&self) -> Vec<String> {
        self.state.lock().logins.iter().map(|l| l.host.clone()).collect()
    }

    /// Batches received so far.
    #[must_use]
    pub fn batches(&self) -> Vec<String> {
        self.state.lock().batches.clone()
    }

    /// Number of batches received that contain `needle` (case-insensitive).
    #[must_use]
    pub fn batch_count(&self, needle: &str) -> usize {
        let needle = needle.to_lowercase();
        self.state
            .lock()
            .batches
            .iter()
            .filter(|b| b.to_lowercase().contains(&needle))
            .count()
    }

    /// Procedure calls received so far.
    #[must_use]
    pub fn rpc_calls(&self) -> Vec<RpcCall> {
        self.state.lock().rpc_calls.clone()
    }

    /// Procedure calls that were started but dropped before being sent.
    #[must_use]
    pub fn abandoned_calls(&self) -> Vec<RpcCall> {
        self.state.lock().abandoned_calls.clone()
    }

    /// Number of sessions that are open and not closed.
    #[must_use]
    pub fn open_sessions(&self) -> usize {
        self.state.lock().sessions.len()
    }

    pub(crate) fn run_batch(&self, host: &str, sql: &str) -> Outcome {
        let mut state = self.state.lock();
        state.batches.push(sql.to_string());
        if state.mirrors.contains(host) {
            return Outcome::Mirror;
        }
        let lowered = sql.to_lowercase();
        let scripted = state
            .replies
            .iter_mut()
            .rev()
            .find(|entry| entry.1.remaining != Some(0) && lowered.contains(entry.0.as_str()));
        if let Some((_, reply)) = scripted {
            if let Some(remaining) = reply.remaining.as_mut() {
                *remaining -= 1;
            }
            return Outcome::Results(reply.clone());
        }
        if lowered.contains("sys.all_parameters") || lowered.contains("syscolumns") {
            return Outcome::Results(Reply::result(catalog_rows(&state.procedures, sql)));
        }
        Outcome::Results(Reply::empty())
    }

    pub(crate) fn run_call(&self, host: &str, call: &RpcCall) -> CallOutcome {
        let mut state = self.state.lock();
        state.rpc_calls.push(call.clone());
        if state.mirrors.contains(host) {
            return CallOutcome::Mirror;
        }
        match state.procedures.get(&call.name.to_lowercase()) {
            Some(procedure) => CallOutcome::Procedure(procedure.clone()),
            None => CallOutcome::Missing,
        }
    }

    pub(crate) fn call_abandoned(&self, call: RpcCall) {
        self.state.lock().abandoned_calls.push(call);
    }

    pub(crate) fn session_closed(&self, handle: HandleId) {
        self.state.lock().sessions.remove(&handle);
    }
}

/// Serve the parameter catalog for the procedure named in the first quoted
/// literal of `sql`.
fn catalog_rows(procedures: &HashMap<String, Procedure>, sql: &str) -> MockResultSet {
    let mut result = MockResultSet::new()
        .column("name", WireType::VarChar, 128)
        .column("parameter_id", WireType::Int, 4)
        .column("user_type_id", WireType::Int, 4)
        .column("is_output", WireType::Bit, 1)
        .column("max_length", WireType::SmallInt, 2)
        .column("precision", WireType::TinyInt, 1)
        .column("scale", WireType::TinyInt, 1);
    let name = sql.split('\'').nth(1).unwrap_or_default().to_lowercase();
    let Some(procedure) = procedures.get(&name) else {
        return result;
    };
    for (id, param) in (1..).zip(&procedure.params) {
        result = result.row([
            SqlValue::String(param.name.clone()),
            SqlValue::Int(id),
            SqlValue::Int(param.wire.code()),
            SqlValue::Bool(param.is_output),
            SqlValue::SmallInt(param.max_length),
            SqlValue::TinyInt(param.precision),
            SqlValue::TinyInt(param.scale),
        ]);
    }
    result
}

#[async_trait]
impl Connector for MockServer {
    async fn login(&self, params: &LoginParams) -> Result<Box<dyn Transport>, TransportError> {
        let handle = HandleId::next();
        let dead = Arc::new(AtomicBool::new(false));
        {
            let mut state = self.state.lock();
            state.logins.push(params.clone());
            if state.unreachable.contains(&params.host) {
                drop(state);
                tracing::debug!(host = %params.host, "mock login refused");
                let error = LibraryError::new(
                    20009,
                    9,
                    "Unable to connect: Adaptive Server is unavailable or does not exist",
                )
                .os_error(111, "Connection refused");
                callbacks::report_error(None, &error);
                return Err(TransportError::Login {
                    host: params.host.clone(),
                });
            }
            state.sessions.insert(handle, Arc::clone(&dead));
        }
        tracing::debug!(host = %params.host, handle = %handle, "mock login accepted");
        Ok(Box::new(MockTransport::new(
            self.clone(),
            handle,
            params.host.clone(),
            params.database.clone(),
            dead,
        )))
    }

    fn library_version(&self) -> String {
        self.state
            .lock()
            .library_version
            .clone()
            .unwrap_or_else(|| DEFAULT_LIBRARY_VERSION.to_string())
    }
}
