//! A session on one server connection.
//!
//! A [`Session`] owns a single transport handle. It registers its
//! [`Diagnostics`] under the handle's identity so library errors and server
//! messages reach it, reconnects when the handle dies, and fails over to the
//! mirror host when the server says it is acting as a mirror.

use std::sync::{Arc, Weak};

use mssql_types::{EncodeOptions, SqlValue};
use tds_transport::{Connector, DiagnosticSink, HandleId, LibraryVersion, Transport, callbacks};
use tracing::Instrument;

use crate::config::{Compatibility, Credentials};
use crate::diagnostics::{self, Diagnostics};
use crate::error::{Error, Result};
use crate::fetch::fetch_results;
use crate::instrumentation;
use crate::param_cache::ParamCache;
use crate::result::ResultSet;
use crate::state::SessionState;

/// Session options applied after every SQL Server login.
const DEFAULT_SETTINGS: &str = "
        set quoted_identifier on
        set ansi_warnings on
        set ansi_padding on
        set concat_null_yields_null on
";

const CONNECT_ATTEMPTS: usize = 2;

/// Mirroring state of the configured database.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MirrorStatus {
    /// A mirror host is configured.
    pub defined: bool,
    /// Mirroring is active for the database.
    pub active: bool,
    /// The current host is the principal.
    pub is_master: bool,
}

/// A connection to SQL Server or Sybase ASE.
///
/// # Example
///
/// ```rust,ignore
/// use std::sync::Arc;
/// use mssql_client::Session;
///
/// let mut session = Session::connect(connector, "host=db1;database=pubs;user=sa;pwd=secret").await?;
/// let mut results = session.exec("select au_id, au_lname from authors").await?;
/// let authors = &mut results[0];
/// while authors.next() {
///     let (mut id, mut name) = (String::new(), String::new());
///     authors.scan(&mut [&mut id, &mut name])?;
/// }
/// ```
pub struct Session {
    pub(crate) connector: Arc<dyn Connector>,
    pub(crate) transport: Option<Box<dyn Transport>>,
    pub(crate) diagnostics: Arc<Diagnostics>,
    pub(crate) credentials: Arc<Credentials>,
    pub(crate) param_cache: Arc<ParamCache>,
    pub(crate) encode_options: EncodeOptions,
    state: SessionState,
}

impl Session {
    /// Parse `conn_str` and open a session.
    pub async fn connect(connector: Arc<dyn Connector>, conn_str: &str) -> Result<Self> {
        let credentials = Credentials::from_connection_string(conn_str)?;
        Self::open(connector, credentials).await
    }

    /// Open a session with its own parameter cache.
    pub async fn open(connector: Arc<dyn Connector>, credentials: Credentials) -> Result<Self> {
        Self::open_with_cache(connector, Arc::new(credentials), Arc::new(ParamCache::new())).await
    }

    /// Open a session that shares `param_cache` with other sessions.
    pub async fn open_with_cache(
        connector: Arc<dyn Connector>,
        credentials: Arc<Credentials>,
        param_cache: Arc<ParamCache>,
    ) -> Result<Self> {
        let mut session = Self {
            connector,
            transport: None,
            diagnostics: Arc::new(Diagnostics::new()),
            credentials,
            param_cache,
            encode_options: EncodeOptions::default(),
            state: SessionState::Disconnected,
        };
        session.reconnect().await?;
        Ok(session)
    }

    /// Credentials in use. After a mirror failover the host and mirror host
    /// are exchanged.
    #[must_use]
    pub fn credentials(&self) -> &Arc<Credentials> {
        &self.credentials
    }

    /// The parameter cache this session uses.
    #[must_use]
    pub fn param_cache(&self) -> &Arc<ParamCache> {
        &self.param_cache
    }

    /// Lifecycle state.
    #[must_use]
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Identity of the current transport handle.
    #[must_use]
    pub fn handle_id(&self) -> Option<HandleId> {
        self.transport.as_ref().map(|t| t.handle_id())
    }

    /// Options used to encode procedure parameters on this connection.
    #[must_use]
    pub fn encode_options(&self) -> EncodeOptions {
        self.encode_options
    }

    /// Diagnostics collected since the last request started.
    #[must_use]
    pub fn diagnostics(&self) -> &Diagnostics {
        &self.diagnostics
    }

    /// Close the current handle and open a new one.
    ///
    /// Makes up to two attempts. Before each, if the collected messages say
    /// the server is a mirror, host and mirror host are exchanged.
    pub async fn reconnect(&mut self) -> Result<()> {
        let mut last_error = None;
        for attempt in 1..=CONNECT_ATTEMPTS {
            if self.diagnostics.is_mirror_message() {
                self.switch_mirror();
            }
            match self.connect_once().await {
                Ok(()) => return Ok(()),
                Err(err) => {
                    tracing::warn!(
                        attempt = attempt,
                        host = %self.credentials.host,
                        error = %err,
                        "connect attempt failed"
                    );
                    last_error = Some(err);
                }
            }
        }
        Err(last_error.unwrap_or(Error::DeadConnection))
    }

    fn switch_mirror(&mut self) {
        if !self.credentials.mirror_defined() {
            return;
        }
        let swapped = self.credentials.swapped_mirror();
        tracing::info!(
            from = %self.credentials.host,
            to = %swapped.host,
            "server is acting as a mirror, switching hosts"
        );
        self.credentials = Arc::new(swapped);
    }

    async fn connect_once(&mut self) -> Result<()> {
        self.close_handle();
        self.diagnostics.clear();
        self.state = SessionState::Connecting;

        let params = self.credentials.login_params();
        let span = instrumentation::connect_span(&self.credentials);
        let login = tokio::time::timeout(params.login_timeout, self.connector.login(&params))
            .instrument(span)
            .await;

        let transport = match login {
            Ok(Ok(transport)) => transport,
            Ok(Err(err)) => {
                self.state = SessionState::Disconnected;
                tracing::debug!(error = %err, "login refused");
                return Err(Error::Connection {
                    host: self.credentials.host.clone(),
                    detail: format!("dbopen error\n{}", diagnostics::last_detail()),
                });
            }
            Err(_) => {
                self.state = SessionState::Disconnected;
                return Err(Error::Connection {
                    host: self.credentials.host.clone(),
                    detail: format!("login timed out after {:?}", params.login_timeout),
                });
            }
        };

        let banner = self.connector.library_version();
        let wide = LibraryVersion::parse(&banner).is_some_and(LibraryVersion::sizes_wide_params);
        self.encode_options = if wide {
            EncodeOptions::default()
        } else {
            EncodeOptions::legacy()
        };

        let handle = transport.handle_id();
        let weak = Arc::downgrade(&self.diagnostics);
        let sink: Weak<dyn DiagnosticSink> = weak;
        callbacks::register(handle, sink);
        self.transport = Some(transport);

        if let Err(err) = self.set_defaults().await {
            let detail = match &err {
                Error::Server { .. } => self.diagnostics.detail(),
                other => other.to_string(),
            };
            self.close_handle();
            self.state = SessionState::Disconnected;
            return Err(Error::Connection {
                host: self.credentials.host.clone(),
                detail,
            });
        }

        self.state = SessionState::Connected;
        tracing::info!(
            host = %self.credentials.host,
            database = ?self.credentials.database,
            handle = %handle,
            library = %banner,
            legacy_wide_padding = self.encode_options.legacy_wide_padding,
            "session connected"
        );
        Ok(())
    }

    async fn set_defaults(&mut self) -> Result<()> {
        let compatibility = self.credentials.compatibility.clone();
        if !compatibility.is_sybase() {
            self.exec_once(DEFAULT_SETTINGS).await?;
        }
        if let Some(seconds) = self.credentials.lock_timeout.filter(|s| *s > 0) {
            let sql = if compatibility == Compatibility::Sybase12_5 {
                format!("set lock wait {seconds}")
            } else {
                format!("set lock_timeout {seconds}")
            };
            self.exec_once(&sql).await?;
        }
        Ok(())
    }

    fn close_handle(&mut self) {
        if let Some(mut transport) = self.transport.take() {
            let handle = transport.handle_id();
            callbacks::unregister(handle);
            transport.close();
            tracing::debug!(handle = %handle, "session handle closed");
        }
    }

    pub(crate) fn transport_mut(&mut self) -> Result<&mut (dyn Transport + 'static)> {
        self.transport.as_deref_mut().ok_or(Error::DeadConnection)
    }

    /// Run a batch and return all of its result sets.
    ///
    /// If the batch fails because the handle died or the server turned out
    /// to be a mirror, the session reconnects and runs it once more.
    pub async fn exec(&mut self, sql: &str) -> Result<Vec<ResultSet>> {
        let span = instrumentation::query_span(&self.credentials, sql);
        async {
            match self.exec_once(sql).await {
                Ok(results) => Ok(results),
                Err(err) => self.retry(err, sql).await,
            }
        }
        .instrument(span)
        .await
    }

    async fn retry(&mut self, err: Error, sql: &str) -> Result<Vec<ResultSet>> {
        if !self.is_dead() && !self.is_mirror_slave().await {
            return Err(err);
        }
        tracing::warn!(error = %err, "request failed on a lost session, reconnecting");
        self.reconnect().await?;
        match self.exec_once(sql).await {
            Ok(results) => Ok(results),
            Err(retry_err) => Err(self.classify(retry_err)),
        }
    }

    pub(crate) fn classify(&self, err: Error) -> Error {
        if self.is_dead() {
            Error::DeadConnection
        } else if self.diagnostics.is_mirror_message() {
            Error::MirrorRedirect {
                message: self.diagnostics.message_text(),
            }
        } else {
            err
        }
    }

    /// Run a batch once, without reconnecting.
    pub(crate) async fn exec_once(&mut self, sql: &str) -> Result<Vec<ResultSet>> {
        let diagnostics = &self.diagnostics;
        let Some(transport) = self.transport.as_deref_mut() else {
            return Err(Error::DeadConnection);
        };
        diagnostics.clear();

        let outcome = run_batch(transport, diagnostics, sql).await;
        if outcome.is_err() && transport.is_dead() {
            self.state = SessionState::Dead;
        }
        outcome
    }

    /// Whether the handle is missing or dead.
    #[must_use]
    pub fn is_dead(&self) -> bool {
        self.transport.as_ref().is_none_or(|t| t.is_dead())
    }

    /// Mirroring state of the configured database.
    ///
    /// Without a configured mirror this is all `false` and nothing is sent.
    pub async fn mirror_status(&mut self) -> Result<MirrorStatus> {
        if !self.credentials.mirror_defined() {
            return Ok(MirrorStatus::default());
        }
        let database = self
            .credentials
            .database
            .as_deref()
            .unwrap_or_default()
            .replace('\'', "''");
        let sql = format!(
            "
    select
        case when mirroring_guid is not null then 1 else 0 end mirroring_active,
        case when mirroring_role = 2 then 0 else 1 end is_master,
        mirroring_state, mirroring_state_desc, mirroring_role, mirroring_role_desc,
        database_id,
        db_name(database_id) database_name
    from sys.database_mirroring
    where db_name(database_id) = '{database}'
"
        );
        let mut results = self.exec_once(&sql).await?;
        let mut status = MirrorStatus {
            defined: true,
            ..MirrorStatus::default()
        };
        if let Some(rs) = results.first_mut() {
            if rs.next() {
                rs.scan(&mut [&mut status.active, &mut status.is_master])?;
            }
        }
        Ok(status)
    }

    /// Whether requests must go to the mirror partner instead.
    ///
    /// True after a mirror redirect message. Otherwise the mirroring state
    /// is queried; a failed query counts as "not a slave".
    pub async fn is_mirror_slave(&mut self) -> bool {
        if self.diagnostics.is_mirror_message() {
            return true;
        }
        match self.mirror_status().await {
            Ok(status) => status.defined && status.active && !status.is_master,
            Err(err) => {
                tracing::debug!(error = %err, "mirror status query failed");
                false
            }
        }
    }

    /// `begin transaction`.
    pub async fn begin(&mut self) -> Result<()> {
        self.exec("begin transaction").await.map(drop)
    }

    /// `commit transaction`.
    pub async fn commit(&mut self) -> Result<()> {
        self.exec("commit transaction").await.map(drop)
    }

    /// Roll back the open transaction, if there is one.
    pub async fn rollback(&mut self) -> Result<()> {
        self.exec("if @@trancount > 0 rollback transaction").await.map(drop)
    }

    /// First column of the first row of the first result set.
    pub async fn select_value(&mut self, sql: &str) -> Result<SqlValue> {
        let results = self.exec(sql).await?;
        results
            .first()
            .and_then(|rs| rs.value(0, 0))
            .cloned()
            .ok_or(Error::NoRows)
    }

    /// Switch to the configured database. Does nothing without one.
    pub async fn db_use(&mut self) -> Result<()> {
        let Some(database) = self.credentials.database.clone() else {
            return Ok(());
        };
        let diagnostics = Arc::clone(&self.diagnostics);
        self.transport_mut()?
            .use_database(&database)
            .await
            .map_err(|_| diagnostics.server_error(format!("unable to use database {database}")))
    }

    /// Whether `select 1` answers 1.
    pub async fn is_live(&mut self) -> bool {
        match self.exec_once("select 1").await {
            Ok(results) => results
                .first()
                .and_then(|rs| rs.value(0, 0))
                .and_then(SqlValue::as_i64)
                == Some(1),
            Err(_) => false,
        }
    }

    /// Number of messages with this number collected for the last request.
    #[must_use]
    pub fn has_message_number(&self, number: i32) -> usize {
        self.diagnostics.message_count(number)
    }

    /// Library errors collected for the last request.
    #[must_use]
    pub fn error_text(&self) -> String {
        self.diagnostics.error_text()
    }

    /// Server messages collected for the last request.
    #[must_use]
    pub fn message_text(&self) -> String {
        self.diagnostics.message_text()
    }

    /// Close the handle. The next request reconnects.
    pub fn close(&mut self) {
        self.close_handle();
        self.state = SessionState::Disconnected;
    }
}

async fn run_batch(
    transport: &mut dyn Transport,
    diagnostics: &Diagnostics,
    sql: &str,
) -> Result<Vec<ResultSet>> {
    transport
        .submit_command(sql)
        .map_err(|e| diagnostics.server_error(e))?;
    transport
        .execute()
        .await
        .map_err(|e| diagnostics.server_error(e))?;
    fetch_results(transport, diagnostics).await
}

impl Drop for Session {
    fn drop(&mut self) {
        self.close_handle();
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("host", &self.credentials.host)
            .field("database", &self.credentials.database)
            .field("handle", &self.handle_id())
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}
