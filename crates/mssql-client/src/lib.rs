//! # mssql-client
//!
//! Async SQL Server and Sybase ASE client built on a DB-Library style
//! transport.
//!
//! ## Features
//!
//! - **Sessions**: batches, stored procedure calls with output parameters,
//!   `?` placeholder statements through `sp_executesql`
//! - **Mirror failover**: a session whose server turns out to be a mirror
//!   reconnects to the partner host
//! - **Reconnect**: a request that fails on a dead handle is retried once on
//!   a fresh one
//! - **Scanning**: positional scans into plain values, or by column name into
//!   structs deriving `Record`
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use mssql_client::{Session, StatusRow};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let connector: Arc<dyn tds_transport::Connector> = make_connector();
//!     let mut session =
//!         Session::connect(connector, "host=db1;database=pubs;user=sa;pwd=secret;mirror=db2").await?;
//!
//!     let mut results = session
//!         .execute_sql("select au_lname from authors where au_id = ?", &[&"172-32-1176"])
//!         .await?;
//!     let authors = &mut results[0];
//!     while authors.next() {
//!         let mut name = String::new();
//!         authors.scan(&mut [&mut name])?;
//!         println!("{name}");
//!     }
//!
//!     let mut call = session.exec_sp("dbo.author_count", &[&"CA", &0i32]).await?;
//!     let mut count = 0i32;
//!     call.param_scan(&mut [&mut count])?;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod config;
pub mod diagnostics;
pub mod error;
pub mod execute_sql;
mod fetch;
pub mod instrumentation;
pub mod param_cache;
mod procedure;
pub mod result;
pub mod scan;
pub mod session;
pub mod sp_result;
pub mod state;

pub use config::{Compatibility, Credentials, DEFAULT_MAX_POOL_SIZE};
pub use diagnostics::Diagnostics;
pub use error::{Error, Result};
pub use execute_sql::StatusRow;
pub use mssql_types::{FromSql, SqlValue, ToSql, TypeError, WireType, naming};
pub use param_cache::{ParamCache, ParameterDescriptor};
pub use result::{Column, ResultSet};
pub use scan::{Record, ScanTarget};
pub use session::{MirrorStatus, Session};
pub use sp_result::{OutputParam, SpResult};
pub use state::SessionState;
