//! # mssql-testing
//!
//! Test infrastructure for the driver.
//!
//! [`MockServer`] implements the transport boundary in memory. Tests script
//! how it answers batches ([`MockServer::on`]) and procedure calls
//! ([`MockServer::procedure`]), which hosts refuse logins or act as a mirror,
//! and then assert on the logins, batches and calls it recorded.
//!
//! ## Example
//!
//! ```rust,ignore
//! use mssql_testing::{MockResultSet, MockServer, Reply};
//! use mssql_types::{SqlValue, WireType};
//!
//! let server = MockServer::new();
//! server.on(
//!     "select 1",
//!     Reply::result(MockResultSet::new().column("", WireType::Int, 4).row([SqlValue::Int(1)])),
//! );
//!
//! let session = Session::open(Arc::new(server.clone()), "host=srv;user=sa;pwd=secret").await?;
//! assert_eq!(server.login_hosts(), vec!["srv"]);
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod result;
pub mod script;
pub mod server;
pub mod transport;

pub use result::MockResultSet;
pub use script::{Procedure, ProcedureParam, ProcedureReply, Reply, RpcCall};
pub use server::{DEFAULT_LIBRARY_VERSION, MSG_MIRROR_DATABASE, MockServer};
pub use transport::MockTransport;
