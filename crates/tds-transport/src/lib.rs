//! # tds-transport
//!
//! The boundary between the driver core and a DB-Library style client
//! library (FreeTDS `libsybdb`, Sybase Open Client).
//!
//! The driver never speaks the wire protocol itself. It drives a library
//! session through the [`Transport`] trait, opens sessions through a
//! [`Connector`], and receives the library's out-of-band errors and messages
//! through the process-wide [`callbacks`] registry.
//!
//! ## Diagnostics routing
//!
//! ```rust,ignore
//! use tds_transport::callbacks;
//!
//! // A session registers itself after login...
//! callbacks::register(transport.handle_id(), Arc::downgrade(&diagnostics) as _);
//!
//! // ...and the library glue forwards what it receives.
//! callbacks::report_message(Some(handle), &ServerMessage::new(208, 16, "Invalid object name"));
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod callbacks;
pub mod error;
pub mod handle;
pub mod login;
pub mod message;
pub mod transport;

pub use callbacks::DiagnosticSink;
pub use error::TransportError;
pub use handle::HandleId;
pub use login::{LibraryVersion, LoginParams, ProtocolVersion};
pub use message::{LibraryError, ServerMessage};
pub use transport::{
    ColumnBinding, ColumnInfo, Connector, OutputParam, RowStatus, RpcParam, Transport,
};
