//! # mssql-types
//!
//! Type codec for SQL Server and Sybase ASE.
//!
//! This crate converts between Rust values and the fixed and variable width
//! buffers the DB-Library style transport exchanges with the server:
//!
//! - [`WireType`]: the numeric type tags columns and parameters carry
//! - [`SqlValue`]: a decoded value
//! - [`ToSql`] / [`FromSql`]: conversions between Rust types and [`SqlValue`]
//! - [`codec::encode`] / [`codec::decode`]: the wire layouts
//! - [`naming`]: column name normalization for struct scanning
//!
//! ## Example
//!
//! ```
//! use mssql_types::{codec, EncodeOptions, SqlValue, WireType};
//!
//! let encoded = codec::encode(WireType::Money, &SqlValue::Float(2.639), EncodeOptions::default())?;
//! let data = encoded.data.unwrap_or_default();
//! assert_eq!(codec::decode(WireType::Money, &data)?, SqlValue::Float(2.639));
//! # Ok::<(), mssql_types::TypeError>(())
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod codec;
pub mod error;
pub mod from_sql;
pub mod naming;
pub mod to_sql;
pub mod value;
pub mod wire;

pub use codec::{EncodeOptions, Encoded};
pub use error::TypeError;
pub use from_sql::FromSql;
pub use to_sql::ToSql;
pub use value::SqlValue;
pub use wire::WireType;
