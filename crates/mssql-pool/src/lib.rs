//! # mssql-driver-pool
//!
//! Session pool for SQL Server and Sybase ASE.
//!
//! The pool hands out [`Session`](mssql_client::Session)s opened with one
//! connection string. At most `max_pool_size` sessions (from the connection
//! string, default 100) are checked out at once; further callers wait.
//!
//! ## Features
//!
//! - Most recently released session is reused first
//! - Dead sessions are closed on release instead of being reused
//! - Idle sessions expire after the idle timeout; one is always kept
//! - One procedure parameter cache shared by every session of the pool
//! - `run` / `run_in_transaction` helpers that always release
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::time::Duration;
//! use mssql_driver_pool::{Pool, PoolConfig};
//!
//! let config = PoolConfig::new().idle_timeout(Duration::from_secs(120));
//! let pool = Pool::with_config(connector, "host=db1;database=pubs;user=sa;pwd=secret;mirror=db2", config).await?;
//!
//! let mut session = pool.acquire().await?;
//! let mut result = session.exec_sp("dbo.author_count", &[&"CA"]).await?;
//! drop(session);
//!
//! let status = pool.status();
//! println!("Pool utilization: {:.1}%", status.utilization());
//!
//! let metrics = pool.metrics();
//! println!("Checkout success rate: {:.2}", metrics.checkout_success_rate());
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod config;
pub mod error;
pub mod pool;

// Configuration
pub use config::PoolConfig;

// Error types
pub use error::PoolError;

// Pool types
pub use pool::{Pool, PoolMetrics, PoolStatus, PooledSession};
