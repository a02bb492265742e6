//! # dbpool-driver
//!
//! Driver contract consumed by the `dbpool` connection pool kernel.
//!
//! The pool is protocol-agnostic: it never speaks a wire protocol itself.
//! Instead, a database driver implements the [`Driver`] and
//! [`DriverConnection`] traits defined here, and the pool takes care of
//! sharing a bounded set of those connections across concurrent callers.
//!
//! ## Contract summary
//!
//! - [`Driver::connect`] turns a [`ConnectConfig`] into one live session.
//! - [`DriverConnection`] exposes execute/prepare/deallocate plus a cheap
//!   liveness probe (`ping`) and an idempotent `close`.
//! - Prepared statements are identified by opaque [`StatementHandle`]s that
//!   a driver must never reuse within a connection's lifetime.
//!
//! ## Example
//!
//! ```rust,ignore
//! use dbpool_driver::{ConnectConfig, Driver, Value};
//!
//! let config = ConnectConfig::from_connection_string(
//!     "host=db.internal;port=5432;database=app;user=svc;password=secret;",
//! )?;
//!
//! let mut conn = my_driver.connect(&config).await?;
//! let result = conn.execute("SELECT 1", &[]).await?;
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod config;
pub mod driver;
pub mod error;
pub mod value;

pub use config::ConnectConfig;
pub use driver::{Driver, DriverConnection, ExecuteResult, StatementHandle};
pub use error::{ConnectError, StatementInvalid};
pub use value::Value;
