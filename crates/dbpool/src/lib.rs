//! Async connection pooling with prepared-statement caching.
//!
//! This crate provides [`Pool`], a bounded pool of database connections with:
//!
//! - Blocking checkout with a configurable timeout and FIFO fairness
//! - Transparent discard-and-replace of dead connections at checkout
//! - Re-entrant checkout: nested checkouts from one owner share a connection
//! - A background reaper that reclaims connections abandoned by their owners
//! - A bounded per-connection LRU cache of prepared statements
//!
//! The pool is driver-agnostic; anything implementing
//! [`dbpool_driver::Driver`] can be pooled.
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use dbpool::{Pool, ConnectConfig};
//!
//! # async fn example(driver: Arc<dyn dbpool::Driver>) -> dbpool::Result<()> {
//! let config = ConnectConfig::from_connection_string(
//!     "host=db.internal;port=5432;database=app;user=svc;password=secret",
//! )?;
//!
//! let pool = Pool::builder(driver, config).max_size(20).build().await?;
//!
//! pool.with_connection(|conn| async move {
//!     conn.execute("DELETE FROM sessions WHERE expired", &[]).await?;
//!     Ok(())
//! })
//! .await?;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

mod config;
mod error;
mod lease;
mod pool;
mod reaper;

pub use config::PoolConfig;
pub use error::{PoolError, Result};
pub use lease::OwnerId;
pub use pool::{Pool, PoolBuilder, PoolMetrics, PoolStatus, PooledConnection};

pub use dbpool_conn::{
    Connection, ExecuteEvent, ExecuteObserver, NoopObserver, StatementCache, TracingObserver,
};
pub use dbpool_driver::{
    ConnectConfig, ConnectError, Driver, DriverConnection, ExecuteResult, StatementHandle,
    StatementInvalid, Value,
};
