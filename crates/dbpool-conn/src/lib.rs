//! # dbpool-conn
//!
//! Physical connection wrapper with per-connection prepared-statement caching.
//!
//! A [`Connection`] owns one [`DriverConnection`](dbpool_driver::DriverConnection)
//! together with a bounded [`StatementCache`]. Callers execute SQL through the
//! wrapper; when prepared-statement mode is enabled, execution transparently
//! goes through the cache, preparing on miss and deallocating the
//! least-recently-used statement when the cache is full.
//!
//! Every execute emits a structured [`ExecuteEvent`] to a pluggable
//! [`ExecuteObserver`]; the default observer logs via `tracing`.
//!
//! A `Connection` is exclusively leased by the pool, so nothing in this crate
//! needs internal locking.

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod connection;
pub mod instrumentation;
pub mod statement_cache;

pub use connection::Connection;
pub use instrumentation::{ExecuteEvent, ExecuteObserver, NoopObserver, TracingObserver};
pub use statement_cache::StatementCache;
