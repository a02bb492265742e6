//! Structured instrumentation events for statement execution.
//!
//! Every execute on a [`Connection`](crate::Connection) emits one
//! [`ExecuteEvent`] to the configured [`ExecuteObserver`]. Consumers (loggers,
//! tracers, metrics pipelines) subscribe by implementing the trait; the
//! default [`TracingObserver`] forwards events to `tracing`.

use std::fmt::Write as _;
use std::time::Duration;

use dbpool_driver::Value;

/// Event name emitted for statement execution.
pub const EXECUTE_EVENT_NAME: &str = "sql.execute";

/// A single statement execution, as seen by observers.
#[derive(Debug)]
pub struct ExecuteEvent<'a> {
    /// Event name (currently always [`EXECUTE_EVENT_NAME`]).
    pub name: &'static str,
    /// The SQL text that was executed.
    pub sql: &'a str,
    /// Bind values, in positional order.
    pub binds: &'a [Value],
    /// Wall-clock execution duration.
    pub duration: Duration,
    /// Whether the statement was served from the prepared-statement cache.
    pub cached: bool,
    /// Rows affected, when execution succeeded.
    pub rows_affected: Option<u64>,
    /// Identifier of the connection that ran the statement.
    pub connection_id: u64,
}

impl ExecuteEvent<'_> {
    /// Render the bind values for log output.
    ///
    /// Relies on [`Value`]'s `Display`, which summarizes large binary
    /// payloads instead of emitting them raw.
    #[must_use]
    pub fn binds_summary(&self) -> String {
        let mut out = String::from("[");
        for (i, value) in self.binds.iter().enumerate() {
            if i > 0 {
                out.push_str(", ");
            }
            let _ = write!(out, "{value}");
        }
        out.push(']');
        out
    }
}

/// Observer of statement executions.
pub trait ExecuteObserver: Send + Sync {
    /// Called after every execute, successful or not.
    fn on_execute(&self, event: &ExecuteEvent<'_>);
}

/// Default observer: logs each execution via `tracing` at debug level.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingObserver;

impl ExecuteObserver for TracingObserver {
    fn on_execute(&self, event: &ExecuteEvent<'_>) {
        tracing::debug!(
            name = event.name,
            sql = event.sql,
            binds = %event.binds_summary(),
            duration_ms = event.duration.as_millis() as u64,
            cached = event.cached,
            rows_affected = event.rows_affected,
            connection_id = event.connection_id,
            "statement executed"
        );
    }
}

/// Observer that discards all events.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopObserver;

impl ExecuteObserver for NoopObserver {
    fn on_execute(&self, _event: &ExecuteEvent<'_>) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    #[test]
    fn test_binds_summary_formats_values() {
        let binds = vec![
            Value::Int(1),
            Value::Text("a".into()),
            Value::Bytes(Bytes::from(vec![0u8; 100])),
        ];
        let event = ExecuteEvent {
            name: EXECUTE_EVENT_NAME,
            sql: "SELECT 1",
            binds: &binds,
            duration: Duration::from_millis(3),
            cached: false,
            rows_affected: Some(1),
            connection_id: 7,
        };

        assert_eq!(event.binds_summary(), "[1, 'a', <100 bytes of binary data>]");
    }
}
