//! Driver-level error types.

use std::time::Duration;

use thiserror::Error;

use crate::value::Value;

/// Errors that can occur while establishing a physical connection.
#[derive(Debug, Error)]
pub enum ConnectError {
    /// The server refused the connection.
    #[error("connection refused by {host}:{port}")]
    Refused {
        /// Server hostname.
        host: String,
        /// Server port.
        port: u16,
    },

    /// Authentication was rejected by the server.
    #[error("authentication failed for user '{username}'")]
    AuthFailed {
        /// Username that failed to authenticate.
        username: String,
    },

    /// The connection attempt did not complete in time.
    #[error("connect timed out after {0:?}")]
    Timeout(Duration),

    /// The configuration is invalid.
    #[error("configuration error: {0}")]
    Config(String),

    /// A network-level failure occurred.
    #[error("network error: {0}")]
    Network(String),
}

/// A statement failed to execute.
///
/// The SQL text and bind values are carried as structured fields for
/// introspection, but are deliberately excluded from the `Display` message so
/// they never leak into free-text logs. Use [`sql`](StatementInvalid::sql) and
/// [`binds`](StatementInvalid::binds) when a consumer actually needs them.
#[derive(Debug, Error)]
#[error("statement execution failed: {message}")]
pub struct StatementInvalid {
    message: String,
    sql: String,
    binds: Vec<Value>,
}

impl StatementInvalid {
    /// Create a new statement error.
    pub fn new(
        message: impl Into<String>,
        sql: impl Into<String>,
        binds: impl Into<Vec<Value>>,
    ) -> Self {
        Self {
            message: message.into(),
            sql: sql.into(),
            binds: binds.into(),
        }
    }

    /// The driver's error message.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// The SQL text of the failed statement.
    #[must_use]
    pub fn sql(&self) -> &str {
        &self.sql
    }

    /// The bind values of the failed statement.
    #[must_use]
    pub fn binds(&self) -> &[Value] {
        &self.binds
    }
}
