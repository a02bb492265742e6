//! Pool error types.

use std::time::Duration;

use thiserror::Error;

use dbpool_driver::{ConnectError, StatementInvalid};

/// Convenience alias for pool operations.
pub type Result<T, E = PoolError> = std::result::Result<T, E>;

/// Errors raised by pool operations.
///
/// Every failure mode is a distinct variant so callers can pattern-match on
/// exhaustion vs. ownership vs. execution failure; their remediation differs.
#[derive(Debug, Error)]
pub enum PoolError {
    /// No connection became available within the checkout timeout.
    ///
    /// Recoverable: retry, queue, or surface upstream. Never fatal to the
    /// pool itself.
    #[error("timed out after {waited:?} waiting for an available connection")]
    CheckoutTimeout {
        /// How long the checkout waited before giving up.
        waited: Duration,
    },

    /// Checkout kept finding dead connections and gave up after the
    /// configured number of recovery attempts.
    #[error("no healthy connection after {attempts} recovery attempts")]
    Unavailable {
        /// Number of dead connections discarded before giving up.
        attempts: u32,
    },

    /// The connection backing this lease is gone (reaped, removed, or the
    /// pool was cleared).
    #[error("connection is no longer established")]
    NotEstablished,

    /// Establishing a new physical connection failed.
    #[error("connection could not be established: {0}")]
    Connect(#[from] ConnectError),

    /// A statement failed to execute. Carries the SQL and binds as
    /// structured data; see [`StatementInvalid`].
    #[error(transparent)]
    Statement(#[from] StatementInvalid),

    /// A connection was used from a thread or task other than its current
    /// owner. A programming error; the lease itself is left unchanged.
    #[error("connection is leased to a different owner")]
    OwnershipViolation,

    /// The pool has been shut down.
    #[error("pool is closed")]
    PoolClosed,

    /// The pool configuration is invalid.
    #[error("invalid pool configuration: {0}")]
    InvalidConfig(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_variants_are_distinguishable() {
        let timeout = PoolError::CheckoutTimeout {
            waited: Duration::from_millis(500),
        };
        assert!(matches!(timeout, PoolError::CheckoutTimeout { .. }));

        let ownership = PoolError::OwnershipViolation;
        assert!(!matches!(ownership, PoolError::CheckoutTimeout { .. }));
    }

    #[test]
    fn test_statement_error_display_stays_redacted() {
        let err = PoolError::from(StatementInvalid::new(
            "bad things",
            "SELECT secret FROM vault",
            vec![],
        ));
        assert!(!err.to_string().contains("vault"));
    }
}
