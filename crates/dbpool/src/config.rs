//! Pool configuration.

use std::time::Duration;

use crate::error::PoolError;

/// Configuration for a [`Pool`](crate::Pool).
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Maximum number of physical connections.
    pub max_size: usize,

    /// How long a checkout may wait for an available connection.
    pub checkout_timeout: Duration,

    /// Per-connection prepared-statement cache bound. Zero disables
    /// prepared-statement mode entirely.
    pub statement_limit: usize,

    /// Interval between reaper passes. `None` disables the reaper; the
    /// background task is then never started.
    pub reaping_frequency: Option<Duration>,

    /// Minimum lease age before the reaper considers a connection for
    /// reclamation. Live long-held leases are left alone regardless.
    pub stale_threshold: Duration,

    /// How many dead connections a single checkout may discard and replace
    /// before giving up.
    pub max_recover_attempts: u32,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_size: 10,
            checkout_timeout: Duration::from_secs(5),
            statement_limit: 100,
            reaping_frequency: Some(Duration::from_secs(60)),
            stale_threshold: Duration::from_secs(300),
            max_recover_attempts: 3,
        }
    }
}

impl PoolConfig {
    /// Create a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the maximum pool size.
    #[must_use]
    pub fn max_size(mut self, size: usize) -> Self {
        self.max_size = size;
        self
    }

    /// Set the checkout timeout.
    #[must_use]
    pub fn checkout_timeout(mut self, timeout: Duration) -> Self {
        self.checkout_timeout = timeout;
        self
    }

    /// Set the prepared-statement cache bound.
    #[must_use]
    pub fn statement_limit(mut self, limit: usize) -> Self {
        self.statement_limit = limit;
        self
    }

    /// Set the reaper interval, or disable the reaper with `None`.
    #[must_use]
    pub fn reaping_frequency(mut self, frequency: Option<Duration>) -> Self {
        self.reaping_frequency = frequency;
        self
    }

    /// Set the lease staleness threshold.
    #[must_use]
    pub fn stale_threshold(mut self, threshold: Duration) -> Self {
        self.stale_threshold = threshold;
        self
    }

    /// Set the dead-connection recovery bound for a single checkout.
    #[must_use]
    pub fn max_recover_attempts(mut self, attempts: u32) -> Self {
        self.max_recover_attempts = attempts;
        self
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), PoolError> {
        if self.max_size == 0 {
            return Err(PoolError::InvalidConfig("max_size must be at least 1".into()));
        }
        if self.checkout_timeout.is_zero() {
            return Err(PoolError::InvalidConfig(
                "checkout_timeout must be non-zero".into(),
            ));
        }
        if self.max_recover_attempts == 0 {
            return Err(PoolError::InvalidConfig(
                "max_recover_attempts must be at least 1".into(),
            ));
        }
        if let Some(frequency) = self.reaping_frequency {
            if frequency.is_zero() {
                return Err(PoolError::InvalidConfig(
                    "reaping_frequency must be non-zero when set; use None to disable".into(),
                ));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        assert!(PoolConfig::default().validate().is_ok());
    }

    #[test]
    fn test_zero_max_size_rejected() {
        let config = PoolConfig::new().max_size(0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_reaping_frequency_rejected() {
        let config = PoolConfig::new().reaping_frequency(Some(Duration::ZERO));
        assert!(config.validate().is_err());

        // None means disabled, which is fine.
        let config = PoolConfig::new().reaping_frequency(None);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builder_fluent() {
        let config = PoolConfig::new()
            .max_size(5)
            .checkout_timeout(Duration::from_millis(500))
            .statement_limit(16);

        assert_eq!(config.max_size, 5);
        assert_eq!(config.checkout_timeout, Duration::from_millis(500));
        assert_eq!(config.statement_limit, 16);
    }
}
