//! Pool configuration.

use std::time::Duration;

use crate::error::PoolError;

/// Default time an idle session may sit in the pool before the sweeper
/// closes it.
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(5 * 60);

/// Default interval between sweeps of the idle list.
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Configuration for a [`Pool`](crate::Pool).
///
/// The maximum number of sessions comes from the connection string
/// (`max_pool_size`), not from here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolConfig {
    /// How long a released session stays eligible for reuse.
    pub idle_timeout: Duration,
    /// How often the background task sweeps expired idle sessions.
    pub sweep_interval: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
        }
    }
}

impl PoolConfig {
    /// Create a configuration with the default timeouts.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the idle timeout.
    #[must_use]
    pub fn idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = timeout;
        self
    }

    /// Set the sweep interval.
    #[must_use]
    pub fn sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = interval;
        self
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), PoolError> {
        if self.sweep_interval.is_zero() {
            return Err(PoolError::InvalidConfig(
                "sweep_interval must be greater than 0".into(),
            ));
        }
        Ok(())
    }
}
