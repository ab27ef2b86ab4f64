//! Pool configuration.

use std::time::Duration;

use mysql_client::ConnectionSettings;

/// Configuration for the connection pool.
///
/// This struct is marked `#[non_exhaustive]` to allow adding new fields
/// in future minor versions without breaking changes. Use the builder
/// pattern methods or [`Default::default()`] to construct instances.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub struct PoolConfig {
    /// Minimum number of idle connections the sweeper maintains.
    pub min_connections: u32,

    /// Maximum number of connections allowed.
    pub max_connections: u32,

    /// Time to wait for a connection before timing out. Zero waits forever.
    pub acquisition_timeout: Duration,

    /// Maximum lifetime of a connection. Zero means unlimited; expired
    /// connections are replaced instead of reused.
    pub connection_lifetime: Duration,

    /// Whether to reset session state (rollback, ping) before reuse.
    pub connection_reset: bool,

    /// Interval between maintenance sweeps.
    pub sweep_interval: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            min_connections: 0,
            max_connections: 100,
            acquisition_timeout: Duration::from_secs(15),
            connection_lifetime: Duration::ZERO,
            connection_reset: false,
            sweep_interval: Duration::from_secs(30),
        }
    }
}

impl PoolConfig {
    /// Create a new pool configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Derive pool settings from connection settings.
    #[must_use]
    pub fn from_settings(settings: &ConnectionSettings) -> Self {
        Self {
            min_connections: settings.min_pool_size,
            max_connections: settings.max_pool_size,
            acquisition_timeout: settings.connect_timeout,
            connection_lifetime: settings.connection_lifetime,
            connection_reset: settings.connection_reset,
            sweep_interval: Duration::from_secs(30),
        }
    }

    /// Set the minimum number of idle connections.
    #[must_use]
    pub fn min_connections(mut self, count: u32) -> Self {
        self.min_connections = count;
        self
    }

    /// Set the maximum number of connections.
    #[must_use]
    pub fn max_connections(mut self, count: u32) -> Self {
        self.max_connections = count;
        self
    }

    /// Set the connection acquisition timeout.
    #[must_use]
    pub fn acquisition_timeout(mut self, timeout: Duration) -> Self {
        self.acquisition_timeout = timeout;
        self
    }

    /// Set the maximum connection lifetime.
    #[must_use]
    pub fn connection_lifetime(mut self, lifetime: Duration) -> Self {
        self.connection_lifetime = lifetime;
        self
    }

    /// Enable or disable session reset before reuse.
    #[must_use]
    pub fn connection_reset(mut self, enabled: bool) -> Self {
        self.connection_reset = enabled;
        self
    }

    /// Set the maintenance sweep interval.
    #[must_use]
    pub fn sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = interval;
        self
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), crate::error::PoolError> {
        if self.max_connections == 0 {
            return Err(crate::error::PoolError::Configuration(
                "max_connections must be greater than 0".into(),
            ));
        }
        if self.min_connections > self.max_connections {
            return Err(crate::error::PoolError::Configuration(
                "min_connections cannot be greater than max_connections".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = PoolConfig::default();
        assert_eq!(config.min_connections, 0);
        assert_eq!(config.max_connections, 100);
        assert!(!config.connection_reset);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_settings() {
        let settings = ConnectionSettings::from_connection_string(
            "Server=db;Min Pool Size=2;Max Pool Size=7;Connection Lifetime=60;Connection Reset=true",
        )
        .unwrap();
        let config = PoolConfig::from_settings(&settings);
        assert_eq!(config.min_connections, 2);
        assert_eq!(config.max_connections, 7);
        assert_eq!(config.connection_lifetime, Duration::from_secs(60));
        assert!(config.connection_reset);
    }

    #[test]
    fn test_config_validation() {
        let config = PoolConfig::new().min_connections(20).max_connections(10);
        assert!(config.validate().is_err());

        let mut config = PoolConfig::new();
        config.max_connections = 0;
        assert!(config.validate().is_err());
    }
}
