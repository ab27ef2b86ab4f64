//! Pool registry.
//!
//! Connections opened with pooling enabled share a pool per distinct
//! connection settings. Settings are keyed by their canonical cache key, so
//! two connection strings that differ only in key spelling or ordering share
//! one pool.

use std::collections::HashMap;

use once_cell::sync::Lazy;
use parking_lot::Mutex;

use mysql_client::ConnectionSettings;

use crate::config::PoolConfig;
use crate::error::PoolError;
use crate::lifecycle::MySqlConnector;
use crate::pool::{Pool, PooledConnection};

/// The production pool type.
pub type MySqlPool = Pool<MySqlConnector>;

/// A MySQL connection checked out from a managed pool.
pub type MySqlPooledConnection = PooledConnection<MySqlConnector>;

static GLOBAL: Lazy<PoolManager> = Lazy::new(PoolManager::new);

/// Registry of pools keyed by connection settings.
pub struct PoolManager {
    pools: Mutex<HashMap<String, MySqlPool>>,
}

impl PoolManager {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            pools: Mutex::new(HashMap::new()),
        }
    }

    /// The process-wide registry.
    #[must_use]
    pub fn global() -> &'static Self {
        &GLOBAL
    }

    /// Get or create the pool for the given settings.
    pub fn pool(&self, settings: &ConnectionSettings) -> Result<MySqlPool, PoolError> {
        let key = settings.cache_key();
        let mut pools = self.pools.lock();
        if let Some(pool) = pools.get(&key) {
            if !pool.is_closed() {
                return Ok(pool.clone());
            }
        }
        let config = PoolConfig::from_settings(settings);
        let pool = Pool::new(MySqlConnector::new(settings.clone()), config)?;
        tracing::debug!(key = %key, "created connection pool");
        pools.insert(key, pool.clone());
        Ok(pool)
    }

    /// Acquire a connection for the given settings from its pool.
    pub async fn acquire(
        &self,
        settings: &ConnectionSettings,
    ) -> Result<MySqlPooledConnection, PoolError> {
        let pool = self.pool(settings)?;
        pool.acquire().await
    }

    /// Discard the pooled connections for the given settings.
    pub async fn clear_pool(&self, settings: &ConnectionSettings) {
        let pool = {
            let pools = self.pools.lock();
            pools.get(&settings.cache_key()).cloned()
        };
        if let Some(pool) = pool {
            pool.clear().await;
        }
    }

    /// Discard the pooled connections of every registered pool.
    pub async fn clear_all_pools(&self) {
        let pools: Vec<MySqlPool> = self.pools.lock().values().cloned().collect();
        for pool in pools {
            pool.clear().await;
        }
    }
}

impl Default for PoolManager {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for PoolManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PoolManager")
            .field("pools", &self.pools.lock().len())
            .finish()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_equivalent_settings_share_a_pool() {
        let manager = PoolManager::new();
        let a = ConnectionSettings::from_connection_string(
            "Server=db;User Id=app;Max Pool Size=3",
        )
        .unwrap();
        let b = ConnectionSettings::from_connection_string(
            "max pool size=3;SERVER=db;uid=app",
        )
        .unwrap();

        let _ = manager.pool(&a).unwrap();
        let _ = manager.pool(&b).unwrap();
        assert_eq!(manager.pools.lock().len(), 1);
    }

    #[test]
    fn test_distinct_settings_get_distinct_pools() {
        let manager = PoolManager::new();
        let a = ConnectionSettings::from_connection_string("Server=db1").unwrap();
        let b = ConnectionSettings::from_connection_string("Server=db2").unwrap();

        let _ = manager.pool(&a).unwrap();
        let _ = manager.pool(&b).unwrap();
        assert_eq!(manager.pools.lock().len(), 2);
    }

    #[test]
    fn test_pool_config_follows_settings() {
        let manager = PoolManager::new();
        let settings = ConnectionSettings::from_connection_string(
            "Server=db;Max Pool Size=5;Min Pool Size=1",
        )
        .unwrap();
        let pool = manager.pool(&settings).unwrap();
        assert_eq!(pool.config().max_connections, 5);
        assert_eq!(pool.config().min_connections, 1);
    }
}
