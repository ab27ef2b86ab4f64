//! # mysql-driver-pool
//!
//! Purpose-built connection pool for MySQL with lifecycle management.
//!
//! Unlike generic connection pools, this implementation understands the
//! driver's connection semantics: broken connections are never reused,
//! sessions are rolled back and pinged before reuse when connection reset is
//! enabled, and pools are shared per distinct connection settings through a
//! process-wide registry.
//!
//! ## Features
//!
//! - Pool-per-settings registry keyed by the canonical cache key
//! - Configurable min/max pool sizes derived from the connection string
//! - Bounded acquisition with timeout
//! - Connection lifetime enforcement and idle maintenance sweeps
//! - Session reset (rollback + ping) before reuse
//!
//! ## Example
//!
//! ```rust,ignore
//! use mysql_driver_pool::PoolManager;
//! use mysql_client::ConnectionSettings;
//!
//! let settings = ConnectionSettings::from_connection_string(
//!     "Server=localhost;User Id=app;Password=secret;Max Pool Size=20",
//! )?;
//!
//! let mut conn = PoolManager::global().acquire(&settings).await?;
//! conn.ping().await?;
//! // Connection automatically returned to the pool on drop
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod config;
pub mod error;
pub mod lifecycle;
pub mod manager;
pub mod pool;

pub use config::PoolConfig;
pub use error::PoolError;
pub use lifecycle::{Connector, MySqlConnector};
pub use manager::{MySqlPool, MySqlPooledConnection, PoolManager};
pub use pool::{Pool, PoolStatus, PooledConnection};
