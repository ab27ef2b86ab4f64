//! Connection lifecycle management.
//!
//! The pool is generic over a [`Connector`] so its acquisition, reuse and
//! replacement logic is testable without a server. [`MySqlConnector`] is the
//! production implementation over `mysql-client`.

use mysql_client::{Connection, ConnectionSettings};

use crate::error::PoolError;

/// Creates and services the connections a pool manages.
///
/// `#[async_trait]` is used for object safety and so the pool can hold the
/// connector behind a shared reference.
#[async_trait::async_trait]
pub trait Connector: Send + Sync + 'static {
    /// Connection type managed by the pool.
    type Connection: Send + 'static;

    /// Open a new connection.
    async fn connect(&self) -> Result<Self::Connection, PoolError>;

    /// Whether a connection is still usable. Lightweight; no round trip.
    fn is_valid(&self, conn: &Self::Connection) -> bool;

    /// Reset session state before handing a reused connection out.
    async fn reset(&self, conn: &mut Self::Connection) -> Result<(), PoolError>;

    /// Close a connection that is leaving the pool.
    async fn close(&self, conn: Self::Connection);
}

/// Production connector opening MySQL sessions from connection settings.
#[derive(Debug, Clone)]
pub struct MySqlConnector {
    settings: ConnectionSettings,
}

impl MySqlConnector {
    /// Create a connector for the given settings.
    #[must_use]
    pub fn new(settings: ConnectionSettings) -> Self {
        Self { settings }
    }

    /// The settings this connector opens sessions with.
    #[must_use]
    pub fn settings(&self) -> &ConnectionSettings {
        &self.settings
    }
}

#[async_trait::async_trait]
impl Connector for MySqlConnector {
    type Connection = Connection;

    async fn connect(&self) -> Result<Connection, PoolError> {
        Connection::open(self.settings.clone())
            .await
            .map_err(|err| PoolError::ConnectionCreation(err.to_string()))
    }

    fn is_valid(&self, conn: &Connection) -> bool {
        conn.is_open()
    }

    async fn reset(&self, conn: &mut Connection) -> Result<(), PoolError> {
        if conn.in_transaction() {
            conn.rollback()
                .await
                .map_err(|err| PoolError::ResetFailed(err.to_string()))?;
        }
        conn.ping()
            .await
            .map_err(|err| PoolError::ResetFailed(err.to_string()))
    }

    async fn close(&self, mut conn: Connection) {
        conn.close().await;
    }
}
