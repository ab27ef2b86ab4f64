//! Query cancellation.
//!
//! MySQL has no in-band cancel: a second session issues
//! `KILL QUERY <thread id>` against the target session. The killed session
//! then sees server error 1317 on its in-flight read.

use std::time::Duration;

use crate::config::ConnectionSettings;
use crate::connection::Connection;
use crate::error::{Error, Result};

/// How long the timeout path waits for the killed query to drain before
/// giving the connection up as broken.
const DRAIN_GRACE: Duration = Duration::from_secs(5);

/// Handle for cancelling a query running on another task's connection.
///
/// The handle is detached: it captures the target's settings and thread id
/// at creation and can be used from any task, even while the owning task is
/// blocked reading results.
#[derive(Debug, Clone)]
pub struct CancelHandle {
    settings: ConnectionSettings,
    thread_id: u32,
}

impl CancelHandle {
    /// Create a cancel handle targeting the given connection.
    #[must_use]
    pub fn new(conn: &Connection) -> Self {
        let mut settings = conn.settings_internal().clone();
        settings.pooling = false;
        Self {
            settings,
            thread_id: conn.thread_id(),
        }
    }

    /// Server thread id this handle targets.
    #[must_use]
    pub fn thread_id(&self) -> u32 {
        self.thread_id
    }

    /// Kill the query currently running on the target session.
    ///
    /// Opens a short-lived side session. The target session itself stays
    /// open; its in-flight read surfaces a query-interrupted error.
    pub async fn kill_query(&self) -> Result<()> {
        let mut side = Connection::open(self.settings.clone()).await?;
        let result = side
            .query_drop(&format!("KILL QUERY {}", self.thread_id))
            .await;
        side.close().await;
        tracing::debug!(thread_id = self.thread_id, ok = result.is_ok(), "kill query issued");
        result
    }
}

/// Bring a session back to command state after a command timeout: kill the
/// running query from a side session, then drain whatever the server still
/// sends. If draining does not complete within a grace period the
/// connection is marked broken.
pub(crate) async fn recover_after_timeout(conn: &mut Connection) {
    let handle = CancelHandle::new(conn);
    if let Err(err) = handle.kill_query().await {
        tracing::warn!(error = %err, "could not kill timed-out query");
    }
    match tokio::time::timeout(DRAIN_GRACE, conn.drain_results()).await {
        Ok(Ok(())) | Ok(Err(Error::QueryInterrupted)) => {}
        Ok(Err(err)) => {
            tracing::warn!(error = %err, "error draining timed-out query");
        }
        Err(_) => {
            let _ = conn.broken("timed-out query could not be drained");
        }
    }
}
