//! Begin/End-style asynchronous command execution.
//!
//! A pending command takes ownership of the connection, runs the operation
//! on a background task, and hands the connection back together with the
//! outcome when ended. The outcome is observable exactly once.

use std::future::Future;

use mysql_protocol::Value;
use tokio::task::JoinHandle;

use crate::command::Command;
use crate::connection::Connection;
use crate::error::Result;

/// A command running on a background task.
///
/// `S` is the state carried through the operation; for driver use this is
/// always [`Connection`].
#[derive(Debug)]
pub struct PendingCommand<T, S = Connection> {
    handle: JoinHandle<(S, Result<T>)>,
}

impl<T, S> PendingCommand<T, S>
where
    T: Send + 'static,
    S: Send + 'static,
{
    /// Start an operation on a background task.
    ///
    /// The operation owns the state for its whole duration and must hand it
    /// back alongside the result.
    pub fn begin<F, Fut>(state: S, op: F) -> Self
    where
        F: FnOnce(S) -> Fut + Send + 'static,
        Fut: Future<Output = (S, Result<T>)> + Send + 'static,
    {
        let handle = tokio::spawn(op(state));
        Self { handle }
    }

    /// Whether the operation has finished. Non-blocking; ending a complete
    /// command does not wait.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.handle.is_finished()
    }

    /// Wait for the operation and take back the state and the outcome.
    pub async fn end(self) -> (S, Result<T>) {
        match self.handle.await {
            Ok(outcome) => outcome,
            // The task is never aborted, so a join error is a panic in the
            // operation; surface it on the caller's task.
            Err(err) => std::panic::resume_unwind(err.into_panic()),
        }
    }
}

impl PendingCommand<u64> {
    /// Begin executing a row-less command; end yields the affected-row count.
    #[must_use]
    pub fn begin_non_query(conn: Connection, command: Command) -> Self {
        Self::begin(conn, move |mut conn| async move {
            let result = command.execute_non_query(&mut conn).await;
            (conn, result)
        })
    }
}

impl PendingCommand<Option<Value>> {
    /// Begin executing a command; end yields the first column of the first
    /// row, if any.
    #[must_use]
    pub fn begin_scalar(conn: Connection, command: Command) -> Self {
        Self::begin(conn, move |mut conn| async move {
            let result = command.execute_scalar(&mut conn).await;
            (conn, result)
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::error::Error;

    #[tokio::test]
    async fn test_end_returns_state_and_result() {
        let pending: PendingCommand<u64, u8> =
            PendingCommand::begin(7u8, |state| async move { (state, Ok(41)) });
        let (state, result) = pending.end().await;
        assert_eq!(state, 7);
        assert_eq!(result.unwrap(), 41);
    }

    #[tokio::test]
    async fn test_error_outcome_still_returns_state() {
        let pending: PendingCommand<u64, u8> = PendingCommand::begin(3u8, |state| async move {
            (state, Err(Error::CommandTimeout))
        });
        let (state, result) = pending.end().await;
        assert_eq!(state, 3);
        assert!(matches!(result, Err(Error::CommandTimeout)));
    }

    #[tokio::test]
    async fn test_is_complete_flips_without_blocking() {
        let (tx, rx) = tokio::sync::oneshot::channel::<()>();
        let pending: PendingCommand<u64, u8> = PendingCommand::begin(0u8, |state| async move {
            let _ = rx.await;
            (state, Ok(1))
        });
        assert!(!pending.is_complete());
        tx.send(()).unwrap();
        let (_, result) = pending.end().await;
        assert_eq!(result.unwrap(), 1);
    }
}
