//! Runtime connection state tracking.
//!
//! ## State transitions
//!
//! ```text
//! Closed -> Connecting (via open())
//! Connecting -> Open   (handshake + authentication complete)
//! Connecting -> Closed (open failed)
//! Open -> Closed       (via close())
//! Open -> Broken       (fatal protocol / IO error)
//! Broken -> Closed     (via close(); the only exit from Broken)
//! ```
//!
//! Observers receive exactly one notification per transition; a transition
//! into the current state is a no-op.

/// Runtime connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No transport; only `open()` is valid.
    Closed,
    /// Handshake in progress.
    Connecting,
    /// Ready for commands.
    Open,
    /// Unusable after a fatal error; only `close()` is valid.
    Broken,
}

impl ConnectionState {
    /// Short name for diagnostics.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Closed => "closed",
            Self::Connecting => "connecting",
            Self::Open => "open",
            Self::Broken => "broken",
        }
    }
}

/// A single observed state transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StateChange {
    /// State before the transition.
    pub from: ConnectionState,
    /// State after the transition.
    pub to: ConnectionState,
}

/// Observer callback invoked synchronously on each transition.
pub type StateObserver = Box<dyn FnMut(StateChange) + Send>;

/// Tracks the connection state and fans out change notifications.
pub struct StateTracker {
    state: ConnectionState,
    observers: Vec<StateObserver>,
}

impl StateTracker {
    /// Create a tracker in the `Closed` state.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: ConnectionState::Closed,
            observers: Vec::new(),
        }
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Register an observer for future transitions.
    pub fn observe(&mut self, observer: StateObserver) {
        self.observers.push(observer);
    }

    /// Move to a new state, notifying observers once.
    ///
    /// Re-entering the current state does not notify. `Broken` only ever
    /// transitions to `Closed`.
    pub fn transition(&mut self, to: ConnectionState) {
        if self.state == to {
            return;
        }
        if self.state == ConnectionState::Broken && to != ConnectionState::Closed {
            return;
        }
        let change = StateChange {
            from: self.state,
            to,
        };
        self.state = to;
        tracing::debug!(from = change.from.name(), to = change.to.name(), "state change");
        for observer in &mut self.observers {
            observer(change);
        }
    }
}

impl Default for StateTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for StateTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StateTracker")
            .field("state", &self.state)
            .field("observers", &self.observers.len())
            .finish()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;

    fn recording_tracker() -> (StateTracker, Arc<Mutex<Vec<StateChange>>>) {
        let mut tracker = StateTracker::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&log);
        tracker.observe(Box::new(move |change| {
            sink.lock().unwrap().push(change);
        }));
        (tracker, log)
    }

    #[test]
    fn test_single_notification_per_transition() {
        let (mut tracker, log) = recording_tracker();
        tracker.transition(ConnectionState::Connecting);
        tracker.transition(ConnectionState::Open);
        tracker.transition(ConnectionState::Open); // no-op
        tracker.transition(ConnectionState::Closed);
        let log = log.lock().unwrap();
        assert_eq!(log.len(), 3);
        assert_eq!(log[1].from, ConnectionState::Connecting);
        assert_eq!(log[1].to, ConnectionState::Open);
    }

    #[test]
    fn test_broken_is_terminal_except_close() {
        let (mut tracker, log) = recording_tracker();
        tracker.transition(ConnectionState::Connecting);
        tracker.transition(ConnectionState::Open);
        tracker.transition(ConnectionState::Broken);
        tracker.transition(ConnectionState::Open); // ignored
        assert_eq!(tracker.state(), ConnectionState::Broken);
        tracker.transition(ConnectionState::Closed);
        assert_eq!(tracker.state(), ConnectionState::Closed);
        assert_eq!(log.lock().unwrap().len(), 4);
    }
}
