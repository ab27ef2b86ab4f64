//! Connection pool implementation.

use std::collections::VecDeque;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Instant;

use parking_lot::Mutex;
use tokio::sync::{Notify, OwnedSemaphorePermit, Semaphore};

use crate::config::PoolConfig;
use crate::error::PoolError;
use crate::lifecycle::Connector;

/// A connection pool.
///
/// Cloning is cheap and clones share the same pool. Acquisition prefers an
/// idle connection, creates a new one while under the maximum, and otherwise
/// waits until a connection is returned or the acquisition timeout elapses.
pub struct Pool<C: Connector> {
    shared: Arc<Shared<C>>,
}

impl<C: Connector> Clone for Pool<C> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

struct Shared<C: Connector> {
    connector: C,
    config: PoolConfig,
    semaphore: Arc<Semaphore>,
    state: Mutex<PoolState<C::Connection>>,
    /// Bumped by `clear`; connections from older generations are discarded
    /// instead of reused.
    generation: AtomicU64,
    /// Signalled whenever a slot opens up, so capacity waiters park
    /// instead of spinning.
    returned: Notify,
    closed: AtomicBool,
}

struct PoolState<T> {
    idle: VecDeque<Idle<T>>,
    /// Connections alive: idle plus checked out.
    total: u32,
}

struct Idle<T> {
    conn: T,
    created_at: Instant,
    generation: u64,
}

enum Slot<T> {
    Reuse(Idle<T>),
    Create,
    Wait,
}

impl<C: Connector> Pool<C> {
    /// Create a pool over a connector.
    pub fn new(connector: C, config: PoolConfig) -> Result<Self, PoolError> {
        config.validate()?;
        let max = config.max_connections as usize;
        Ok(Self {
            shared: Arc::new(Shared {
                connector,
                config,
                semaphore: Arc::new(Semaphore::new(max)),
                state: Mutex::new(PoolState {
                    idle: VecDeque::new(),
                    total: 0,
                }),
                generation: AtomicU64::new(0),
                returned: Notify::new(),
                closed: AtomicBool::new(false),
            }),
        })
    }

    /// Get a connection from the pool.
    pub async fn acquire(&self) -> Result<PooledConnection<C>, PoolError> {
        if self.is_closed() {
            return Err(PoolError::PoolClosed);
        }
        tracing::trace!("acquiring connection from pool");
        let permit = self.grab_permit().await?;
        let generation = self.current_generation();

        loop {
            let slot = {
                let mut state = self.shared.state.lock();
                if let Some(idle) = state.idle.pop_front() {
                    Slot::Reuse(idle)
                } else if state.total < self.shared.config.max_connections {
                    state.total += 1;
                    Slot::Create
                } else {
                    Slot::Wait
                }
            };
            match slot {
                Slot::Reuse(idle) => {
                    if idle.generation != generation
                        || self.expired(idle.created_at)
                        || !self.shared.connector.is_valid(&idle.conn)
                    {
                        self.discard(idle.conn).await;
                        continue;
                    }
                    let mut conn = idle.conn;
                    if self.shared.config.connection_reset {
                        if let Err(err) = self.shared.connector.reset(&mut conn).await {
                            tracing::debug!(error = %err, "discarding connection that failed reset");
                            self.discard(conn).await;
                            continue;
                        }
                    }
                    return Ok(PooledConnection::checked_out(
                        Arc::clone(&self.shared),
                        conn,
                        idle.created_at,
                        generation,
                        permit,
                    ));
                }
                Slot::Create => match self.shared.connector.connect().await {
                    Ok(conn) => {
                        return Ok(PooledConnection::checked_out(
                            Arc::clone(&self.shared),
                            conn,
                            Instant::now(),
                            generation,
                            permit,
                        ));
                    }
                    Err(err) => {
                        self.shared.state.lock().total -= 1;
                        self.shared.returned.notify_one();
                        return Err(err);
                    }
                },
                // All connections momentarily claimed by other acquirers;
                // the permit guarantees one frees up for us. `Notify`
                // stores a permit, so a release between the state check
                // and this await is not lost.
                Slot::Wait => self.shared.returned.notified().await,
            }
        }
    }

    /// Discard every idle connection and mark checked-out connections for
    /// disposal when they are returned.
    pub async fn clear(&self) {
        self.shared.generation.fetch_add(1, Ordering::SeqCst);
        let drained: Vec<_> = {
            let mut state = self.shared.state.lock();
            let drained: Vec<_> = state.idle.drain(..).collect();
            state.total -= drained.len() as u32;
            drained
        };
        self.shared.returned.notify_waiters();
        for idle in drained {
            self.shared.connector.close(idle.conn).await;
        }
        tracing::debug!("pool cleared");
    }

    /// Close the pool. Pending and future acquisitions fail with
    /// [`PoolError::PoolClosed`].
    pub async fn close(&self) {
        self.shared.closed.store(true, Ordering::SeqCst);
        self.shared.semaphore.close();
        self.clear().await;
        tracing::info!("connection pool closed");
    }

    /// Check if the pool is closed.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::SeqCst)
    }

    /// Get the current pool status.
    #[must_use]
    pub fn status(&self) -> PoolStatus {
        let state = self.shared.state.lock();
        let available = state.idle.len() as u32;
        PoolStatus {
            available,
            in_use: state.total - available,
            total: state.total,
            max: self.shared.config.max_connections,
        }
    }

    /// Get the pool configuration.
    #[must_use]
    pub fn config(&self) -> &PoolConfig {
        &self.shared.config
    }

    /// One maintenance pass: drop idle connections that expired or went
    /// stale, then replenish idle connections up to the minimum.
    pub async fn sweep(&self) {
        let generation = self.current_generation();
        let stale: Vec<_> = {
            let mut state = self.shared.state.lock();
            let mut keep = VecDeque::with_capacity(state.idle.len());
            let mut stale = Vec::new();
            while let Some(idle) = state.idle.pop_front() {
                if idle.generation != generation
                    || self.expired(idle.created_at)
                    || !self.shared.connector.is_valid(&idle.conn)
                {
                    stale.push(idle);
                } else {
                    keep.push_back(idle);
                }
            }
            state.total -= stale.len() as u32;
            state.idle = keep;
            stale
        };
        if !stale.is_empty() {
            self.shared.returned.notify_waiters();
        }
        for idle in stale {
            self.shared.connector.close(idle.conn).await;
        }

        while !self.is_closed() {
            let create = {
                let mut state = self.shared.state.lock();
                if state.total < self.shared.config.min_connections {
                    state.total += 1;
                    true
                } else {
                    false
                }
            };
            if !create {
                break;
            }
            match self.shared.connector.connect().await {
                Ok(conn) => {
                    let mut state = self.shared.state.lock();
                    state.idle.push_back(Idle {
                        conn,
                        created_at: Instant::now(),
                        generation,
                    });
                    drop(state);
                    self.shared.returned.notify_one();
                }
                Err(err) => {
                    self.shared.state.lock().total -= 1;
                    self.shared.returned.notify_one();
                    tracing::warn!(error = %err, "could not replenish pool minimum");
                    break;
                }
            }
        }
    }

    /// Spawn the periodic maintenance task. It exits when the pool closes.
    pub fn start_maintenance(&self) -> tokio::task::JoinHandle<()> {
        let pool = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(pool.shared.config.sweep_interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if pool.is_closed() {
                    break;
                }
                pool.sweep().await;
            }
        })
    }

    async fn grab_permit(&self) -> Result<OwnedSemaphorePermit, PoolError> {
        let timeout = self.shared.config.acquisition_timeout;
        let acquire = Arc::clone(&self.shared.semaphore).acquire_owned();
        let acquired = if timeout.is_zero() {
            acquire.await
        } else {
            match tokio::time::timeout(timeout, acquire).await {
                Ok(acquired) => acquired,
                Err(_) => return Err(PoolError::AcquisitionTimeout(timeout)),
            }
        };
        acquired.map_err(|_| PoolError::PoolClosed)
    }

    fn current_generation(&self) -> u64 {
        self.shared.generation.load(Ordering::SeqCst)
    }

    fn expired(&self, created_at: Instant) -> bool {
        let lifetime = self.shared.config.connection_lifetime;
        !lifetime.is_zero() && created_at.elapsed() > lifetime
    }

    async fn discard(&self, conn: C::Connection) {
        self.shared.state.lock().total -= 1;
        self.shared.returned.notify_one();
        self.shared.connector.close(conn).await;
    }
}

impl<C: Connector> std::fmt::Debug for Pool<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let status = self.status();
        f.debug_struct("Pool")
            .field("available", &status.available)
            .field("in_use", &status.in_use)
            .field("max", &status.max)
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// Status information about the pool.
#[derive(Debug, Clone, Copy)]
pub struct PoolStatus {
    /// Number of idle connections available.
    pub available: u32,
    /// Number of connections currently in use.
    pub in_use: u32,
    /// Total number of connections.
    pub total: u32,
    /// Maximum allowed connections.
    pub max: u32,
}

/// A connection checked out from the pool.
///
/// Dereferences to the underlying connection. When dropped, the connection
/// returns to the pool if it is still valid and current; otherwise it is
/// disposed of.
pub struct PooledConnection<C: Connector> {
    shared: Arc<Shared<C>>,
    conn: Option<C::Connection>,
    created_at: Instant,
    generation: u64,
    _permit: OwnedSemaphorePermit,
}

impl<C: Connector> PooledConnection<C> {
    fn checked_out(
        shared: Arc<Shared<C>>,
        conn: C::Connection,
        created_at: Instant,
        generation: u64,
        permit: OwnedSemaphorePermit,
    ) -> Self {
        Self {
            shared,
            conn: Some(conn),
            created_at,
            generation,
            _permit: permit,
        }
    }

    /// Detach the connection from the pool.
    ///
    /// The caller takes ownership; the pool slot is freed immediately.
    #[must_use]
    pub fn detach(mut self) -> C::Connection {
        self.shared.state.lock().total -= 1;
        self.shared.returned.notify_one();
        // Taking the connection disables the drop-time return.
        self.conn.take().unwrap_or_else(|| unreachable!())
    }
}

impl<C: Connector> Deref for PooledConnection<C> {
    type Target = C::Connection;

    fn deref(&self) -> &Self::Target {
        self.conn.as_ref().unwrap_or_else(|| unreachable!())
    }
}

impl<C: Connector> DerefMut for PooledConnection<C> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.conn.as_mut().unwrap_or_else(|| unreachable!())
    }
}

impl<C: Connector> Drop for PooledConnection<C> {
    fn drop(&mut self) {
        let Some(conn) = self.conn.take() else {
            return;
        };
        let current = self.shared.generation.load(Ordering::SeqCst);
        let lifetime = self.shared.config.connection_lifetime;
        let expired = !lifetime.is_zero() && self.created_at.elapsed() > lifetime;
        let reusable = !self.shared.closed.load(Ordering::SeqCst)
            && self.generation == current
            && !expired
            && self.shared.connector.is_valid(&conn);

        let mut state = self.shared.state.lock();
        if reusable {
            tracing::trace!("returning connection to pool");
            state.idle.push_back(Idle {
                conn,
                created_at: self.created_at,
                generation: self.generation,
            });
            drop(state);
        } else {
            state.total -= 1;
            drop(state);
            // Close on a task when a runtime is available, so the server
            // sees a clean quit instead of a dropped transport.
            if let Ok(handle) = tokio::runtime::Handle::try_current() {
                let shared = Arc::clone(&self.shared);
                handle.spawn(async move {
                    shared.connector.close(conn).await;
                });
            }
        }
        self.shared.returned.notify_one();
    }
}

impl<C: Connector> std::fmt::Debug for PooledConnection<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PooledConnection")
            .field("generation", &self.generation)
            .finish()
    }
}
