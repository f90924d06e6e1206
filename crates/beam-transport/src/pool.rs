use std::ops::{Deref, DerefMut};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use bytes::Bytes;
use tracing::debug;

use crate::error::{Result, TransportError};
use crate::traits::{Connection, ConnectionManager, PooledChannel};

/// Connection pool limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolConfig {
    /// Maximum number of idle connections kept for reuse.
    pub max_idle: usize,
    /// Maximum number of live connections. `None` means unbounded.
    pub max_open: Option<usize>,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_idle: 8,
            max_open: Some(64),
        }
    }
}

/// A cloneable checkout/checkin pool over a [`ConnectionManager`].
pub struct ConnectionPool<M: ConnectionManager> {
    shared: Arc<PoolShared<M>>,
}

struct PoolShared<M: ConnectionManager> {
    manager: M,
    config: PoolConfig,
    state: Mutex<PoolState<M::Connection>>,
}

struct PoolState<C> {
    idle: Vec<C>,
    open: usize,
}

impl<M: ConnectionManager> ConnectionPool<M> {
    /// Create a pool with default limits.
    pub fn new(manager: M) -> Self {
        Self::with_config(manager, PoolConfig::default())
    }

    /// Create a pool with explicit limits.
    pub fn with_config(manager: M, config: PoolConfig) -> Self {
        Self {
            shared: Arc::new(PoolShared {
                manager,
                config,
                state: Mutex::new(PoolState {
                    idle: Vec::new(),
                    open: 0,
                }),
            }),
        }
    }

    /// Check out a connection, reusing an idle one when available.
    pub fn get(&self) -> Result<PooledConnection<M>> {
        {
            let mut state = self.lock_state();
            if let Some(conn) = state.idle.pop() {
                return Ok(self.guard(conn));
            }
            if let Some(max) = self.shared.config.max_open {
                if state.open >= max {
                    return Err(TransportError::PoolExhausted { max });
                }
            }
            // Reserve the slot before connecting so the limit holds under contention.
            state.open += 1;
        }

        match self.shared.manager.connect() {
            Ok(conn) => {
                debug!("opened pooled connection");
                Ok(self.guard(conn))
            }
            Err(err) => {
                self.lock_state().open -= 1;
                Err(err)
            }
        }
    }

    /// Number of live connections (idle and checked out).
    pub fn open_connections(&self) -> usize {
        self.lock_state().open
    }

    /// Number of idle connections ready for reuse.
    pub fn idle_connections(&self) -> usize {
        self.lock_state().idle.len()
    }

    /// Pool limits.
    pub fn config(&self) -> &PoolConfig {
        &self.shared.config
    }

    /// The underlying connection manager.
    pub fn manager(&self) -> &M {
        &self.shared.manager
    }

    fn guard(&self, conn: M::Connection) -> PooledConnection<M> {
        PooledConnection {
            conn: Some(conn),
            pool: Arc::clone(&self.shared),
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, PoolState<M::Connection>> {
        self.shared
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl<M: ConnectionManager> Clone for ConnectionPool<M> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<M: ConnectionManager> PooledChannel for ConnectionPool<M> {
    fn publish(&self, key: &str, payload: &[u8]) -> Result<()> {
        let mut conn = self.get()?;
        conn.publish(key, payload)
    }

    fn receive(&self, key: &str, timeout: Duration) -> Result<Option<Bytes>> {
        let mut conn = self.get()?;
        conn.receive(key, timeout)
    }
}

/// A checked-out connection. Returned to the pool on drop.
pub struct PooledConnection<M: ConnectionManager> {
    conn: Option<M::Connection>,
    pool: Arc<PoolShared<M>>,
}

impl<M: ConnectionManager> Deref for PooledConnection<M> {
    type Target = M::Connection;

    fn deref(&self) -> &Self::Target {
        // Only taken in drop.
        self.conn.as_ref().expect("pooled connection already returned")
    }
}

impl<M: ConnectionManager> DerefMut for PooledConnection<M> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.conn.as_mut().expect("pooled connection already returned")
    }
}

impl<M: ConnectionManager> Drop for PooledConnection<M> {
    fn drop(&mut self) {
        let Some(conn) = self.conn.take() else {
            return;
        };
        let mut state = self
            .pool
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if conn.is_healthy() && state.idle.len() < self.pool.config.max_idle {
            state.idle.push(conn);
        } else {
            state.open -= 1;
            debug!(healthy = conn.is_healthy(), "discarding pooled connection");
        }
    }
}
