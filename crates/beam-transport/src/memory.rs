use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use bytes::Bytes;
use tracing::debug;

use crate::error::{Result, TransportError};
use crate::traits::{Connection, ConnectionManager};

/// In-process backing store: a set of named FIFO queues.
///
/// Cloning shares the same queues. Use it as the [`ConnectionManager`] of a
/// [`ConnectionPool`](crate::ConnectionPool) to connect streamers living in
/// the same process.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<StoreInner>,
}

#[derive(Default)]
struct StoreInner {
    state: Mutex<StoreState>,
    ready: Condvar,
}

#[derive(Default)]
struct StoreState {
    queues: HashMap<String, VecDeque<Bytes>>,
    shut_down: bool,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of payloads waiting under `key`.
    pub fn queued(&self, key: &str) -> usize {
        self.lock().queues.get(key).map_or(0, VecDeque::len)
    }

    /// Stop the store. Blocked receivers wake and every operation fails
    /// with [`TransportError::Shutdown`] from then on.
    pub fn shutdown(&self) {
        self.lock().shut_down = true;
        self.inner.ready.notify_all();
        debug!("memory store shut down");
    }

    /// Whether [`shutdown`](Self::shutdown) has been called.
    pub fn is_shut_down(&self) -> bool {
        self.lock().shut_down
    }

    fn push(&self, key: &str, payload: &[u8]) -> Result<()> {
        let mut state = self.lock();
        if state.shut_down {
            return Err(TransportError::Shutdown);
        }
        state
            .queues
            .entry(key.to_string())
            .or_default()
            .push_back(Bytes::copy_from_slice(payload));
        drop(state);
        self.inner.ready.notify_all();
        Ok(())
    }

    fn pop(&self, key: &str, timeout: Duration) -> Result<Option<Bytes>> {
        let deadline = Instant::now() + timeout;
        let mut state = self.lock();
        loop {
            if state.shut_down {
                return Err(TransportError::Shutdown);
            }
            if let Some(payload) = state.queues.get_mut(key).and_then(VecDeque::pop_front) {
                return Ok(Some(payload));
            }
            let now = Instant::now();
            if now >= deadline {
                return Ok(None);
            }
            state = self
                .inner
                .ready
                .wait_timeout(state, deadline - now)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
    }

    fn lock(&self) -> MutexGuard<'_, StoreState> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.lock();
        f.debug_struct("MemoryStore")
            .field("keys", &state.queues.len())
            .field("shut_down", &state.shut_down)
            .finish()
    }
}

/// A connection to a [`MemoryStore`].
#[derive(Debug, Clone)]
pub struct MemoryConnection {
    store: MemoryStore,
}

impl Connection for MemoryConnection {
    fn publish(&mut self, key: &str, payload: &[u8]) -> Result<()> {
        self.store.push(key, payload)
    }

    fn receive(&mut self, key: &str, timeout: Duration) -> Result<Option<Bytes>> {
        self.store.pop(key, timeout)
    }

    fn is_healthy(&self) -> bool {
        !self.store.is_shut_down()
    }
}

impl ConnectionManager for MemoryStore {
    type Connection = MemoryConnection;

    fn connect(&self) -> Result<MemoryConnection> {
        if self.is_shut_down() {
            return Err(TransportError::Shutdown);
        }
        Ok(MemoryConnection {
            store: self.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use std::thread;

    use super::*;
    use crate::pool::ConnectionPool;
    use crate::traits::PooledChannel;

    #[test]
    fn receive_returns_payloads_in_publish_order() {
        let store = MemoryStore::new();
        let mut conn = store.connect().unwrap();

        conn.publish("k", b"one").unwrap();
        conn.publish("k", b"two").unwrap();

        let timeout = Duration::from_millis(10);
        assert_eq!(conn.receive("k", timeout).unwrap().unwrap().as_ref(), b"one");
        assert_eq!(conn.receive("k", timeout).unwrap().unwrap().as_ref(), b"two");
        assert!(conn.receive("k", timeout).unwrap().is_none());
    }

    #[test]
    fn keys_are_independent() {
        let store = MemoryStore::new();
        let mut conn = store.connect().unwrap();

        conn.publish("a", b"for-a").unwrap();

        assert!(conn.receive("b", Duration::from_millis(5)).unwrap().is_none());
        assert_eq!(store.queued("a"), 1);
    }

    #[test]
    fn blocked_receive_wakes_on_publish() {
        let store = MemoryStore::new();
        let pool = ConnectionPool::new(store.clone());

        let receiver = {
            let pool = pool.clone();
            thread::spawn(move || pool.receive("k", Duration::from_secs(5)).unwrap())
        };

        thread::sleep(Duration::from_millis(20));
        pool.publish("k", b"late").unwrap();

        let payload = receiver.join().unwrap().expect("payload should arrive");
        assert_eq!(payload.as_ref(), b"late");
    }

    #[test]
    fn shutdown_wakes_receivers_and_rejects_publish() {
        let store = MemoryStore::new();
        let mut conn = store.connect().unwrap();
        let waiter = thread::spawn(move || conn.receive("k", Duration::from_secs(5)));

        thread::sleep(Duration::from_millis(20));
        store.shutdown();

        assert!(matches!(
            waiter.join().unwrap(),
            Err(TransportError::Shutdown)
        ));
        assert!(matches!(store.connect(), Err(TransportError::Shutdown)));
    }
}
