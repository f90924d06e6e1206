use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;

use crate::error::Result;

/// A single connection to the backing store.
///
/// Keys are queues: `publish` appends, `receive` pops the oldest entry.
pub trait Connection: Send {
    /// Append `payload` to the queue under `key`.
    fn publish(&mut self, key: &str, payload: &[u8]) -> Result<()>;

    /// Pop the oldest payload under `key`, waiting up to `timeout`.
    ///
    /// Returns `Ok(None)` when nothing arrived in time.
    fn receive(&mut self, key: &str, timeout: Duration) -> Result<Option<Bytes>>;

    /// Whether the connection may be returned to the pool after use.
    fn is_healthy(&self) -> bool {
        true
    }
}

/// Opens connections for a [`ConnectionPool`](crate::ConnectionPool).
pub trait ConnectionManager: Send + Sync + 'static {
    type Connection: Connection;

    /// Establish a new connection.
    fn connect(&self) -> Result<Self::Connection>;
}

/// The shared channel a streamer multiplexes over.
///
/// Each call checks a connection out, uses it once and hands it back, so
/// implementations can be shared freely across threads.
pub trait PooledChannel: Send + Sync {
    /// Publish `payload` under `key`.
    fn publish(&self, key: &str, payload: &[u8]) -> Result<()>;

    /// Receive the next payload under `key`, waiting up to `timeout`.
    fn receive(&self, key: &str, timeout: Duration) -> Result<Option<Bytes>>;
}

/// Reference-counted handle to a pooled channel.
pub type SharedChannel = Arc<dyn PooledChannel>;
