use std::collections::VecDeque;
use std::fmt;
use std::io::{self, Read};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use bytes::{Buf, Bytes};
use tracing::debug;

use crate::error::{Result, StreamError};
use crate::handle::{Direction, Endpoint, RouteOutcome};

/// A named source fed by routed messages.
///
/// Clones share the same queue. Reads block the calling thread only; the
/// streamer's lock is never held while waiting.
#[derive(Clone)]
pub struct ReadStream {
    shared: Arc<ReadShared>,
}

struct ReadShared {
    name: String,
    state: Mutex<ReadState>,
    ready: Condvar,
}

#[derive(Default)]
struct ReadState {
    chunks: VecDeque<Bytes>,
    /// Unread remainder of the chunk a byte-level read started on.
    current: Bytes,
    closed: bool,
}

impl ReadState {
    fn next_chunk(&mut self) -> Option<Bytes> {
        if !self.current.is_empty() {
            return Some(std::mem::take(&mut self.current));
        }
        self.chunks.pop_front()
    }
}

impl ReadStream {
    /// Create an unregistered read stream.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            shared: Arc::new(ReadShared {
                name: name.into(),
                state: Mutex::new(ReadState::default()),
                ready: Condvar::new(),
            }),
        }
    }

    /// The stream name.
    pub fn name(&self) -> &str {
        &self.shared.name
    }

    /// Receive the next chunk, blocking until one arrives.
    ///
    /// Returns [`StreamError::Closed`] once the stream is closed and every
    /// queued chunk has been consumed.
    pub fn recv(&self) -> Result<Bytes> {
        let mut state = self.lock();
        loop {
            if let Some(chunk) = state.next_chunk() {
                return Ok(chunk);
            }
            if state.closed {
                return Err(StreamError::Closed(self.shared.name.clone()));
            }
            state = self
                .shared
                .ready
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Receive the next chunk, waiting at most `timeout`.
    ///
    /// Returns `Ok(None)` on timeout.
    pub fn recv_timeout(&self, timeout: Duration) -> Result<Option<Bytes>> {
        let deadline = Instant::now() + timeout;
        let mut state = self.lock();
        loop {
            if let Some(chunk) = state.next_chunk() {
                return Ok(Some(chunk));
            }
            if state.closed {
                return Err(StreamError::Closed(self.shared.name.clone()));
            }
            let now = Instant::now();
            if now >= deadline {
                return Ok(None);
            }
            state = self
                .shared
                .ready
                .wait_timeout(state, deadline - now)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
    }

    /// Number of chunks queued and not yet read.
    pub fn pending(&self) -> usize {
        let state = self.lock();
        state.chunks.len() + usize::from(!state.current.is_empty())
    }

    /// Mark the stream terminated and wake every blocked reader.
    ///
    /// Chunks already queued stay readable; anything delivered afterwards
    /// is dropped.
    pub fn close(&self) -> Result<()> {
        let mut state = self.lock();
        if !state.closed {
            state.closed = true;
            debug!(stream = %self.shared.name, pending = state.chunks.len(), "read stream closed");
        }
        drop(state);
        self.shared.ready.notify_all();
        Ok(())
    }

    /// Whether the stream has been closed.
    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    /// Whether both handles refer to the same stream.
    pub fn same_stream(&self, other: &ReadStream) -> bool {
        Arc::ptr_eq(&self.shared, &other.shared)
    }

    fn deliver_chunk(&self, body: Bytes) -> RouteOutcome {
        let mut state = self.lock();
        if state.closed {
            return RouteOutcome::Dropped;
        }
        state.chunks.push_back(body);
        drop(state);
        self.shared.ready.notify_one();
        RouteOutcome::Delivered
    }

    fn read_into(&self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        let mut state = self.lock();
        loop {
            if state.current.is_empty() {
                if let Some(chunk) = state.chunks.pop_front() {
                    state.current = chunk;
                    continue;
                }
                if state.closed {
                    return Ok(0);
                }
                state = self
                    .shared
                    .ready
                    .wait(state)
                    .unwrap_or_else(PoisonError::into_inner);
                continue;
            }
            let n = buf.len().min(state.current.len());
            buf[..n].copy_from_slice(&state.current[..n]);
            state.current.advance(n);
            return Ok(n);
        }
    }

    fn lock(&self) -> MutexGuard<'_, ReadState> {
        self.shared
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl Endpoint for ReadStream {
    fn name(&self) -> &str {
        &self.shared.name
    }

    fn direction(&self) -> Direction {
        Direction::Read
    }

    fn deliver(&self, body: Bytes) -> RouteOutcome {
        self.deliver_chunk(body)
    }

    fn close(&self) -> Result<()> {
        ReadStream::close(self)
    }

    fn is_closed(&self) -> bool {
        ReadStream::is_closed(self)
    }
}

impl Read for ReadStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.read_into(buf)
    }
}

impl Read for &ReadStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.read_into(buf)
    }
}

impl fmt::Debug for ReadStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReadStream")
            .field("name", &self.shared.name)
            .field("pending", &self.pending())
            .field("closed", &self.is_closed())
            .finish()
    }
}
