use std::fmt;

use bytes::Bytes;

use crate::error::Result;
use crate::read::ReadStream;
use crate::write::WriteStream;

/// Which way data flows through a stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Inbound: fed by routed messages, drained by `Read`.
    Read,
    /// Outbound: fed by `Write`, published to the shared channel.
    Write,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Read => f.write_str("read"),
            Direction::Write => f.write_str("write"),
        }
    }
}

/// Result of handing a routed payload to a stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteOutcome {
    /// The payload was queued on the stream.
    Delivered,
    /// No open stream accepted the payload; it was discarded.
    Dropped,
}

/// Capabilities every registered stream exposes to the streamer.
pub trait Endpoint: Send + Sync {
    /// The stream name.
    fn name(&self) -> &str;

    /// Read or write.
    fn direction(&self) -> Direction;

    /// Queue a routed payload without blocking.
    fn deliver(&self, body: Bytes) -> RouteOutcome;

    /// Terminate the stream, waking anyone blocked on it.
    fn close(&self) -> Result<()>;

    /// Whether the stream has been closed.
    fn is_closed(&self) -> bool;
}

/// An open stream of either direction.
#[derive(Debug, Clone)]
pub enum StreamHandle {
    Read(ReadStream),
    Write(WriteStream),
}

impl StreamHandle {
    /// Borrow as a read stream.
    pub fn as_read(&self) -> Option<&ReadStream> {
        match self {
            StreamHandle::Read(stream) => Some(stream),
            StreamHandle::Write(_) => None,
        }
    }

    /// Borrow as a write stream.
    pub fn as_write(&self) -> Option<&WriteStream> {
        match self {
            StreamHandle::Write(stream) => Some(stream),
            StreamHandle::Read(_) => None,
        }
    }

    /// Convert into a read stream.
    pub fn into_read(self) -> Option<ReadStream> {
        match self {
            StreamHandle::Read(stream) => Some(stream),
            StreamHandle::Write(_) => None,
        }
    }

    /// Convert into a write stream.
    pub fn into_write(self) -> Option<WriteStream> {
        match self {
            StreamHandle::Write(stream) => Some(stream),
            StreamHandle::Read(_) => None,
        }
    }

    /// Whether both handles refer to the same underlying stream.
    pub fn same_stream(&self, other: &StreamHandle) -> bool {
        match (self, other) {
            (StreamHandle::Read(a), StreamHandle::Read(b)) => a.same_stream(b),
            (StreamHandle::Write(a), StreamHandle::Write(b)) => a.same_stream(b),
            _ => false,
        }
    }

    fn endpoint(&self) -> &dyn Endpoint {
        match self {
            StreamHandle::Read(stream) => stream,
            StreamHandle::Write(stream) => stream,
        }
    }
}

impl Endpoint for StreamHandle {
    fn name(&self) -> &str {
        self.endpoint().name()
    }

    fn direction(&self) -> Direction {
        self.endpoint().direction()
    }

    fn deliver(&self, body: Bytes) -> RouteOutcome {
        self.endpoint().deliver(body)
    }

    fn close(&self) -> Result<()> {
        self.endpoint().close()
    }

    fn is_closed(&self) -> bool {
        self.endpoint().is_closed()
    }
}

impl From<ReadStream> for StreamHandle {
    fn from(stream: ReadStream) -> Self {
        StreamHandle::Read(stream)
    }
}

impl From<WriteStream> for StreamHandle {
    fn from(stream: WriteStream) -> Self {
        StreamHandle::Write(stream)
    }
}
