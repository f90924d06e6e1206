use std::fmt;
use std::io::{self, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender, SyncSender};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};

use beam_frame::Envelope;
use beam_transport::{SharedChannel, TransportError};
use bytes::Bytes;
use tracing::{debug, warn};

use crate::error::{Result, StreamError};
use crate::handle::{Direction, Endpoint, RouteOutcome};

enum Outbound {
    Data(Bytes),
    Flush(SyncSender<()>),
    End,
}

/// A named sink multiplexed onto the shared channel.
///
/// Writes are queued and published by a background adapter thread, one
/// envelope per chunk, under the streamer's write key. No chunk is larger
/// than the streamer's envelope body limit; a longer `write` is accepted
/// only up to that limit. Clones share the same queue.
#[derive(Clone)]
pub struct WriteStream {
    shared: Arc<WriteShared>,
}

struct WriteShared {
    name: String,
    write_key: String,
    max_chunk: usize,
    channel: SharedChannel,
    outbound: Mutex<Option<Sender<Outbound>>>,
    /// Held for the whole of `close` so concurrent closes run one at a time.
    adapter: Mutex<Option<JoinHandle<Result<()>>>>,
    fault: Arc<Mutex<Option<StreamError>>>,
    closed: AtomicBool,
}

impl WriteStream {
    /// Open a write stream and start its publishing adapter.
    pub(crate) fn open(
        name: &str,
        write_key: &str,
        max_chunk: usize,
        channel: SharedChannel,
    ) -> Result<Self> {
        let (tx, rx) = mpsc::channel();
        let fault = Arc::new(Mutex::new(None));

        let adapter = {
            let name = name.to_string();
            let write_key = write_key.to_string();
            let channel = Arc::clone(&channel);
            let fault = Arc::clone(&fault);
            thread::Builder::new()
                .name(format!("beam-write-{name}"))
                .spawn(move || run_adapter(&name, &write_key, &channel, rx, &fault))?
        };

        Ok(Self {
            shared: Arc::new(WriteShared {
                name: name.to_string(),
                write_key: write_key.to_string(),
                max_chunk: max_chunk.max(1),
                channel,
                outbound: Mutex::new(Some(tx)),
                adapter: Mutex::new(Some(adapter)),
                fault,
                closed: AtomicBool::new(false),
            }),
        })
    }

    /// The stream name.
    pub fn name(&self) -> &str {
        &self.shared.name
    }

    /// The key this stream publishes under.
    pub fn write_key(&self) -> &str {
        &self.shared.write_key
    }

    /// Signal end-of-stream to the backing store and stop the adapter.
    ///
    /// Waits until everything written before the call has been published.
    /// On failure the stream stays closable: a later call retries the
    /// end-of-stream publish directly.
    pub fn close(&self) -> Result<()> {
        let mut adapter = lock(&self.shared.adapter);
        if self.shared.closed.load(Ordering::SeqCst) {
            return Ok(());
        }

        if let Some(tx) = lock(&self.shared.outbound).take() {
            // Fails only if the adapter already stopped; its result is collected below.
            let _ = tx.send(Outbound::End);
        }

        let result = match adapter.take() {
            Some(handle) => match handle.join() {
                Ok(result) => result,
                Err(_) => Err(StreamError::AdapterPanicked(self.shared.name.clone())),
            },
            None => self.publish_end(),
        };

        match result {
            Ok(()) => {
                self.shared.closed.store(true, Ordering::SeqCst);
                debug!(stream = %self.shared.name, "write stream closed");
                Ok(())
            }
            Err(err) => {
                warn!(stream = %self.shared.name, error = %err, "write stream close failed");
                Err(err)
            }
        }
    }

    /// Whether [`close`](Self::close) has completed successfully.
    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::SeqCst)
    }

    /// Whether both handles refer to the same stream.
    pub fn same_stream(&self, other: &WriteStream) -> bool {
        Arc::ptr_eq(&self.shared, &other.shared)
    }

    fn publish_end(&self) -> Result<()> {
        let payload = Envelope::end(self.shared.name.as_str())?.to_bytes()?;
        self.shared
            .channel
            .publish(&self.shared.write_key, &payload)?;
        Ok(())
    }

    fn enqueue(&self, outbound: Outbound) -> Result<()> {
        if self.is_closed() {
            return Err(StreamError::Closed(self.shared.name.clone()));
        }
        if let Some(err) = lock(&self.shared.fault).as_ref() {
            return Err(replay(err));
        }
        match lock(&self.shared.outbound).as_ref() {
            Some(tx) => tx.send(outbound).map_err(|_| self.stopped_error()),
            None => Err(StreamError::Closed(self.shared.name.clone())),
        }
    }

    fn stopped_error(&self) -> StreamError {
        match lock(&self.shared.fault).as_ref() {
            Some(err) => replay(err),
            None => StreamError::Closed(self.shared.name.clone()),
        }
    }

    fn flush_outbound(&self) -> Result<()> {
        let (ack_tx, ack_rx) = mpsc::sync_channel(1);
        self.enqueue(Outbound::Flush(ack_tx))?;
        if ack_rx.recv().is_err() {
            return Err(self.stopped_error());
        }
        Ok(())
    }

    fn write_chunk(&self, buf: &[u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        let chunk = &buf[..buf.len().min(self.shared.max_chunk)];
        self.enqueue(Outbound::Data(Bytes::copy_from_slice(chunk)))?;
        Ok(chunk.len())
    }

    fn enqueue_body(&self, mut body: Bytes) -> Result<()> {
        while body.len() > self.shared.max_chunk {
            let chunk = body.split_to(self.shared.max_chunk);
            self.enqueue(Outbound::Data(chunk))?;
        }
        self.enqueue(Outbound::Data(body))
    }
}

fn run_adapter(
    name: &str,
    write_key: &str,
    channel: &SharedChannel,
    rx: Receiver<Outbound>,
    fault: &Mutex<Option<StreamError>>,
) -> Result<()> {
    let publish = |envelope: Result<Envelope>| -> Result<()> {
        let payload = envelope?.to_bytes()?;
        channel.publish(write_key, &payload)?;
        Ok(())
    };

    for outbound in rx {
        let result = match outbound {
            Outbound::Data(body) => {
                let len = body.len();
                let result = publish(Envelope::data(name, body).map_err(StreamError::from));
                if result.is_ok() {
                    debug!(stream = %name, key = %write_key, bytes = len, "published chunk");
                }
                result
            }
            Outbound::Flush(ack) => {
                let _ = ack.send(());
                Ok(())
            }
            Outbound::End => {
                let result = publish(Envelope::end(name).map_err(StreamError::from));
                if let Err(err) = &result {
                    *lock(fault) = Some(replay(err));
                }
                return result;
            }
        };

        if let Err(err) = result {
            warn!(stream = %name, key = %write_key, error = %err, "write adapter stopped on fault");
            *lock(fault) = Some(replay(&err));
            return Err(err);
        }
    }

    debug!(stream = %name, "write stream dropped without close");
    Ok(())
}

/// Rebuild an adapter fault so it can be reported to every later caller.
fn replay(err: &StreamError) -> StreamError {
    match err {
        StreamError::Transport(TransportError::Io(io_err)) => StreamError::Transport(
            TransportError::Io(io::Error::new(io_err.kind(), io_err.to_string())),
        ),
        StreamError::Transport(TransportError::PoolExhausted { max }) => {
            StreamError::Transport(TransportError::PoolExhausted { max: *max })
        }
        StreamError::Transport(TransportError::Connect(msg)) => {
            StreamError::Transport(TransportError::Connect(msg.clone()))
        }
        StreamError::Transport(TransportError::Shutdown) => {
            StreamError::Transport(TransportError::Shutdown)
        }
        StreamError::Closed(name) => StreamError::Closed(name.clone()),
        StreamError::AdapterPanicked(name) => StreamError::AdapterPanicked(name.clone()),
        StreamError::Frame(frame_err) => StreamError::Frame(frame_err.clone()),
        other => StreamError::Io(io::Error::other(other.to_string())),
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Endpoint for WriteStream {
    fn name(&self) -> &str {
        &self.shared.name
    }

    fn direction(&self) -> Direction {
        Direction::Write
    }

    fn deliver(&self, body: Bytes) -> RouteOutcome {
        match self.enqueue_body(body) {
            Ok(()) => RouteOutcome::Delivered,
            Err(_) => RouteOutcome::Dropped,
        }
    }

    fn close(&self) -> Result<()> {
        WriteStream::close(self)
    }

    fn is_closed(&self) -> bool {
        WriteStream::is_closed(self)
    }
}

impl Write for WriteStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.write_chunk(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.flush_outbound().map_err(io::Error::from)
    }
}

impl Write for &WriteStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.write_chunk(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.flush_outbound().map_err(io::Error::from)
    }
}

impl fmt::Debug for WriteStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WriteStream")
            .field("name", &self.shared.name)
            .field("write_key", &self.shared.write_key)
            .field("closed", &self.is_closed())
            .finish()
    }
}
