use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use beam_frame::{Message, MAX_NAME_LEN};
use beam_transport::SharedChannel;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::StreamerConfig;
use crate::error::{Result, StreamError};
use crate::handle::{Direction, Endpoint, RouteOutcome, StreamHandle};
use crate::read::ReadStream;
use crate::write::WriteStream;

/// Registry of open named streams over one shared channel.
///
/// At most one stream is open per name at any time. All methods take
/// `&self`; share a streamer across threads with an `Arc`.
pub struct Streamer {
    config: StreamerConfig,
    channel: SharedChannel,
    streams: Mutex<BTreeMap<String, StreamHandle>>,
    routed: AtomicU64,
    dropped: AtomicU64,
}

/// Point-in-time view of a streamer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StreamerStats {
    pub open_streams: usize,
    pub routed: u64,
    pub dropped: u64,
    pub streams: Vec<StreamInfo>,
}

/// One open stream, as listed in [`StreamerStats`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StreamInfo {
    pub name: String,
    pub direction: Direction,
}

impl Streamer {
    /// Create a streamer with default keys.
    pub fn new(channel: SharedChannel) -> Self {
        Self::with_config(channel, StreamerConfig::default())
    }

    /// Create a streamer with explicit configuration.
    pub fn with_config(channel: SharedChannel, config: StreamerConfig) -> Self {
        Self {
            config,
            channel,
            streams: Mutex::new(BTreeMap::new()),
            routed: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
        }
    }

    /// Open a stream under `name`.
    ///
    /// Fails with [`StreamError::InvalidName`] for a name that is empty or
    /// longer than an envelope can carry, and with [`StreamError::AlreadyOpen`]
    /// if a stream with that name is registered, whatever its direction. The
    /// check and the insert happen under one lock, so concurrent opens of the
    /// same name admit exactly one.
    pub fn open(&self, name: &str, direction: Direction) -> Result<StreamHandle> {
        if name.is_empty() || name.len() > MAX_NAME_LEN {
            return Err(StreamError::InvalidName);
        }

        let mut streams = self.lock();
        if streams.contains_key(name) {
            return Err(StreamError::AlreadyOpen(name.to_string()));
        }

        let handle = match direction {
            Direction::Read => StreamHandle::Read(ReadStream::new(name)),
            Direction::Write => StreamHandle::Write(WriteStream::open(
                name,
                &self.config.write_key,
                self.config.frame.max_body_size,
                Arc::clone(&self.channel),
            )?),
        };
        streams.insert(name.to_string(), handle.clone());
        drop(streams);

        debug!(stream = %name, direction = %direction, "stream opened");
        Ok(handle)
    }

    /// Open a read stream under `name`.
    pub fn open_read(&self, name: &str) -> Result<ReadStream> {
        let handle = self.open(name, Direction::Read)?;
        handle
            .into_read()
            .ok_or_else(|| StreamError::AlreadyOpen(name.to_string()))
    }

    /// Open a write stream under `name`.
    pub fn open_write(&self, name: &str) -> Result<WriteStream> {
        let handle = self.open(name, Direction::Write)?;
        handle
            .into_write()
            .ok_or_else(|| StreamError::AlreadyOpen(name.to_string()))
    }

    /// Deliver an inbound message to the stream it names.
    ///
    /// Never blocks on a reader. Messages for names with no open stream,
    /// or for a stream that no longer accepts data, are dropped.
    pub fn route_message(&self, message: &Message) -> RouteOutcome {
        let streams = self.lock();
        let outcome = match streams.get(message.name()) {
            Some(handle) => handle.deliver(message.body().clone()),
            None => RouteOutcome::Dropped,
        };
        drop(streams);

        match outcome {
            RouteOutcome::Delivered => {
                self.routed.fetch_add(1, Ordering::Relaxed);
            }
            RouteOutcome::Dropped => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                debug!(
                    stream = %message.name(),
                    bytes = message.body().len(),
                    "dropped message for stream with no open reader"
                );
            }
        }
        outcome
    }

    /// Terminate the read stream `name` after its writer signalled the end.
    ///
    /// The stream stays registered until it is closed through the streamer,
    /// so its name cannot be reused while a reader may still be draining it.
    pub fn end_of_stream(&self, name: &str) -> RouteOutcome {
        let handle = self.lock().get(name).cloned();
        match handle {
            Some(StreamHandle::Read(stream)) if !stream.is_closed() => {
                // Closing a read stream cannot fail.
                let _ = stream.close();
                debug!(stream = %name, pending = stream.pending(), "end of stream received");
                RouteOutcome::Delivered
            }
            _ => {
                debug!(stream = %name, "end of stream for no open reader");
                RouteOutcome::Dropped
            }
        }
    }

    /// Close the stream registered under `name` and release the name.
    ///
    /// Closing a name with no open stream is a no-op. If the stream's close
    /// fails, the error is returned and the stream stays registered.
    pub fn close(&self, name: &str) -> Result<()> {
        let Some(handle) = self.lock().get(name).cloned() else {
            return Ok(());
        };

        // Write streams wait for their adapter here; the registry lock is not held.
        if let Err(err) = handle.close() {
            warn!(stream = %name, error = %err, "failed to close stream");
            return Err(err);
        }

        let mut streams = self.lock();
        if streams
            .get(name)
            .is_some_and(|current| current.same_stream(&handle))
        {
            streams.remove(name);
        }
        drop(streams);

        debug!(stream = %name, direction = %handle.direction(), "stream closed");
        Ok(())
    }

    /// Close every open stream in lexicographic name order.
    ///
    /// Stops at the first failure and returns it. Streams before the failing
    /// one are closed and released; the failing stream and the ones after it
    /// stay open.
    pub fn close_all(&self) -> Result<()> {
        let names = self.names();
        let total = names.len();
        for name in names {
            self.close(&name)?;
        }
        if total > 0 {
            info!(closed = total, "closed all streams");
        }
        Ok(())
    }

    /// Whether a stream is registered under `name`.
    pub fn is_open(&self, name: &str) -> bool {
        self.lock().contains_key(name)
    }

    /// Names of registered streams, sorted.
    pub fn names(&self) -> Vec<String> {
        self.lock().keys().cloned().collect()
    }

    /// Number of registered streams.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn stats(&self) -> StreamerStats {
        let streams: Vec<StreamInfo> = self
            .lock()
            .iter()
            .map(|(name, handle)| StreamInfo {
                name: name.clone(),
                direction: handle.direction(),
            })
            .collect();
        StreamerStats {
            open_streams: streams.len(),
            routed: self.routed.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            streams,
        }
    }

    pub fn config(&self) -> &StreamerConfig {
        &self.config
    }

    /// The channel write streams publish to.
    pub fn channel(&self) -> &SharedChannel {
        &self.channel
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<String, StreamHandle>> {
        self.streams.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for Streamer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Streamer")
            .field("config", &self.config)
            .field("streams", &self.names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write as _;
    use std::time::Duration;

    use beam_transport::{ConnectionPool, MemoryStore};
    use bytes::Bytes;

    use super::*;

    fn streamer() -> (MemoryStore, Streamer) {
        let store = MemoryStore::new();
        let channel: SharedChannel = Arc::new(ConnectionPool::new(store.clone()));
        (store, Streamer::new(channel))
    }

    fn message(name: &str, body: &'static [u8]) -> Message {
        Message::new(name, Bytes::from_static(body)).unwrap()
    }

    #[test]
    fn open_rejects_duplicate_name_across_directions() {
        let (_store, streamer) = streamer();
        streamer.open_read("a").unwrap();

        assert!(matches!(
            streamer.open_read("a"),
            Err(StreamError::AlreadyOpen(name)) if name == "a"
        ));
        assert!(matches!(
            streamer.open_write("a"),
            Err(StreamError::AlreadyOpen(_))
        ));
        assert_eq!(streamer.len(), 1);
    }

    #[test]
    fn open_rejects_empty_name() {
        let (_store, streamer) = streamer();
        assert!(matches!(
            streamer.open("", Direction::Read),
            Err(StreamError::InvalidName)
        ));
        assert!(streamer.is_empty());
    }

    #[test]
    fn open_rejects_name_too_long_for_an_envelope() {
        let (_store, streamer) = streamer();
        let long = "x".repeat(MAX_NAME_LEN + 1);

        assert!(matches!(
            streamer.open_write(&long),
            Err(StreamError::InvalidName)
        ));
        assert!(matches!(
            streamer.open_read(&long),
            Err(StreamError::InvalidName)
        ));
        assert!(streamer.is_empty());
        streamer.close_all().unwrap();
    }

    #[test]
    fn longest_encodable_name_can_be_closed() {
        let (store, streamer) = streamer();
        let longest = "x".repeat(MAX_NAME_LEN);

        let writer = streamer.open_write(&longest).unwrap();
        (&writer).write_all(b"data").unwrap();
        streamer.close(&longest).unwrap();

        assert!(writer.is_closed());
        assert!(!streamer.is_open(&longest));
        assert_eq!(store.queued(&streamer.config().write_key), 2);
    }

    #[test]
    fn route_delivers_to_named_reader() {
        let (_store, streamer) = streamer();
        let reader = streamer.open_read("a").unwrap();
        let other = streamer.open_read("b").unwrap();

        assert_eq!(
            streamer.route_message(&message("a", b"x")),
            RouteOutcome::Delivered
        );
        assert_eq!(reader.recv().unwrap().as_ref(), b"x");
        assert_eq!(other.pending(), 0);
    }

    #[test]
    fn route_to_unknown_name_is_dropped_and_counted() {
        let (_store, streamer) = streamer();
        assert_eq!(
            streamer.route_message(&message("ghost", b"x")),
            RouteOutcome::Dropped
        );

        let stats = streamer.stats();
        assert_eq!(stats.dropped, 1);
        assert_eq!(stats.routed, 0);
    }

    #[test]
    fn end_of_stream_closes_reader_but_keeps_name() {
        let (_store, streamer) = streamer();
        let reader = streamer.open_read("a").unwrap();
        streamer.route_message(&message("a", b"tail"));

        assert_eq!(streamer.end_of_stream("a"), RouteOutcome::Delivered);
        assert_eq!(streamer.end_of_stream("a"), RouteOutcome::Dropped);

        assert!(reader.is_closed());
        assert!(streamer.is_open("a"));
        assert_eq!(reader.recv().unwrap().as_ref(), b"tail");
        assert!(reader.recv().is_err());
    }

    #[test]
    fn close_releases_name_for_reuse() {
        let (_store, streamer) = streamer();
        let first = streamer.open_read("a").unwrap();
        streamer.close("a").unwrap();

        assert!(first.is_closed());
        assert!(!streamer.is_open("a"));

        let second = streamer.open_read("a").unwrap();
        assert!(!second.same_stream(&first));
    }

    #[test]
    fn close_unknown_name_is_noop() {
        let (_store, streamer) = streamer();
        streamer.close("missing").unwrap();
        assert!(streamer.is_empty());
    }

    #[test]
    fn close_write_stream_publishes_end() {
        let (store, streamer) = streamer();
        let writer = streamer.open_write("w").unwrap();
        (&writer).write_all(b"data").unwrap();

        streamer.close("w").unwrap();

        assert!(writer.is_closed());
        assert_eq!(store.queued(&streamer.config().write_key), 2);
    }

    #[test]
    fn close_all_closes_in_name_order() {
        let (_store, streamer) = streamer();
        let handles: Vec<ReadStream> = ["c", "a", "b"]
            .into_iter()
            .map(|name| streamer.open_read(name).unwrap())
            .collect();

        assert_eq!(streamer.names(), vec!["a", "b", "c"]);
        streamer.close_all().unwrap();

        assert!(streamer.is_empty());
        assert!(handles.iter().all(ReadStream::is_closed));
    }

    #[test]
    fn stats_list_open_streams() {
        let (_store, streamer) = streamer();
        streamer.open_read("in").unwrap();
        streamer.open_write("out").unwrap();

        let stats = streamer.stats();
        assert_eq!(stats.open_streams, 2);
        assert_eq!(
            stats.streams,
            vec![
                StreamInfo {
                    name: "in".to_string(),
                    direction: Direction::Read,
                },
                StreamInfo {
                    name: "out".to_string(),
                    direction: Direction::Write,
                },
            ]
        );

        let json = serde_json::to_value(&stats).unwrap();
        assert_eq!(json["streams"][1]["direction"], "write");
        streamer.close_all().unwrap();
    }

    #[test]
    fn blocked_reader_does_not_stall_routing() {
        let (_store, streamer) = streamer();
        let streamer = Arc::new(streamer);
        let blocked = streamer.open_read("slow").unwrap();
        let waiter = std::thread::spawn(move || blocked.recv_timeout(Duration::from_secs(2)));

        let fast = streamer.open_read("fast").unwrap();
        for _ in 0..100 {
            streamer.route_message(&message("fast", b"."));
        }
        assert_eq!(fast.pending(), 100);

        streamer.route_message(&message("slow", b"!"));
        assert_eq!(waiter.join().unwrap().unwrap().unwrap().as_ref(), b"!");
    }
}
