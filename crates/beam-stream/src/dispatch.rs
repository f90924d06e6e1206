use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use beam_frame::Envelope;
use beam_transport::SharedChannel;
use tracing::{debug, warn};

use crate::error::{Result, StreamError};
use crate::handle::RouteOutcome;
use crate::registry::Streamer;

/// Pumps inbound envelopes from the channel into a [`Streamer`].
///
/// Receives under the streamer's `read_key`, routing `Data` envelopes to
/// their stream and turning `End` envelopes into end-of-stream.
pub struct Dispatcher {
    streamer: Arc<Streamer>,
    channel: SharedChannel,
    malformed: Arc<AtomicU64>,
}

impl Dispatcher {
    pub fn new(streamer: Arc<Streamer>, channel: SharedChannel) -> Self {
        Self {
            streamer,
            channel,
            malformed: Arc::new(AtomicU64::new(0)),
        }
    }

    /// A dispatcher that receives on the channel the streamer publishes to.
    pub fn for_streamer(streamer: Arc<Streamer>) -> Self {
        let channel = Arc::clone(streamer.channel());
        Self::new(streamer, channel)
    }

    pub fn streamer(&self) -> &Arc<Streamer> {
        &self.streamer
    }

    /// Number of payloads that failed to decode.
    pub fn malformed(&self) -> u64 {
        self.malformed.load(Ordering::Relaxed)
    }

    /// Receive and route at most one envelope.
    ///
    /// Returns `Ok(None)` when the poll interval elapses with nothing to
    /// receive. Malformed payloads are skipped and reported as dropped.
    pub fn dispatch_once(&self) -> Result<Option<RouteOutcome>> {
        let config = self.streamer.config();
        let Some(payload) = self
            .channel
            .receive(&config.read_key, config.poll_interval)?
        else {
            return Ok(None);
        };

        let envelope = match Envelope::from_payload(payload, &config.frame) {
            Ok(envelope) => envelope,
            Err(err) => {
                self.malformed.fetch_add(1, Ordering::Relaxed);
                warn!(key = %config.read_key, error = %err, "skipping malformed envelope");
                return Ok(Some(RouteOutcome::Dropped));
            }
        };

        let outcome = match &envelope {
            Envelope::Data(message) => self.streamer.route_message(message),
            Envelope::End { name } => self.streamer.end_of_stream(name),
        };
        Ok(Some(outcome))
    }

    /// Dispatch until `stop` is set or the channel faults.
    ///
    /// The stop flag is checked between receives, so stopping takes up to
    /// one poll interval.
    pub fn run(&self, stop: &AtomicBool) -> Result<()> {
        let key = &self.streamer.config().read_key;
        debug!(key = %key, "dispatcher started");
        while !stop.load(Ordering::SeqCst) {
            if let Err(err) = self.dispatch_once() {
                warn!(key = %key, error = %err, "dispatcher stopped on fault");
                return Err(err);
            }
        }
        debug!(key = %key, "dispatcher stopped");
        Ok(())
    }

    /// Run the dispatch loop on a background thread.
    pub fn spawn(self) -> Result<DispatcherHandle> {
        let stop = Arc::new(AtomicBool::new(false));
        let malformed = Arc::clone(&self.malformed);
        let thread = {
            let stop = Arc::clone(&stop);
            thread::Builder::new()
                .name("beam-dispatch".to_string())
                .spawn(move || self.run(&stop))?
        };
        Ok(DispatcherHandle {
            stop,
            malformed,
            thread: Some(thread),
        })
    }
}

/// Owner of a running dispatcher thread.
///
/// Dropping the handle signals the loop to stop without waiting for it.
pub struct DispatcherHandle {
    stop: Arc<AtomicBool>,
    malformed: Arc<AtomicU64>,
    thread: Option<JoinHandle<Result<()>>>,
}

impl DispatcherHandle {
    /// Signal the loop to stop and wait for it, returning its result.
    pub fn stop(mut self) -> Result<()> {
        self.stop.store(true, Ordering::SeqCst);
        match self.thread.take() {
            Some(thread) => thread
                .join()
                .map_err(|_| StreamError::AdapterPanicked("dispatcher".to_string()))?,
            None => Ok(()),
        }
    }

    /// Number of payloads the running dispatcher failed to decode.
    pub fn malformed(&self) -> u64 {
        self.malformed.load(Ordering::Relaxed)
    }

    /// Whether the loop has exited, on stop or on a fault.
    pub fn is_finished(&self) -> bool {
        self.thread.as_ref().is_none_or(JoinHandle::is_finished)
    }
}

impl Drop for DispatcherHandle {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use std::io::Read;
    use std::time::{Duration, Instant};

    use beam_frame::FrameConfig;
    use beam_transport::{ConnectionPool, MemoryStore, PooledChannel, TransportError};

    use super::*;
    use crate::config::StreamerConfig;

    const KEY: &str = "beam:test";

    fn setup() -> (MemoryStore, SharedChannel, Dispatcher) {
        let store = MemoryStore::new();
        let channel: SharedChannel = Arc::new(ConnectionPool::new(store.clone()));
        let config = StreamerConfig::new("beam:unused", KEY)
            .with_poll_interval(Duration::from_millis(20));
        let streamer = Arc::new(Streamer::with_config(Arc::clone(&channel), config));
        (store, Arc::clone(&channel), Dispatcher::new(streamer, channel))
    }

    fn publish(channel: &SharedChannel, envelope: Envelope) {
        channel.publish(KEY, &envelope.to_bytes().unwrap()).unwrap();
    }

    #[test]
    fn dispatch_once_times_out_when_idle() {
        let (_store, _channel, dispatcher) = setup();
        assert_eq!(dispatcher.dispatch_once().unwrap(), None);
    }

    #[test]
    fn data_and_end_reach_reader() {
        let (_store, channel, dispatcher) = setup();
        let mut reader = dispatcher.streamer().open_read("logs").unwrap();

        publish(&channel, Envelope::data("logs", &b"hello\n"[..]).unwrap());
        publish(&channel, Envelope::end("logs").unwrap());

        assert_eq!(
            dispatcher.dispatch_once().unwrap(),
            Some(RouteOutcome::Delivered)
        );
        assert_eq!(
            dispatcher.dispatch_once().unwrap(),
            Some(RouteOutcome::Delivered)
        );

        let mut out = String::new();
        reader.read_to_string(&mut out).unwrap();
        assert_eq!(out, "hello\n");
    }

    #[test]
    fn malformed_payload_is_skipped() {
        let (_store, channel, dispatcher) = setup();
        channel.publish(KEY, b"not an envelope").unwrap();
        publish(&channel, Envelope::data("ghost", &b"x"[..]).unwrap());

        assert_eq!(
            dispatcher.dispatch_once().unwrap(),
            Some(RouteOutcome::Dropped)
        );
        assert_eq!(dispatcher.malformed(), 1);
        assert_eq!(
            dispatcher.dispatch_once().unwrap(),
            Some(RouteOutcome::Dropped)
        );
        assert_eq!(dispatcher.streamer().stats().dropped, 1);
    }

    #[test]
    fn oversized_body_counts_as_malformed() {
        let store = MemoryStore::new();
        let channel: SharedChannel = Arc::new(ConnectionPool::new(store));
        let config = StreamerConfig::new("out", KEY)
            .with_poll_interval(Duration::from_millis(20))
            .with_frame_config(FrameConfig { max_body_size: 2 });
        let streamer = Arc::new(Streamer::with_config(Arc::clone(&channel), config));
        let dispatcher = Dispatcher::new(streamer, Arc::clone(&channel));

        publish(&channel, Envelope::data("a", &b"too long"[..]).unwrap());
        assert_eq!(
            dispatcher.dispatch_once().unwrap(),
            Some(RouteOutcome::Dropped)
        );
        assert_eq!(dispatcher.malformed(), 1);
    }

    #[test]
    fn spawned_dispatcher_stops_on_request() {
        let (_store, channel, dispatcher) = setup();
        let streamer = Arc::clone(dispatcher.streamer());
        let reader = streamer.open_read("logs").unwrap();
        let handle = dispatcher.spawn().unwrap();

        publish(&channel, Envelope::data("logs", &b"ping"[..]).unwrap());
        let got = reader.recv_timeout(Duration::from_secs(2)).unwrap();
        assert_eq!(got.unwrap().as_ref(), b"ping");

        handle.stop().unwrap();
    }

    #[test]
    fn transport_fault_stops_the_loop() {
        let (store, _channel, dispatcher) = setup();
        let handle = dispatcher.spawn().unwrap();
        store.shutdown();

        let deadline = Instant::now() + Duration::from_secs(2);
        while !handle.is_finished() && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(5));
        }
        assert!(matches!(
            handle.stop(),
            Err(StreamError::Transport(TransportError::Shutdown))
        ));
    }
}
