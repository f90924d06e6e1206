use std::time::Duration;

use beam_frame::FrameConfig;

/// Default key write streams publish under.
pub const DEFAULT_WRITE_KEY: &str = "beam:out";
/// Default key the dispatcher receives from.
pub const DEFAULT_READ_KEY: &str = "beam:in";
/// Default dispatcher receive timeout.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Configuration for a [`Streamer`](crate::Streamer) and its dispatcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamerConfig {
    /// Key write streams publish their envelopes under.
    pub write_key: String,
    /// Key inbound envelopes are received from.
    pub read_key: String,
    /// How long a single dispatcher receive waits before re-checking for stop.
    pub poll_interval: Duration,
    /// Envelope codec limits; `max_body_size` also caps outbound chunks.
    pub frame: FrameConfig,
}

impl StreamerConfig {
    /// Config with explicit write and read keys.
    pub fn new(write_key: impl Into<String>, read_key: impl Into<String>) -> Self {
        Self {
            write_key: write_key.into(),
            read_key: read_key.into(),
            ..Self::default()
        }
    }

    /// Override the dispatcher poll interval.
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Override the envelope codec limits.
    pub fn with_frame_config(mut self, frame: FrameConfig) -> Self {
        self.frame = frame;
        self
    }
}

impl Default for StreamerConfig {
    fn default() -> Self {
        Self {
            write_key: DEFAULT_WRITE_KEY.to_string(),
            read_key: DEFAULT_READ_KEY.to_string(),
            poll_interval: DEFAULT_POLL_INTERVAL,
            frame: FrameConfig::default(),
        }
    }
}
