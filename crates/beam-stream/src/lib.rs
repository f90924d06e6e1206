//! Named byte streams multiplexed over a shared pooled channel.
//!
//! This is the core of beam. A [`Streamer`] maps stream names to open
//! [`ReadStream`]s and [`WriteStream`]s, enforces one open stream per name,
//! routes inbound [`Message`](beam_frame::Message)s to the stream they are
//! addressed to, and closes streams in a well-defined order.

pub mod config;
pub mod copy;
pub mod dispatch;
pub mod error;
pub mod handle;
pub mod read;
pub mod registry;
pub mod write;

pub use config::StreamerConfig;
pub use dispatch::{Dispatcher, DispatcherHandle};
pub use error::{Result, StreamError};
pub use handle::{Direction, Endpoint, RouteOutcome, StreamHandle};
pub use read::ReadStream;
pub use registry::{StreamInfo, Streamer, StreamerStats};
pub use write::WriteStream;
