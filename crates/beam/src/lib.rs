//! Named byte streams multiplexed over a pooled backing-store channel.
//!
//! beam lets many independent, named, directional byte streams share one
//! pooled connection to a key/queue store. Writers publish envelopes tagged
//! with their stream name; a dispatcher on the other side routes each one to
//! the read stream open under that name.
//!
//! # Crate Structure
//!
//! - [`transport`]: Pooled channel contract, connection pool, in-memory store
//! - [`frame`]: Messages and the envelope wire format
//! - [`stream`]: The streamer registry, read/write streams, copy adapters, dispatcher

/// Re-export transport types.
pub mod transport {
    pub use beam_transport::*;
}

/// Re-export frame types.
pub mod frame {
    pub use beam_frame::*;
}

/// Re-export stream types.
pub mod stream {
    pub use beam_stream::*;
}

pub use beam_stream::{
    Direction, Dispatcher, ReadStream, StreamError, Streamer, StreamerConfig, WriteStream,
};
