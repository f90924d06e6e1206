//! Named messages and their envelope encoding.
//!
//! Every payload published on the shared channel is wrapped in an envelope
//! so the receiving side can demultiplex it by stream name:
//! - A 2-byte magic number ("BM")
//! - A 1-byte kind (data or end-of-stream)
//! - A 2-byte little-endian name length and a 4-byte little-endian body length
//! - The UTF-8 stream name, then the body

pub mod codec;
pub mod error;
pub mod message;

pub use codec::{
    decode_envelope, encode_envelope, Envelope, FrameConfig, DEFAULT_MAX_BODY, HEADER_SIZE,
    MAX_NAME_LEN,
};
pub use error::{FrameError, Result};
pub use message::Message;
