/// Errors that can occur while building or decoding messages.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FrameError {
    /// The envelope header contains an invalid magic number.
    #[error("invalid envelope magic (expected 0x424D \"BM\")")]
    InvalidMagic,

    /// The envelope kind byte is not recognized.
    #[error("unknown envelope kind {0}")]
    UnknownKind(u8),

    /// A message must be addressed to a non-empty stream name.
    #[error("stream name must not be empty")]
    EmptyName,

    /// The stream name does not fit the 2-byte length field.
    #[error("stream name too long ({len} bytes, max {max})")]
    NameTooLong { len: usize, max: usize },

    /// The stream name is not valid UTF-8.
    #[error("stream name is not valid UTF-8")]
    InvalidName,

    /// The body exceeds the configured maximum size.
    #[error("payload too large ({size} bytes, max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    /// A whole payload ended before the envelope it announced.
    #[error("truncated envelope ({len} of {expected} bytes)")]
    Truncated { len: usize, expected: usize },

    /// A whole payload carried bytes past the end of its envelope.
    #[error("{0} trailing bytes after envelope")]
    TrailingBytes(usize),
}

pub type Result<T> = std::result::Result<T, FrameError>;
