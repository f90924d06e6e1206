use std::io;

/// Errors that can occur in stream operations.
#[derive(Debug, thiserror::Error)]
pub enum StreamError {
    /// A stream with this name is already open in the streamer.
    #[error("stream '{0}' is already open")]
    AlreadyOpen(String),

    /// The stream has been closed or reached end-of-stream.
    #[error("stream '{0}' is closed")]
    Closed(String),

    /// Stream names must be non-empty and fit the envelope name field.
    #[error("stream name must be 1 to 65535 bytes")]
    InvalidName,

    /// Fault reported by the pooled connection.
    #[error("transport error: {0}")]
    Transport(#[from] beam_transport::TransportError),

    /// Envelope encoding/decoding error.
    #[error("frame error: {0}")]
    Frame(#[from] beam_frame::FrameError),

    /// I/O error from a copy source or sink.
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),

    /// The background publisher of a write stream panicked.
    #[error("write adapter for stream '{0}' panicked")]
    AdapterPanicked(String),
}

impl StreamError {
    /// Recover a `StreamError` carried inside an `io::Error`.
    ///
    /// Stream `Read`/`Write` impls wrap their errors so that copy adapters
    /// can hand the original error back to the caller.
    pub fn from_io(err: io::Error) -> Self {
        if err.get_ref().is_some_and(|inner| inner.is::<StreamError>()) {
            if let Some(inner) = err.into_inner() {
                match inner.downcast::<StreamError>() {
                    Ok(stream_err) => return *stream_err,
                    Err(other) => return StreamError::Io(io::Error::other(other)),
                }
            }
            return StreamError::Io(io::Error::other("unknown stream error"));
        }
        StreamError::Io(err)
    }

    fn io_kind(&self) -> io::ErrorKind {
        match self {
            StreamError::AlreadyOpen(_) => io::ErrorKind::AlreadyExists,
            StreamError::Closed(_) => io::ErrorKind::BrokenPipe,
            StreamError::InvalidName => io::ErrorKind::InvalidInput,
            StreamError::Transport(beam_transport::TransportError::Io(err)) => err.kind(),
            StreamError::Frame(_) => io::ErrorKind::InvalidData,
            StreamError::Io(err) => err.kind(),
            _ => io::ErrorKind::Other,
        }
    }
}

impl From<StreamError> for io::Error {
    fn from(err: StreamError) -> Self {
        if let StreamError::Io(inner) = err {
            return inner;
        }
        io::Error::new(err.io_kind(), err)
    }
}

pub type Result<T> = std::result::Result<T, StreamError>;
