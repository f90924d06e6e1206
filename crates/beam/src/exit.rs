use std::fmt;
use std::io;

use beam_frame::FrameError;
use beam_stream::StreamError;
use beam_transport::TransportError;

// Exit code constants.
pub const SUCCESS: i32 = 0;
pub const FAILURE: i32 = 1;
pub const TRANSPORT_ERROR: i32 = 3;
pub const HEALTH_CHECK_FAILED: i32 = 30;
pub const DATA_INVALID: i32 = 60;
pub const USAGE: i32 = 64;
pub const TIMEOUT: i32 = 124;
pub const INTERNAL: i32 = 125;

pub type CliResult<T> = Result<T, CliError>;

#[derive(Debug)]
pub struct CliError {
    pub code: i32,
    pub message: String,
}

impl CliError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CliError {}

pub fn io_error(context: &str, err: io::Error) -> CliError {
    let code = match err.kind() {
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => TIMEOUT,
        io::ErrorKind::BrokenPipe | io::ErrorKind::UnexpectedEof => FAILURE,
        io::ErrorKind::InvalidData => DATA_INVALID,
        _ => INTERNAL,
    };
    CliError::new(code, format!("{context}: {err}"))
}

pub fn transport_error(context: &str, err: TransportError) -> CliError {
    match err {
        TransportError::Io(source) if source.kind() == io::ErrorKind::TimedOut => {
            io_error(context, source)
        }
        other => CliError::new(TRANSPORT_ERROR, format!("{context}: {other}")),
    }
}

pub fn frame_error(context: &str, err: FrameError) -> CliError {
    match err {
        FrameError::EmptyName | FrameError::NameTooLong { .. } => {
            CliError::new(USAGE, format!("{context}: {err}"))
        }
        other => CliError::new(DATA_INVALID, format!("{context}: {other}")),
    }
}

pub fn stream_error(context: &str, err: StreamError) -> CliError {
    match err {
        StreamError::Transport(err) => transport_error(context, err),
        StreamError::Frame(err) => frame_error(context, err),
        StreamError::Io(err) => io_error(context, err),
        StreamError::InvalidName | StreamError::AlreadyOpen(_) => {
            CliError::new(USAGE, format!("{context}: {err}"))
        }
        StreamError::Closed(_) => CliError::new(FAILURE, format!("{context}: {err}")),
        other => CliError::new(INTERNAL, format!("{context}: {other}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connection_fault_maps_to_transport_code() {
        let err = StreamError::Transport(TransportError::Io(io::Error::from(
            io::ErrorKind::ConnectionReset,
        )));
        assert_eq!(stream_error("close", err).code, TRANSPORT_ERROR);
    }

    #[test]
    fn duplicate_open_is_a_usage_error() {
        let err = stream_error("open", StreamError::AlreadyOpen("logs".to_string()));
        assert_eq!(err.code, USAGE);
        assert_eq!(err.message, "open: stream 'logs' is already open");
    }

    #[test]
    fn malformed_envelope_is_invalid_data() {
        let err = stream_error("dispatch", StreamError::Frame(FrameError::InvalidMagic));
        assert_eq!(err.code, DATA_INVALID);
    }

    #[test]
    fn timeout_keeps_timeout_code() {
        let err = io_error("copy", io::Error::from(io::ErrorKind::TimedOut));
        assert_eq!(err.code, TIMEOUT);
    }
}
