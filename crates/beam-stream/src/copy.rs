//! Copy adapters between `std::io` endpoints and named streams.
//!
//! Both adapters leave the stream registered when they return: closing it,
//! on success or after a failure, is up to the caller.

use std::io::{self, Read, Write};

use tracing::debug;

use crate::error::{Result, StreamError};
use crate::registry::Streamer;

impl Streamer {
    /// Open a write stream `name` and copy `source` into it until EOF.
    ///
    /// Returns the number of bytes copied once every chunk has been
    /// published. A stream error raised mid-copy is returned as itself,
    /// not as the `io::Error` that carried it.
    pub fn copy_into<R: Read + ?Sized>(&self, name: &str, source: &mut R) -> Result<u64> {
        let stream = self.open_write(name)?;
        let mut sink = &stream;

        let copied = io::copy(source, &mut sink).map_err(StreamError::from_io)?;
        sink.flush().map_err(StreamError::from_io)?;

        debug!(stream = %name, bytes = copied, "copied source into stream");
        Ok(copied)
    }

    /// Open a read stream `name` and copy it into `sink` until end-of-stream.
    pub fn copy_from<W: Write + ?Sized>(&self, name: &str, sink: &mut W) -> Result<u64> {
        let stream = self.open_read(name)?;
        let mut source = &stream;

        let copied = io::copy(&mut source, sink).map_err(StreamError::from_io)?;

        debug!(stream = %name, bytes = copied, "copied stream into sink");
        Ok(copied)
    }
}
