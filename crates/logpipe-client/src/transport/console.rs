//! JSON-lines transport for local streams.

use std::fmt;
use std::io::{self, Write};

use logpipe_events::LogEvent;
use tracing::warn;

use crate::config::ConsoleStream;
use crate::error::DeliveryError;

/// Writes each event as one JSON line to a local stream.
pub struct ConsoleTransport {
    writer: Box<dyn Write + Send>,
    closed: bool,
}

impl fmt::Debug for ConsoleTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConsoleTransport")
            .field("closed", &self.closed)
            .finish_non_exhaustive()
    }
}

impl ConsoleTransport {
    /// Creates a transport writing to a standard stream.
    #[must_use]
    pub fn new(stream: ConsoleStream) -> Self {
        match stream {
            ConsoleStream::Stdout => Self::with_writer(io::stdout()),
            ConsoleStream::Stderr => Self::with_writer(io::stderr()),
        }
    }

    /// Creates a transport writing to any writer.
    #[must_use]
    pub fn with_writer(writer: impl Write + Send + 'static) -> Self {
        Self {
            writer: Box::new(writer),
            closed: false,
        }
    }

    /// Writes the batch. Events that fail to serialize are skipped.
    ///
    /// # Errors
    ///
    /// Returns [`DeliveryError::Io`] if the stream rejects a write.
    pub fn send(&mut self, batch: &[LogEvent]) -> Result<(), DeliveryError> {
        if self.closed {
            return Err(DeliveryError::Closed);
        }
        for event in batch {
            match event.to_json_line() {
                Ok(line) => writeln!(self.writer, "{line}")?,
                Err(e) => {
                    warn!(event_id = %event.id, error = %e, "skipping unserializable event");
                }
            }
        }
        self.writer.flush()?;
        Ok(())
    }

    /// Flushes the writer and marks the transport closed.
    ///
    /// # Errors
    ///
    /// Returns an error if the final flush fails.
    pub fn close(&mut self) -> Result<(), DeliveryError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.writer.flush()?;
        Ok(())
    }
}
