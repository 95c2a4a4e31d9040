//! Line-oriented transport over an exclusively owned serial port.
//!
//! [`LineTransport`] sends raw bytes and reads up to a line terminator with a
//! bounded timeout. It knows nothing about commands or error responses; that
//! is the job of [`crate::framer`] and the device drivers.
//!
//! The transport is owned by value. Every method takes `&mut self`, so two
//! exchanges can never be interleaved on one connection.

use crate::error::{FocusResult, ProtocolError};
use crate::serial::DynSerial;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

/// A duplex byte channel with a bounded, terminator-delimited read.
pub struct LineTransport {
    reader: BufReader<DynSerial>,
    name: String,
    read_timeout: Duration,
    terminator: u8,
}

impl LineTransport {
    /// Carriage return, used for both requests and responses.
    pub const DEFAULT_TERMINATOR: u8 = b'\r';

    /// Wrap an already opened port.
    pub fn new(port: DynSerial, name: impl Into<String>, read_timeout: Duration) -> Self {
        Self {
            reader: BufReader::new(port),
            name: name.into(),
            read_timeout,
            terminator: Self::DEFAULT_TERMINATOR,
        }
    }

    /// Open a serial port and wrap it.
    #[cfg(feature = "serial")]
    pub async fn open(
        settings: &crate::serial::SerialSettings,
        device_name: &str,
    ) -> FocusResult<Self> {
        let port = crate::serial::open_serial_async(settings, device_name).await?;
        Ok(Self::new(
            Box::new(port),
            settings.port.clone(),
            settings.read_timeout,
        ))
    }

    /// Use a different line terminator.
    pub fn with_terminator(mut self, terminator: u8) -> Self {
        self.terminator = terminator;
        self
    }

    /// Port name used in logs.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn read_timeout(&self) -> Duration {
        self.read_timeout
    }

    pub fn terminator(&self) -> u8 {
        self.terminator
    }

    /// Write `bytes` and flush.
    pub async fn send(&mut self, bytes: &[u8]) -> FocusResult<()> {
        let writer = self.reader.get_mut();
        writer.write_all(bytes).await?;
        writer.flush().await?;
        Ok(())
    }

    /// Read one line, terminator included.
    ///
    /// Returns `Ok(None)` when the stream ends before any byte arrives. A
    /// stream that ends mid-line yields the partial line. Expiry of the bounded
    /// read is a [`ProtocolError::Timeout`].
    pub async fn read_line(&mut self) -> FocusResult<Option<Vec<u8>>> {
        let mut line = Vec::with_capacity(32);
        let read = self.reader.read_until(self.terminator, &mut line);

        match tokio::time::timeout(self.read_timeout, read).await {
            Ok(Ok(0)) => Ok(None),
            Ok(Ok(_)) => Ok(Some(line)),
            Ok(Err(e)) => Err(e.into()),
            Err(_) => Err(ProtocolError::Timeout {
                timeout_ms: self.read_timeout.as_millis() as u64,
            }
            .into()),
        }
    }

    /// Bytes already received but not yet consumed by a read.
    ///
    /// Only reports data the transport has buffered; it never waits for more.
    pub fn pending_input(&self) -> &[u8] {
        self.reader.buffer()
    }

    /// Discard `count` buffered bytes.
    pub fn consume_pending(&mut self, count: usize) {
        use tokio::io::AsyncBufRead;
        let count = count.min(self.reader.buffer().len());
        std::pin::Pin::new(&mut self.reader).consume(count);
    }

    /// Shut the port down, releasing it.
    pub async fn close(mut self) -> FocusResult<()> {
        self.reader.get_mut().shutdown().await?;
        tracing::debug!(port = %self.name, "Transport closed");
        Ok(())
    }
}

impl std::fmt::Debug for LineTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LineTransport")
            .field("name", &self.name)
            .field("read_timeout", &self.read_timeout)
            .field("terminator", &(self.terminator as char))
            .finish()
    }
}
