//! Channel-backed serial port for exercising drivers without hardware.
//!
//! [`MockSerialPort`] implements `AsyncRead` and `AsyncWrite` and is handed to
//! the code under test. [`MockDeviceHarness`] stays with the test and plays the
//! device: it asserts on what was written and feeds back response bytes.
//!
//! Each [`MockDeviceHarness::send_response`] call arrives at the port as one
//! chunk, so bytes sent together are buffered together on the reading side.
//! That makes it possible to script trailing garbage after a response.
//!
//! # Example
//!
//! ```rust,ignore
//! use autofocus_core::mock_serial;
//! use autofocus_core::transport::LineTransport;
//!
//! let (port, mut harness) = mock_serial::new();
//! let mut transport = LineTransport::new(Box::new(port), "mock", Duration::from_secs(1));
//!
//! let device = tokio::spawn(async move {
//!     harness.expect_and_respond(b"LENSP\r", b"1\r").await;
//! });
//! transport.send(b"LENSP\r").await?;
//! ```

#![allow(clippy::panic, clippy::expect_used)]

use std::collections::VecDeque;
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

/// How long harness expectations wait before failing the test.
const EXPECT_TIMEOUT: Duration = Duration::from_secs(2);

/// The client-facing side of the mock serial port.
#[derive(Debug)]
pub struct MockSerialPort {
    writes_tx: UnboundedSender<Vec<u8>>,
    reads_rx: UnboundedReceiver<Vec<u8>>,
    read_buffer: VecDeque<u8>,
}

/// The test-facing side, scripting device behavior.
#[derive(Debug)]
pub struct MockDeviceHarness {
    writes_rx: UnboundedReceiver<Vec<u8>>,
    reads_tx: UnboundedSender<Vec<u8>>,
    /// Written by the client but not yet consumed by an expectation
    write_buffer: Vec<u8>,
}

/// Creates a connected port/harness pair.
pub fn new() -> (MockSerialPort, MockDeviceHarness) {
    let (client_to_harness_tx, client_to_harness_rx) = mpsc::unbounded_channel();
    let (harness_to_client_tx, harness_to_client_rx) = mpsc::unbounded_channel();

    let port = MockSerialPort {
        writes_tx: client_to_harness_tx,
        reads_rx: harness_to_client_rx,
        read_buffer: VecDeque::new(),
    };

    let harness = MockDeviceHarness {
        writes_rx: client_to_harness_rx,
        reads_tx: harness_to_client_tx,
        write_buffer: Vec::new(),
    };

    (port, harness)
}

impl MockSerialPort {
    fn fill(&mut self, buf: &mut ReadBuf<'_>) {
        let to_read = std::cmp::min(buf.remaining(), self.read_buffer.len());
        let chunk: Vec<u8> = self.read_buffer.drain(..to_read).collect();
        buf.put_slice(&chunk);
    }
}

impl AsyncRead for MockSerialPort {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        if !self.read_buffer.is_empty() {
            self.fill(buf);
            return Poll::Ready(Ok(()));
        }

        match self.reads_rx.poll_recv(cx) {
            Poll::Ready(Some(chunk)) => {
                self.read_buffer.extend(chunk);
                self.fill(buf);
                Poll::Ready(Ok(()))
            }
            // Harness dropped: end of stream
            Poll::Ready(None) => Poll::Ready(Ok(())),
            Poll::Pending => Poll::Pending,
        }
    }
}

impl AsyncWrite for MockSerialPort {
    fn poll_write(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        match self.writes_tx.send(buf.to_vec()) {
            Ok(_) => Poll::Ready(Ok(buf.len())),
            Err(_) => Poll::Ready(Err(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "mock device harness disconnected",
            ))),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}

impl MockDeviceHarness {
    /// Queue bytes for the client to read.
    ///
    /// # Errors
    /// Returns error if the client port has been dropped.
    pub fn send_response(&self, data: &[u8]) -> Result<(), &'static str> {
        self.reads_tx
            .send(data.to_vec())
            .map_err(|_| "Failed to send response: client port disconnected")
    }

    /// Wait for the client to write `expected` and assert on it.
    ///
    /// # Panics
    /// Panics on mismatch, on timeout, or if the client port is dropped.
    pub async fn expect_write(&mut self, expected: &[u8]) {
        while self.write_buffer.len() < expected.len() {
            match tokio::time::timeout(EXPECT_TIMEOUT, self.writes_rx.recv()).await {
                Ok(Some(chunk)) => self.write_buffer.extend_from_slice(&chunk),
                Ok(None) => panic!("Client-side port closed while expecting a write."),
                Err(_) => panic!(
                    "Timeout waiting for write. Expected `{:?}`, but only received `{:?}`.",
                    String::from_utf8_lossy(expected),
                    String::from_utf8_lossy(&self.write_buffer),
                ),
            }
        }

        let actual = &self.write_buffer[..expected.len()];
        assert_eq!(
            actual,
            expected,
            "Mismatch in expected write. Expected `{:?}`, got `{:?}`.",
            String::from_utf8_lossy(expected),
            String::from_utf8_lossy(actual)
        );
        self.write_buffer.drain(..expected.len());
    }

    /// Expect a write, then answer it.
    pub async fn expect_and_respond(&mut self, expected: &[u8], response: &[u8]) {
        self.expect_write(expected).await;
        self.send_response(response)
            .expect("Failed to send response");
    }

    /// Next command written by the client, up to and including `terminator`.
    ///
    /// Returns `None` once the client port is dropped. Unlike
    /// [`expect_write`](Self::expect_write) this never times out, so a
    /// simulated device can loop on it for the lifetime of a session.
    pub async fn next_command(&mut self, terminator: u8) -> Option<Vec<u8>> {
        loop {
            if let Some(pos) = self.write_buffer.iter().position(|&b| b == terminator) {
                return Some(self.write_buffer.drain(..=pos).collect());
            }
            let chunk = self.writes_rx.recv().await?;
            self.write_buffer.extend_from_slice(&chunk);
        }
    }

    /// Assert that the client wrote nothing within `quiet`.
    ///
    /// # Panics
    /// Panics if any byte arrives.
    pub async fn expect_silence(&mut self, quiet: Duration) {
        assert!(
            self.write_buffer.is_empty(),
            "Unconsumed write `{:?}`",
            String::from_utf8_lossy(&self.write_buffer)
        );
        if let Ok(Some(chunk)) = tokio::time::timeout(quiet, self.writes_rx.recv()).await {
            panic!(
                "Expected no writes, got `{:?}`",
                String::from_utf8_lossy(&chunk)
            );
        }
    }

    /// Discard pending writes without asserting their content.
    pub async fn drain_writes(&mut self) {
        let short_timeout = Duration::from_millis(50);
        while let Ok(Some(chunk)) =
            tokio::time::timeout(short_timeout, self.writes_rx.recv()).await
        {
            self.write_buffer.extend_from_slice(&chunk);
        }
        self.write_buffer.clear();
    }
}
