//! Serial Port Abstractions
//!
//! Shared types for async serial communication used by the line transport and
//! the device drivers.
//!
//! # Types
//!
//! - [`SerialPortIO`]: Trait alias combining AsyncRead + AsyncWrite for serial ports
//! - [`DynSerial`]: Type-erased boxed serial port
//! - [`SerialSettings`]: Port path, baud rate and bounded read timeout
//!
//! # Utilities
//!
//! - [`open_serial_async`]: Open a serial port with spawn_blocking (feature `serial`)
//!
//! # Example
//!
//! ```rust,ignore
//! use autofocus_core::serial::{open_serial_async, SerialSettings};
//!
//! let settings = SerialSettings::new("/dev/ttyUSB0", 460_800);
//! let port = open_serial_async(&settings, "PureFocus850").await?;
//! ```

use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};

// =============================================================================
// Serial Port Trait
// =============================================================================

/// Trait alias for async serial port I/O.
///
/// Any type implementing `AsyncRead + AsyncWrite + Unpin + Send` can be used
/// as a serial port. This includes:
/// - `tokio_serial::SerialStream` (real hardware)
/// - `tokio::io::DuplexStream` (testing)
/// - [`crate::mock_serial::MockSerialPort`] (scripted device tests)
pub trait SerialPortIO: AsyncRead + AsyncWrite + Unpin + Send {}

// Blanket implementation for all types meeting the requirements
impl<T: AsyncRead + AsyncWrite + Unpin + Send> SerialPortIO for T {}

/// Type-erased boxed serial port.
pub type DynSerial = Box<dyn SerialPortIO>;

// =============================================================================
// Settings
// =============================================================================

/// Link parameters for a point-to-point serial connection.
///
/// Framing is fixed at 8N1 without flow control.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SerialSettings {
    /// Serial port path (e.g., "/dev/ttyUSB0", "COM8")
    pub port: String,
    /// Baud rate
    pub baud_rate: u32,
    /// Bound on how long a single response line may take to arrive
    pub read_timeout: Duration,
}

impl SerialSettings {
    /// Default bounded read timeout.
    pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(5);

    /// Settings with the default read timeout.
    pub fn new(port: impl Into<String>, baud_rate: u32) -> Self {
        Self {
            port: port.into(),
            baud_rate,
            read_timeout: Self::DEFAULT_READ_TIMEOUT,
        }
    }

    /// Override the bounded read timeout.
    ///
    /// A shorter timeout detects an absent device sooner but risks a
    /// premature protocol error on a slow one.
    pub fn with_read_timeout(mut self, read_timeout: Duration) -> Self {
        self.read_timeout = read_timeout;
        self
    }
}

// =============================================================================
// Serial Port Utilities
// =============================================================================

/// Open a serial port asynchronously using spawn_blocking.
///
/// Wraps the port opening in `spawn_blocking` to avoid blocking the async
/// runtime during initialization. Standard settings are applied: 8N1, no flow
/// control.
///
/// # Errors
///
/// Returns [`FocusError::Connection`](crate::error::FocusError::Connection) if
/// the port cannot be opened or the blocking task fails.
#[cfg(feature = "serial")]
pub async fn open_serial_async(
    settings: &SerialSettings,
    device_name: &str,
) -> crate::error::FocusResult<tokio_serial::SerialStream> {
    use crate::error::FocusError;
    use tokio::task::spawn_blocking;
    use tokio_serial::SerialPortBuilderExt;

    let port_path = settings.port.clone();
    let baud_rate = settings.baud_rate;

    let opened = spawn_blocking(move || {
        tokio_serial::new(&port_path, baud_rate)
            .data_bits(tokio_serial::DataBits::Eight)
            .parity(tokio_serial::Parity::None)
            .stop_bits(tokio_serial::StopBits::One)
            .flow_control(tokio_serial::FlowControl::None)
            .open_native_async()
    })
    .await
    .map_err(|e| FocusError::Connection {
        port: settings.port.clone(),
        reason: format!("spawn_blocking for serial port opening failed: {}", e),
    })?;

    match opened {
        Ok(port) => {
            tracing::info!(
                device = device_name,
                port = %settings.port,
                baud_rate,
                "Opened serial port"
            );
            Ok(port)
        }
        Err(e) => Err(FocusError::Connection {
            port: settings.port.clone(),
            reason: describe_open_error(&e),
        }),
    }
}

#[cfg(feature = "serial")]
fn describe_open_error(err: &tokio_serial::Error) -> String {
    match err.kind() {
        tokio_serial::ErrorKind::NoDevice => format!("no such device ({})", err.description),
        tokio_serial::ErrorKind::InvalidInput => format!("invalid settings ({})", err.description),
        tokio_serial::ErrorKind::Io(kind) => format!("{:?}: {}", kind, err.description),
        _ => err.description.clone(),
    }
}
