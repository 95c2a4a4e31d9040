//! Error types for autofocus drivers.
//!
//! [`FocusError`] is the single error type returned by the transport, the
//! framer and the device drivers built on top of them. It is a closed
//! enumeration: callers are expected to `match` on it (or on
//! [`FocusError::kind`]) rather than inspect message strings.
//!
//! ## Error Hierarchy
//!
//! - **`Connection`**: the serial link could not be opened. Fatal to session
//!   construction.
//! - **`Protocol`**: the byte stream did not look like a valid exchange (no
//!   data, bounded-read timeout, empty line, stray bytes). Usually means the
//!   device is absent, unpowered or disconnected. See [`ProtocolError`].
//! - **`Device`**: the device answered with an `E,<code>` error response.
//! - **`Validation`**: a client-side domain check failed before any bytes were
//!   sent.
//! - **`Verification`**: the device accepted a write but the readback does not
//!   match the request within the parameter's tolerance.
//! - **`Precondition`**: an operation's safety precondition does not hold.
//! - **`UnsupportedProduct`**: the identity query returned a product this
//!   driver does not support.
//! - **`Configuration`**: configuration file or value could not be used.
//! - **`Io`**: wraps `std::io::Error` from writes and shutdown.
//!
//! None of these are retried by the library; every error propagates to the
//! immediate caller.

use thiserror::Error;

/// Convenience alias for results using [`FocusError`].
pub type FocusResult<T> = std::result::Result<T, FocusError>;

// =============================================================================
// Error Kind
// =============================================================================

/// Flat classification of a [`FocusError`], useful for logging and metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// [`FocusError::Connection`]
    Connection,
    /// [`FocusError::Protocol`]
    Protocol,
    /// [`FocusError::Device`]
    Device,
    /// [`FocusError::Validation`]
    Validation,
    /// [`FocusError::Verification`]
    Verification,
    /// [`FocusError::Precondition`]
    Precondition,
    /// [`FocusError::UnsupportedProduct`]
    UnsupportedProduct,
    /// [`FocusError::Configuration`]
    Configuration,
    /// [`FocusError::Io`]
    Io,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            ErrorKind::Connection => "connection",
            ErrorKind::Protocol => "protocol",
            ErrorKind::Device => "device",
            ErrorKind::Validation => "validation",
            ErrorKind::Verification => "verification",
            ErrorKind::Precondition => "precondition",
            ErrorKind::UnsupportedProduct => "unsupported_product",
            ErrorKind::Configuration => "configuration",
            ErrorKind::Io => "io",
        };
        write!(f, "{}", label)
    }
}

// =============================================================================
// Protocol Errors
// =============================================================================

/// Transport-level anomalies detected while reading a response.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// The link reached end-of-stream before all expected lines arrived.
    #[error("no data after {received} of {expected} response line(s)")]
    NoData {
        /// Lines the exchange needed
        expected: usize,
        /// Complete lines read before end-of-stream
        received: usize,
    },

    /// A bounded read expired before a line terminator was seen.
    #[error("read timed out after {timeout_ms} ms")]
    Timeout {
        /// Configured per-line read timeout
        timeout_ms: u64,
    },

    /// The device sent a bare terminator.
    #[error("empty response line (is the device connected and powered?)")]
    EmptyResponse,

    /// A line shaped like an error response without a numeric code.
    #[error("malformed error response '{0}'")]
    MalformedError(String),

    /// Bytes were still buffered after the expected response lines.
    #[error("{0} unexpected byte(s) after response")]
    TrailingData(usize),

    /// A value line could not be converted to the expected type.
    #[error("cannot parse '{line}' as {expected}")]
    UnexpectedValue {
        /// The offending response line
        line: String,
        /// Description of the accepted values
        expected: &'static str,
    },

    /// The response contained bytes outside the ASCII range.
    #[error("response line is not ASCII")]
    NonAscii,
}

impl ProtocolError {
    /// Builds an [`ProtocolError::UnexpectedValue`] for `line`.
    pub fn unexpected(line: &str, expected: &'static str) -> Self {
        Self::UnexpectedValue {
            line: line.to_string(),
            expected,
        }
    }
}

// =============================================================================
// FocusError
// =============================================================================

/// Primary error type for autofocus drivers.
#[derive(Error, Debug)]
pub enum FocusError {
    /// The serial link could not be opened.
    #[error("Unable to connect on {port}: {reason}")]
    Connection {
        /// Port path as configured
        port: String,
        /// Description of the open failure
        reason: String,
    },

    /// The response stream was not a valid exchange.
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// The device rejected the command with `E,<code>`.
    #[error("Device error E,{code}: {message}")]
    Device {
        /// Numeric code from the response
        code: u16,
        /// Fixed message for `code`
        message: &'static str,
    },

    /// A requested value is outside the parameter's domain.
    ///
    /// Always raised before anything is written to the link.
    #[error("Invalid {parameter}: {reason}")]
    Validation {
        /// Parameter the value was meant for
        parameter: &'static str,
        /// Why the value was refused
        reason: String,
    },

    /// The post-write readback does not match the request.
    #[error("Verification failed for {parameter}: requested {requested}, device reports {actual}")]
    Verification {
        /// Parameter that was written
        parameter: &'static str,
        /// Value sent to the device
        requested: String,
        /// Value read back
        actual: String,
    },

    /// A safety precondition for the operation does not hold.
    #[error("Precondition violated: {0}")]
    Precondition(String),

    /// The identity query returned an unsupported product string.
    #[error("Product not supported: '{found}' (expected '{expected}')")]
    UnsupportedProduct {
        /// Product line returned by `DATE`
        found: String,
        /// Product line this driver accepts
        expected: &'static str,
    },

    /// Configuration could not be loaded or failed validation.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Standard I/O failure on write, flush or shutdown.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl FocusError {
    /// Returns the flat [`ErrorKind`] of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            FocusError::Connection { .. } => ErrorKind::Connection,
            FocusError::Protocol(_) => ErrorKind::Protocol,
            FocusError::Device { .. } => ErrorKind::Device,
            FocusError::Validation { .. } => ErrorKind::Validation,
            FocusError::Verification { .. } => ErrorKind::Verification,
            FocusError::Precondition(_) => ErrorKind::Precondition,
            FocusError::UnsupportedProduct { .. } => ErrorKind::UnsupportedProduct,
            FocusError::Configuration(_) => ErrorKind::Configuration,
            FocusError::Io(_) => ErrorKind::Io,
        }
    }

    /// Shorthand for a [`FocusError::Validation`].
    pub fn validation(parameter: &'static str, reason: impl Into<String>) -> Self {
        FocusError::Validation {
            parameter,
            reason: reason.into(),
        }
    }

    /// True if the error means the device did not answer at all.
    pub fn is_device_absent(&self) -> bool {
        matches!(
            self,
            FocusError::Protocol(
                ProtocolError::NoData { .. }
                    | ProtocolError::Timeout { .. }
                    | ProtocolError::EmptyResponse
            )
        )
    }
}
