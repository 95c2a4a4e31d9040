//! `autofocus-core`
//!
//! Transport, framing and error types shared by serial autofocus drivers.
//!
//! ## Layers
//!
//! - [`serial`]: port settings and the type-erased [`DynSerial`] stream
//! - [`transport`]: [`LineTransport`], bounded terminator-delimited reads over
//!   an exclusively owned port
//! - [`framer`]: ASCII command encoding and fixed-count line decoding
//! - [`error`]: the closed [`FocusError`] enumeration
//!
//! With the `mock` feature, [`mock_serial`] provides a channel-backed port and
//! a harness for scripting device responses in tests.

pub mod error;
pub mod framer;
#[cfg(any(test, feature = "mock"))]
pub mod mock_serial;
pub mod serial;
pub mod transport;

pub use error::{ErrorKind, FocusError, FocusResult, ProtocolError};
pub use framer::Command;
pub use serial::{DynSerial, SerialPortIO, SerialSettings};
pub use transport::LineTransport;
