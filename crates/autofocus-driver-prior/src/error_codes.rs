//! PureFocus850 error responses.
//!
//! The controller reports a rejected command with a single `E,<code>` line.
//! Every response line, including both identity lines, goes through
//! [`classify`] before the caller parses it.

use autofocus_core::{FocusError, FocusResult, ProtocolError};

/// Documented PureFocus850 error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeviceErrorCode {
    NotIdle = 2,
    NoDrive = 3,
    StringParse = 4,
    CommandNotFound = 5,
    ValueOutOfRange = 8,
    Argument1OutOfRange = 10,
    Argument2OutOfRange = 11,
    Argument3OutOfRange = 12,
    Argument4OutOfRange = 13,
    Argument5OutOfRange = 14,
    Argument6OutOfRange = 15,
}

impl DeviceErrorCode {
    /// Every documented code, in ascending order.
    pub const ALL: [DeviceErrorCode; 11] = [
        Self::NotIdle,
        Self::NoDrive,
        Self::StringParse,
        Self::CommandNotFound,
        Self::ValueOutOfRange,
        Self::Argument1OutOfRange,
        Self::Argument2OutOfRange,
        Self::Argument3OutOfRange,
        Self::Argument4OutOfRange,
        Self::Argument5OutOfRange,
        Self::Argument6OutOfRange,
    ];

    /// Message reported for codes outside the documented table.
    pub const UNRECOGNIZED: &'static str = "Unrecognized device error";

    pub fn from_code(code: u16) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.code() == code)
    }

    pub fn code(self) -> u16 {
        self as u16
    }

    pub fn message(self) -> &'static str {
        match self {
            Self::NotIdle => "Not idle",
            Self::NoDrive => "No drive",
            Self::StringParse => "String parse",
            Self::CommandNotFound => "Command not found",
            Self::ValueOutOfRange => "Value out of range",
            Self::Argument1OutOfRange => "Argument 1 out of range",
            Self::Argument2OutOfRange => "Argument 2 out of range",
            Self::Argument3OutOfRange => "Argument 3 out of range",
            Self::Argument4OutOfRange => "Argument 4 out of range",
            Self::Argument5OutOfRange => "Argument 5 out of range",
            Self::Argument6OutOfRange => "Argument 6 out of range",
        }
    }
}

/// Message for any numeric code, documented or not.
pub fn message_for(code: u16) -> &'static str {
    DeviceErrorCode::from_code(code)
        .map(DeviceErrorCode::message)
        .unwrap_or(DeviceErrorCode::UNRECOGNIZED)
}

/// Outcome of classifying one response line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classified<'a> {
    /// An ordinary value for the caller to parse.
    Value(&'a str),
    /// The device rejected the command.
    DeviceError { code: u16, message: &'static str },
}

/// Sort a response line into a value or a device error.
///
/// An empty line means nothing answered and is a
/// [`ProtocolError::EmptyResponse`]. A line that starts with `E` but is not
/// `E,<integer>` is a [`ProtocolError::MalformedError`] rather than a value.
pub fn classify(line: &str) -> Result<Classified<'_>, ProtocolError> {
    if line.is_empty() {
        return Err(ProtocolError::EmptyResponse);
    }
    if !line.starts_with('E') {
        return Ok(Classified::Value(line));
    }

    let code = line
        .strip_prefix("E,")
        .and_then(|rest| rest.trim().parse::<u16>().ok())
        .ok_or_else(|| ProtocolError::MalformedError(line.to_string()))?;

    Ok(Classified::DeviceError {
        code,
        message: message_for(code),
    })
}

/// Classify `line`, turning a device error into [`FocusError::Device`].
pub fn expect_value(line: &str) -> FocusResult<&str> {
    match classify(line)? {
        Classified::Value(value) => Ok(value),
        Classified::DeviceError { code, message } => {
            tracing::warn!(code, message, "Device reported error");
            Err(FocusError::Device { code, message })
        }
    }
}
