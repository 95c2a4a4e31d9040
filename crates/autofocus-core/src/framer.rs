//! ASCII command framing.
//!
//! Requests are a command name followed by optional comma-separated
//! arguments and a carriage return, e.g. `UPR,500\r`. Responses are one or
//! more carriage-return terminated lines. Framing is purely syntactic: argument
//! semantics and error responses are handled by the caller.

use crate::error::{FocusResult, ProtocolError};
use crate::transport::LineTransport;
use std::fmt;

/// A command name plus its arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    name: String,
    args: Vec<String>,
}

impl Command {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            args: Vec::new(),
        }
    }

    /// Append an argument.
    pub fn arg(mut self, value: impl fmt::Display) -> Self {
        self.args.push(value.to_string());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }

    /// Encode with the default terminator.
    pub fn encode(&self) -> Vec<u8> {
        encode(&self.name, &self.args)
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)?;
        for arg in &self.args {
            write!(f, ",{}", arg)?;
        }
        Ok(())
    }
}

/// Join `name` and `args` with commas and append the terminator.
pub fn encode<S: AsRef<str>>(name: &str, args: &[S]) -> Vec<u8> {
    let mut out = Vec::with_capacity(name.len() + 1 + args.len() * 5);
    out.extend_from_slice(name.as_bytes());
    for arg in args {
        out.push(b',');
        out.extend_from_slice(arg.as_ref().as_bytes());
    }
    out.push(LineTransport::DEFAULT_TERMINATOR);
    out
}

/// Read exactly `expected` lines and strip their terminators.
///
/// Fails with [`ProtocolError::NoData`] if the stream ends first. After the
/// last line, everything still buffered is discarded. If any of it was more
/// than stray line feeds the call fails with [`ProtocolError::TrailingData`].
pub async fn read_lines(
    transport: &mut LineTransport,
    expected: usize,
) -> FocusResult<Vec<String>> {
    let mut lines = Vec::with_capacity(expected);

    while lines.len() < expected {
        let raw = match transport.read_line().await? {
            Some(raw) => raw,
            None => {
                return Err(ProtocolError::NoData {
                    expected,
                    received: lines.len(),
                }
                .into())
            }
        };
        let line = decode_line(&raw)?;
        tracing::trace!(port = %transport.name(), response = %line, "<- line");
        lines.push(line);
    }

    // Leftovers are always discarded so the next exchange starts clean
    let pending = transport.pending_input();
    let count = pending.len();
    let stray = pending.iter().any(|&b| b != b'\n');
    transport.consume_pending(count);
    if stray {
        tracing::warn!(port = %transport.name(), bytes = count, "Discarded trailing response data");
        return Err(ProtocolError::TrailingData(count).into());
    }

    Ok(lines)
}

fn decode_line(raw: &[u8]) -> Result<String, ProtocolError> {
    if !raw.is_ascii() {
        return Err(ProtocolError::NonAscii);
    }
    let text = String::from_utf8_lossy(raw);
    Ok(text.trim_matches(|c| c == '\r' || c == '\n').to_string())
}
