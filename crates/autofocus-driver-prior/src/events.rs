//! Structured session events.
//!
//! A [`PureFocus850`](crate::PureFocus850) publishes a [`SessionEvent`] after
//! each protocol transition worth observing. Events are broadcast, so any
//! number of subscribers may listen and a session with no subscribers pays
//! only for the enum construction.

use serde::Serialize;
use tokio::sync::broadcast;

/// Default capacity of the event channel.
pub const EVENT_CHANNEL_CAPACITY: usize = 64;

pub type EventSender = broadcast::Sender<SessionEvent>;
pub type EventReceiver = broadcast::Receiver<SessionEvent>;

/// Something observable that happened on a session.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SessionEvent {
    /// A query returned a value.
    ParameterRead {
        parameter: &'static str,
        value: String,
    },
    /// A write was confirmed by its readback.
    ParameterVerified {
        parameter: &'static str,
        requested: String,
        actual: String,
    },
    /// A write was accepted but the readback did not match.
    VerificationFailed {
        parameter: &'static str,
        requested: String,
        actual: String,
    },
    /// The device answered with `E,<code>`.
    DeviceError {
        command: String,
        code: u16,
        message: &'static str,
    },
    /// An objective change started a lens move.
    LensMotionStarted { objective: u8 },
    LensSettled { objective: u8, polls: u32 },
    LensWaitCancelled { objective: u8, polls: u32 },
    Closed { port: String },
}

/// Create an event channel with the given capacity.
pub fn event_channel(capacity: usize) -> EventSender {
    let (tx, _rx) = broadcast::channel(capacity.max(1));
    tx
}

/// Publish `event`, ignoring the no-subscriber case.
pub(crate) fn emit(tx: &EventSender, event: SessionEvent) {
    let _ = tx.send(event);
}
