//! Prior Scientific PureFocus850 laser autofocus driver.
//!
//! The PureFocus850 keeps a microscope in focus by steering either a stepper
//! drive or an analog piezo stage. This crate talks to its serial command
//! interface:
//!
//! - [`PureFocus850`]: async session with verified setters and cached state
//! - [`BlockingPureFocus850`]: the same surface for synchronous callers
//! - [`PureFocusConfig`]: TOML-loadable session configuration
//! - [`SessionEvent`]: structured events published on every transition
//!
//! Errors are [`autofocus_core::FocusError`] throughout.

pub mod blocking;
pub mod config;
pub mod error_codes;
pub mod events;
pub mod motion;
pub mod purefocus850;
pub mod types;
pub mod verify;

pub use blocking::BlockingPureFocus850;
pub use config::PureFocusConfig;
pub use error_codes::DeviceErrorCode;
pub use events::SessionEvent;
pub use motion::{LensProbe, MotionOutcome, MotionPoller, Settled};
pub use purefocus850::{ObjectiveChange, PureFocus850, SessionState, DEVICE_NAME};
pub use types::{ControlMode, DeviceInfo, DigipotMode, FocusConfig, SensorMode};
pub use verify::{Comparison, Tolerances};
