//! Synchronous wrapper for scripts and other non-async callers.
//!
//! [`BlockingPureFocus850`] owns a current-thread tokio runtime and drives the
//! async [`PureFocus850`] to completion on every call. It must not be used
//! from inside another tokio runtime.

use crate::config::PureFocusConfig;
use crate::events::EventReceiver;
use crate::purefocus850::{ObjectiveChange, PureFocus850, SessionState};
use crate::types::{ControlMode, DeviceInfo, DigipotMode, FocusConfig};
use autofocus_core::{FocusResult, LineTransport};
use std::time::Duration;
use tokio::runtime::{Builder, Runtime};

/// Blocking handle to a PureFocus850 session.
pub struct BlockingPureFocus850 {
    runtime: Runtime,
    inner: PureFocus850,
}

impl BlockingPureFocus850 {
    /// Open the configured port and initialize the controller.
    #[cfg(feature = "serial")]
    pub fn open(config: &PureFocusConfig) -> FocusResult<Self> {
        let runtime = new_runtime()?;
        let inner = runtime.block_on(PureFocus850::open(config))?;
        Ok(Self { runtime, inner })
    }

    /// Initialize over an existing transport.
    pub fn with_transport(transport: LineTransport, config: &PureFocusConfig) -> FocusResult<Self> {
        let runtime = new_runtime()?;
        let inner = runtime.block_on(PureFocus850::with_transport(transport, config))?;
        Ok(Self { runtime, inner })
    }

    pub fn info(&self) -> &DeviceInfo {
        self.inner.info()
    }

    pub fn state(&self) -> &SessionState {
        self.inner.state()
    }

    pub fn subscribe(&self) -> EventReceiver {
        self.inner.subscribe()
    }

    /// Borrow the async session.
    pub fn session(&mut self) -> &mut PureFocus850 {
        &mut self.inner
    }

    pub fn read_info(&mut self) -> FocusResult<DeviceInfo> {
        self.runtime.block_on(self.inner.read_info())
    }

    pub fn get_config(&mut self) -> FocusResult<FocusConfig> {
        self.runtime.block_on(self.inner.get_config())
    }

    pub fn get_lens_position(&mut self) -> FocusResult<i32> {
        self.runtime.block_on(self.inner.get_lens_position())
    }

    pub fn get_lens_moving(&mut self) -> FocusResult<bool> {
        self.runtime.block_on(self.inner.get_lens_moving())
    }

    pub fn get_piezo_range_um(&mut self) -> FocusResult<u32> {
        self.runtime.block_on(self.inner.get_piezo_range_um())
    }

    pub fn get_piezo_dac(&mut self) -> FocusResult<u16> {
        self.runtime.block_on(self.inner.get_piezo_dac())
    }

    pub fn get_piezo_voltage(&mut self) -> FocusResult<f64> {
        self.runtime.block_on(self.inner.get_piezo_voltage())
    }

    pub fn get_objective(&mut self) -> FocusResult<u8> {
        self.runtime.block_on(self.inner.get_objective())
    }

    pub fn get_servo_enable(&mut self) -> FocusResult<bool> {
        self.runtime.block_on(self.inner.get_servo_enable())
    }

    pub fn get_digipot_mode(&mut self) -> FocusResult<DigipotMode> {
        self.runtime.block_on(self.inner.get_digipot_mode())
    }

    pub fn get_focus_flag(&mut self) -> FocusResult<bool> {
        self.runtime.block_on(self.inner.get_focus_flag())
    }

    pub fn set_config(&mut self, config: FocusConfig) -> FocusResult<FocusConfig> {
        self.runtime.block_on(self.inner.set_config(config))
    }

    pub fn set_control_mode(&mut self, mode: ControlMode) -> FocusResult<FocusConfig> {
        self.runtime.block_on(self.inner.set_control_mode(mode))
    }

    pub fn set_piezo_range_um(&mut self, range_um: u32) -> FocusResult<u32> {
        self.runtime.block_on(self.inner.set_piezo_range_um(range_um))
    }

    pub fn set_piezo_voltage(&mut self, volts: f64) -> FocusResult<f64> {
        self.runtime.block_on(self.inner.set_piezo_voltage(volts))
    }

    /// Select an objective, blocking until the lens settles.
    pub fn set_objective(&mut self, objective: u8) -> FocusResult<u8> {
        self.runtime.block_on(self.inner.set_objective(objective))
    }

    /// Select an objective, waiting at most `limit` for the lens to settle.
    pub fn set_objective_within(
        &mut self,
        objective: u8,
        limit: Duration,
    ) -> FocusResult<ObjectiveChange> {
        let inner = &mut self.inner;
        // The timer must be created inside the runtime.
        self.runtime.block_on(async move {
            inner
                .set_objective_or_cancel(objective, tokio::time::sleep(limit))
                .await
        })
    }

    pub fn set_servo_enable(&mut self, enabled: bool) -> FocusResult<bool> {
        self.runtime.block_on(self.inner.set_servo_enable(enabled))
    }

    pub fn set_digipot_mode(&mut self, mode: DigipotMode) -> FocusResult<DigipotMode> {
        self.runtime.block_on(self.inner.set_digipot_mode(mode))
    }

    pub fn close(self) -> FocusResult<()> {
        let Self { runtime, inner } = self;
        runtime.block_on(inner.close())
    }
}

fn new_runtime() -> FocusResult<Runtime> {
    Ok(Builder::new_current_thread().enable_all().build()?)
}
