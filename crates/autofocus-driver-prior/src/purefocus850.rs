//! Prior Scientific PureFocus850 Laser Autofocus Driver
//!
//! Protocol Overview:
//! - Format: ASCII command/response over RS-232
//! - Baud: 460800, 8N1, no flow control
//! - Requests: `NAME[,arg]*\r`, e.g. `OBJ,3\r`
//! - Responses: `\r`-terminated lines; `E,<code>` when a command is rejected
//! - Identity: `DATE` answers with product and version lines
//!
//! # Verified writes
//!
//! Every setter writes, re-reads the parameter, and compares the readback with
//! the request before reporting success. Enumerated parameters must match
//! exactly; piezo range and voltage are compared within [`Tolerances`]. A
//! mismatch is a [`FocusError::Verification`], distinct from the device
//! rejecting the command.
//!
//! # Usage
//!
//! ```rust,ignore
//! use autofocus_driver_prior::{PureFocus850, PureFocusConfig};
//!
//! let mut focus = PureFocus850::open(&PureFocusConfig::new("COM8")).await?;
//! focus.set_piezo_range_um(300).await?;
//! focus.set_objective(3).await?; // returns once the offset lens has settled
//! focus.close().await?;
//! ```

use crate::config::PureFocusConfig;
use crate::error_codes::expect_value;
use crate::events::{
    emit, event_channel, EventReceiver, EventSender, SessionEvent, EVENT_CHANNEL_CAPACITY,
};
use crate::motion::{LensProbe, MotionOutcome, MotionPoller, Settled};
use crate::types::{
    dac_to_volts, parse_flag, parse_int, volts_to_dac, ControlMode, DeviceInfo, DigipotMode,
    FocusConfig, DAC_MAX, OBJECTIVES, PIEZO_MAX_VOLTS, PIEZO_RANGE_UM, SUPPORTED_PRODUCT,
};
use crate::verify::Tolerances;
use async_trait::async_trait;
use autofocus_core::framer::{read_lines, Command};
use autofocus_core::{FocusError, FocusResult, LineTransport, ProtocolError};
use serde::Serialize;
use std::fmt;
use std::future::Future;
use tracing::instrument;

/// Name used in logs and connection errors.
pub const DEVICE_NAME: &str = "PureFocus850";

const CONFIG: &str = "config";
const PIEZO_RANGE: &str = "piezo range";
const PIEZO_VOLTAGE: &str = "piezo voltage";
const OBJECTIVE: &str = "objective";
const SERVO_ENABLE: &str = "servo enable";
const DIGIPOT_MODE: &str = "digipot mode";

/// Last known value of every parameter the session has read or written.
///
/// Updated after each successful query, including the readback of a write
/// whose verification failed, so it always reflects what the device last
/// reported. A write the device may have applied clears its field until the
/// readback arrives; `None` means unknown.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SessionState {
    pub config: Option<FocusConfig>,
    pub lens_position: Option<i32>,
    pub lens_moving: Option<bool>,
    pub piezo_range_um: Option<u32>,
    pub piezo_dac: Option<u16>,
    pub piezo_voltage: Option<f64>,
    pub objective: Option<u8>,
    pub servo_enabled: Option<bool>,
    pub digipot_mode: Option<DigipotMode>,
    pub focus_found: Option<bool>,
}

/// Result of an objective change whose lens wait may be cancelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObjectiveChange {
    /// Objective confirmed by readback
    pub objective: u8,
    pub motion: MotionOutcome,
}

/// Session with one PureFocus850 controller.
///
/// Owns the connection exclusively. Every operation takes `&mut self`, so
/// request/response exchanges can never interleave, including during the
/// lens-motion wait that follows an objective change.
pub struct PureFocus850 {
    transport: LineTransport,
    info: DeviceInfo,
    state: SessionState,
    tolerances: Tolerances,
    poller: MotionPoller,
    events: EventSender,
}

impl PureFocus850 {
    /// Open the configured serial port and initialize the controller.
    ///
    /// # Errors
    /// Returns error if:
    /// - The configuration is invalid
    /// - The serial port cannot be opened
    /// - The device does not identify as the supported product
    /// - Applying the focus configuration or any initial query fails
    #[cfg(feature = "serial")]
    #[instrument(skip(config), fields(port = %config.port), err)]
    pub async fn open(config: &PureFocusConfig) -> FocusResult<Self> {
        config.validate()?;
        let transport = LineTransport::open(&config.serial_settings(), DEVICE_NAME).await?;
        Self::with_transport(transport, config).await
    }

    /// Initialize the controller over an already open transport.
    ///
    /// The port and link settings in `config` are ignored. On failure the
    /// transport is shut down before the error is returned.
    pub async fn with_transport(
        transport: LineTransport,
        config: &PureFocusConfig,
    ) -> FocusResult<Self> {
        config.tolerances.validate().map_err(FocusError::Configuration)?;

        let mut session = Self {
            transport,
            info: DeviceInfo {
                product: String::new(),
                version: String::new(),
            },
            state: SessionState::default(),
            tolerances: config.tolerances,
            poller: config.poller(),
            events: event_channel(EVENT_CHANNEL_CAPACITY),
        };

        match session.initialize(config.focus_config()).await {
            Ok(()) => Ok(session),
            Err(e) => {
                tracing::warn!(port = %session.transport.name(), error = %e, "Initialization failed");
                if let Err(close_err) = session.transport.close().await {
                    tracing::warn!(error = %close_err, "Failed to close transport after initialization error");
                }
                Err(e)
            }
        }
    }

    async fn initialize(&mut self, focus_config: FocusConfig) -> FocusResult<()> {
        self.info = self.read_info().await?;
        if !self.info.is_supported() {
            return Err(FocusError::UnsupportedProduct {
                found: self.info.product.clone(),
                expected: SUPPORTED_PRODUCT,
            });
        }
        tracing::info!(
            product = %self.info.product,
            version = %self.info.version,
            "PureFocus850 identified"
        );

        self.set_config(focus_config).await?;
        // Confirms the optical head is attached and answering
        self.get_lens_position().await?;
        tracing::debug!(tolerances = ?self.tolerances, "Verification tolerances installed");
        self.get_objective().await?;
        self.get_servo_enable().await?;

        tracing::info!(port = %self.transport.name(), "PureFocus850 session open");
        Ok(())
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn info(&self) -> &DeviceInfo {
        &self.info
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn tolerances(&self) -> Tolerances {
        self.tolerances
    }

    /// Replace the verification tolerances.
    pub fn set_tolerances(&mut self, tolerances: Tolerances) -> FocusResult<()> {
        tolerances.validate().map_err(FocusError::Configuration)?;
        self.tolerances = tolerances;
        Ok(())
    }

    pub fn poller(&self) -> MotionPoller {
        self.poller
    }

    pub fn port(&self) -> &str {
        self.transport.name()
    }

    /// Subscribe to [`SessionEvent`]s.
    pub fn subscribe(&self) -> EventReceiver {
        self.events.subscribe()
    }

    // =========================================================================
    // Queries
    // =========================================================================

    /// Re-read product and version with `DATE`.
    #[instrument(skip(self), err)]
    pub async fn read_info(&mut self) -> FocusResult<DeviceInfo> {
        let mut lines = self.exchange(&Command::new("DATE"), 2).await?.into_iter();
        let product = lines.next().unwrap_or_default();
        let version = lines.next().unwrap_or_default();
        Ok(DeviceInfo { product, version })
    }

    #[instrument(skip(self), err)]
    pub async fn get_config(&mut self) -> FocusResult<FocusConfig> {
        let line = self.query(Command::new("CONFIG")).await?;
        let config = FocusConfig::from_wire(&line)?;
        self.state.config = Some(config);
        self.record(CONFIG, &config);
        Ok(config)
    }

    #[instrument(skip(self), err)]
    pub async fn get_lens_position(&mut self) -> FocusResult<i32> {
        let line = self.query(Command::new("LENSP")).await?;
        let position = parse_int::<i32>(&line, "lens position")?;
        self.state.lens_position = Some(position);
        self.record("lens position", &position);
        Ok(position)
    }

    #[instrument(skip(self), err)]
    pub async fn get_lens_moving(&mut self) -> FocusResult<bool> {
        let line = self.query(Command::new("LENS$")).await?;
        let moving = parse_flag(&line)?;
        self.state.lens_moving = Some(moving);
        Ok(moving)
    }

    #[instrument(skip(self), err)]
    pub async fn get_piezo_range_um(&mut self) -> FocusResult<u32> {
        let line = self.query(Command::new("UPR")).await?;
        let range = parse_int::<u32>(&line, "piezo range (um)")?;
        self.state.piezo_range_um = Some(range);
        self.record(PIEZO_RANGE, &range);
        Ok(range)
    }

    /// Raw 12-bit DAC code driving the piezo output.
    #[instrument(skip(self), err)]
    pub async fn get_piezo_dac(&mut self) -> FocusResult<u16> {
        let line = self.query(Command::new("PIEZO")).await?;
        let code = parse_int::<u16>(&line, "DAC code (0-4095)")?;
        if code > DAC_MAX {
            return Err(ProtocolError::unexpected(&line, "DAC code (0-4095)").into());
        }
        self.state.piezo_dac = Some(code);
        self.state.piezo_voltage = Some(dac_to_volts(code));
        Ok(code)
    }

    /// Piezo output in volts, converted from the DAC readback.
    #[instrument(skip(self), err)]
    pub async fn get_piezo_voltage(&mut self) -> FocusResult<f64> {
        let volts = dac_to_volts(self.get_piezo_dac().await?);
        self.record(PIEZO_VOLTAGE, &volts);
        Ok(volts)
    }

    #[instrument(skip(self), err)]
    pub async fn get_objective(&mut self) -> FocusResult<u8> {
        let line = self.query(Command::new("OBJ")).await?;
        let objective = parse_int::<u8>(&line, "objective (1-6)")?;
        if !OBJECTIVES.contains(&objective) {
            return Err(ProtocolError::unexpected(&line, "objective (1-6)").into());
        }
        self.state.objective = Some(objective);
        self.record(OBJECTIVE, &objective);
        Ok(objective)
    }

    #[instrument(skip(self), err)]
    pub async fn get_servo_enable(&mut self) -> FocusResult<bool> {
        let line = self.query(Command::new("SERVO")).await?;
        let enabled = parse_flag(&line)?;
        self.state.servo_enabled = Some(enabled);
        self.record(SERVO_ENABLE, &enabled);
        Ok(enabled)
    }

    #[instrument(skip(self), err)]
    pub async fn get_digipot_mode(&mut self) -> FocusResult<DigipotMode> {
        let line = self.query(Command::new("LENS")).await?;
        let mode = DigipotMode::from_wire(&line)?;
        self.state.digipot_mode = Some(mode);
        self.record(DIGIPOT_MODE, &mode);
        Ok(mode)
    }

    /// Whether the servo has found focus.
    #[instrument(skip(self), err)]
    pub async fn get_focus_flag(&mut self) -> FocusResult<bool> {
        let line = self.query(Command::new("FOCUS")).await?;
        let found = parse_flag(&line)?;
        self.state.focus_found = Some(found);
        self.record("focus flag", &found);
        Ok(found)
    }

    // =========================================================================
    // Verified writes
    // =========================================================================

    /// Write control and sensor mode together.
    #[instrument(skip(self), err)]
    pub async fn set_config(&mut self, config: FocusConfig) -> FocusResult<FocusConfig> {
        self.write_setting(
            Command::new("CONFIG")
                .arg(config.control_mode.code())
                .arg(config.sensor_mode.code()),
            |state| state.config = None,
        )
        .await?;
        let actual = self.get_config().await?;
        self.confirm(CONFIG, config, actual, config == actual)
    }

    /// Change only the control mode, keeping the current sensor mode.
    pub async fn set_control_mode(&mut self, mode: ControlMode) -> FocusResult<FocusConfig> {
        let current = match self.state.config {
            Some(config) => config,
            None => self.get_config().await?,
        };
        self.set_config(FocusConfig::new(mode, current.sensor_mode)).await
    }

    /// Set the piezo travel range the controller assumes, in micrometers.
    ///
    /// The device rounds to the ranges it supports, so the readback is
    /// accepted within the relative range tolerance.
    #[instrument(skip(self), err)]
    pub async fn set_piezo_range_um(&mut self, range_um: u32) -> FocusResult<u32> {
        if !PIEZO_RANGE_UM.contains(&range_um) {
            return Err(FocusError::validation(
                PIEZO_RANGE,
                format!(
                    "{} um outside {}-{} um",
                    range_um,
                    PIEZO_RANGE_UM.start(),
                    PIEZO_RANGE_UM.end()
                ),
            ));
        }
        if let Some(config) = self.state.config {
            if config.control_mode != ControlMode::PiezoDrive {
                tracing::warn!(
                    control_mode = %config.control_mode,
                    "Piezo range only takes effect in PiezoDrive mode"
                );
            }
        }

        self.write_setting(Command::new("UPR").arg(range_um), |state| {
            state.piezo_range_um = None
        })
        .await?;
        let actual = self.get_piezo_range_um().await?;
        let accepted = self
            .tolerances
            .piezo_range()
            .accepts(f64::from(range_um), f64::from(actual));
        self.confirm(PIEZO_RANGE, range_um, actual, accepted)
    }

    /// Drive the piezo output directly.
    ///
    /// Refused while the servo is enabled, without sending anything.
    #[instrument(skip(self), err)]
    pub async fn set_piezo_voltage(&mut self, volts: f64) -> FocusResult<f64> {
        if !volts.is_finite() || !(0.0..=PIEZO_MAX_VOLTS).contains(&volts) {
            return Err(FocusError::validation(
                PIEZO_VOLTAGE,
                format!("{} V outside 0-{} V", volts, PIEZO_MAX_VOLTS),
            ));
        }
        // An unknown servo state is resolved on the device, never assumed off
        let servo_enabled = match self.state.servo_enabled {
            Some(enabled) => enabled,
            None => self.get_servo_enable().await?,
        };
        if servo_enabled {
            return Err(FocusError::Precondition(
                "cannot set piezo voltage while the servo is enabled".into(),
            ));
        }

        self.write_setting(Command::new("PIEZO").arg(volts_to_dac(volts)), |state| {
            state.piezo_dac = None;
            state.piezo_voltage = None;
        })
        .await?;
        let actual = self.get_piezo_voltage().await?;
        let accepted = self.tolerances.piezo_voltage().accepts(volts, actual);
        self.confirm(PIEZO_VOLTAGE, volts, actual, accepted)
    }

    /// Select an objective and wait for the offset lens to settle.
    ///
    /// The wait has no timeout; see [`set_objective_or_cancel`] for a
    /// cancellable variant.
    ///
    /// [`set_objective_or_cancel`]: Self::set_objective_or_cancel
    #[instrument(skip(self), err)]
    pub async fn set_objective(&mut self, objective: u8) -> FocusResult<u8> {
        let confirmed = self.change_objective(objective).await?;
        let poller = self.poller;
        let settled = poller.wait_until_idle(self).await?;
        self.lens_settled(confirmed, settled);
        Ok(confirmed)
    }

    /// Select an objective and wait for the lens until `cancel` resolves.
    ///
    /// Cancelling only stops the wait; the lens keeps moving and the
    /// objective stays selected.
    #[instrument(skip(self, cancel), err)]
    pub async fn set_objective_or_cancel<C>(
        &mut self,
        objective: u8,
        cancel: C,
    ) -> FocusResult<ObjectiveChange>
    where
        C: Future<Output = ()> + Send,
    {
        let confirmed = self.change_objective(objective).await?;
        let poller = self.poller;
        let motion = poller.wait_until_idle_or_cancel(self, cancel).await?;
        match motion {
            MotionOutcome::Settled(settled) => self.lens_settled(confirmed, settled),
            MotionOutcome::Cancelled { polls } => {
                tracing::warn!(objective = confirmed, polls, "Stopped waiting for lens motion");
                emit(
                    &self.events,
                    SessionEvent::LensWaitCancelled {
                        objective: confirmed,
                        polls,
                    },
                );
            }
        }
        Ok(ObjectiveChange {
            objective: confirmed,
            motion,
        })
    }

    async fn change_objective(&mut self, objective: u8) -> FocusResult<u8> {
        if !OBJECTIVES.contains(&objective) {
            return Err(FocusError::validation(
                OBJECTIVE,
                format!(
                    "{} outside {}-{}",
                    objective,
                    OBJECTIVES.start(),
                    OBJECTIVES.end()
                ),
            ));
        }

        self.write_setting(Command::new("OBJ").arg(objective), |state| {
            state.objective = None;
            state.lens_moving = None;
        })
        .await?;
        let actual = self.get_objective().await?;
        let confirmed = self.confirm(OBJECTIVE, objective, actual, objective == actual)?;
        emit(
            &self.events,
            SessionEvent::LensMotionStarted {
                objective: confirmed,
            },
        );
        Ok(confirmed)
    }

    fn lens_settled(&mut self, objective: u8, settled: Settled) {
        self.state.lens_moving = Some(false);
        emit(
            &self.events,
            SessionEvent::LensSettled {
                objective,
                polls: settled.polls,
            },
        );
    }

    #[instrument(skip(self), err)]
    pub async fn set_servo_enable(&mut self, enabled: bool) -> FocusResult<bool> {
        self.write_setting(Command::new("SERVO").arg(u8::from(enabled)), |state| {
            state.servo_enabled = None
        })
        .await?;
        let actual = self.get_servo_enable().await?;
        self.confirm(SERVO_ENABLE, enabled, actual, enabled == actual)
    }

    #[instrument(skip(self), err)]
    pub async fn set_digipot_mode(&mut self, mode: DigipotMode) -> FocusResult<DigipotMode> {
        self.write_setting(Command::new("LENS").arg(mode.code()), |state| {
            state.digipot_mode = None
        })
        .await?;
        let actual = self.get_digipot_mode().await?;
        self.confirm(DIGIPOT_MODE, mode, actual, mode == actual)
    }

    /// Check a readback against the request.
    fn confirm<T: fmt::Display + Copy>(
        &self,
        parameter: &'static str,
        requested: T,
        actual: T,
        accepted: bool,
    ) -> FocusResult<T> {
        let (requested, actual_text) = (requested.to_string(), actual.to_string());
        if accepted {
            tracing::debug!(parameter, %requested, actual = %actual_text, "Write verified");
            emit(
                &self.events,
                SessionEvent::ParameterVerified {
                    parameter,
                    requested,
                    actual: actual_text,
                },
            );
            Ok(actual)
        } else {
            tracing::warn!(parameter, %requested, actual = %actual_text, "Readback does not match request");
            emit(
                &self.events,
                SessionEvent::VerificationFailed {
                    parameter,
                    requested: requested.clone(),
                    actual: actual_text.clone(),
                },
            );
            Err(FocusError::Verification {
                parameter,
                requested,
                actual: actual_text,
            })
        }
    }

    // =========================================================================
    // Exchanges
    // =========================================================================

    /// Send a write and check its acknowledgement for a device error.
    async fn write(&mut self, command: Command) -> FocusResult<()> {
        self.exchange(&command, 1).await.map(|_| ())
    }

    /// Write a parameter and drop its cache entry until the readback.
    ///
    /// Only an explicit `E,<code>` rejection leaves the cache untouched; after
    /// any other outcome the device may hold the new value.
    async fn write_setting(
        &mut self,
        command: Command,
        invalidate: fn(&mut SessionState),
    ) -> FocusResult<()> {
        let result = self.write(command).await;
        if !matches!(result, Err(FocusError::Device { .. })) {
            invalidate(&mut self.state);
        }
        result
    }

    /// Send a query and return its single value line.
    async fn query(&mut self, command: Command) -> FocusResult<String> {
        let mut lines = self.exchange(&command, 1).await?;
        Ok(lines.pop().unwrap_or_default())
    }

    async fn exchange(&mut self, command: &Command, lines: usize) -> FocusResult<Vec<String>> {
        tracing::trace!(port = %self.transport.name(), %command, "-> command");
        self.transport.send(&command.encode()).await?;
        let response = read_lines(&mut self.transport, lines).await?;

        for line in &response {
            if let Err(e) = expect_value(line) {
                if let FocusError::Device { code, message } = &e {
                    emit(
                        &self.events,
                        SessionEvent::DeviceError {
                            command: command.to_string(),
                            code: *code,
                            message: *message,
                        },
                    );
                }
                return Err(e);
            }
        }
        Ok(response)
    }

    fn record<T: fmt::Display>(&self, parameter: &'static str, value: &T) {
        tracing::debug!(parameter, %value, "Cached readback");
        emit(
            &self.events,
            SessionEvent::ParameterRead {
                parameter,
                value: value.to_string(),
            },
        );
    }

    /// Release the serial port.
    #[instrument(skip(self), fields(port = %self.transport.name()), err)]
    pub async fn close(self) -> FocusResult<()> {
        emit(
            &self.events,
            SessionEvent::Closed {
                port: self.transport.name().to_string(),
            },
        );
        tracing::info!("Closing PureFocus850 session");
        self.transport.close().await
    }
}

#[async_trait]
impl LensProbe for PureFocus850 {
    async fn lens_moving(&mut self) -> FocusResult<bool> {
        self.get_lens_moving().await
    }
}

impl fmt::Debug for PureFocus850 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PureFocus850")
            .field("transport", &self.transport)
            .field("info", &self.info)
            .field("state", &self.state)
            .field("tolerances", &self.tolerances)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use autofocus_core::mock_serial::{self, MockDeviceHarness};
    use std::time::Duration;

    const IDENTITY: &[u8] = b"Prior Scientific Instruments OptiScan LF\rV1.0\r";

    fn mock_transport() -> (LineTransport, MockDeviceHarness) {
        let (port, harness) = mock_serial::new();
        let transport = LineTransport::new(Box::new(port), "mock", Duration::from_millis(500));
        (transport, harness)
    }

    /// Scripts the initialization exchange with servo disabled.
    async fn script_startup(harness: &mut MockDeviceHarness) {
        harness.expect_and_respond(b"DATE\r", IDENTITY).await;
        harness.expect_and_respond(b"CONFIG,1,1\r", b"0\r").await;
        harness.expect_and_respond(b"CONFIG\r", b"1,1\r").await;
        harness.expect_and_respond(b"LENSP\r", b"1200\r").await;
        harness.expect_and_respond(b"OBJ\r", b"1\r").await;
        harness.expect_and_respond(b"SERVO\r", b"0\r").await;
    }

    async fn open_session() -> (PureFocus850, MockDeviceHarness) {
        let (transport, mut harness) = mock_transport();
        let config = PureFocusConfig::new("mock");
        let (session, ()) = tokio::join!(
            PureFocus850::with_transport(transport, &config),
            script_startup(&mut harness)
        );
        (session.unwrap(), harness)
    }

    #[tokio::test]
    async fn test_initialization_seeds_state() {
        let (session, _harness) = open_session().await;

        assert_eq!(session.info().product, SUPPORTED_PRODUCT);
        assert_eq!(session.info().version, "V1.0");
        let state = session.state();
        assert_eq!(state.objective, Some(1));
        assert_eq!(state.servo_enabled, Some(false));
        assert_eq!(state.lens_position, Some(1200));
        assert_eq!(state.config, Some(FocusConfig::default()));
    }

    #[tokio::test]
    async fn test_device_error_on_query() {
        let (mut session, mut harness) = open_session().await;
        let (result, ()) = tokio::join!(session.get_focus_flag(), async {
            harness.expect_and_respond(b"FOCUS\r", b"E,5\r").await;
        });
        assert!(matches!(
            result,
            Err(FocusError::Device {
                code: 5,
                message: "Command not found"
            })
        ));
        assert_eq!(session.state().focus_found, None);
    }

    #[tokio::test]
    async fn test_validation_sends_nothing() {
        let (mut session, mut harness) = open_session().await;

        assert!(matches!(
            session.set_objective(7).await,
            Err(FocusError::Validation { .. })
        ));
        assert!(matches!(
            session.set_piezo_range_um(0).await,
            Err(FocusError::Validation { .. })
        ));
        assert!(matches!(
            session.set_piezo_voltage(10.5).await,
            Err(FocusError::Validation { .. })
        ));
        assert!(matches!(
            session.set_piezo_voltage(f64::NAN).await,
            Err(FocusError::Validation { .. })
        ));
        harness.expect_silence(Duration::from_millis(20)).await;
    }

    #[tokio::test]
    async fn test_voltage_write_uses_dac_code() {
        let (mut session, mut harness) = open_session().await;
        let (result, ()) = tokio::join!(session.set_piezo_voltage(5.0), async {
            harness.expect_and_respond(b"PIEZO,2048\r", b"0\r").await;
            harness.expect_and_respond(b"PIEZO\r", b"2048\r").await;
        });
        let volts = result.unwrap();
        assert!((volts - 5.0).abs() <= Tolerances::default().piezo_voltage_absolute);
        assert_eq!(session.state().piezo_dac, Some(2048));
    }

    #[tokio::test]
    async fn test_trailing_bytes_fail_the_exchange() {
        let (mut session, mut harness) = open_session().await;
        let (result, ()) = tokio::join!(session.get_lens_position(), async {
            harness.expect_and_respond(b"LENSP\r", b"5\r7\r").await;
        });
        assert!(matches!(
            result,
            Err(FocusError::Protocol(ProtocolError::TrailingData(_)))
        ));
    }

    #[tokio::test]
    async fn test_events_are_published() {
        let (mut session, mut harness) = open_session().await;
        let mut events = session.subscribe();

        let (result, ()) = tokio::join!(session.set_servo_enable(true), async {
            harness.expect_and_respond(b"SERVO,1\r", b"0\r").await;
            harness.expect_and_respond(b"SERVO\r", b"1\r").await;
        });
        assert!(result.unwrap());

        assert_eq!(
            events.recv().await.unwrap(),
            SessionEvent::ParameterRead {
                parameter: SERVO_ENABLE,
                value: "true".into()
            }
        );
        assert_eq!(
            events.recv().await.unwrap(),
            SessionEvent::ParameterVerified {
                parameter: SERVO_ENABLE,
                requested: "true".into(),
                actual: "true".into()
            }
        );
    }

    #[tokio::test]
    async fn test_close_emits_event() {
        let (session, _harness) = open_session().await;
        let mut events = session.subscribe();
        session.close().await.unwrap();
        assert_eq!(
            events.recv().await.unwrap(),
            SessionEvent::Closed { port: "mock".into() }
        );
    }
}
