//! Session configuration.
//!
//! ```toml
//! port = "/dev/ttyUSB0"
//! baud_rate = 460800
//! timeout_ms = 5000
//! control_mode = "PiezoDrive"
//! sensor_mode = "LineMode"
//! poll_interval_ms = 100
//!
//! [tolerances]
//! piezo_range_relative = 0.10
//! piezo_voltage_absolute = 0.0048828125
//! ```
//!
//! Every field except `port` has a default.

use crate::motion::MotionPoller;
use crate::types::{ControlMode, FocusConfig, SensorMode, DEFAULT_BAUD_RATE};
use crate::verify::Tolerances;
use autofocus_core::{FocusError, FocusResult, SerialSettings};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Configuration for a PureFocus850 session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PureFocusConfig {
    /// Serial port path (e.g., "/dev/ttyUSB0", "COM8")
    pub port: String,
    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,
    /// Bounded read timeout per response line
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// Control mode applied at session start
    #[serde(default = "default_control_mode")]
    pub control_mode: ControlMode,
    /// Sensor mode applied at session start
    #[serde(default = "default_sensor_mode")]
    pub sensor_mode: SensorMode,
    /// Interval between lens-moving queries after an objective change
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default)]
    pub tolerances: Tolerances,
}

fn default_baud_rate() -> u32 {
    DEFAULT_BAUD_RATE
}

fn default_timeout_ms() -> u64 {
    SerialSettings::DEFAULT_READ_TIMEOUT.as_millis() as u64
}

fn default_control_mode() -> ControlMode {
    FocusConfig::default().control_mode
}

fn default_sensor_mode() -> SensorMode {
    FocusConfig::default().sensor_mode
}

fn default_poll_interval_ms() -> u64 {
    MotionPoller::DEFAULT_INTERVAL.as_millis() as u64
}

impl PureFocusConfig {
    /// Defaults for everything but the port.
    pub fn new(port: impl Into<String>) -> Self {
        Self {
            port: port.into(),
            baud_rate: default_baud_rate(),
            timeout_ms: default_timeout_ms(),
            control_mode: default_control_mode(),
            sensor_mode: default_sensor_mode(),
            poll_interval_ms: default_poll_interval_ms(),
            tolerances: Tolerances::default(),
        }
    }

    pub fn with_focus_config(mut self, config: FocusConfig) -> Self {
        self.control_mode = config.control_mode;
        self.sensor_mode = config.sensor_mode;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval_ms = interval.as_millis() as u64;
        self
    }

    pub fn with_tolerances(mut self, tolerances: Tolerances) -> Self {
        self.tolerances = tolerances;
        self
    }

    /// Parse and validate a TOML document.
    pub fn from_toml_str(text: &str) -> FocusResult<Self> {
        let config: Self = toml::from_str(text)
            .map_err(|e| FocusError::Configuration(format!("invalid TOML: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a TOML file.
    pub fn load(path: &Path) -> FocusResult<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            FocusError::Configuration(format!("cannot read {}: {}", path.display(), e))
        })?;
        let config = Self::from_toml_str(&text)?;
        tracing::debug!(path = %path.display(), port = %config.port, "Loaded configuration");
        Ok(config)
    }

    pub fn validate(&self) -> FocusResult<()> {
        if self.port.trim().is_empty() {
            return Err(FocusError::Configuration("port must not be empty".into()));
        }
        if self.baud_rate == 0 {
            return Err(FocusError::Configuration("baud_rate must be positive".into()));
        }
        if self.timeout_ms == 0 {
            return Err(FocusError::Configuration("timeout_ms must be positive".into()));
        }
        if self.poll_interval_ms == 0 {
            return Err(FocusError::Configuration(
                "poll_interval_ms must be positive".into(),
            ));
        }
        self.tolerances
            .validate()
            .map_err(FocusError::Configuration)
    }

    pub fn focus_config(&self) -> FocusConfig {
        FocusConfig::new(self.control_mode, self.sensor_mode)
    }

    pub fn serial_settings(&self) -> SerialSettings {
        SerialSettings::new(self.port.clone(), self.baud_rate)
            .with_read_timeout(Duration::from_millis(self.timeout_ms))
    }

    pub fn poller(&self) -> MotionPoller {
        MotionPoller::new(Duration::from_millis(self.poll_interval_ms))
    }
}
