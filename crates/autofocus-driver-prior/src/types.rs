//! Parameter types and wire conversions for the PureFocus850.

use autofocus_core::ProtocolError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::RangeInclusive;
use std::str::FromStr;

/// Identity string reported by the only supported product.
pub const SUPPORTED_PRODUCT: &str = "Prior Scientific Instruments OptiScan LF";

/// Default baud rate of the controller's serial link.
pub const DEFAULT_BAUD_RATE: u32 = 460_800;

/// Valid piezo ranges, in micrometers.
pub const PIEZO_RANGE_UM: RangeInclusive<u32> = 1..=1000;

/// Full scale of the piezo analog output, in volts.
pub const PIEZO_MAX_VOLTS: f64 = 10.0;

/// Largest 12-bit DAC code.
pub const DAC_MAX: u16 = 4095;

/// Valid objective slots.
pub const OBJECTIVES: RangeInclusive<u8> = 1..=6;

/// Product and firmware version read by `DATE`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceInfo {
    pub product: String,
    pub version: String,
}

impl DeviceInfo {
    pub fn is_supported(&self) -> bool {
        self.product == SUPPORTED_PRODUCT
    }
}

macro_rules! wire_enum {
    (
        $(#[$meta:meta])*
        $name:ident, $label:literal {
            $($variant:ident = $code:literal => [$($alias:literal),+]),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum $name {
            $($variant = $code),+
        }

        impl $name {
            /// Every variant, in wire-code order.
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            /// Numeric code used on the wire.
            pub fn code(self) -> u8 {
                self as u8
            }

            pub fn from_code(code: u8) -> Option<Self> {
                match code {
                    $($code => Some(Self::$variant),)+
                    _ => None,
                }
            }

            /// Parse a wire code such as `"1"`.
            pub fn from_wire(text: &str) -> Result<Self, ProtocolError> {
                text.trim()
                    .parse::<u8>()
                    .ok()
                    .and_then(Self::from_code)
                    .ok_or_else(|| ProtocolError::unexpected(text, $label))
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                let name = match self {
                    $($name::$variant => stringify!($variant)),+
                };
                f.write_str(name)
            }
        }

        impl FromStr for $name {
            type Err = String;

            /// Accepts the variant name, a short alias or the wire code.
            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let lower = s.trim().to_ascii_lowercase();
                $(
                    if lower == stringify!($variant).to_ascii_lowercase()
                        $(|| lower == $alias)+
                        || lower == stringify!($code)
                    {
                        return Ok($name::$variant);
                    }
                )+
                Err(format!("unknown {}: '{}'", $label, s))
            }
        }
    };
}

wire_enum! {
    /// How the controller outputs its focus correction.
    ControlMode, "control mode" {
        StepperDrive = 0 => ["stepper"],
        PiezoDrive = 1 => ["piezo"],
        MeasureMode = 2 => ["measure"],
    }
}

wire_enum! {
    /// Optical sensing mode.
    SensorMode, "sensor mode" {
        SliceMode = 0 => ["slice"],
        LineMode = 1 => ["line"],
    }
}

wire_enum! {
    /// What the manual adjustment knob currently drives.
    DigipotMode, "digipot mode" {
        Focus = 0 => ["focus"],
        Offset = 1 => ["offset"],
    }
}

/// Control and sensor mode, always read and written together.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FocusConfig {
    pub control_mode: ControlMode,
    pub sensor_mode: SensorMode,
}

impl FocusConfig {
    pub fn new(control_mode: ControlMode, sensor_mode: SensorMode) -> Self {
        Self {
            control_mode,
            sensor_mode,
        }
    }

    /// Parse a `CONFIG` readback of the form `M,S`.
    pub fn from_wire(text: &str) -> Result<Self, ProtocolError> {
        let (mode, sensor) = text
            .split_once(',')
            .ok_or_else(|| ProtocolError::unexpected(text, "control,sensor pair"))?;
        Ok(Self {
            control_mode: ControlMode::from_wire(mode)?,
            sensor_mode: SensorMode::from_wire(sensor)?,
        })
    }
}

impl Default for FocusConfig {
    fn default() -> Self {
        Self::new(ControlMode::PiezoDrive, SensorMode::LineMode)
    }
}

impl fmt::Display for FocusConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.control_mode, self.sensor_mode)
    }
}

/// DAC code for `volts`. The caller validates the range.
pub fn volts_to_dac(volts: f64) -> u16 {
    let code = (f64::from(DAC_MAX) * volts / PIEZO_MAX_VOLTS).round();
    code.clamp(0.0, f64::from(DAC_MAX)) as u16
}

/// Voltage represented by a DAC readback.
pub fn dac_to_volts(code: u16) -> f64 {
    PIEZO_MAX_VOLTS * f64::from(code) / f64::from(DAC_MAX)
}

/// Smallest voltage increment of the 12-bit output.
pub fn dac_step_volts() -> f64 {
    PIEZO_MAX_VOLTS / 4096.0
}

/// Parse a `0`/`1` flag.
pub fn parse_flag(text: &str) -> Result<bool, ProtocolError> {
    match text.trim() {
        "0" => Ok(false),
        "1" => Ok(true),
        _ => Err(ProtocolError::unexpected(text, "flag (0 or 1)")),
    }
}

/// Parse an integer readback.
pub fn parse_int<T: FromStr>(text: &str, expected: &'static str) -> Result<T, ProtocolError> {
    text.trim()
        .parse::<T>()
        .map_err(|_| ProtocolError::unexpected(text, expected))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_codes() {
        assert_eq!(ControlMode::StepperDrive.code(), 0);
        assert_eq!(ControlMode::PiezoDrive.code(), 1);
        assert_eq!(ControlMode::MeasureMode.code(), 2);
        assert_eq!(SensorMode::LineMode.code(), 1);
        assert_eq!(DigipotMode::Offset.code(), 1);
        assert_eq!(ControlMode::from_code(3), None);
    }

    #[test]
    fn test_config_from_wire() {
        let config = FocusConfig::from_wire("1,0").unwrap();
        assert_eq!(config.control_mode, ControlMode::PiezoDrive);
        assert_eq!(config.sensor_mode, SensorMode::SliceMode);

        assert!(FocusConfig::from_wire("1").is_err());
        assert!(FocusConfig::from_wire("9,0").is_err());
        assert!(FocusConfig::from_wire("0,x").is_err());
    }

    #[test]
    fn test_from_str_accepts_names_aliases_and_codes() {
        assert_eq!("Offset".parse::<DigipotMode>(), Ok(DigipotMode::Offset));
        assert_eq!("focus".parse::<DigipotMode>(), Ok(DigipotMode::Focus));
        assert_eq!("piezo".parse::<ControlMode>(), Ok(ControlMode::PiezoDrive));
        assert_eq!("2".parse::<ControlMode>(), Ok(ControlMode::MeasureMode));
        assert_eq!("slicemode".parse::<SensorMode>(), Ok(SensorMode::SliceMode));
        assert!("sideways".parse::<SensorMode>().is_err());
    }

    #[test]
    fn test_serde_uses_variant_names() {
        let config: FocusConfig =
            toml::from_str("control_mode = \"StepperDrive\"\nsensor_mode = \"SliceMode\"").unwrap();
        assert_eq!(
            config,
            FocusConfig::new(ControlMode::StepperDrive, SensorMode::SliceMode)
        );
    }

    #[test]
    fn test_dac_conversion_endpoints() {
        assert_eq!(volts_to_dac(0.0), 0);
        assert_eq!(volts_to_dac(10.0), 4095);
        assert_eq!(volts_to_dac(5.0), 2048);
        assert_eq!(dac_to_volts(4095), 10.0);
        assert!((dac_to_volts(volts_to_dac(3.3)) - 3.3).abs() < dac_step_volts());
    }

    #[test]
    fn test_parse_flag() {
        assert_eq!(parse_flag("1"), Ok(true));
        assert_eq!(parse_flag("0"), Ok(false));
        assert!(parse_flag("2").is_err());
        assert!(parse_flag("").is_err());
    }

    #[test]
    fn test_device_info_supported() {
        let info = DeviceInfo {
            product: SUPPORTED_PRODUCT.into(),
            version: "1.0".into(),
        };
        assert!(info.is_supported());
        let other = DeviceInfo {
            product: "Prior Scientific Instruments ProScan".into(),
            version: "1.0".into(),
        };
        assert!(!other.is_supported());
    }
}
