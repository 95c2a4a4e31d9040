//! Readback comparison rules for verified writes.
//!
//! Every state-changing command is followed by a readback. Discrete
//! parameters must read back exactly; the piezo range and voltage are compared
//! within tolerances. The device only accepts a discrete subset of ranges and
//! the voltage is quantized to a 12-bit DAC, so neither reads back exactly.
//! Both tolerances are heuristics and therefore configurable.

use crate::types::dac_step_volts;
use serde::{Deserialize, Serialize};

/// How a readback is compared with the requested value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Comparison {
    /// Values must be equal.
    Exact,
    /// `|actual - requested| <= fraction * |requested|`
    Relative(f64),
    /// `|actual - requested| <= bound`
    Absolute(f64),
}

impl Comparison {
    /// Whether `actual` satisfies this rule for `requested`.
    pub fn accepts(&self, requested: f64, actual: f64) -> bool {
        let diff = (actual - requested).abs();
        match *self {
            Comparison::Exact => diff == 0.0,
            Comparison::Relative(fraction) => diff <= fraction * requested.abs(),
            Comparison::Absolute(bound) => diff <= bound,
        }
    }
}

/// Tolerances used when verifying the analog piezo parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Tolerances {
    /// Relative tolerance on the piezo range readback
    pub piezo_range_relative: f64,
    /// Absolute tolerance on the piezo voltage readback, in volts
    pub piezo_voltage_absolute: f64,
}

impl Default for Tolerances {
    fn default() -> Self {
        Self {
            piezo_range_relative: 0.10,
            piezo_voltage_absolute: 2.0 * dac_step_volts(),
        }
    }
}

impl Tolerances {
    pub fn piezo_range(&self) -> Comparison {
        Comparison::Relative(self.piezo_range_relative)
    }

    pub fn piezo_voltage(&self) -> Comparison {
        Comparison::Absolute(self.piezo_voltage_absolute)
    }

    /// Reject negative or non-finite tolerances.
    pub fn validate(&self) -> Result<(), String> {
        for (name, value) in [
            ("piezo_range_relative", self.piezo_range_relative),
            ("piezo_voltage_absolute", self.piezo_voltage_absolute),
        ] {
            if !value.is_finite() || value <= 0.0 {
                return Err(format!("{name} must be a positive number, got {value}"));
            }
        }
        Ok(())
    }
}
