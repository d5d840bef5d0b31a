//! Control policies mapping (target SoC, current SoC) to a battery command.
//!
//! - **Edge**: bang-bang. Full charge or discharge power until the target is met.
//! - **Smooth**: proportional. Average power needed to close the SoC gap within
//!   the remaining time, clamped to the battery's power limits.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::ControllerConfig;
use crate::domain::{BatteryCapabilities, ControlDecision};

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::EnumString, strum::Display,
)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
#[serde(rename_all = "lowercase")]
pub enum ControlMode {
    Edge,
    Smooth,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ModeError {
    #[error("invalid control mode {0:?}; choose 'edge' or 'smooth'")]
    Invalid(String),
}

impl ControlMode {
    /// Parses user input: surrounding whitespace ignored, case-insensitive.
    pub fn parse(input: &str) -> Result<Self, ModeError> {
        let trimmed = input.trim();
        trimmed
            .parse()
            .map_err(|_| ModeError::Invalid(trimmed.to_string()))
    }

    pub fn policy(self, tuning: PolicyTuning) -> Box<dyn ControlPolicy> {
        match self {
            ControlMode::Edge => Box::new(EdgePolicy::new(tuning.standby_deadband_percent)),
            ControlMode::Smooth => Box::new(SmoothPolicy::new(
                tuning.remaining_time_hours,
                tuning.standby_deadband_percent,
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PolicyTuning {
    pub remaining_time_hours: f64,
    pub standby_deadband_percent: f64,
}

impl Default for PolicyTuning {
    fn default() -> Self {
        Self {
            remaining_time_hours: 1.0,
            standby_deadband_percent: 0.0,
        }
    }
}

impl From<&ControllerConfig> for PolicyTuning {
    fn from(cfg: &ControllerConfig) -> Self {
        Self {
            remaining_time_hours: cfg.remaining_time_hours,
            standby_deadband_percent: cfg.standby_deadband_percent,
        }
    }
}

pub trait ControlPolicy: Send + Sync {
    fn mode(&self) -> ControlMode;
    fn decide(
        &self,
        target_soc: f64,
        current_soc: f64,
        caps: &BatteryCapabilities,
    ) -> ControlDecision;
}

fn within_deadband(target_soc: f64, current_soc: f64, deadband: f64) -> bool {
    deadband > 0.0 && (target_soc - current_soc).abs() <= deadband
}

#[derive(Debug, Clone, Copy, Default)]
pub struct EdgePolicy {
    deadband_percent: f64,
}

impl EdgePolicy {
    pub fn new(deadband_percent: f64) -> Self {
        Self {
            deadband_percent: deadband_percent.max(0.0),
        }
    }
}

impl ControlPolicy for EdgePolicy {
    fn mode(&self) -> ControlMode {
        ControlMode::Edge
    }

    fn decide(
        &self,
        target_soc: f64,
        current_soc: f64,
        caps: &BatteryCapabilities,
    ) -> ControlDecision {
        if within_deadband(target_soc, current_soc, self.deadband_percent) {
            ControlDecision::Standby
        } else if current_soc < target_soc {
            ControlDecision::Charge(caps.max_charge_w)
        } else if current_soc > target_soc {
            ControlDecision::Discharge(caps.max_discharge_w)
        } else {
            ControlDecision::Standby
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct SmoothPolicy {
    remaining_time_hours: f64,
    deadband_percent: f64,
}

impl Default for SmoothPolicy {
    fn default() -> Self {
        Self::new(1.0, 0.0)
    }
}

impl SmoothPolicy {
    pub fn new(remaining_time_hours: f64, deadband_percent: f64) -> Self {
        Self {
            remaining_time_hours,
            deadband_percent: deadband_percent.max(0.0),
        }
    }

    /// Signed average power (W) that moves the SoC from `current` to `target`
    /// within the remaining time. Positive means charge.
    pub fn required_power_w(&self, target_soc: f64, current_soc: f64, capacity_kwh: f64) -> f64 {
        let soc_difference = target_soc - current_soc;
        (soc_difference / 100.0) * capacity_kwh / self.remaining_time_hours * 1000.0
    }
}

impl ControlPolicy for SmoothPolicy {
    fn mode(&self) -> ControlMode {
        ControlMode::Smooth
    }

    fn decide(
        &self,
        target_soc: f64,
        current_soc: f64,
        caps: &BatteryCapabilities,
    ) -> ControlDecision {
        if within_deadband(target_soc, current_soc, self.deadband_percent) {
            return ControlDecision::Standby;
        }
        let required = self.required_power_w(target_soc, current_soc, caps.capacity_kwh);
        if required > 0.0 {
            ControlDecision::Charge(required.min(caps.max_charge_w))
        } else if required < 0.0 {
            ControlDecision::Discharge(required.abs().min(caps.max_discharge_w))
        } else {
            ControlDecision::Standby
        }
    }
}
