use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Field carrying the SoC percentage in the battery interface's telemetry answer.
pub const SOC_FIELD: &str = "RemainingCapacity3";
/// Sentinel answer the battery interface returns when SoC cannot be read.
pub const ERROR_SENTINEL: &str = "ERROR";
/// Gauge overshoot past 0 or 100 % accepted and clamped rather than rejected.
pub const SOC_OVERSHOOT_TOLERANCE: f64 = 1.0;

/// Battery-specific errors
#[derive(Debug, Error)]
pub enum BatteryError {
    #[error("telemetry unavailable: {0}")]
    TelemetryUnavailable(String),
    #[error("malformed telemetry frame: {0}")]
    MalformedTelemetry(String),
    #[error("invalid power command: {0}W (must be finite and non-negative)")]
    InvalidPower(f64),
    #[error("communication error: {0}")]
    Communication(String),
}

/// Battery operational status
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum BatteryStatus {
    Idle,
    Charging,
    Discharging,
    Standby,
}

/// Static limits of the battery. Read by the controller, never mutated.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BatteryCapabilities {
    pub capacity_kwh: f64,
    pub max_charge_w: f64,
    pub max_discharge_w: f64,
}

/// Command produced by a control policy for one time slot.
///
/// Power magnitudes are always non-negative watts.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum ControlDecision {
    Charge(f64),
    Discharge(f64),
    Standby,
}

impl ControlDecision {
    pub fn power_w(&self) -> f64 {
        match self {
            ControlDecision::Charge(w) | ControlDecision::Discharge(w) => *w,
            ControlDecision::Standby => 0.0,
        }
    }
}

impl fmt::Display for ControlDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ControlDecision::Charge(w) => write!(f, "charge({w:.1}W)"),
            ControlDecision::Discharge(w) => write!(f, "discharge({w:.1}W)"),
            ControlDecision::Standby => write!(f, "standby"),
        }
    }
}

/// SoC value as the battery interface reports it: a number or a numeric string.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SocValue {
    Number(f64),
    Text(String),
}

/// Raw telemetry answer, before validation.
///
/// Either `{"RemainingCapacity3": <value>}` or a bare sentinel string such as `"ERROR"`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawSocFrame {
    Reading {
        #[serde(rename = "RemainingCapacity3")]
        remaining_capacity: SocValue,
    },
    Sentinel(String),
}

impl RawSocFrame {
    pub fn reading(soc_percent: f64) -> Self {
        RawSocFrame::Reading {
            remaining_capacity: SocValue::Number(soc_percent),
        }
    }

    pub fn error() -> Self {
        RawSocFrame::Sentinel(ERROR_SENTINEL.to_string())
    }
}

/// Validated state of charge in percent (0..=100).
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SocReading {
    pub soc_percent: f64,
}

impl SocReading {
    pub fn new(soc_percent: f64) -> Result<Self, BatteryError> {
        let accepted = -SOC_OVERSHOOT_TOLERANCE..=100.0 + SOC_OVERSHOOT_TOLERANCE;
        if !soc_percent.is_finite() || !accepted.contains(&soc_percent) {
            return Err(BatteryError::MalformedTelemetry(format!(
                "{SOC_FIELD} out of range: {soc_percent}"
            )));
        }
        Ok(Self {
            soc_percent: soc_percent.clamp(0.0, 100.0),
        })
    }

    /// Validates a raw telemetry answer. Any sentinel is a hard error for this read.
    pub fn from_frame(frame: RawSocFrame) -> Result<Self, BatteryError> {
        match frame {
            RawSocFrame::Sentinel(s) => Err(BatteryError::TelemetryUnavailable(s)),
            RawSocFrame::Reading {
                remaining_capacity: SocValue::Number(v),
            } => Self::new(v),
            RawSocFrame::Reading {
                remaining_capacity: SocValue::Text(s),
            } => {
                let v = s.trim().parse::<f64>().map_err(|_| {
                    BatteryError::MalformedTelemetry(format!("{SOC_FIELD} is not numeric: {s:?}"))
                })?;
                Self::new(v)
            }
        }
    }

    pub fn from_json(raw: &str) -> Result<Self, BatteryError> {
        let frame: RawSocFrame = serde_json::from_str(raw)
            .map_err(|e| BatteryError::MalformedTelemetry(e.to_string()))?;
        Self::from_frame(frame)
    }
}

/// Port to the battery management interface.
///
/// Implementations must tolerate concurrent calls from the control loop and the
/// background monitor.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Battery: Send + Sync {
    async fn read_soc(&self) -> Result<SocReading, BatteryError>;
    async fn charge(&self, power_w: f64) -> Result<(), BatteryError>;
    async fn discharge(&self, power_w: f64) -> Result<(), BatteryError>;
    async fn standby(&self) -> Result<(), BatteryError>;
    /// One step of background SoC bookkeeping, driven by the monitor task.
    async fn poll(&self) -> Result<(), BatteryError>;
    fn capabilities(&self) -> BatteryCapabilities;
}
