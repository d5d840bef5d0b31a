use async_trait::async_trait;
use parking_lot::RwLock;
use std::time::{Duration, Instant};
use tracing::debug;

use crate::config::BatteryConfig;
use crate::domain::{
    Battery, BatteryCapabilities, BatteryError, BatteryStatus, RawSocFrame, SocReading, SocValue,
};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimulatedSnapshot {
    pub soc_percent: f64,
    /// Signed: positive charges, negative discharges
    pub power_w: f64,
    pub status: BatteryStatus,
}

#[derive(Debug)]
struct SimState {
    soc_percent: f64,
    power_w: f64,
    status: BatteryStatus,
    last_update: Instant,
    telemetry_fault: bool,
}

/// In-process battery with SoC bookkeeping.
///
/// SoC integrates the commanded power over wall-clock time whenever the battery
/// is touched (read, command, or monitor poll). Charging halts at 100 %,
/// discharging at 0 %.
#[derive(Debug)]
pub struct SimulatedBattery {
    caps: BatteryCapabilities,
    state: RwLock<SimState>,
}

impl SimulatedBattery {
    pub fn new(caps: BatteryCapabilities, initial_soc_percent: f64) -> Self {
        Self {
            caps,
            state: RwLock::new(SimState {
                soc_percent: clamp_soc(initial_soc_percent),
                power_w: 0.0,
                status: BatteryStatus::Idle,
                last_update: Instant::now(),
                telemetry_fault: false,
            }),
        }
    }

    pub fn from_config(cfg: &BatteryConfig) -> Self {
        Self::new(cfg.capabilities(), cfg.initial_soc_percent)
    }

    /// While set, SoC reads answer with the error sentinel.
    pub fn set_telemetry_fault(&self, fault: bool) {
        self.state.write().telemetry_fault = fault;
    }

    /// Integrates the current power setpoint over `dt` of simulated time.
    pub fn advance(&self, dt: Duration) {
        let mut st = self.state.write();
        integrate(&mut st, &self.caps, dt);
    }

    pub fn snapshot(&self) -> SimulatedSnapshot {
        let st = self.state.read();
        SimulatedSnapshot {
            soc_percent: st.soc_percent,
            power_w: st.power_w,
            status: st.status,
        }
    }

    fn catch_up(&self) {
        let mut st = self.state.write();
        let now = Instant::now();
        let dt = now.saturating_duration_since(st.last_update);
        integrate(&mut st, &self.caps, dt);
        st.last_update = now;
    }

    fn telemetry_frame(&self) -> RawSocFrame {
        let st = self.state.read();
        if st.telemetry_fault {
            RawSocFrame::error()
        } else {
            RawSocFrame::Reading {
                remaining_capacity: SocValue::Text(format!("{:.2}", st.soc_percent)),
            }
        }
    }

    fn set_power(&self, power_w: f64, status: BatteryStatus) {
        self.catch_up();
        let mut st = self.state.write();
        st.power_w = power_w;
        st.status = status;
        debug!(power_w, %status, soc_percent = st.soc_percent, "simulated battery setpoint");
    }
}

fn clamp_soc(soc: f64) -> f64 {
    soc.clamp(0.0, 100.0)
}

fn validate_power(power_w: f64) -> Result<f64, BatteryError> {
    if power_w.is_finite() && power_w >= 0.0 {
        Ok(power_w)
    } else {
        Err(BatteryError::InvalidPower(power_w))
    }
}

fn integrate(st: &mut SimState, caps: &BatteryCapabilities, dt: Duration) {
    if st.power_w == 0.0 || dt.is_zero() {
        return;
    }
    let dt_h = dt.as_secs_f64() / 3600.0;
    let cap_wh = caps.capacity_kwh.max(0.001) * 1000.0;
    let delta_pct = st.power_w * dt_h / cap_wh * 100.0;
    st.soc_percent = clamp_soc(st.soc_percent + delta_pct);

    let full = st.power_w > 0.0 && st.soc_percent >= 100.0;
    let empty = st.power_w < 0.0 && st.soc_percent <= 0.0;
    if full || empty {
        st.power_w = 0.0;
        st.status = BatteryStatus::Idle;
    }
}

#[async_trait]
impl Battery for SimulatedBattery {
    async fn read_soc(&self) -> Result<SocReading, BatteryError> {
        self.catch_up();
        SocReading::from_frame(self.telemetry_frame())
    }

    async fn charge(&self, power_w: f64) -> Result<(), BatteryError> {
        let w = validate_power(power_w)?.min(self.caps.max_charge_w);
        self.set_power(w, BatteryStatus::Charging);
        Ok(())
    }

    async fn discharge(&self, power_w: f64) -> Result<(), BatteryError> {
        let w = validate_power(power_w)?.min(self.caps.max_discharge_w);
        self.set_power(-w, BatteryStatus::Discharging);
        Ok(())
    }

    async fn standby(&self) -> Result<(), BatteryError> {
        self.set_power(0.0, BatteryStatus::Standby);
        Ok(())
    }

    async fn poll(&self) -> Result<(), BatteryError> {
        self.catch_up();
        Ok(())
    }

    fn capabilities(&self) -> BatteryCapabilities {
        self.caps
    }
}
