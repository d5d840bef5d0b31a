use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::domain::{
    Battery, BatteryCapabilities, BatteryError, ControlDecision, RawSocFrame, SocReading,
};

/// Test double with scripted telemetry answers and a log of every command.
///
/// The binary never builds one; it only backs unit and integration tests.
///
/// Each `read_soc` pops the next raw frame and validates it like a real answer.
/// Once the script is exhausted reads fail.
pub struct RecordingBattery {
    caps: BatteryCapabilities,
    frames: Mutex<VecDeque<RawSocFrame>>,
    commands: Mutex<Vec<ControlDecision>>,
    fail_actuation: bool,
    reads: AtomicU64,
    polls: AtomicU64,
}

impl RecordingBattery {
    pub fn new(caps: BatteryCapabilities) -> Self {
        Self {
            caps,
            frames: Mutex::new(VecDeque::new()),
            commands: Mutex::new(Vec::new()),
            fail_actuation: false,
            reads: AtomicU64::new(0),
            polls: AtomicU64::new(0),
        }
    }

    pub fn with_frames(mut self, frames: impl IntoIterator<Item = RawSocFrame>) -> Self {
        self.frames.get_mut().extend(frames);
        self
    }

    /// Scripts SoC answers; `None` stands for the error sentinel.
    pub fn with_soc_script(self, script: impl IntoIterator<Item = Option<f64>>) -> Self {
        self.with_frames(script.into_iter().map(|soc| match soc {
            Some(v) => RawSocFrame::reading(v),
            None => RawSocFrame::error(),
        }))
    }

    /// Every actuation call is recorded and then reported as failed.
    pub fn with_failing_actuation(mut self) -> Self {
        self.fail_actuation = true;
        self
    }

    pub fn commands(&self) -> Vec<ControlDecision> {
        self.commands.lock().clone()
    }

    pub fn reads(&self) -> u64 {
        self.reads.load(Ordering::Relaxed)
    }

    pub fn polls(&self) -> u64 {
        self.polls.load(Ordering::Relaxed)
    }

    fn record(&self, decision: ControlDecision) -> Result<(), BatteryError> {
        self.commands.lock().push(decision);
        if self.fail_actuation {
            Err(BatteryError::Communication("actuation rejected".into()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl Battery for RecordingBattery {
    async fn read_soc(&self) -> Result<SocReading, BatteryError> {
        self.reads.fetch_add(1, Ordering::Relaxed);
        let frame = self.frames.lock().pop_front().ok_or_else(|| {
            BatteryError::TelemetryUnavailable("telemetry script exhausted".into())
        })?;
        SocReading::from_frame(frame)
    }

    async fn charge(&self, power_w: f64) -> Result<(), BatteryError> {
        self.record(ControlDecision::Charge(power_w))
    }

    async fn discharge(&self, power_w: f64) -> Result<(), BatteryError> {
        self.record(ControlDecision::Discharge(power_w))
    }

    async fn standby(&self) -> Result<(), BatteryError> {
        self.record(ControlDecision::Standby)
    }

    async fn poll(&self) -> Result<(), BatteryError> {
        self.polls.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn capabilities(&self) -> BatteryCapabilities {
        self.caps
    }
}
