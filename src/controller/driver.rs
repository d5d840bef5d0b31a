use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::domain::{
    AggregatedBids, Battery, BatteryCapabilities, BatteryError, ControlDecision, TimeSlotKey,
};

use super::policy::{ControlMode, ControlPolicy, ModeError, PolicyTuning};

/// What happened to a single time slot.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SlotOutcome {
    Actuated(ControlDecision),
    /// Telemetry read failed; no decision, no actuation.
    TelemetrySkipped,
    ActuationFailed(ControlDecision),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub slots_total: usize,
    pub slots_actuated: usize,
    pub slots_skipped: usize,
    pub actuation_failures: usize,
    pub charges: usize,
    pub discharges: usize,
    pub standbys: usize,
    pub cancelled: bool,
}

impl RunSummary {
    fn record(&mut self, outcome: &SlotOutcome) {
        match outcome {
            SlotOutcome::Actuated(decision) => {
                self.slots_actuated += 1;
                match decision {
                    ControlDecision::Charge(_) => self.charges += 1,
                    ControlDecision::Discharge(_) => self.discharges += 1,
                    ControlDecision::Standby => self.standbys += 1,
                }
            }
            SlotOutcome::TelemetrySkipped => self.slots_skipped += 1,
            SlotOutcome::ActuationFailed(_) => self.actuation_failures += 1,
        }
    }

    pub fn slots_processed(&self) -> usize {
        self.slots_actuated + self.slots_skipped + self.actuation_failures
    }
}

/// Walks the aggregated bid schedule, one read / decide / actuate cycle per slot.
///
/// Holds no state between slots.
pub struct BidController {
    battery: Arc<dyn Battery>,
    policy: Box<dyn ControlPolicy>,
    slot_pause: Duration,
}

impl BidController {
    pub fn new(battery: Arc<dyn Battery>, policy: Box<dyn ControlPolicy>) -> Self {
        Self {
            battery,
            policy,
            slot_pause: Duration::ZERO,
        }
    }

    /// Wait between consecutive slots. Zero processes them back-to-back.
    pub fn with_slot_pause(mut self, pause: Duration) -> Self {
        self.slot_pause = pause;
        self
    }

    pub async fn run(&self, bids: &AggregatedBids, cancel: &CancellationToken) -> RunSummary {
        let caps = self.battery.capabilities();
        let mut summary = RunSummary {
            slots_total: bids.len(),
            ..Default::default()
        };
        info!(mode = %self.policy.mode(), slots = bids.len(), "control loop started");

        for (i, (slot, target_soc)) in bids.iter().enumerate() {
            if i > 0 && !self.slot_pause.is_zero() {
                tokio::select! {
                    _ = cancel.cancelled() => {}
                    _ = tokio::time::sleep(self.slot_pause) => {}
                }
            }
            if cancel.is_cancelled() {
                summary.cancelled = true;
                warn!(%slot, "control loop cancelled");
                break;
            }

            let outcome = self.step(slot, target_soc, &caps).await;
            summary.record(&outcome);
        }

        info!(
            mode = %self.policy.mode(),
            total = summary.slots_total,
            actuated = summary.slots_actuated,
            skipped = summary.slots_skipped,
            actuation_failures = summary.actuation_failures,
            cancelled = summary.cancelled,
            "control loop finished"
        );
        summary
    }

    pub async fn step(
        &self,
        slot: TimeSlotKey,
        target_soc: f64,
        caps: &BatteryCapabilities,
    ) -> SlotOutcome {
        let current_soc = match self.battery.read_soc().await {
            Ok(reading) => reading.soc_percent,
            Err(e) => {
                warn!(%slot, error = %e, "SoC read failed, skipping slot");
                return SlotOutcome::TelemetrySkipped;
            }
        };

        let decision = self.policy.decide(target_soc, current_soc, caps);
        info!(
            %slot,
            slot_start = ?slot.start(),
            target_soc,
            current_soc,
            command = %decision,
            power_w = decision.power_w(),
            "slot decision"
        );

        match dispatch(self.battery.as_ref(), decision).await {
            Ok(()) => SlotOutcome::Actuated(decision),
            Err(e) => {
                warn!(%slot, command = %decision, error = %e, "actuation failed");
                SlotOutcome::ActuationFailed(decision)
            }
        }
    }
}

/// Parses the operator's mode choice and runs the schedule with it.
///
/// A rejected mode returns before the battery is read or commanded.
pub async fn run_with_mode(
    raw_mode: &str,
    battery: Arc<dyn Battery>,
    tuning: PolicyTuning,
    slot_pause: Duration,
    bids: &AggregatedBids,
    cancel: &CancellationToken,
) -> Result<RunSummary, ModeError> {
    let mode = ControlMode::parse(raw_mode)?;
    let controller = BidController::new(battery, mode.policy(tuning)).with_slot_pause(slot_pause);
    Ok(controller.run(bids, cancel).await)
}

async fn dispatch(battery: &dyn Battery, decision: ControlDecision) -> Result<(), BatteryError> {
    match decision {
        ControlDecision::Charge(w) => battery.charge(w).await,
        ControlDecision::Discharge(w) => battery.discharge(w).await,
        ControlDecision::Standby => battery.standby().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::policy::{EdgePolicy, SmoothPolicy};
    use crate::domain::{aggregate, BidRecord, MockBattery, SocReading};
    use mockall::predicate::eq;
    use mockall::Sequence;

    fn caps() -> BatteryCapabilities {
        BatteryCapabilities {
            capacity_kwh: 15.0,
            max_charge_w: 120.0,
            max_discharge_w: 100.0,
        }
    }

    fn bids(rows: &[(u32, &str)]) -> AggregatedBids {
        let records: Vec<_> = rows
            .iter()
            .enumerate()
            .map(|(i, (hour, bid))| {
                BidRecord::new(TimeSlotKey::new(2024, 1, 1, *hour), *bid, i + 1)
            })
            .collect();
        aggregate(&records).unwrap()
    }

    #[tokio::test]
    async fn test_edge_charges_at_full_power() {
        let mut battery = MockBattery::new();
        battery.expect_capabilities().return_const(caps());
        battery
            .expect_read_soc()
            .times(1)
            .returning(|| SocReading::new(30.0));
        battery
            .expect_charge()
            .with(eq(120.0))
            .times(1)
            .returning(|_| Ok(()));
        battery.expect_discharge().never();
        battery.expect_standby().never();

        let controller = BidController::new(Arc::new(battery), Box::new(EdgePolicy::default()));
        let summary = controller
            .run(&bids(&[(10, "40"), (10, "60")]), &CancellationToken::new())
            .await;

        assert_eq!(summary.slots_total, 1);
        assert_eq!(summary.charges, 1);
    }

    #[tokio::test]
    async fn test_telemetry_error_skips_slot_and_continues() {
        let mut battery = MockBattery::new();
        let mut seq = Sequence::new();
        battery.expect_capabilities().return_const(caps());
        battery
            .expect_read_soc()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|| Err(BatteryError::TelemetryUnavailable("ERROR".into())));
        battery
            .expect_read_soc()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|| SocReading::new(80.0));
        battery.expect_charge().never();
        battery.expect_standby().never();
        battery
            .expect_discharge()
            .with(eq(100.0))
            .times(1)
            .returning(|_| Ok(()));

        let controller = BidController::new(Arc::new(battery), Box::new(SmoothPolicy::default()));
        let summary = controller
            .run(&bids(&[(1, "50"), (2, "50")]), &CancellationToken::new())
            .await;

        assert_eq!(summary.slots_skipped, 1);
        assert_eq!(summary.slots_actuated, 1);
        assert_eq!(summary.discharges, 1);
        assert!(!summary.cancelled);
    }

    #[tokio::test]
    async fn test_standby_on_exact_target() {
        let mut battery = MockBattery::new();
        battery.expect_capabilities().return_const(caps());
        battery
            .expect_read_soc()
            .returning(|| SocReading::new(50.0));
        battery.expect_standby().times(2).returning(|| Ok(()));
        battery.expect_charge().never();
        battery.expect_discharge().never();

        let battery: Arc<dyn Battery> = Arc::new(battery);
        for policy in [
            Box::new(EdgePolicy::default()) as Box<dyn ControlPolicy>,
            Box::new(SmoothPolicy::default()),
        ] {
            let controller = BidController::new(battery.clone(), policy);
            let summary = controller
                .run(&bids(&[(3, "50")]), &CancellationToken::new())
                .await;
            assert_eq!(summary.standbys, 1);
        }
    }

    #[tokio::test]
    async fn test_actuation_failure_is_counted_not_fatal() {
        let mut battery = MockBattery::new();
        battery.expect_capabilities().return_const(caps());
        battery
            .expect_read_soc()
            .returning(|| SocReading::new(10.0));
        battery
            .expect_charge()
            .returning(|_| Err(BatteryError::Communication("link down".into())));

        let controller = BidController::new(Arc::new(battery), Box::new(EdgePolicy::default()));
        let summary = controller
            .run(&bids(&[(1, "20"), (2, "20")]), &CancellationToken::new())
            .await;

        assert_eq!(summary.actuation_failures, 2);
        assert_eq!(summary.slots_actuated, 0);
        assert_eq!(summary.slots_processed(), 2);
    }

    #[tokio::test]
    async fn test_cancelled_before_start_touches_nothing() {
        let mut battery = MockBattery::new();
        battery.expect_capabilities().return_const(caps());
        battery.expect_read_soc().never();

        let cancel = CancellationToken::new();
        cancel.cancel();
        let controller = BidController::new(Arc::new(battery), Box::new(EdgePolicy::default()));
        let summary = controller.run(&bids(&[(1, "20")]), &cancel).await;

        assert!(summary.cancelled);
        assert_eq!(summary.slots_processed(), 0);
    }
}
