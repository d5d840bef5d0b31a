//! Background SoC monitor.
//!
//! Runs next to the control loop for the whole process lifetime and drives the
//! battery's own SoC bookkeeping. Stops cooperatively when its cancellation
//! token fires, so shutdown does not depend on detached tasks.

use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::domain::Battery;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MonitorReport {
    pub polls: u64,
    pub poll_errors: u64,
}

pub struct SocMonitor {
    battery: Arc<dyn Battery>,
    interval: Duration,
}

impl SocMonitor {
    pub fn new(battery: Arc<dyn Battery>, interval: Duration) -> Self {
        Self {
            battery,
            interval: interval.max(Duration::from_millis(1)),
        }
    }

    pub fn spawn(self, cancel: CancellationToken) -> JoinHandle<MonitorReport> {
        tokio::spawn(self.run(cancel))
    }

    pub async fn run(self, cancel: CancellationToken) -> MonitorReport {
        let mut report = MonitorReport::default();
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        debug!(interval_ms = self.interval.as_millis() as u64, "SoC monitor started");

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    report.polls += 1;
                    if let Err(e) = self.battery.poll().await {
                        report.poll_errors += 1;
                        warn!(error = %e, "SoC monitor poll failed");
                    }
                }
            }
        }

        info!(
            polls = report.polls,
            poll_errors = report.poll_errors,
            "SoC monitor stopped"
        );
        report
    }
}
