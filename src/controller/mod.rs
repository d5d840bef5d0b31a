pub mod driver;
pub mod monitor;
pub mod policy;

pub use driver::{run_with_mode, BidController, RunSummary, SlotOutcome};
pub use monitor::{MonitorReport, SocMonitor};
pub use policy::{
    ControlMode, ControlPolicy, EdgePolicy, ModeError, PolicyTuning, SmoothPolicy,
};
