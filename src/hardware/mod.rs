//! Battery port implementations.

pub mod recording;
pub mod simulated;

pub use recording::RecordingBattery;
pub use simulated::{SimulatedBattery, SimulatedSnapshot};
