//! Battery SoC bid reconciliation controller.
//!
//! Reads a schedule of per-hour state-of-charge bids, aggregates them per time
//! slot and drives a battery towards each target with either bang-bang
//! ("edge") or proportional ("smooth") control.

pub mod bids;
pub mod config;
pub mod controller;
pub mod domain;
pub mod hardware;
pub mod telemetry;
