//! Bid schedule ingestion.

pub mod loader;

pub use loader::{load_bid_file, load_bids, read_bid_records, BidLoadError};
