pub mod battery;
pub mod bids;

pub use battery::*;
pub use bids::*;
