//! Core types and constants for strike location

pub mod constants;
pub mod geodesy;
pub mod timestamp;
pub mod types;

pub use constants::*;
pub use geodesy::Point;
pub use timestamp::NanosecondTimestamp;
pub use types::*;
