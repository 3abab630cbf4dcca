//! Output of located strikes

pub mod formatting;

pub use formatting::{OutputFormat, StrikeFormatter};
