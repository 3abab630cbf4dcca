//! Strike location pipeline

pub mod locator;

pub use locator::{ProcessingSummary, StrikeLocator, StrikeSink};
