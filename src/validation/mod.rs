//! Error types and input screening

pub mod data;
pub mod error;

pub use data::EventValidator;
pub use error::{GeometryIssue, LocatorError, LocatorResult};
