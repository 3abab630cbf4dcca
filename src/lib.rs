//! Lightning Strike Locator
//!
//! Locates the origin of a lightning stroke from the nanosecond arrival times
//! of its electromagnetic pulse at three or more ground stations. A closed-form
//! three-station solution seeds a Gauss-Newton fit over all stations on the
//! WGS84 ellipsoid.

pub mod core;
pub mod algorithms;
pub mod processing;
pub mod validation;
pub mod utils;
pub mod api;

// Re-export commonly used types
pub use crate::core::{DetectionEvent, Event, NanosecondTimestamp, Point, Strike, SIGNAL_VELOCITY_M_PER_NS};
pub use algorithms::{FitParameter, FitParameters, LeastSquareFit, SignalVelocity, ThreePointSolution, ThreePointSolver};
pub use processing::{ProcessingSummary, StrikeLocator, StrikeSink};
pub use validation::{EventValidator, GeometryIssue, LocatorError, LocatorResult};
pub use utils::{ConfigError, FitTermination, LocatorConfig};
pub use api::{OutputFormat, StrikeFormatter};
